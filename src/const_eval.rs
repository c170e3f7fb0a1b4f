//! Evaluation of constant expressions: the tiny instruction sub-language
//! used for global initializers and active element/data segment offsets.
//!
//! Only a fixed whitelist of instructions are legal here (checked by
//! [`crate::validator::Validator`] at load time); this evaluator trusts that
//! whitelist and simply walks the instructions left to right with a small
//! value stack, exactly as this engine's original constant-expression
//! evaluator does for its (much larger) Cranelift-oriented `ConstOp` set.

use crate::indices::{FuncIndex, GlobalIndex};
use crate::instr::Instruction;
use crate::values::{Ref, Val};
use alloc::boxed::Box;
use smallvec::SmallVec;

/// A constant expression: a flat instruction sequence (already stripped of
/// its terminating `end` by the decoder) guaranteed by validation to push
/// exactly one value and contain only constant-expression instructions.
#[derive(Debug, Clone)]
pub struct ConstExpr {
    instructions: Box<[Instruction]>,
}

impl ConstExpr {
    pub fn new(instructions: Box<[Instruction]>) -> Self {
        Self { instructions }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }
}

/// The external state a constant expression may read: already-resolved
/// imported globals (only imported *immutable* globals are legal operands to
/// `global.get` in a const expr) and a way to turn a function index into a
/// `funcref` value for `ref.func`.
pub struct ConstEvalContext<'a> {
    pub imported_globals: &'a dyn Fn(GlobalIndex) -> Val,
    pub func_ref: &'a dyn Fn(FuncIndex) -> Ref,
}

#[derive(Debug, Default)]
pub struct ConstExprEvaluator {
    stack: SmallVec<[Val; 2]>,
}

impl ConstExprEvaluator {
    pub fn eval(&mut self, expr: &ConstExpr, ctx: &ConstEvalContext<'_>) -> Val {
        self.stack.clear();
        for op in expr.instructions() {
            match op {
                Instruction::I32Const(v) => self.push(Val::I32(*v)),
                Instruction::I64Const(v) => self.push(Val::I64(*v)),
                Instruction::F32Const(v) => self.push(Val::F32(v.to_bits())),
                Instruction::F64Const(v) => self.push(Val::F64(v.to_bits())),
                Instruction::V128Const(bytes) => {
                    self.push(Val::V128(u128::from_le_bytes(*bytes)))
                }
                Instruction::GlobalGet(idx) => self.push((ctx.imported_globals)(*idx)),
                Instruction::RefNull(rt) => self.push(Val::from(Ref::null(*rt))),
                Instruction::RefFunc(idx) => {
                    self.push(Val::from(Ref::Func((ctx.func_ref)(*idx).unwrap_func())))
                }
                Instruction::I32Add => {
                    let (a, b) = self.pop2_i32();
                    self.push(Val::I32(a.wrapping_add(b)));
                }
                Instruction::I32Sub => {
                    let (a, b) = self.pop2_i32();
                    self.push(Val::I32(a.wrapping_sub(b)));
                }
                Instruction::I32Mul => {
                    let (a, b) = self.pop2_i32();
                    self.push(Val::I32(a.wrapping_mul(b)));
                }
                Instruction::I64Add => {
                    let (a, b) = self.pop2_i64();
                    self.push(Val::I64(a.wrapping_add(b)));
                }
                Instruction::I64Sub => {
                    let (a, b) = self.pop2_i64();
                    self.push(Val::I64(a.wrapping_sub(b)));
                }
                Instruction::I64Mul => {
                    let (a, b) = self.pop2_i64();
                    self.push(Val::I64(a.wrapping_mul(b)));
                }
                other => unreachable!("not a constant expression instruction: {other:?}"),
            }
        }
        debug_assert_eq!(self.stack.len(), 1);
        self.stack.pop().expect("const expr leaves one value")
    }

    fn push(&mut self, val: Val) {
        self.stack.push(val);
    }

    fn pop2_i32(&mut self) -> (i32, i32) {
        let b = self.stack.pop().unwrap().unwrap_i32();
        let a = self.stack.pop().unwrap().unwrap_i32();
        (a, b)
    }

    fn pop2_i64(&mut self) -> (i64, i64) {
        let b = self.stack.pop().unwrap().unwrap_i64();
        let a = self.stack.pop().unwrap().unwrap_i64();
        (a, b)
    }
}

/// Instructions legal inside a constant expression under the base spec.
/// Extended-const (the `i32.add`/`i32.sub`/... arithmetic operators here)
/// is accepted unconditionally since it only ever widens what a constant
/// expression can compute, never what it needs to be valid.
pub fn is_const_instruction(instr: &Instruction) -> bool {
    matches!(
        instr,
        Instruction::I32Const(_)
            | Instruction::I64Const(_)
            | Instruction::F32Const(_)
            | Instruction::F64Const(_)
            | Instruction::V128Const(_)
            | Instruction::GlobalGet(_)
            | Instruction::RefNull(_)
            | Instruction::RefFunc(_)
            | Instruction::I32Add
            | Instruction::I32Sub
            | Instruction::I32Mul
            | Instruction::I64Add
            | Instruction::I64Sub
            | Instruction::I64Mul
    )
}
