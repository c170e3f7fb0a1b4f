//! Structural type-checking: the abstract operand-stack/control-stack
//! algorithm the core specification describes, run once per function body
//! (and once per constant expression) after the loader has already turned
//! the binary into an AST.
//!
//! The operand stack holds `Option<ValType>` rather than `ValType`: `None`
//! is the "polymorphic" bottom a stack gets after `unreachable`, where any
//! type is acceptable until the enclosing block ends. This is the same
//! two-stack shape described for every from-scratch Wasm validator; nothing
//! about it is specific to this engine's own runtime representation.

use crate::const_eval::is_const_instruction;
use crate::errors::ValidationError;
use crate::indices::{FuncIndex, GlobalIndex, LocalIndex, TableIndex, TypeIndex};
use crate::instr::Instruction;
use crate::module::{DataMode, ElementMode, EntityType, Module};
use crate::types::{BlockType, FuncType, GlobalType, RefType, ValType};
use crate::Features;
use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

pub struct Validator<'a> {
    features: &'a Features,
}

impl<'a> Validator<'a> {
    pub fn new(features: &'a Features) -> Self {
        Self { features }
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub fn validate(&self, module: &Module) -> Result<(), ValidationError> {
        for ty in module.types.values() {
            if ty.results().len() > 1 && !self.features.multi_value {
                return Err(ValidationError::FeatureDisabled("multi-value"));
            }
        }

        if module.memories.len() > 1 && !self.features.multi_memory {
            return Err(ValidationError::FeatureDisabled("multi-memory"));
        }

        for ty_idx in module.functions.values() {
            self.check_type_index(module, *ty_idx)?;
        }

        if let Some(data_count) = module.data_count {
            if data_count as usize != module.data.len() {
                return Err(ValidationError::DataCountMismatch);
            }
        }

        if module.function_bodies.len() != module.num_defined_funcs() as usize {
            return Err(ValidationError::FunctionCodeMismatch);
        }

        if let Some(start) = module.start {
            let ty = module.func_type(start);
            if !ty.params().is_empty() || !ty.results().is_empty() {
                return Err(ValidationError::InvalidStartFunction);
            }
        }

        for import in &module.imports {
            if let EntityType::Function(ty_idx) = &import.desc {
                self.check_type_index(module, *ty_idx)?;
            }
        }

        for (i, init) in module.global_initializers.values().enumerate() {
            let global_idx = GlobalIndex::from_u32(module.num_imported_globals + i as u32);
            let ty = module.globals[global_idx];
            self.check_const_expr(module, init.instructions(), ty.content)?;
        }

        for seg in module.elements.values() {
            match &seg.mode {
                ElementMode::Active { table, offset } => {
                    self.check_table_index(module, *table)?;
                    self.check_const_expr(module, offset.instructions(), ValType::I32)?;
                }
                ElementMode::Passive | ElementMode::Declarative => {}
            }
            match &seg.items {
                crate::module::ElementItems::Func(fs) => {
                    for idx in fs.iter() {
                        self.check_func_index(module, *idx)?;
                    }
                }
                crate::module::ElementItems::Expr(exprs) => {
                    for expr in exprs.iter() {
                        self.check_const_expr(
                            module,
                            expr.instructions(),
                            ValType::Ref(RefType::Func),
                        )?;
                    }
                }
            }
        }

        for seg in module.data.values() {
            if let DataMode::Active { memory, offset } = &seg.mode {
                self.check_memory_index(module, *memory)?;
                self.check_const_expr(module, offset.instructions(), ValType::I32)?;
            }
        }

        for (name, idx) in &module.exports {
            self.check_entity_index(module, *idx).map_err(|_| {
                ValidationError::TypeMismatch {
                    expected: String::from("valid export target"),
                    found: format!("export '{name}' refers to an unknown entity"),
                }
            })?;
        }

        for (def_index, body) in module.function_bodies.iter() {
            let func_idx = FuncIndex::from_u32(module.num_imported_funcs + def_index.as_u32());
            let ty = module.func_type(func_idx);
            self.check_function_body(module, ty, body)?;
        }

        tracing::debug!(funcs = module.function_bodies.len(), "module validated");
        Ok(())
    }

    fn check_type_index(&self, module: &Module, idx: TypeIndex) -> Result<(), ValidationError> {
        if (idx.as_u32() as usize) < module.types.len() {
            Ok(())
        } else {
            Err(ValidationError::UnknownType(idx.as_u32()))
        }
    }

    fn check_func_index(&self, module: &Module, idx: FuncIndex) -> Result<(), ValidationError> {
        if (idx.as_u32() as usize) < module.functions.len() {
            Ok(())
        } else {
            Err(ValidationError::UnknownFunc(idx.as_u32()))
        }
    }

    fn check_table_index(&self, module: &Module, idx: TableIndex) -> Result<(), ValidationError> {
        if (idx.as_u32() as usize) < module.tables.len() {
            Ok(())
        } else {
            Err(ValidationError::UnknownTable(idx.as_u32()))
        }
    }

    fn check_memory_index(&self, module: &Module, idx: crate::indices::MemoryIndex) -> Result<(), ValidationError> {
        if (idx.as_u32() as usize) < module.memories.len() {
            Ok(())
        } else {
            Err(ValidationError::UnknownMemory(idx.as_u32()))
        }
    }

    fn check_entity_index(&self, module: &Module, idx: crate::indices::EntityIndex) -> Result<(), ValidationError> {
        use crate::indices::EntityIndex as E;
        match idx {
            E::Function(i) => self.check_func_index(module, i),
            E::Table(i) => self.check_table_index(module, i),
            E::Memory(i) => self.check_memory_index(module, i),
            E::Global(i) => {
                if (i.as_u32() as usize) < module.globals.len() {
                    Ok(())
                } else {
                    Err(ValidationError::UnknownGlobal(i.as_u32()))
                }
            }
        }
    }

    /// Checks that `instructions` obey the constant-expression whitelist and
    /// leave exactly one value of `expected` type on the stack. `global.get`
    /// operands must additionally name an already-imported, immutable
    /// global, per the core specification.
    fn check_const_expr(
        &self,
        module: &Module,
        instructions: &[Instruction],
        expected: ValType,
    ) -> Result<(), ValidationError> {
        let mut produced = None;
        for instr in instructions {
            if !is_const_instruction(instr) {
                return Err(ValidationError::InvalidConstExpr);
            }
            produced = Some(match instr {
                Instruction::GlobalGet(idx) => {
                    if idx.as_u32() >= module.num_imported_globals {
                        return Err(ValidationError::InvalidConstExpr);
                    }
                    let ty = module.globals[*idx];
                    if ty.is_mutable() {
                        return Err(ValidationError::ImmutableGlobal);
                    }
                    ty.content
                }
                Instruction::RefFunc(idx) => {
                    self.check_func_index(module, *idx)?;
                    ValType::Ref(RefType::Func)
                }
                other => const_instr_type(other),
            });
        }
        match produced {
            Some(ty) if ty == expected => Ok(()),
            Some(found) => Err(ValidationError::TypeMismatch {
                expected: format!("{expected:?}"),
                found: format!("{found:?}"),
            }),
            None => Err(ValidationError::InvalidConstExpr),
        }
    }

    fn check_function_body(
        &self,
        module: &Module,
        ty: &FuncType,
        body: &crate::module::FunctionBody,
    ) -> Result<(), ValidationError> {
        let mut locals: Vec<ValType> = ty.params().to_vec();
        locals.extend_from_slice(&body.locals);

        let mut checker = FuncChecker {
            validator: self,
            module,
            locals: &locals,
            stack: Vec::new(),
            frames: Vec::new(),
        };
        checker.push_ctrl(FrameKind::Function, Box::from([]), Box::from(ty.results()));
        checker.check_seq(&body.instructions)?;
        checker.pop_ctrl()?;
        if !checker.frames.is_empty() || !checker.stack.is_empty() {
            return Err(ValidationError::EmptyControlStack);
        }
        Ok(())
    }
}

fn const_instr_type(instr: &Instruction) -> ValType {
    match instr {
        Instruction::I32Const(_) | Instruction::I32Add | Instruction::I32Sub | Instruction::I32Mul => ValType::I32,
        Instruction::I64Const(_) | Instruction::I64Add | Instruction::I64Sub | Instruction::I64Mul => ValType::I64,
        Instruction::F32Const(_) => ValType::F32,
        Instruction::F64Const(_) => ValType::F64,
        Instruction::V128Const(_) => ValType::V128,
        Instruction::RefNull(rt) => ValType::Ref(*rt),
        other => unreachable!("not a constant expression instruction: {other:?}"),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Block,
    Loop,
    If,
    Function,
}

struct Frame {
    /// Types pushed back onto the stack when branching to this frame's
    /// label: a loop's own parameters (branching re-enters at the top), or
    /// a block/if/function's results (branching exits with these).
    label_types: Box<[ValType]>,
    end_types: Box<[ValType]>,
    height: usize,
    unreachable: bool,
}

struct FuncChecker<'a, 'b> {
    validator: &'a Validator<'a>,
    module: &'b Module,
    locals: &'b [ValType],
    stack: Vec<Option<ValType>>,
    frames: Vec<Frame>,
}

impl<'a, 'b> FuncChecker<'a, 'b> {
    fn push_val(&mut self, ty: ValType) {
        self.stack.push(Some(ty));
    }

    fn push_vals(&mut self, tys: &[ValType]) {
        for ty in tys {
            self.push_val(*ty);
        }
    }

    fn pop_val(&mut self) -> Result<Option<ValType>, ValidationError> {
        let frame = self.frames.last().ok_or(ValidationError::EmptyControlStack)?;
        if self.stack.len() == frame.height {
            if frame.unreachable {
                return Ok(None);
            }
            return Err(ValidationError::StackUnderflow);
        }
        Ok(self.stack.pop().expect("checked non-empty above"))
    }

    fn pop_expect(&mut self, expected: ValType) -> Result<(), ValidationError> {
        match self.pop_val()? {
            None => Ok(()),
            Some(found) if found == expected => Ok(()),
            Some(found) => Err(ValidationError::TypeMismatch {
                expected: format!("{expected:?}"),
                found: format!("{found:?}"),
            }),
        }
    }

    fn pop_expect_many(&mut self, expected: &[ValType]) -> Result<(), ValidationError> {
        for ty in expected.iter().rev() {
            self.pop_expect(*ty)?;
        }
        Ok(())
    }

    fn set_unreachable(&mut self) -> Result<(), ValidationError> {
        let frame = self.frames.last_mut().ok_or(ValidationError::EmptyControlStack)?;
        let height = frame.height;
        frame.unreachable = true;
        self.stack.truncate(height);
        Ok(())
    }

    fn push_ctrl(&mut self, kind: FrameKind, params: Box<[ValType]>, results: Box<[ValType]>) {
        self.push_vals(&params);
        let label_types = if kind == FrameKind::Loop { params.clone() } else { results.clone() };
        self.frames.push(Frame {
            label_types,
            end_types: results,
            height: self.stack.len(),
            unreachable: false,
        });
    }

    fn pop_ctrl(&mut self) -> Result<Box<[ValType]>, ValidationError> {
        let frame = self.frames.last().ok_or(ValidationError::EmptyControlStack)?;
        let end_types = frame.end_types.clone();
        self.pop_expect_many(&end_types)?;
        let frame = self.frames.last().ok_or(ValidationError::EmptyControlStack)?;
        if self.stack.len() != frame.height {
            return Err(ValidationError::StackUnderflow);
        }
        let frame = self.frames.pop().expect("checked above");
        Ok(frame.end_types)
    }

    fn label(&self, depth: u32) -> Result<&Frame, ValidationError> {
        let len = self.frames.len();
        let idx = len
            .checked_sub(1 + depth as usize)
            .ok_or(ValidationError::UnknownLabel(depth))?;
        Ok(&self.frames[idx])
    }

    fn local_type(&self, idx: LocalIndex) -> Result<ValType, ValidationError> {
        self.locals
            .get(idx.as_u32() as usize)
            .copied()
            .ok_or(ValidationError::UnknownLocal(idx.as_u32()))
    }

    fn global_type(&self, idx: GlobalIndex) -> Result<GlobalType, ValidationError> {
        if (idx.as_u32() as usize) < self.module.globals.len() {
            Ok(self.module.globals[idx])
        } else {
            Err(ValidationError::UnknownGlobal(idx.as_u32()))
        }
    }

    fn block_type_sig(&self, ty: BlockType) -> Result<(Box<[ValType]>, Box<[ValType]>), ValidationError> {
        match ty {
            BlockType::Empty => Ok((Box::from([]), Box::from([]))),
            BlockType::Value(vt) => Ok((Box::from([]), Box::from([vt]))),
            BlockType::FuncType(idx) => {
                self.validator.check_type_index(self.module, idx)?;
                let fty = &self.module.types[idx];
                Ok((fty.params().into(), fty.results().into()))
            }
        }
    }

    fn check_seq(&mut self, instructions: &[Instruction]) -> Result<(), ValidationError> {
        for instr in instructions {
            self.check_one(instr)?;
        }
        Ok(())
    }

    fn check_one(&mut self, instr: &Instruction) -> Result<(), ValidationError> {
        use Instruction as I;
        use ValType::{F32, F64, I32, I64, V128};

        match instr {
            I::Unreachable => self.set_unreachable()?,
            I::Nop => {}

            I::Block(b) => {
                let (params, results) = self.block_type_sig(b.ty)?;
                self.pop_expect_many(&params)?;
                self.push_ctrl(FrameKind::Block, params, results);
                self.check_seq(&b.body)?;
                let results = self.pop_ctrl()?;
                self.push_vals(&results);
            }
            I::Loop(b) => {
                let (params, results) = self.block_type_sig(b.ty)?;
                self.pop_expect_many(&params)?;
                self.push_ctrl(FrameKind::Loop, params, results);
                self.check_seq(&b.body)?;
                let results = self.pop_ctrl()?;
                self.push_vals(&results);
            }
            I::If(ie) => {
                self.pop_expect(I32)?;
                let (params, results) = self.block_type_sig(ie.ty)?;
                self.pop_expect_many(&params)?;
                self.push_ctrl(FrameKind::If, params.clone(), results.clone());
                self.check_seq(&ie.then_body)?;
                let then_results = self.pop_ctrl()?;
                self.push_ctrl(FrameKind::If, params, then_results);
                self.check_seq(&ie.else_body)?;
                let results = self.pop_ctrl()?;
                self.push_vals(&results);
            }

            I::Br(idx) => {
                let label_types = self.label(idx.as_u32())?.label_types.clone();
                self.pop_expect_many(&label_types)?;
                self.set_unreachable()?;
            }
            I::BrIf(idx) => {
                self.pop_expect(I32)?;
                let label_types = self.label(idx.as_u32())?.label_types.clone();
                self.pop_expect_many(&label_types)?;
                self.push_vals(&label_types);
            }
            I::BrTable(bt) => {
                self.pop_expect(I32)?;
                let default_types = self.label(bt.default.as_u32())?.label_types.clone();
                for target in bt.targets.iter() {
                    let target_types = self.label(target.as_u32())?.label_types.clone();
                    if target_types != default_types {
                        return Err(ValidationError::TypeMismatch {
                            expected: format!("{default_types:?}"),
                            found: format!("{target_types:?}"),
                        });
                    }
                }
                self.pop_expect_many(&default_types)?;
                self.set_unreachable()?;
            }
            I::Return => {
                let func_frame = self.frames.first().ok_or(ValidationError::EmptyControlStack)?;
                let results = func_frame.end_types.clone();
                self.pop_expect_many(&results)?;
                self.set_unreachable()?;
            }
            I::Call(idx) => {
                self.validator.check_func_index(self.module, *idx)?;
                let ty = self.module.func_type(*idx).clone();
                self.pop_expect_many(ty.params())?;
                self.push_vals(ty.results());
            }
            I::CallIndirect { ty, table } => {
                self.validator.check_type_index(self.module, *ty)?;
                self.validator.check_table_index(self.module, *table)?;
                let fty = self.module.types[*ty].clone();
                self.pop_expect(I32)?;
                self.pop_expect_many(fty.params())?;
                self.push_vals(fty.results());
            }

            I::Drop => {
                self.pop_val()?;
            }
            I::Select => {
                self.pop_expect(I32)?;
                let a = self.pop_val()?;
                let b = self.pop_val()?;
                match (a, b) {
                    (Some(a), Some(b)) if a != b => {
                        return Err(ValidationError::TypeMismatch {
                            expected: format!("{a:?}"),
                            found: format!("{b:?}"),
                        })
                    }
                    _ => {}
                }
                self.stack.push(a.or(b));
            }
            I::SelectTyped(ty) => {
                self.pop_expect(I32)?;
                self.pop_expect(*ty)?;
                self.pop_expect(*ty)?;
                self.push_val(*ty);
            }

            I::LocalGet(idx) => {
                let ty = self.local_type(*idx)?;
                self.push_val(ty);
            }
            I::LocalSet(idx) => {
                let ty = self.local_type(*idx)?;
                self.pop_expect(ty)?;
            }
            I::LocalTee(idx) => {
                let ty = self.local_type(*idx)?;
                self.pop_expect(ty)?;
                self.push_val(ty);
            }
            I::GlobalGet(idx) => {
                let ty = self.global_type(*idx)?;
                self.push_val(ty.content);
            }
            I::GlobalSet(idx) => {
                let ty = self.global_type(*idx)?;
                if !ty.is_mutable() {
                    return Err(ValidationError::ImmutableGlobal);
                }
                self.pop_expect(ty.content)?;
            }

            I::TableGet(idx) => {
                self.validator.check_table_index(self.module, *idx)?;
                self.pop_expect(I32)?;
                self.push_val(ValType::Ref(self.module.tables[*idx].element));
            }
            I::TableSet(idx) => {
                self.validator.check_table_index(self.module, *idx)?;
                let elem = self.module.tables[*idx].element;
                self.pop_expect(ValType::Ref(elem))?;
                self.pop_expect(I32)?;
            }
            I::TableSize(idx) => {
                self.validator.check_table_index(self.module, *idx)?;
                self.push_val(I32);
            }
            I::TableGrow(idx) => {
                self.validator.check_table_index(self.module, *idx)?;
                let elem = self.module.tables[*idx].element;
                self.pop_expect(I32)?;
                self.pop_expect(ValType::Ref(elem))?;
                self.push_val(I32);
            }
            I::TableFill(idx) => {
                self.validator.check_table_index(self.module, *idx)?;
                let elem = self.module.tables[*idx].element;
                self.pop_expect(I32)?;
                self.pop_expect(ValType::Ref(elem))?;
                self.pop_expect(I32)?;
            }
            I::TableCopy { dst, src } => {
                self.validator.check_table_index(self.module, *dst)?;
                self.validator.check_table_index(self.module, *src)?;
                self.pop_expect(I32)?;
                self.pop_expect(I32)?;
                self.pop_expect(I32)?;
            }
            I::TableInit { table, elem } => {
                self.validator.check_table_index(self.module, *table)?;
                if elem.as_u32() as usize >= self.module.elements.len() {
                    return Err(ValidationError::UnknownTable(elem.as_u32()));
                }
                self.pop_expect(I32)?;
                self.pop_expect(I32)?;
                self.pop_expect(I32)?;
            }
            I::ElemDrop(elem) => {
                if elem.as_u32() as usize >= self.module.elements.len() {
                    return Err(ValidationError::UnknownTable(elem.as_u32()));
                }
            }

            I::MemorySize(_) => {
                self.require_memory()?;
                self.push_val(I32);
            }
            I::MemoryGrow(_) => {
                self.require_memory()?;
                self.pop_expect(I32)?;
                self.push_val(I32);
            }
            I::MemoryInit { data, .. } => {
                self.require_memory()?;
                if data.as_u32() as usize >= self.module.data.len() {
                    return Err(ValidationError::UnknownMemory(data.as_u32()));
                }
                self.pop_expect(I32)?;
                self.pop_expect(I32)?;
                self.pop_expect(I32)?;
            }
            I::DataDrop(data) => {
                if data.as_u32() as usize >= self.module.data.len() {
                    return Err(ValidationError::UnknownMemory(data.as_u32()));
                }
            }
            I::MemoryCopy { .. } => {
                self.require_memory()?;
                self.pop_expect(I32)?;
                self.pop_expect(I32)?;
                self.pop_expect(I32)?;
            }
            I::MemoryFill(_) => {
                self.require_memory()?;
                self.pop_expect(I32)?;
                self.pop_expect(I32)?;
                self.pop_expect(I32)?;
            }

            I::I32Load(_) | I::I32Load8S(_) | I::I32Load8U(_) | I::I32Load16S(_) | I::I32Load16U(_) => {
                self.require_memory()?;
                self.pop_expect(I32)?;
                self.push_val(I32);
            }
            I::I64Load(_)
            | I::I64Load8S(_)
            | I::I64Load8U(_)
            | I::I64Load16S(_)
            | I::I64Load16U(_)
            | I::I64Load32S(_)
            | I::I64Load32U(_) => {
                self.require_memory()?;
                self.pop_expect(I32)?;
                self.push_val(I64);
            }
            I::F32Load(_) => {
                self.require_memory()?;
                self.pop_expect(I32)?;
                self.push_val(F32);
            }
            I::F64Load(_) => {
                self.require_memory()?;
                self.pop_expect(I32)?;
                self.push_val(F64);
            }
            I::I32Store(_) | I::I32Store8(_) | I::I32Store16(_) => {
                self.require_memory()?;
                self.pop_expect(I32)?;
                self.pop_expect(I32)?;
            }
            I::I64Store(_) | I::I64Store8(_) | I::I64Store16(_) | I::I64Store32(_) => {
                self.require_memory()?;
                self.pop_expect(I64)?;
                self.pop_expect(I32)?;
            }
            I::F32Store(_) => {
                self.require_memory()?;
                self.pop_expect(F32)?;
                self.pop_expect(I32)?;
            }
            I::F64Store(_) => {
                self.require_memory()?;
                self.pop_expect(F64)?;
                self.pop_expect(I32)?;
            }
            I::V128Load(_) => {
                self.require_memory()?;
                self.pop_expect(I32)?;
                self.push_val(V128);
            }
            I::V128Store(_) => {
                self.require_memory()?;
                self.pop_expect(V128)?;
                self.pop_expect(I32)?;
            }

            I::I32Const(_) => self.push_val(I32),
            I::I64Const(_) => self.push_val(I64),
            I::F32Const(_) => self.push_val(F32),
            I::F64Const(_) => self.push_val(F64),
            I::V128Const(_) => self.push_val(V128),

            I::I32Eqz => {
                self.pop_expect(I32)?;
                self.push_val(I32);
            }
            I::I32Eq | I::I32Ne | I::I32LtS | I::I32LtU | I::I32GtS | I::I32GtU | I::I32LeS | I::I32LeU
            | I::I32GeS | I::I32GeU => {
                self.pop_expect(I32)?;
                self.pop_expect(I32)?;
                self.push_val(I32);
            }
            I::I64Eqz => {
                self.pop_expect(I64)?;
                self.push_val(I32);
            }
            I::I64Eq | I::I64Ne | I::I64LtS | I::I64LtU | I::I64GtS | I::I64GtU | I::I64LeS | I::I64LeU
            | I::I64GeS | I::I64GeU => {
                self.pop_expect(I64)?;
                self.pop_expect(I64)?;
                self.push_val(I32);
            }
            I::F32Eq | I::F32Ne | I::F32Lt | I::F32Gt | I::F32Le | I::F32Ge => {
                self.pop_expect(F32)?;
                self.pop_expect(F32)?;
                self.push_val(I32);
            }
            I::F64Eq | I::F64Ne | I::F64Lt | I::F64Gt | I::F64Le | I::F64Ge => {
                self.pop_expect(F64)?;
                self.pop_expect(F64)?;
                self.push_val(I32);
            }

            I::I32Clz | I::I32Ctz | I::I32Popcnt | I::I32Extend8S | I::I32Extend16S => {
                self.pop_expect(I32)?;
                self.push_val(I32);
            }
            I::I32Add | I::I32Sub | I::I32Mul | I::I32DivS | I::I32DivU | I::I32RemS | I::I32RemU
            | I::I32And | I::I32Or | I::I32Xor | I::I32Shl | I::I32ShrS | I::I32ShrU | I::I32Rotl
            | I::I32Rotr => {
                self.pop_expect(I32)?;
                self.pop_expect(I32)?;
                self.push_val(I32);
            }
            I::I64Clz | I::I64Ctz | I::I64Popcnt | I::I64Extend8S | I::I64Extend16S => {
                self.pop_expect(I64)?;
                self.push_val(I64);
            }
            I::I64Add | I::I64Sub | I::I64Mul | I::I64DivS | I::I64DivU | I::I64RemS | I::I64RemU
            | I::I64And | I::I64Or | I::I64Xor | I::I64Shl | I::I64ShrS | I::I64ShrU | I::I64Rotl
            | I::I64Rotr => {
                self.pop_expect(I64)?;
                self.pop_expect(I64)?;
                self.push_val(I64);
            }
            I::F32Abs | I::F32Neg | I::F32Ceil | I::F32Floor | I::F32Trunc | I::F32Nearest | I::F32Sqrt => {
                self.pop_expect(F32)?;
                self.push_val(F32);
            }
            I::F32Add | I::F32Sub | I::F32Mul | I::F32Div | I::F32Min | I::F32Max | I::F32Copysign => {
                self.pop_expect(F32)?;
                self.pop_expect(F32)?;
                self.push_val(F32);
            }
            I::F64Abs | I::F64Neg | I::F64Ceil | I::F64Floor | I::F64Trunc | I::F64Nearest | I::F64Sqrt => {
                self.pop_expect(F64)?;
                self.push_val(F64);
            }
            I::F64Add | I::F64Sub | I::F64Mul | I::F64Div | I::F64Min | I::F64Max | I::F64Copysign => {
                self.pop_expect(F64)?;
                self.pop_expect(F64)?;
                self.push_val(F64);
            }

            I::I32WrapI64 => {
                self.pop_expect(I64)?;
                self.push_val(I32);
            }
            I::I32TruncF32S | I::I32TruncF32U | I::I32TruncSatF32S | I::I32TruncSatF32U => {
                self.pop_expect(F32)?;
                self.push_val(I32);
            }
            I::I32TruncF64S | I::I32TruncF64U | I::I32TruncSatF64S | I::I32TruncSatF64U => {
                self.pop_expect(F64)?;
                self.push_val(I32);
            }
            I::I64ExtendI32S | I::I64ExtendI32U => {
                self.pop_expect(I32)?;
                self.push_val(I64);
            }
            I::I64TruncF32S | I::I64TruncF32U | I::I64TruncSatF32S | I::I64TruncSatF32U => {
                self.pop_expect(F32)?;
                self.push_val(I64);
            }
            I::I64TruncF64S | I::I64TruncF64U | I::I64TruncSatF64S | I::I64TruncSatF64U => {
                self.pop_expect(F64)?;
                self.push_val(I64);
            }
            I::F32ConvertI32S | I::F32ConvertI32U => {
                self.pop_expect(I32)?;
                self.push_val(F32);
            }
            I::F32ConvertI64S | I::F32ConvertI64U => {
                self.pop_expect(I64)?;
                self.push_val(F32);
            }
            I::F32DemoteF64 => {
                self.pop_expect(F64)?;
                self.push_val(F32);
            }
            I::F64ConvertI32S | I::F64ConvertI32U => {
                self.pop_expect(I32)?;
                self.push_val(F64);
            }
            I::F64ConvertI64S | I::F64ConvertI64U => {
                self.pop_expect(I64)?;
                self.push_val(F64);
            }
            I::F64PromoteF32 => {
                self.pop_expect(F32)?;
                self.push_val(F64);
            }
            I::I32ReinterpretF32 => {
                self.pop_expect(F32)?;
                self.push_val(I32);
            }
            I::I64ReinterpretF64 => {
                self.pop_expect(F64)?;
                self.push_val(I64);
            }
            I::F32ReinterpretI32 => {
                self.pop_expect(I32)?;
                self.push_val(F32);
            }
            I::F64ReinterpretI64 => {
                self.pop_expect(I64)?;
                self.push_val(F64);
            }

            I::RefNull(rt) => {
                if matches!(rt, RefType::Extern) && !self.validator.features.reference_types {
                    return Err(ValidationError::FeatureDisabled("reference-types"));
                }
                self.push_val(ValType::Ref(*rt));
            }
            I::RefIsNull => {
                self.pop_val()?;
                self.push_val(I32);
            }
            I::RefFunc(idx) => {
                self.validator.check_func_index(self.module, *idx)?;
                self.push_val(ValType::Ref(RefType::Func));
            }

            I::I32x4Splat => {
                self.pop_expect(I32)?;
                self.push_val(V128);
            }
            I::I64x2Splat => {
                self.pop_expect(I64)?;
                self.push_val(V128);
            }
            I::F32x4Splat => {
                self.pop_expect(F32)?;
                self.push_val(V128);
            }
            I::F64x2Splat => {
                self.pop_expect(F64)?;
                self.push_val(V128);
            }
            I::I8x16Add
            | I::I16x8Add
            | I::I32x4Add
            | I::I64x2Add
            | I::F32x4Add
            | I::F64x2Add
            | I::I32x4Sub
            | I::I32x4Mul
            | I::V128And
            | I::V128Or
            | I::V128Xor => {
                self.pop_expect(V128)?;
                self.pop_expect(V128)?;
                self.push_val(V128);
            }
            I::V128Not => {
                self.pop_expect(V128)?;
                self.push_val(V128);
            }
        }
        Ok(())
    }

    fn require_memory(&self) -> Result<(), ValidationError> {
        if self.module.memories.len() == 0 {
            Err(ValidationError::UnknownMemory(0))
        } else {
            Ok(())
        }
    }
}
