//! The stack-based interpreter: executes a function's instructions directly
//! against a value stack, without compiling to machine code.
//!
//! The opcode-dispatch shape — one match arm per instruction, each popping
//! its operands off a stack and pushing its result — mirrors this engine's
//! own per-opcode `translate_operator` dispatch; the arm bodies differ in
//! that they compute a value on the spot instead of emitting an IR
//! instruction for a later compilation stage.

use crate::func::{Caller, FuncInstance};
use crate::indices::FuncIndex;
use crate::instr::{Block, IfElse, Instruction, MemArg};
use crate::module::Module;
use crate::store::{FuncAddr, InstanceAddr, Store};
use crate::trap::Trap;
use crate::types::BlockType;
use crate::values::{Ref, Val};
use alloc::vec::Vec;

/// Records, for one structurally-enclosing block/loop/if, the value-stack
/// height at entry and the arity a branch targeting it carries: the
/// result-type count for ordinary blocks, the parameter-type count for
/// loops (a branch to a loop re-enters at its start).
struct LabelInfo {
    height: usize,
    arity: usize,
}

enum Flow {
    Normal,
    /// Unwinding towards a branch target `depth` levels further out.
    Branch(u32),
    Return,
}

struct Ctx<'a> {
    store: &'a mut Store,
    instance: InstanceAddr,
    module: &'a Module,
}

/// Cap on nested Wasm-to-Wasm call depth. There is no compiled code here to
/// size a guard page against, so this is a plain counter threaded through
/// `Store` rather than a native-stack probe; chosen generously enough that
/// legitimate recursive Wasm programs don't hit it before the host's actual
/// stack would anyway.
const MAX_CALL_DEPTH: u32 = 1024;

pub struct Interpreter;

impl Interpreter {
    pub fn call(
        store: &mut Store,
        addr: FuncAddr,
        params: &[Val],
        results: &mut [Val],
    ) -> crate::Result<()> {
        if store.call_depth >= MAX_CALL_DEPTH {
            return Err(Trap::StackOverflow.into());
        }
        store.call_depth += 1;
        let result = Self::call_inner(store, addr, params, results);
        store.call_depth -= 1;
        result
    }

    fn call_inner(
        store: &mut Store,
        addr: FuncAddr,
        params: &[Val],
        results: &mut [Val],
    ) -> crate::Result<()> {
        enum Callee {
            Wasm {
                instance: InstanceAddr,
                module: alloc::sync::Arc<Module>,
                def_index: crate::indices::DefinedFuncIndex,
            },
            Host(alloc::sync::Arc<spin::Mutex<crate::func::HostFunc>>),
        }

        let callee = match &store.funcs[addr] {
            FuncInstance::Wasm {
                module,
                instance,
                def_index,
                ..
            } => Callee::Wasm {
                instance: *instance,
                module: module.clone(),
                def_index: *def_index,
            },
            FuncInstance::Host { func, .. } => Callee::Host(func.clone()),
        };

        let (instance, module, def_index) = match callee {
            Callee::Host(host) => {
                let mut guard = host.lock();
                return match (*guard)(Caller { store }, params, results) {
                    Ok(()) => Ok(()),
                    // A host function signals clean shutdown by returning
                    // this sentinel rather than a real failure.
                    Err(Trap::Terminated) => Ok(()),
                    Err(_) => Err(Trap::HostFuncFailed.into()),
                };
            }
            Callee::Wasm {
                instance,
                module,
                def_index,
            } => (instance, module, def_index),
        };

        let body = &module.function_bodies[def_index];
        let mut locals: Vec<Val> = params.to_vec();
        for ty in body.locals.iter() {
            locals.push(Val::default_for(*ty));
        }

        let mut stack: Vec<Val> = Vec::new();
        let mut labels: Vec<LabelInfo> = Vec::new();
        let mut ctx = Ctx {
            store,
            instance,
            module: &module,
        };

        match exec_seq(&body.instructions, &mut stack, &mut locals, &mut labels, &mut ctx)? {
            Flow::Normal | Flow::Return => {}
            Flow::Branch(_) => unreachable!("branch escaped function body; validation bug"),
        }

        let n = results.len();
        let base = stack.len() - n;
        results.copy_from_slice(&stack[base..]);
        Ok(())
    }
}

fn block_arity(ty: BlockType, module: &Module, is_loop: bool) -> usize {
    match ty {
        BlockType::Empty => 0,
        BlockType::Value(_) => {
            if is_loop {
                0
            } else {
                1
            }
        }
        BlockType::FuncType(idx) => {
            let fty = &module.types[idx];
            if is_loop {
                fty.params().len()
            } else {
                fty.results().len()
            }
        }
    }
}

fn truncate_for_branch(stack: &mut Vec<Val>, label: &LabelInfo) {
    let carried_start = stack.len() - label.arity;
    let carried: Vec<Val> = stack[carried_start..].to_vec();
    stack.truncate(label.height);
    stack.extend(carried);
}

fn exec_seq(
    instrs: &[Instruction],
    stack: &mut Vec<Val>,
    locals: &mut [Val],
    labels: &mut Vec<LabelInfo>,
    ctx: &mut Ctx<'_>,
) -> Result<Flow, Trap> {
    for instr in instrs {
        charge(ctx, instr)?;
        match exec_one(instr, stack, locals, labels, ctx)? {
            Flow::Normal => continue,
            other => return Ok(other),
        }
    }
    Ok(Flow::Normal)
}

/// Debits one dispatched instruction's cost from the running gas counter,
/// trapping once a configured limit is exceeded. A no-op (beyond the
/// instruction count) when no cost table is installed.
fn charge(ctx: &mut Ctx<'_>, instr: &Instruction) -> Result<(), Trap> {
    let cost = ctx
        .store
        .config
        .cost_table
        .as_ref()
        .map_or(0, |table| table.cost_of(instr));
    ctx.store.stats.record(cost);
    if let Some(limit) = ctx.store.config.cost_limit {
        if ctx.store.stats.gas_used > limit {
            return Err(Trap::CostLimitExceeded);
        }
    }
    Ok(())
}

macro_rules! pop {
    ($stack:expr, $variant:ident) => {{
        match $stack.pop() {
            Some(v) => v,
            None => unreachable!("operand stack underflow; validation bug"),
        }
    }};
}

macro_rules! binop_i32 {
    ($stack:expr, $op:expr) => {{
        let b = pop!($stack, I32).unwrap_i32();
        let a = pop!($stack, I32).unwrap_i32();
        $stack.push(Val::I32($op(a, b)));
    }};
}

macro_rules! binop_i64 {
    ($stack:expr, $op:expr) => {{
        let b = pop!($stack, I64).unwrap_i64();
        let a = pop!($stack, I64).unwrap_i64();
        $stack.push(Val::I64($op(a, b)));
    }};
}

macro_rules! binop_f32 {
    ($stack:expr, $op:expr) => {{
        let b = pop!($stack, F32).unwrap_f32();
        let a = pop!($stack, F32).unwrap_f32();
        $stack.push(Val::from($op(a, b)));
    }};
}

macro_rules! binop_f64 {
    ($stack:expr, $op:expr) => {{
        let b = pop!($stack, F64).unwrap_f64();
        let a = pop!($stack, F64).unwrap_f64();
        $stack.push(Val::from($op(a, b)));
    }};
}

macro_rules! relop {
    ($stack:expr, $ty:ident, $unwrap:ident, $op:expr) => {{
        let b = pop!($stack, $ty).$unwrap();
        let a = pop!($stack, $ty).$unwrap();
        $stack.push(Val::I32(i32::from($op(a, b))));
    }};
}

#[allow(clippy::too_many_lines, reason = "one match arm per opcode, mirrors the binary format's own flat opcode space")]
fn exec_one(
    instr: &Instruction,
    stack: &mut Vec<Val>,
    locals: &mut [Val],
    labels: &mut Vec<LabelInfo>,
    ctx: &mut Ctx<'_>,
) -> Result<Flow, Trap> {
    use Instruction as I;
    match instr {
        I::Unreachable => return Err(Trap::UnreachableCodeReached),
        I::Nop => {}

        I::Block(Block { ty, body }) => {
            let arity = block_arity(*ty, ctx.module, false);
            labels.push(LabelInfo {
                height: stack.len(),
                arity,
            });
            let flow = exec_seq(body, stack, locals, labels, ctx)?;
            labels.pop();
            match flow {
                Flow::Branch(0) | Flow::Normal => {}
                Flow::Branch(n) => return Ok(Flow::Branch(n - 1)),
                Flow::Return => return Ok(Flow::Return),
            }
        }

        I::Loop(Block { ty, body }) => loop {
            let arity = block_arity(*ty, ctx.module, true);
            labels.push(LabelInfo {
                height: stack.len(),
                arity,
            });
            let flow = exec_seq(body, stack, locals, labels, ctx)?;
            let label = labels.pop().unwrap();
            match flow {
                Flow::Branch(0) => {
                    truncate_for_branch(stack, &label);
                    continue;
                }
                Flow::Branch(n) => return Ok(Flow::Branch(n - 1)),
                Flow::Return => return Ok(Flow::Return),
                Flow::Normal => break,
            }
        },

        I::If(IfElse {
            ty,
            then_body,
            else_body,
        }) => {
            let cond = pop!(stack, I32).unwrap_i32();
            let arity = block_arity(*ty, ctx.module, false);
            labels.push(LabelInfo {
                height: stack.len(),
                arity,
            });
            let body = if cond != 0 { then_body } else { else_body };
            let flow = exec_seq(body, stack, locals, labels, ctx)?;
            labels.pop();
            match flow {
                Flow::Branch(0) => {}
                Flow::Branch(n) => return Ok(Flow::Branch(n - 1)),
                Flow::Return => return Ok(Flow::Return),
                Flow::Normal => {}
            }
        }

        I::Br(label) => {
            let idx = label.as_u32() as usize;
            let info = &labels[labels.len() - 1 - idx];
            truncate_for_branch(stack, info);
            return Ok(Flow::Branch(label.as_u32()));
        }
        I::BrIf(label) => {
            let cond = pop!(stack, I32).unwrap_i32();
            if cond != 0 {
                let idx = label.as_u32() as usize;
                let info = &labels[labels.len() - 1 - idx];
                truncate_for_branch(stack, info);
                return Ok(Flow::Branch(label.as_u32()));
            }
        }
        I::BrTable(table) => {
            let idx = pop!(stack, I32).unwrap_i32();
            let label = if idx >= 0 && (idx as usize) < table.targets.len() {
                table.targets[idx as usize]
            } else {
                table.default
            };
            let depth = label.as_u32() as usize;
            let info = &labels[labels.len() - 1 - depth];
            truncate_for_branch(stack, info);
            return Ok(Flow::Branch(label.as_u32()));
        }
        I::Return => return Ok(Flow::Return),

        I::Call(func_idx) => {
            let addr = resolve_func(ctx, *func_idx);
            call_nested(ctx, addr, stack)?;
        }
        I::CallIndirect { ty, table } => {
            let table_idx = pop!(stack, I32).unwrap_i32();
            let table_addr = ctx.store.instances[ctx.instance].tables[table.as_u32() as usize];
            let r = ctx.store.tables[table_addr].get(table_idx as u32)?;
            let func = r.unwrap_func().ok_or(Trap::IndirectCallToNull)?;
            let expected = &ctx.module.types[*ty];
            if ctx.store.funcs[func.addr()].ty() != expected {
                return Err(Trap::BadSignature);
            }
            call_nested(ctx, func.addr(), stack)?;
        }

        I::Drop => {
            stack.pop();
        }
        I::Select | I::SelectTyped(_) => {
            let cond = pop!(stack, I32).unwrap_i32();
            let b = stack.pop().unwrap();
            let a = stack.pop().unwrap();
            stack.push(if cond != 0 { a } else { b });
        }

        I::LocalGet(idx) => stack.push(locals[idx.as_u32() as usize]),
        I::LocalSet(idx) => locals[idx.as_u32() as usize] = stack.pop().unwrap(),
        I::LocalTee(idx) => locals[idx.as_u32() as usize] = *stack.last().unwrap(),
        I::GlobalGet(idx) => {
            let addr = ctx.store.instances[ctx.instance].globals[idx.as_u32() as usize];
            stack.push(ctx.store.globals[addr].get());
        }
        I::GlobalSet(idx) => {
            let addr = ctx.store.instances[ctx.instance].globals[idx.as_u32() as usize];
            let v = stack.pop().unwrap();
            ctx.store.globals[addr].set(v)?;
        }

        I::TableGet(t) => {
            let idx = pop!(stack, I32).unwrap_i32();
            let addr = ctx.store.instances[ctx.instance].tables[t.as_u32() as usize];
            let r = ctx.store.tables[addr].get(idx as u32)?;
            stack.push(Val::from(r));
        }
        I::TableSet(t) => {
            let val = pop_ref(stack);
            let idx = pop!(stack, I32).unwrap_i32();
            let addr = ctx.store.instances[ctx.instance].tables[t.as_u32() as usize];
            ctx.store.tables[addr].set(idx as u32, val)?;
        }
        I::TableSize(t) => {
            let addr = ctx.store.instances[ctx.instance].tables[t.as_u32() as usize];
            stack.push(Val::I32(ctx.store.tables[addr].size() as i32));
        }
        I::TableGrow(t) => {
            let delta = pop!(stack, I32).unwrap_i32() as u32;
            let init = pop_ref(stack);
            let addr = ctx.store.instances[ctx.instance].tables[t.as_u32() as usize];
            let result = ctx.store.tables[addr].grow(delta, init).map_or(-1, |v| v as i32);
            stack.push(Val::I32(result));
        }
        I::TableFill(t) => {
            let len = pop!(stack, I32).unwrap_i32() as u32;
            let val = pop_ref(stack);
            let offset = pop!(stack, I32).unwrap_i32() as u32;
            let addr = ctx.store.instances[ctx.instance].tables[t.as_u32() as usize];
            ctx.store.tables[addr].fill(offset, val, len)?;
        }
        I::TableCopy { dst, src } => {
            let len = pop!(stack, I32).unwrap_i32() as u32;
            let s = pop!(stack, I32).unwrap_i32() as u32;
            let d = pop!(stack, I32).unwrap_i32() as u32;
            let dst_addr = ctx.store.instances[ctx.instance].tables[dst.as_u32() as usize];
            let src_addr = ctx.store.instances[ctx.instance].tables[src.as_u32() as usize];
            if dst_addr == src_addr {
                ctx.store.tables[dst_addr].copy_within(d, s, len)?;
            } else {
                let src_elems: Vec<Ref> = (s..s + len)
                    .map(|i| ctx.store.tables[src_addr].get(i))
                    .collect::<Result<_, _>>()?;
                ctx.store.tables[dst_addr].init(d, &src_elems, 0, len)?;
            }
        }
        I::TableInit { table, elem } => {
            let len = pop!(stack, I32).unwrap_i32() as u32;
            let s = pop!(stack, I32).unwrap_i32() as u32;
            let d = pop!(stack, I32).unwrap_i32() as u32;
            let table_addr = ctx.store.instances[ctx.instance].tables[table.as_u32() as usize];
            let items = ctx.store.instances[ctx.instance].elements[elem.as_u32() as usize]
                .clone()
                .unwrap_or_default();
            ctx.store.tables[table_addr].init(d, &items, s, len)?;
        }
        I::ElemDrop(elem) => {
            ctx.store.instances[ctx.instance].elements[elem.as_u32() as usize] = None;
        }

        I::I32Load(m) => load(ctx, stack, m, 4, |b| i32::from_le_bytes(b.try_into().unwrap()), Val::I32)?,
        I::I64Load(m) => load(ctx, stack, m, 8, |b| i64::from_le_bytes(b.try_into().unwrap()), Val::I64)?,
        I::F32Load(m) => load(ctx, stack, m, 4, |b| f32::from_le_bytes(b.try_into().unwrap()), |v| Val::from(v))?,
        I::F64Load(m) => load(ctx, stack, m, 8, |b| f64::from_le_bytes(b.try_into().unwrap()), |v| Val::from(v))?,
        I::I32Load8S(m) => load(ctx, stack, m, 1, |b| i32::from(b[0] as i8), Val::I32)?,
        I::I32Load8U(m) => load(ctx, stack, m, 1, |b| i32::from(b[0]), Val::I32)?,
        I::I32Load16S(m) => load(ctx, stack, m, 2, |b| i32::from(i16::from_le_bytes(b.try_into().unwrap())), Val::I32)?,
        I::I32Load16U(m) => load(ctx, stack, m, 2, |b| i32::from(u16::from_le_bytes(b.try_into().unwrap())), Val::I32)?,
        I::I64Load8S(m) => load(ctx, stack, m, 1, |b| i64::from(b[0] as i8), Val::I64)?,
        I::I64Load8U(m) => load(ctx, stack, m, 1, |b| i64::from(b[0]), Val::I64)?,
        I::I64Load16S(m) => load(ctx, stack, m, 2, |b| i64::from(i16::from_le_bytes(b.try_into().unwrap())), Val::I64)?,
        I::I64Load16U(m) => load(ctx, stack, m, 2, |b| i64::from(u16::from_le_bytes(b.try_into().unwrap())), Val::I64)?,
        I::I64Load32S(m) => load(ctx, stack, m, 4, |b| i64::from(i32::from_le_bytes(b.try_into().unwrap())), Val::I64)?,
        I::I64Load32U(m) => load(ctx, stack, m, 4, |b| i64::from(u32::from_le_bytes(b.try_into().unwrap())), Val::I64)?,

        I::I32Store(m) => store_int(ctx, stack, m, 4, |v: i32| v.to_le_bytes().to_vec(), Val::unwrap_i32)?,
        I::I64Store(m) => store_int(ctx, stack, m, 8, |v: i64| v.to_le_bytes().to_vec(), Val::unwrap_i64)?,
        I::F32Store(m) => store_float32(ctx, stack, m)?,
        I::F64Store(m) => store_float64(ctx, stack, m)?,
        I::I32Store8(m) => store_int(ctx, stack, m, 1, |v: i32| vec![v as u8], Val::unwrap_i32)?,
        I::I32Store16(m) => store_int(ctx, stack, m, 2, |v: i32| (v as u16).to_le_bytes().to_vec(), Val::unwrap_i32)?,
        I::I64Store8(m) => store_int(ctx, stack, m, 1, |v: i64| vec![v as u8], Val::unwrap_i64)?,
        I::I64Store16(m) => store_int(ctx, stack, m, 2, |v: i64| (v as u16).to_le_bytes().to_vec(), Val::unwrap_i64)?,
        I::I64Store32(m) => store_int(ctx, stack, m, 4, |v: i64| (v as u32).to_le_bytes().to_vec(), Val::unwrap_i64)?,

        I::MemorySize(mem) => {
            let addr = ctx.store.instances[ctx.instance].memories[*mem as usize];
            stack.push(Val::I32(ctx.store.memories[addr].size_pages() as i32));
        }
        I::MemoryGrow(mem) => {
            let delta = pop!(stack, I32).unwrap_i32() as u32;
            let addr = ctx.store.instances[ctx.instance].memories[*mem as usize];
            let cap = ctx.store.config.max_memory_pages;
            let result = ctx.store.memories[addr].grow(delta, cap).map_or(-1, |v| v as i32);
            stack.push(Val::I32(result));
        }
        I::MemoryInit { memory, data } => {
            let len = pop!(stack, I32).unwrap_i32() as u32;
            let src = pop!(stack, I32).unwrap_i32() as u32;
            let dst = pop!(stack, I32).unwrap_i32() as u64;
            let mem_addr = ctx.store.instances[ctx.instance].memories[*memory as usize];
            let bytes = ctx.store.instances[ctx.instance].datas[data.as_u32() as usize]
                .clone()
                .unwrap_or_default();
            let end = (src + len) as usize;
            if end > bytes.len() {
                return Err(Trap::MemoryOutOfBounds);
            }
            ctx.store.memories[mem_addr].write(dst, &bytes[src as usize..end])?;
        }
        I::DataDrop(data) => {
            ctx.store.instances[ctx.instance].datas[data.as_u32() as usize] = None;
        }
        I::MemoryCopy { dst, src } => {
            let len = pop!(stack, I32).unwrap_i32() as u32;
            let s = pop!(stack, I32).unwrap_i32() as u64;
            let d = pop!(stack, I32).unwrap_i32() as u64;
            let dst_addr = ctx.store.instances[ctx.instance].memories[*dst as usize];
            let src_addr = ctx.store.instances[ctx.instance].memories[*src as usize];
            if dst_addr == src_addr {
                ctx.store.memories[dst_addr].copy_within(d, s, len)?;
            } else {
                let mut buf = alloc::vec![0u8; len as usize];
                ctx.store.memories[src_addr].read(s, &mut buf)?;
                ctx.store.memories[dst_addr].write(d, &buf)?;
            }
        }
        I::MemoryFill(mem) => {
            let len = pop!(stack, I32).unwrap_i32() as u32;
            let val = pop!(stack, I32).unwrap_i32() as u8;
            let offset = pop!(stack, I32).unwrap_i32() as u64;
            let addr = ctx.store.instances[ctx.instance].memories[*mem as usize];
            ctx.store.memories[addr].fill(offset, val, len)?;
        }

        I::I32Const(v) => stack.push(Val::I32(*v)),
        I::I64Const(v) => stack.push(Val::I64(*v)),
        I::F32Const(v) => stack.push(Val::from(*v)),
        I::F64Const(v) => stack.push(Val::from(*v)),

        I::I32Eqz => {
            let a = pop!(stack, I32).unwrap_i32();
            stack.push(Val::I32(i32::from(a == 0)));
        }
        I::I32Eq => relop!(stack, I32, unwrap_i32, |a, b| a == b),
        I::I32Ne => relop!(stack, I32, unwrap_i32, |a, b| a != b),
        I::I32LtS => relop!(stack, I32, unwrap_i32, |a, b| a < b),
        I::I32LtU => relop!(stack, I32, unwrap_i32, |a: i32, b: i32| (a as u32) < (b as u32)),
        I::I32GtS => relop!(stack, I32, unwrap_i32, |a, b| a > b),
        I::I32GtU => relop!(stack, I32, unwrap_i32, |a: i32, b: i32| (a as u32) > (b as u32)),
        I::I32LeS => relop!(stack, I32, unwrap_i32, |a, b| a <= b),
        I::I32LeU => relop!(stack, I32, unwrap_i32, |a: i32, b: i32| (a as u32) <= (b as u32)),
        I::I32GeS => relop!(stack, I32, unwrap_i32, |a, b| a >= b),
        I::I32GeU => relop!(stack, I32, unwrap_i32, |a: i32, b: i32| (a as u32) >= (b as u32)),

        I::I64Eqz => {
            let a = pop!(stack, I64).unwrap_i64();
            stack.push(Val::I32(i32::from(a == 0)));
        }
        I::I64Eq => relop!(stack, I64, unwrap_i64, |a, b| a == b),
        I::I64Ne => relop!(stack, I64, unwrap_i64, |a, b| a != b),
        I::I64LtS => relop!(stack, I64, unwrap_i64, |a, b| a < b),
        I::I64LtU => relop!(stack, I64, unwrap_i64, |a: i64, b: i64| (a as u64) < (b as u64)),
        I::I64GtS => relop!(stack, I64, unwrap_i64, |a, b| a > b),
        I::I64GtU => relop!(stack, I64, unwrap_i64, |a: i64, b: i64| (a as u64) > (b as u64)),
        I::I64LeS => relop!(stack, I64, unwrap_i64, |a, b| a <= b),
        I::I64LeU => relop!(stack, I64, unwrap_i64, |a: i64, b: i64| (a as u64) <= (b as u64)),
        I::I64GeS => relop!(stack, I64, unwrap_i64, |a, b| a >= b),
        I::I64GeU => relop!(stack, I64, unwrap_i64, |a: i64, b: i64| (a as u64) >= (b as u64)),

        I::F32Eq => relop!(stack, F32, unwrap_f32, |a, b| a == b),
        I::F32Ne => relop!(stack, F32, unwrap_f32, |a, b| a != b),
        I::F32Lt => relop!(stack, F32, unwrap_f32, |a, b| a < b),
        I::F32Gt => relop!(stack, F32, unwrap_f32, |a, b| a > b),
        I::F32Le => relop!(stack, F32, unwrap_f32, |a, b| a <= b),
        I::F32Ge => relop!(stack, F32, unwrap_f32, |a, b| a >= b),
        I::F64Eq => relop!(stack, F64, unwrap_f64, |a, b| a == b),
        I::F64Ne => relop!(stack, F64, unwrap_f64, |a, b| a != b),
        I::F64Lt => relop!(stack, F64, unwrap_f64, |a, b| a < b),
        I::F64Gt => relop!(stack, F64, unwrap_f64, |a, b| a > b),
        I::F64Le => relop!(stack, F64, unwrap_f64, |a, b| a <= b),
        I::F64Ge => relop!(stack, F64, unwrap_f64, |a, b| a >= b),

        I::I32Clz => unop_i32(stack, |v| v.leading_zeros() as i32),
        I::I32Ctz => unop_i32(stack, |v| v.trailing_zeros() as i32),
        I::I32Popcnt => unop_i32(stack, |v| v.count_ones() as i32),
        I::I32Add => binop_i32!(stack, i32::wrapping_add),
        I::I32Sub => binop_i32!(stack, i32::wrapping_sub),
        I::I32Mul => binop_i32!(stack, i32::wrapping_mul),
        I::I32DivS => {
            let b = pop!(stack, I32).unwrap_i32();
            let a = pop!(stack, I32).unwrap_i32();
            if b == 0 {
                return Err(Trap::IntegerDivisionByZero);
            }
            if a == i32::MIN && b == -1 {
                return Err(Trap::IntegerOverflow);
            }
            stack.push(Val::I32(a / b));
        }
        I::I32DivU => {
            let b = pop!(stack, I32).unwrap_i32() as u32;
            let a = pop!(stack, I32).unwrap_i32() as u32;
            if b == 0 {
                return Err(Trap::IntegerDivisionByZero);
            }
            stack.push(Val::I32((a / b) as i32));
        }
        I::I32RemS => {
            let b = pop!(stack, I32).unwrap_i32();
            let a = pop!(stack, I32).unwrap_i32();
            if b == 0 {
                return Err(Trap::IntegerDivisionByZero);
            }
            stack.push(Val::I32(a.wrapping_rem(b)));
        }
        I::I32RemU => {
            let b = pop!(stack, I32).unwrap_i32() as u32;
            let a = pop!(stack, I32).unwrap_i32() as u32;
            if b == 0 {
                return Err(Trap::IntegerDivisionByZero);
            }
            stack.push(Val::I32((a % b) as i32));
        }
        I::I32And => binop_i32!(stack, |a, b: i32| a & b),
        I::I32Or => binop_i32!(stack, |a, b: i32| a | b),
        I::I32Xor => binop_i32!(stack, |a, b: i32| a ^ b),
        I::I32Shl => binop_i32!(stack, |a: i32, b: i32| a.wrapping_shl(b as u32)),
        I::I32ShrS => binop_i32!(stack, |a: i32, b: i32| a.wrapping_shr(b as u32)),
        I::I32ShrU => binop_i32!(stack, |a: i32, b: i32| (a as u32).wrapping_shr(b as u32) as i32),
        I::I32Rotl => binop_i32!(stack, |a: i32, b: i32| a.rotate_left(b as u32)),
        I::I32Rotr => binop_i32!(stack, |a: i32, b: i32| a.rotate_right(b as u32)),

        I::I64Clz => unop_i64(stack, |v| v.leading_zeros() as i64),
        I::I64Ctz => unop_i64(stack, |v| v.trailing_zeros() as i64),
        I::I64Popcnt => unop_i64(stack, |v| v.count_ones() as i64),
        I::I64Add => binop_i64!(stack, i64::wrapping_add),
        I::I64Sub => binop_i64!(stack, i64::wrapping_sub),
        I::I64Mul => binop_i64!(stack, i64::wrapping_mul),
        I::I64DivS => {
            let b = pop!(stack, I64).unwrap_i64();
            let a = pop!(stack, I64).unwrap_i64();
            if b == 0 {
                return Err(Trap::IntegerDivisionByZero);
            }
            if a == i64::MIN && b == -1 {
                return Err(Trap::IntegerOverflow);
            }
            stack.push(Val::I64(a / b));
        }
        I::I64DivU => {
            let b = pop!(stack, I64).unwrap_i64() as u64;
            let a = pop!(stack, I64).unwrap_i64() as u64;
            if b == 0 {
                return Err(Trap::IntegerDivisionByZero);
            }
            stack.push(Val::I64((a / b) as i64));
        }
        I::I64RemS => {
            let b = pop!(stack, I64).unwrap_i64();
            let a = pop!(stack, I64).unwrap_i64();
            if b == 0 {
                return Err(Trap::IntegerDivisionByZero);
            }
            stack.push(Val::I64(a.wrapping_rem(b)));
        }
        I::I64RemU => {
            let b = pop!(stack, I64).unwrap_i64() as u64;
            let a = pop!(stack, I64).unwrap_i64() as u64;
            if b == 0 {
                return Err(Trap::IntegerDivisionByZero);
            }
            stack.push(Val::I64((a % b) as i64));
        }
        I::I64And => binop_i64!(stack, |a, b: i64| a & b),
        I::I64Or => binop_i64!(stack, |a, b: i64| a | b),
        I::I64Xor => binop_i64!(stack, |a, b: i64| a ^ b),
        I::I64Shl => binop_i64!(stack, |a: i64, b: i64| a.wrapping_shl(b as u32)),
        I::I64ShrS => binop_i64!(stack, |a: i64, b: i64| a.wrapping_shr(b as u32)),
        I::I64ShrU => binop_i64!(stack, |a: i64, b: i64| (a as u64).wrapping_shr(b as u32) as i64),
        I::I64Rotl => binop_i64!(stack, |a: i64, b: i64| a.rotate_left(b as u32)),
        I::I64Rotr => binop_i64!(stack, |a: i64, b: i64| a.rotate_right(b as u32)),

        I::F32Abs => unop_f32(stack, f32::abs),
        I::F32Neg => unop_f32(stack, |v: f32| -v),
        I::F32Ceil => unop_f32(stack, f32::ceil),
        I::F32Floor => unop_f32(stack, f32::floor),
        I::F32Trunc => unop_f32(stack, f32::trunc),
        I::F32Nearest => unop_f32(stack, wasm_nearest_f32),
        I::F32Sqrt => unop_f32(stack, f32::sqrt),
        I::F32Add => binop_f32!(stack, |a, b: f32| a + b),
        I::F32Sub => binop_f32!(stack, |a, b: f32| a - b),
        I::F32Mul => binop_f32!(stack, |a, b: f32| a * b),
        I::F32Div => binop_f32!(stack, |a, b: f32| a / b),
        I::F32Min => binop_f32!(stack, wasm_min_f32),
        I::F32Max => binop_f32!(stack, wasm_max_f32),
        I::F32Copysign => binop_f32!(stack, f32::copysign),

        I::F64Abs => unop_f64(stack, f64::abs),
        I::F64Neg => unop_f64(stack, |v: f64| -v),
        I::F64Ceil => unop_f64(stack, f64::ceil),
        I::F64Floor => unop_f64(stack, f64::floor),
        I::F64Trunc => unop_f64(stack, f64::trunc),
        I::F64Nearest => unop_f64(stack, wasm_nearest_f64),
        I::F64Sqrt => unop_f64(stack, f64::sqrt),
        I::F64Add => binop_f64!(stack, |a, b: f64| a + b),
        I::F64Sub => binop_f64!(stack, |a, b: f64| a - b),
        I::F64Mul => binop_f64!(stack, |a, b: f64| a * b),
        I::F64Div => binop_f64!(stack, |a, b: f64| a / b),
        I::F64Min => binop_f64!(stack, wasm_min_f64),
        I::F64Max => binop_f64!(stack, wasm_max_f64),
        I::F64Copysign => binop_f64!(stack, f64::copysign),

        I::I32WrapI64 => {
            let v = pop!(stack, I64).unwrap_i64();
            stack.push(Val::I32(v as i32));
        }
        I::I32TruncF32S => {
            let v = pop!(stack, F32).unwrap_f32() as f64;
            trunc_to_i32(stack, v)?
        }
        I::I32TruncF32U => {
            let v = pop!(stack, F32).unwrap_f32() as f64;
            trunc_to_u32(stack, v)?
        }
        I::I32TruncF64S => {
            let v = pop!(stack, F64).unwrap_f64();
            trunc_to_i32(stack, v)?
        }
        I::I32TruncF64U => {
            let v = pop!(stack, F64).unwrap_f64();
            trunc_to_u32(stack, v)?
        }
        I::I64ExtendI32S => {
            let v = pop!(stack, I32).unwrap_i32();
            stack.push(Val::I64(i64::from(v)));
        }
        I::I64ExtendI32U => {
            let v = pop!(stack, I32).unwrap_i32() as u32;
            stack.push(Val::I64(i64::from(v)));
        }
        I::I64TruncF32S => {
            let v = pop!(stack, F32).unwrap_f32() as f64;
            trunc_to_i64(stack, v)?
        }
        I::I64TruncF32U => {
            let v = pop!(stack, F32).unwrap_f32() as f64;
            trunc_to_u64(stack, v)?
        }
        I::I64TruncF64S => {
            let v = pop!(stack, F64).unwrap_f64();
            trunc_to_i64(stack, v)?
        }
        I::I64TruncF64U => {
            let v = pop!(stack, F64).unwrap_f64();
            trunc_to_u64(stack, v)?
        }
        I::F32ConvertI32S => {
            let v = pop!(stack, I32).unwrap_i32();
            stack.push(Val::from(v as f32));
        }
        I::F32ConvertI32U => {
            let v = pop!(stack, I32).unwrap_i32() as u32;
            stack.push(Val::from(v as f32));
        }
        I::F32ConvertI64S => {
            let v = pop!(stack, I64).unwrap_i64();
            stack.push(Val::from(v as f32));
        }
        I::F32ConvertI64U => {
            let v = pop!(stack, I64).unwrap_i64() as u64;
            stack.push(Val::from(v as f32));
        }
        I::F32DemoteF64 => {
            let v = pop!(stack, F64).unwrap_f64();
            stack.push(Val::from(v as f32));
        }
        I::F64ConvertI32S => {
            let v = pop!(stack, I32).unwrap_i32();
            stack.push(Val::from(f64::from(v)));
        }
        I::F64ConvertI32U => {
            let v = pop!(stack, I32).unwrap_i32() as u32;
            stack.push(Val::from(f64::from(v)));
        }
        I::F64ConvertI64S => {
            let v = pop!(stack, I64).unwrap_i64();
            stack.push(Val::from(v as f64));
        }
        I::F64ConvertI64U => {
            let v = pop!(stack, I64).unwrap_i64() as u64;
            stack.push(Val::from(v as f64));
        }
        I::F64PromoteF32 => {
            let v = pop!(stack, F32).unwrap_f32();
            stack.push(Val::from(f64::from(v)));
        }
        I::I32ReinterpretF32 => {
            let v = pop!(stack, F32).unwrap_f32();
            stack.push(Val::I32(v.to_bits() as i32));
        }
        I::I64ReinterpretF64 => {
            let v = pop!(stack, F64).unwrap_f64();
            stack.push(Val::I64(v.to_bits() as i64));
        }
        I::F32ReinterpretI32 => {
            let v = pop!(stack, I32).unwrap_i32();
            stack.push(Val::F32(v as u32));
        }
        I::F64ReinterpretI64 => {
            let v = pop!(stack, I64).unwrap_i64();
            stack.push(Val::F64(v as u64));
        }
        I::I32Extend8S => {
            let v = pop!(stack, I32).unwrap_i32();
            stack.push(Val::I32(i32::from(v as i8)));
        }
        I::I32Extend16S => {
            let v = pop!(stack, I32).unwrap_i32();
            stack.push(Val::I32(i32::from(v as i16)));
        }
        I::I64Extend8S => {
            let v = pop!(stack, I64).unwrap_i64();
            stack.push(Val::I64(i64::from(v as i8)));
        }
        I::I64Extend16S => {
            let v = pop!(stack, I64).unwrap_i64();
            stack.push(Val::I64(i64::from(v as i16)));
        }

        I::I32TruncSatF32S => {
            let v = pop!(stack, F32).unwrap_f32() as f64;
            stack.push(Val::I32(sat_i32(v)));
        }
        I::I32TruncSatF32U => {
            let v = pop!(stack, F32).unwrap_f32() as f64;
            stack.push(Val::I32(sat_u32(v) as i32));
        }
        I::I32TruncSatF64S => {
            let v = pop!(stack, F64).unwrap_f64();
            stack.push(Val::I32(sat_i32(v)));
        }
        I::I32TruncSatF64U => {
            let v = pop!(stack, F64).unwrap_f64();
            stack.push(Val::I32(sat_u32(v) as i32));
        }
        I::I64TruncSatF32S => {
            let v = pop!(stack, F32).unwrap_f32() as f64;
            stack.push(Val::I64(sat_i64(v)));
        }
        I::I64TruncSatF32U => {
            let v = pop!(stack, F32).unwrap_f32() as f64;
            stack.push(Val::I64(sat_u64(v) as i64));
        }
        I::I64TruncSatF64S => {
            let v = pop!(stack, F64).unwrap_f64();
            stack.push(Val::I64(sat_i64(v)));
        }
        I::I64TruncSatF64U => {
            let v = pop!(stack, F64).unwrap_f64();
            stack.push(Val::I64(sat_u64(v) as i64));
        }

        I::RefNull(rt) => stack.push(Val::from(Ref::null(*rt))),
        I::RefIsNull => {
            let v = stack.pop().unwrap();
            let is_null = matches!(v, Val::FuncRef(None) | Val::ExternRef(None));
            stack.push(Val::I32(i32::from(is_null)));
        }
        I::RefFunc(idx) => {
            let addr = resolve_func(ctx, *idx);
            stack.push(Val::FuncRef(Some(crate::func::Func(addr))));
        }

        // A representative SIMD subset; see Instruction's doc comment for
        // which sub-opcodes the loader currently accepts.
        I::V128Load(m) => load(ctx, stack, m, 16, |b| u128::from_le_bytes(b.try_into().unwrap()), Val::V128)?,
        I::V128Store(m) => {
            let v = pop!(stack, V128).unwrap_v128();
            store_bytes(ctx, stack, m, &v.to_le_bytes())?;
        }
        I::V128Const(bytes) => stack.push(Val::V128(u128::from_le_bytes(*bytes))),
        I::I32x4Splat => simd_splat_i32(stack),
        I::I64x2Splat => simd_splat_i64(stack),
        I::F32x4Splat => simd_splat_f32(stack),
        I::F64x2Splat => simd_splat_f64(stack),
        I::I8x16Add => simd_lanewise_i8(stack, |a, b| a.wrapping_add(b)),
        I::I16x8Add => simd_lanewise_i16(stack, |a, b| a.wrapping_add(b)),
        I::I32x4Add => simd_lanewise_i32(stack, |a, b| a.wrapping_add(b)),
        I::I32x4Sub => simd_lanewise_i32(stack, |a, b| a.wrapping_sub(b)),
        I::I32x4Mul => simd_lanewise_i32(stack, |a, b| a.wrapping_mul(b)),
        I::I64x2Add => simd_lanewise_i64(stack, |a, b| a.wrapping_add(b)),
        I::F32x4Add => simd_lanewise_f32(stack, |a, b| a + b),
        I::F64x2Add => simd_lanewise_f64(stack, |a, b| a + b),
        I::V128And => binop_v128(stack, |a, b| a & b),
        I::V128Or => binop_v128(stack, |a, b| a | b),
        I::V128Xor => binop_v128(stack, |a, b| a ^ b),
        I::V128Not => {
            let v = pop!(stack, V128).unwrap_v128();
            stack.push(Val::V128(!v));
        }
    }
    Ok(Flow::Normal)
}

fn pop_ref(stack: &mut Vec<Val>) -> Ref {
    match stack.pop() {
        Some(Val::FuncRef(f)) => Ref::Func(f),
        Some(Val::ExternRef(e)) => Ref::Extern(e),
        _ => unreachable!("expected a reference operand; validation bug"),
    }
}

fn resolve_func(ctx: &Ctx<'_>, idx: FuncIndex) -> FuncAddr {
    ctx.store.instances[ctx.instance].funcs[idx.as_u32() as usize]
}

fn call_nested(ctx: &mut Ctx<'_>, addr: FuncAddr, stack: &mut Vec<Val>) -> Result<(), Trap> {
    let ty = ctx.store.funcs[addr].ty().clone();
    let nparams = ty.params().len();
    let nresults = ty.results().len();
    let base = stack.len() - nparams;
    let params: Vec<Val> = stack[base..].to_vec();
    stack.truncate(base);
    let mut results = alloc::vec![Val::I32(0); nresults];
    Interpreter::call(ctx.store, addr, &params, &mut results).map_err(|e| match e {
        crate::Error::Trap(t) => t,
        _ => unreachable!("nested call produced a non-trap error after validation"),
    })?;
    stack.extend(results);
    Ok(())
}

fn memory_addr(ctx: &Ctx<'_>, memory: u32) -> crate::store::MemoryAddr {
    ctx.store.instances[ctx.instance].memories[memory as usize]
}

fn load<T>(
    ctx: &mut Ctx<'_>,
    stack: &mut Vec<Val>,
    m: &MemArg,
    width: usize,
    decode: impl Fn(&[u8]) -> T,
    wrap: impl Fn(T) -> Val,
) -> Result<(), Trap> {
    let base = pop!(stack, I32).unwrap_i32() as u64;
    let addr = memory_addr(ctx, m.memory);
    let mut buf = [0u8; 16];
    let buf = &mut buf[..width];
    let offset = base.checked_add(m.offset).ok_or(Trap::MemoryOutOfBounds)?;
    ctx.store.memories[addr].read(offset, buf)?;
    stack.push(wrap(decode(buf)));
    Ok(())
}

fn store_bytes(ctx: &mut Ctx<'_>, stack: &mut Vec<Val>, m: &MemArg, bytes: &[u8]) -> Result<(), Trap> {
    let base = pop!(stack, I32).unwrap_i32() as u64;
    let addr = memory_addr(ctx, m.memory);
    let offset = base.checked_add(m.offset).ok_or(Trap::MemoryOutOfBounds)?;
    ctx.store.memories[addr].write(offset, bytes)
}

fn store_int<T: Copy>(
    ctx: &mut Ctx<'_>,
    stack: &mut Vec<Val>,
    m: &MemArg,
    _width: usize,
    encode: impl Fn(T) -> alloc::vec::Vec<u8>,
    unwrap: impl Fn(&Val) -> T,
) -> Result<(), Trap> {
    let val = stack.pop().unwrap();
    let bytes = encode(unwrap(&val));
    store_bytes(ctx, stack, m, &bytes)
}

fn store_float32(ctx: &mut Ctx<'_>, stack: &mut Vec<Val>, m: &MemArg) -> Result<(), Trap> {
    let v = pop!(stack, F32).unwrap_f32();
    store_bytes(ctx, stack, m, &v.to_le_bytes())
}

fn store_float64(ctx: &mut Ctx<'_>, stack: &mut Vec<Val>, m: &MemArg) -> Result<(), Trap> {
    let v = pop!(stack, F64).unwrap_f64();
    store_bytes(ctx, stack, m, &v.to_le_bytes())
}

fn unop_i32(stack: &mut Vec<Val>, f: impl Fn(i32) -> i32) {
    let v = pop!(stack, I32).unwrap_i32();
    stack.push(Val::I32(f(v)));
}

fn unop_i64(stack: &mut Vec<Val>, f: impl Fn(i64) -> i64) {
    let v = pop!(stack, I64).unwrap_i64();
    stack.push(Val::I64(f(v)));
}

fn unop_f32(stack: &mut Vec<Val>, f: impl Fn(f32) -> f32) {
    let v = pop!(stack, F32).unwrap_f32();
    stack.push(Val::from(f(v)));
}

fn unop_f64(stack: &mut Vec<Val>, f: impl Fn(f64) -> f64) {
    let v = pop!(stack, F64).unwrap_f64();
    stack.push(Val::from(f(v)));
}

fn wasm_min_f32(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::from_bits(0x7fc0_0000)
    } else {
        a.min(b)
    }
}

fn wasm_max_f32(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::from_bits(0x7fc0_0000)
    } else {
        a.max(b)
    }
}

fn wasm_min_f64(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::from_bits(0x7ff8_0000_0000_0000)
    } else {
        a.min(b)
    }
}

fn wasm_max_f64(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::from_bits(0x7ff8_0000_0000_0000)
    } else {
        a.max(b)
    }
}

fn wasm_nearest_f32(v: f32) -> f32 {
    let r = v.round();
    if (v - v.trunc()).abs() == 0.5 && (r as i64) % 2 != 0 {
        r - r.signum()
    } else {
        r
    }
}

fn wasm_nearest_f64(v: f64) -> f64 {
    let r = v.round();
    if (v - v.trunc()).abs() == 0.5 && (r as i64) % 2 != 0 {
        r - r.signum()
    } else {
        r
    }
}

fn trunc_to_i32(stack: &mut Vec<Val>, v: f64) -> Result<(), Trap> {
    if v.is_nan() {
        return Err(Trap::BadConversionToInteger);
    }
    let t = v.trunc();
    if t < i32::MIN as f64 || t >= 2_147_483_648.0 {
        return Err(Trap::IntegerOverflow);
    }
    stack.push(Val::I32(t as i32));
    Ok(())
}

fn trunc_to_u32(stack: &mut Vec<Val>, v: f64) -> Result<(), Trap> {
    if v.is_nan() {
        return Err(Trap::BadConversionToInteger);
    }
    let t = v.trunc();
    if t < 0.0 || t >= 4_294_967_296.0 {
        return Err(Trap::IntegerOverflow);
    }
    stack.push(Val::I32(t as u32 as i32));
    Ok(())
}

fn trunc_to_i64(stack: &mut Vec<Val>, v: f64) -> Result<(), Trap> {
    if v.is_nan() {
        return Err(Trap::BadConversionToInteger);
    }
    let t = v.trunc();
    if t < i64::MIN as f64 || t >= 9_223_372_036_854_775_808.0 {
        return Err(Trap::IntegerOverflow);
    }
    stack.push(Val::I64(t as i64));
    Ok(())
}

fn trunc_to_u64(stack: &mut Vec<Val>, v: f64) -> Result<(), Trap> {
    if v.is_nan() {
        return Err(Trap::BadConversionToInteger);
    }
    let t = v.trunc();
    if t < 0.0 || t >= 18_446_744_073_709_551_616.0 {
        return Err(Trap::IntegerOverflow);
    }
    stack.push(Val::I64(t as u64 as i64));
    Ok(())
}

fn sat_i32(v: f64) -> i32 {
    if v.is_nan() {
        0
    } else {
        v.trunc().clamp(i32::MIN as f64, 2_147_483_647.0) as i32
    }
}

fn sat_u32(v: f64) -> u32 {
    if v.is_nan() || v < 0.0 {
        0
    } else {
        v.trunc().clamp(0.0, 4_294_967_295.0) as u32
    }
}

fn sat_i64(v: f64) -> i64 {
    if v.is_nan() {
        0
    } else {
        v.trunc().clamp(i64::MIN as f64, 9_223_372_036_854_775_807.0) as i64
    }
}

fn sat_u64(v: f64) -> u64 {
    if v.is_nan() || v < 0.0 {
        0
    } else {
        v.trunc().clamp(0.0, 18_446_744_073_709_551_615.0) as u64
    }
}

fn binop_v128(stack: &mut Vec<Val>, f: impl Fn(u128, u128) -> u128) {
    let b = pop!(stack, V128).unwrap_v128();
    let a = pop!(stack, V128).unwrap_v128();
    stack.push(Val::V128(f(a, b)));
}

fn simd_splat_i32(stack: &mut Vec<Val>) {
    let v = pop!(stack, I32).unwrap_i32() as u32;
    let lane = v.to_le_bytes();
    let mut bytes = [0u8; 16];
    for chunk in bytes.chunks_mut(4) {
        chunk.copy_from_slice(&lane);
    }
    stack.push(Val::V128(u128::from_le_bytes(bytes)));
}

fn simd_splat_i64(stack: &mut Vec<Val>) {
    let v = pop!(stack, I64).unwrap_i64() as u64;
    let lane = v.to_le_bytes();
    let mut bytes = [0u8; 16];
    for chunk in bytes.chunks_mut(8) {
        chunk.copy_from_slice(&lane);
    }
    stack.push(Val::V128(u128::from_le_bytes(bytes)));
}

fn simd_splat_f32(stack: &mut Vec<Val>) {
    let v = pop!(stack, F32).unwrap_f32();
    let lane = v.to_le_bytes();
    let mut bytes = [0u8; 16];
    for chunk in bytes.chunks_mut(4) {
        chunk.copy_from_slice(&lane);
    }
    stack.push(Val::V128(u128::from_le_bytes(bytes)));
}

fn simd_splat_f64(stack: &mut Vec<Val>) {
    let v = pop!(stack, F64).unwrap_f64();
    let lane = v.to_le_bytes();
    let mut bytes = [0u8; 16];
    for chunk in bytes.chunks_mut(8) {
        chunk.copy_from_slice(&lane);
    }
    stack.push(Val::V128(u128::from_le_bytes(bytes)));
}

fn simd_lanewise_i8(stack: &mut Vec<Val>, f: impl Fn(u8, u8) -> u8) {
    let b = pop!(stack, V128).unwrap_v128().to_le_bytes();
    let a = pop!(stack, V128).unwrap_v128().to_le_bytes();
    let mut out = [0u8; 16];
    for i in 0..16 {
        out[i] = f(a[i], b[i]);
    }
    stack.push(Val::V128(u128::from_le_bytes(out)));
}

fn simd_lanewise_i16(stack: &mut Vec<Val>, f: impl Fn(u16, u16) -> u16) {
    let b = pop!(stack, V128).unwrap_v128();
    let a = pop!(stack, V128).unwrap_v128();
    lanewise::<u16, 8>(stack, a, b, f);
}

fn simd_lanewise_i32(stack: &mut Vec<Val>, f: impl Fn(u32, u32) -> u32) {
    let b = pop!(stack, V128).unwrap_v128();
    let a = pop!(stack, V128).unwrap_v128();
    lanewise::<u32, 4>(stack, a, b, f);
}

fn simd_lanewise_i64(stack: &mut Vec<Val>, f: impl Fn(u64, u64) -> u64) {
    let b = pop!(stack, V128).unwrap_v128();
    let a = pop!(stack, V128).unwrap_v128();
    lanewise::<u64, 2>(stack, a, b, f);
}

fn simd_lanewise_f32(stack: &mut Vec<Val>, f: impl Fn(f32, f32) -> f32) {
    let b = pop!(stack, V128).unwrap_v128().to_le_bytes();
    let a = pop!(stack, V128).unwrap_v128().to_le_bytes();
    let mut out = [0u8; 16];
    for i in 0..4 {
        let av = f32::from_le_bytes(a[i * 4..i * 4 + 4].try_into().unwrap());
        let bv = f32::from_le_bytes(b[i * 4..i * 4 + 4].try_into().unwrap());
        out[i * 4..i * 4 + 4].copy_from_slice(&f(av, bv).to_le_bytes());
    }
    stack.push(Val::V128(u128::from_le_bytes(out)));
}

fn simd_lanewise_f64(stack: &mut Vec<Val>, f: impl Fn(f64, f64) -> f64) {
    let b = pop!(stack, V128).unwrap_v128().to_le_bytes();
    let a = pop!(stack, V128).unwrap_v128().to_le_bytes();
    let mut out = [0u8; 16];
    for i in 0..2 {
        let av = f64::from_le_bytes(a[i * 8..i * 8 + 8].try_into().unwrap());
        let bv = f64::from_le_bytes(b[i * 8..i * 8 + 8].try_into().unwrap());
        out[i * 8..i * 8 + 8].copy_from_slice(&f(av, bv).to_le_bytes());
    }
    stack.push(Val::V128(u128::from_le_bytes(out)));
}

fn lanewise<T, const N: usize>(stack: &mut Vec<Val>, a: u128, b: u128, f: impl Fn(T, T) -> T)
where
    T: Copy + LeBytes<N>,
{
    let a_bytes = a.to_le_bytes();
    let b_bytes = b.to_le_bytes();
    let width = 16 / N;
    let mut out = [0u8; 16];
    for i in 0..N {
        let av = T::from_le(&a_bytes[i * width..i * width + width]);
        let bv = T::from_le(&b_bytes[i * width..i * width + width]);
        out[i * width..i * width + width].copy_from_slice(&f(av, bv).to_le());
    }
    stack.push(Val::V128(u128::from_le_bytes(out)));
}

trait LeBytes<const N: usize> {
    fn from_le(bytes: &[u8]) -> Self;
    fn to_le(self) -> [u8; 16];
}

impl LeBytes<8> for u16 {
    fn from_le(bytes: &[u8]) -> Self {
        u16::from_le_bytes(bytes.try_into().unwrap())
    }
    fn to_le(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[..2].copy_from_slice(&self.to_le_bytes());
        out
    }
}

impl LeBytes<4> for u32 {
    fn from_le(bytes: &[u8]) -> Self {
        u32::from_le_bytes(bytes.try_into().unwrap())
    }
    fn to_le(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[..4].copy_from_slice(&self.to_le_bytes());
        out
    }
}

impl LeBytes<2> for u64 {
    fn from_le(bytes: &[u8]) -> Self {
        u64::from_le_bytes(bytes.try_into().unwrap())
    }
    fn to_le(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&self.to_le_bytes());
        out
    }
}
