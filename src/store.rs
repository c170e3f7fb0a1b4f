//! The runtime substrate: flat arenas of function/table/memory/global
//! instances addressed by opaque typed indices, plus a name-to-instance
//! registry for linking modules against each other by name.
//!
//! This is the one place this engine's architecture most visibly diverges
//! from its teacher: the teacher's `Store` owns instances that each embed a
//! raw `VMContext` pointer blob (so Cranelift-compiled code can address its
//! own state directly), and cross-references that blob via
//! `vmctx2instance`. There is no compiled code here, so instances are plain
//! owned Rust values and the arenas are addressed by
//! `cranelift_entity`-style typed indices instead of pointers — the same
//! "Store owns arenas, instances hold addresses into them" shape described
//! for the runtime substrate, without the pointer layer that shape existed
//! to support.

use crate::config::{EngineConfig, Statistics};
use crate::const_eval::ConstExprEvaluator;
use crate::func::{Func, FuncInstance, HostFunc};
use crate::global::GlobalInstance;
use crate::indices::EntityIndex;
use crate::memory::Memory;
use crate::table::Table;
use crate::types::{FuncType, GlobalType, MemoryType, TableType};
use crate::Module;
use alloc::string::String;
use alloc::sync::Arc;
use cranelift_entity::{entity_impl, PrimaryMap};
use hashbrown::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncAddr(u32);
entity_impl!(FuncAddr);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableAddr(u32);
entity_impl!(TableAddr);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemoryAddr(u32);
entity_impl!(MemoryAddr);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalAddr(u32);
entity_impl!(GlobalAddr);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceAddr(u32);
entity_impl!(InstanceAddr);

/// A resolved export or import: a tagged address into one of the store's
/// arenas.
#[derive(Debug, Clone, Copy)]
pub enum Extern {
    Func(FuncAddr),
    Table(TableAddr),
    Memory(MemoryAddr),
    Global(GlobalAddr),
}

impl Extern {
    crate::enum_accessors! {
        e
        (Func(FuncAddr) is_func func unwrap_func *e)
        (Table(TableAddr) is_table table unwrap_table *e)
        (Memory(MemoryAddr) is_memory memory unwrap_memory *e)
        (Global(GlobalAddr) is_global global unwrap_global *e)
    }

    /// Convenience wrapper around [`Self::func`] that returns the
    /// embedder-facing [`Func`] handle rather than its raw address.
    pub fn into_func(self) -> Option<Func> {
        self.func().map(Func)
    }
}

#[derive(Debug)]
pub struct ModuleInstance {
    pub module: Arc<Module>,
    pub funcs: alloc::vec::Vec<FuncAddr>,
    pub tables: alloc::vec::Vec<TableAddr>,
    pub memories: alloc::vec::Vec<MemoryAddr>,
    pub globals: alloc::vec::Vec<GlobalAddr>,
    /// Active element/data segments are dropped (replaced with an empty
    /// slice) the moment they are consumed by instantiation or by
    /// `table.init`/`memory.init`; passive ones are dropped only by
    /// `elem.drop`/`data.drop`.
    pub elements: alloc::vec::Vec<Option<alloc::boxed::Box<[crate::values::Ref]>>>,
    pub datas: alloc::vec::Vec<Option<alloc::boxed::Box<[u8]>>>,
    pub exports: HashMap<String, Extern>,
}

impl ModuleInstance {
    pub fn get_export(&self, name: &str) -> Option<Extern> {
        self.exports.get(name).copied()
    }
}

#[derive(Default)]
pub struct Store {
    pub(crate) funcs: PrimaryMap<FuncAddr, FuncInstance>,
    pub(crate) tables: PrimaryMap<TableAddr, Table>,
    pub(crate) memories: PrimaryMap<MemoryAddr, Memory>,
    pub(crate) globals: PrimaryMap<GlobalAddr, GlobalInstance>,
    pub(crate) instances: PrimaryMap<InstanceAddr, ModuleInstance>,
    named: HashMap<String, InstanceAddr>,
    pub(crate) const_eval: ConstExprEvaluator,
    /// Depth of the currently in-flight call chain, maintained by
    /// [`crate::interp::Interpreter::call`] so nested Wasm-to-Wasm calls can
    /// be capped rather than recursing until the native stack overflows.
    pub(crate) call_depth: u32,
    pub config: EngineConfig,
    pub stats: Statistics,
}

impl Store {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Registers an already-instantiated module under a name so later
    /// instantiations can import from it by `(module_name, field_name)`,
    /// matching this engine's `Store::register_module`/named registry
    /// described for the runtime substrate.
    pub fn register_module(&mut self, name: &str, instance: InstanceAddr) {
        self.named.insert(String::from(name), instance);
    }

    pub fn get_registered(&self, name: &str) -> Option<InstanceAddr> {
        self.named.get(name).copied()
    }

    pub fn resolve_import(&self, module: &str, name: &str) -> Option<Extern> {
        self.get_registered(module)
            .and_then(|addr| self.instances[addr].get_export(name))
    }

    pub fn instance(&self, addr: InstanceAddr) -> &ModuleInstance {
        &self.instances[addr]
    }

    pub(crate) fn push_instance(&mut self, instance: ModuleInstance) -> InstanceAddr {
        self.instances.push(instance)
    }

    pub(crate) fn push_func(&mut self, f: FuncInstance) -> FuncAddr {
        self.funcs.push(f)
    }

    pub(crate) fn push_table(&mut self, t: Table) -> TableAddr {
        self.tables.push(t)
    }

    pub(crate) fn push_memory(&mut self, m: Memory) -> MemoryAddr {
        self.memories.push(m)
    }

    pub(crate) fn push_global(&mut self, g: GlobalInstance) -> GlobalAddr {
        self.globals.push(g)
    }

    pub fn func_type(&self, addr: FuncAddr) -> &FuncType {
        self.funcs[addr].ty()
    }

    pub fn table_type(&self, addr: TableAddr) -> TableType {
        self.tables[addr].ty()
    }

    pub fn memory_type(&self, addr: MemoryAddr) -> MemoryType {
        self.memories[addr].ty()
    }

    pub fn global_type(&self, addr: GlobalAddr) -> GlobalType {
        self.globals[addr].ty
    }

    pub fn memory(&self, addr: MemoryAddr) -> &Memory {
        &self.memories[addr]
    }

    pub fn memory_mut(&mut self, addr: MemoryAddr) -> &mut Memory {
        &mut self.memories[addr]
    }

    pub fn table(&self, addr: TableAddr) -> &Table {
        &self.tables[addr]
    }

    pub fn table_mut(&mut self, addr: TableAddr) -> &mut Table {
        &mut self.tables[addr]
    }

    pub fn global(&self, addr: GlobalAddr) -> &GlobalInstance {
        &self.globals[addr]
    }

    pub fn global_mut(&mut self, addr: GlobalAddr) -> &mut GlobalInstance {
        &mut self.globals[addr]
    }

    /// Defines a host function directly in the store so it can be used to
    /// satisfy an import without first building a [`crate::linker::Linker`].
    pub fn define_host_func(&mut self, ty: FuncType, func: HostFunc) -> FuncAddr {
        self.push_func(FuncInstance::Host {
            ty,
            func: Arc::new(spin::Mutex::new(func)),
        })
    }

    pub(crate) fn entity_index_to_extern(&self, instance: &ModuleInstance, idx: EntityIndex) -> Extern {
        match idx {
            EntityIndex::Function(i) => Extern::Func(instance.funcs[i.as_u32() as usize]),
            EntityIndex::Table(i) => Extern::Table(instance.tables[i.as_u32() as usize]),
            EntityIndex::Memory(i) => Extern::Memory(instance.memories[i.as_u32() as usize]),
            EntityIndex::Global(i) => Extern::Global(instance.globals[i.as_u32() as usize]),
        }
    }
}
