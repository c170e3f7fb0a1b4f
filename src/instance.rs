//! Module instantiation: resolving imports, allocating the defined tables,
//! memories and globals, running active element/data segments, and invoking
//! the start function.

use crate::const_eval::ConstEvalContext;
use crate::errors::InstantiationError;
use crate::func::FuncInstance;
use crate::global::GlobalInstance;
use crate::memory::Memory;
use crate::module::{DataMode, ElementItems, ElementMode, Module};
use crate::store::{Extern, ModuleInstance, Store};
use crate::table::Table;
use crate::values::{Ref, Val};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use hashbrown::HashMap;

/// An embedder-facing handle to an instantiated module in a particular
/// [`Store`]; like [`crate::func::Func`] it carries no store-identity check.
#[derive(Debug, Clone, Copy)]
pub struct Instance(pub(crate) crate::store::InstanceAddr);

/// Resolved imports supplied by the embedder, in the order the module's
/// import section declares them. Each entry must match the import's
/// declared kind or instantiation fails with
/// [`InstantiationError::ImportTypeMismatch`].
#[derive(Default)]
pub struct Imports {
    pub entries: Vec<Extern>,
}

impl Imports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, ext: Extern) -> &mut Self {
        self.entries.push(ext);
        self
    }
}

impl Instance {
    /// Instantiates `module` into `store`, resolving each of its imports by
    /// name against `store`'s registered-module registry.
    pub fn new(store: &mut Store, module: Arc<Module>) -> crate::Result<Self> {
        let mut imports = Imports::new();
        for (index, import) in module.imports.iter().enumerate() {
            let ext = store
                .resolve_import(&import.module, &import.name)
                .ok_or_else(|| InstantiationError::UnknownImport {
                    index: index as u32,
                    module: import.module.clone(),
                    name: import.name.clone(),
                })?;
            imports.push(ext);
        }
        Self::new_with_imports(store, module, imports)
    }

    /// Instantiates `module` using an explicit, pre-resolved set of imports,
    /// bypassing the store's name registry entirely.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new_with_imports(
        store: &mut Store,
        module: Arc<Module>,
        imports: Imports,
    ) -> crate::Result<Self> {
        check_import_types(store, &module, &imports)?;

        let mut funcs = Vec::with_capacity(module.functions.len());
        let mut tables = Vec::with_capacity(module.tables.len());
        let mut memories = Vec::with_capacity(module.memories.len());
        let mut globals = Vec::with_capacity(module.globals.len());

        for ext in &imports.entries {
            match *ext {
                Extern::Func(addr) => funcs.push(addr),
                Extern::Table(addr) => tables.push(addr),
                Extern::Memory(addr) => memories.push(addr),
                Extern::Global(addr) => globals.push(addr),
            }
        }

        // Global initializers run before any defined table/memory/global is
        // allocated: per spec, `global.get` in a constant expression may
        // only observe already-imported globals, never a sibling defined
        // one, so capturing `globals` here (imports only) is deliberate.
        let imported_globals = globals.clone();
        for (i, ty) in module
            .globals
            .values()
            .skip(module.num_imported_globals as usize)
            .enumerate()
        {
            let init = &module.global_initializers[crate::indices::DefinedGlobalIndex::from_u32(i as u32)];
            let func_ref_resolver = |idx: crate::indices::FuncIndex| -> Ref {
                Ref::Func(Some(crate::func::Func(funcs[idx.as_u32() as usize])))
            };
            let global_resolver = |idx: crate::indices::GlobalIndex| -> Val {
                store.globals[imported_globals[idx.as_u32() as usize]].get()
            };
            let ctx = ConstEvalContext {
                imported_globals: &global_resolver,
                func_ref: &func_ref_resolver,
            };
            let value = store.const_eval.eval(init, &ctx);
            globals.push(store.push_global(GlobalInstance::new(*ty, value)));
        }

        for ty in module
            .tables
            .values()
            .skip(module.num_imported_tables as usize)
        {
            tables.push(store.push_table(Table::new(*ty)));
        }
        for ty in module
            .memories
            .values()
            .skip(module.num_imported_memories as usize)
        {
            memories.push(store.push_memory(Memory::new(*ty)));
        }

        for def_index in 0..module.num_defined_funcs() {
            let def_index = crate::indices::DefinedFuncIndex::from_u32(def_index);
            let func_index =
                crate::indices::FuncIndex::from_u32(module.num_imported_funcs + def_index.as_u32());
            funcs.push(store.push_func(FuncInstance::Wasm {
                ty: module.func_type(func_index).clone(),
                module: module.clone(),
                // Patched to the real address once the instance itself is
                // allocated below; a Wasm function needs to know which
                // instance it belongs to so the interpreter can resolve its
                // body's local table/memory/global/func indices.
                instance: crate::store::InstanceAddr::from_u32(u32::MAX),
                def_index,
            }));
        }

        let resolve_expr_to_ref = |store: &mut Store,
                                    funcs: &[crate::store::FuncAddr],
                                    globals: &[crate::store::GlobalAddr],
                                    expr: &crate::const_eval::ConstExpr|
         -> Ref {
            let func_ref_resolver = |idx: crate::indices::FuncIndex| -> Ref {
                Ref::Func(Some(crate::func::Func(funcs[idx.as_u32() as usize])))
            };
            let global_resolver = |idx: crate::indices::GlobalIndex| -> Val {
                store.globals[globals[idx.as_u32() as usize]].get()
            };
            let ctx = ConstEvalContext {
                imported_globals: &global_resolver,
                func_ref: &func_ref_resolver,
            };
            match store.const_eval.eval(expr, &ctx) {
                Val::FuncRef(f) => Ref::Func(f),
                _ => unreachable!("element expression must produce a funcref"),
            }
        };

        let mut elements = Vec::with_capacity(module.elements.len());
        for seg in module.elements.values() {
            let items: alloc::boxed::Box<[Ref]> = match &seg.items {
                ElementItems::Func(fs) => fs
                    .iter()
                    .map(|idx| Ref::Func(Some(crate::func::Func(funcs[idx.as_u32() as usize]))))
                    .collect(),
                ElementItems::Expr(exprs) => exprs
                    .iter()
                    .map(|expr| resolve_expr_to_ref(store, &funcs, &globals, expr))
                    .collect(),
            };
            elements.push(Some(items));
        }

        let mut datas = Vec::with_capacity(module.data.len());
        for seg in module.data.values() {
            datas.push(Some(seg.bytes.clone()));
        }

        let mut instance = ModuleInstance {
            module: module.clone(),
            funcs,
            tables,
            memories,
            globals,
            elements,
            datas,
            exports: HashMap::new(),
        };

        // Active element segments populate their target table, consuming
        // the segment (an active segment behaves as if `elem.drop` ran on
        // it immediately after instantiation).
        for (i, seg) in module.elements.values().enumerate() {
            if let ElementMode::Active { table, offset } = &seg.mode {
                let offset = resolve_offset(store, &instance, offset);
                let items = instance.elements[i].take().unwrap_or_default();
                let table_addr = instance.tables[table.as_u32() as usize];
                store.tables[table_addr]
                    .init(offset, &items, 0, items.len() as u32)
                    .map_err(|_| InstantiationError::ElementOutOfBounds)?;
            }
        }

        for (i, seg) in module.data.values().enumerate() {
            if let DataMode::Active { memory, offset } = &seg.mode {
                let offset = resolve_offset(store, &instance, offset);
                let bytes = instance.datas[i].take().unwrap_or_default();
                let mem_addr = instance.memories[memory.as_u32() as usize];
                store.memories[mem_addr]
                    .write(u64::from(offset), &bytes)
                    .map_err(|_| InstantiationError::DataOutOfBounds)?;
            }
        }

        let mut exports = HashMap::with_capacity(module.exports.len());
        for (name, idx) in &module.exports {
            exports.insert(String::from(name.as_str()), store.entity_index_to_extern(&instance, *idx));
        }
        instance.exports = exports;

        let addr = store.push_instance(instance);

        for def_index in 0..module.num_defined_funcs() {
            let func_index = module.num_imported_funcs + def_index;
            let func_addr = store.instances[addr].funcs[func_index as usize];
            if let FuncInstance::Wasm { instance, .. } = &mut store.funcs[func_addr] {
                *instance = addr;
            }
        }

        if let Some(start) = module.start {
            let start_addr = store.instances[addr].funcs[start.as_u32() as usize];
            crate::interp::Interpreter::call(store, start_addr, &[], &mut [])?;
        }

        tracing::debug!(?addr, "module instantiated");
        Ok(Self(addr))
    }

    pub fn get_export(&self, store: &Store, name: &str) -> Option<Extern> {
        store.instance(self.0).get_export(name)
    }

    pub fn addr(&self) -> crate::store::InstanceAddr {
        self.0
    }
}

fn resolve_offset(store: &mut Store, instance: &ModuleInstance, expr: &crate::const_eval::ConstExpr) -> u32 {
    let func_ref_resolver = |idx: crate::indices::FuncIndex| -> Ref {
        Ref::Func(Some(crate::func::Func(instance.funcs[idx.as_u32() as usize])))
    };
    let global_resolver = |idx: crate::indices::GlobalIndex| -> Val {
        store.globals[instance.globals[idx.as_u32() as usize]].get()
    };
    let ctx = ConstEvalContext {
        imported_globals: &global_resolver,
        func_ref: &func_ref_resolver,
    };
    store.const_eval.eval(expr, &ctx).unwrap_i32() as u32
}

fn check_import_types(store: &Store, module: &Module, imports: &Imports) -> Result<(), InstantiationError> {
    if imports.entries.len() != module.imports.len() {
        return Err(InstantiationError::UnknownImport {
            index: imports.entries.len() as u32,
            module: String::new(),
            name: String::new(),
        });
    }
    for (index, (import, ext)) in module.imports.iter().zip(imports.entries.iter()).enumerate() {
        let ok = match (&import.desc, ext) {
            (crate::module::EntityType::Function(type_idx), Extern::Func(addr)) => {
                module.types[*type_idx] == *store.func_type(*addr)
            }
            (crate::module::EntityType::Table(expected), Extern::Table(addr)) => *expected == store.table_type(*addr),
            (crate::module::EntityType::Memory(expected), Extern::Memory(addr)) => {
                *expected == store.memory_type(*addr)
            }
            (crate::module::EntityType::Global(expected), Extern::Global(addr)) => {
                *expected == store.global_type(*addr)
            }
            _ => false,
        };
        if !ok {
            return Err(InstantiationError::ImportTypeMismatch {
                index: index as u32,
                module: import.module.clone(),
                name: import.name.clone(),
            });
        }
    }
    Ok(())
}
