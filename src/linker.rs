//! Name-based import resolution across modules that have not necessarily
//! been registered wholesale in a [`Store`]: an embedder can `define` a
//! single func/table/memory/global under a `(module, name)` pair (typically
//! a host function) and then `instantiate` any module, with the linker
//! filling in whichever imports it has a definition for and falling back to
//! the store's registered-module registry for the rest.

use crate::errors::InstantiationError;
use crate::instance::{Imports, Instance};
use crate::module::Module;
use crate::store::{Extern, Store};
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use hashbrown::HashMap;

#[derive(Default)]
pub struct Linker {
    defs: HashMap<(String, String), Extern>,
}

impl Linker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines a single import. A later call with the same `(module, name)`
    /// pair overwrites the earlier one.
    pub fn define(&mut self, module: &str, name: &str, ext: Extern) -> &mut Self {
        self.defs.insert((module.to_string(), name.to_string()), ext);
        self
    }

    fn resolve(&self, store: &Store, module: &str, name: &str) -> Option<Extern> {
        self.defs
            .get(&(module.to_string(), name.to_string()))
            .copied()
            .or_else(|| store.resolve_import(module, name))
    }

    /// Instantiates `module`, resolving each import first against this
    /// linker's own definitions, then against `store`'s registered-module
    /// registry.
    pub fn instantiate(&self, store: &mut Store, module: Arc<Module>) -> crate::Result<Instance> {
        let mut imports = Imports::new();
        for (index, import) in module.imports.iter().enumerate() {
            let ext = self
                .resolve(store, &import.module, &import.name)
                .ok_or_else(|| InstantiationError::UnknownImport {
                    index: index as u32,
                    module: import.module.clone(),
                    name: import.name.clone(),
                })?;
            imports.push(ext);
        }
        Instance::new_with_imports(store, module, imports)
    }
}
