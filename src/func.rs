//! Function instances: either a module-defined Wasm function (module +
//! function body) or a host function supplied by the embedder.

use crate::store::{FuncAddr, InstanceAddr, Store};
use crate::trap::Trap;
use crate::types::FuncType;
use crate::values::Val;
use crate::Module;
use alloc::boxed::Box;
use alloc::sync::Arc;

/// The embedder-facing view a host function gets of the store while it
/// runs, letting it read exported memory or call back into other exports
/// without the interpreter having to special-case host calls.
pub struct Caller<'a> {
    pub store: &'a mut Store,
}

pub type HostFunc = Box<dyn FnMut(Caller<'_>, &[Val], &mut [Val]) -> Result<(), Trap>>;

pub(crate) enum FuncInstance {
    Wasm {
        ty: FuncType,
        module: Arc<Module>,
        /// The instance this function was defined in, needed to resolve the
        /// table/memory/global indices its body references against the
        /// store addresses that instance's imports and definitions live at.
        instance: InstanceAddr,
        def_index: crate::indices::DefinedFuncIndex,
    },
    Host {
        ty: FuncType,
        func: Arc<spin::Mutex<HostFunc>>,
    },
}

impl FuncInstance {
    pub(crate) fn ty(&self) -> &FuncType {
        match self {
            FuncInstance::Wasm { ty, .. } | FuncInstance::Host { ty, .. } => ty,
        }
    }
}

/// An embedder-facing handle to a function in a particular [`Store`]. Like
/// every handle type in this module, it carries no store-identity check —
/// this engine's concurrency model (one `Store` per thread, never shared)
/// makes using a handle with the wrong store a programmer error rather than
/// something worth paying a runtime check for on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Func(pub(crate) FuncAddr);

impl Func {
    pub fn ty(&self, store: &Store) -> FuncType {
        store.funcs[self.0].ty().clone()
    }

    pub fn call(&self, store: &mut Store, params: &[Val], results: &mut [Val]) -> crate::Result<()> {
        crate::interp::Interpreter::call(store, self.0, params, results)
    }

    pub(crate) fn addr(&self) -> FuncAddr {
        self.0
    }
}
