#![cfg_attr(feature = "no_std", no_std)]

extern crate alloc;
extern crate core;

mod config;
mod const_eval;
mod errors;
mod filemgr;
mod func;
mod global;
mod indices;
mod instance;
mod instr;
mod interp;
mod linker;
mod loader;
mod memory;
mod module;
mod store;
mod table;
mod trap;
mod types;
mod utils;
mod validator;
mod values;

pub use config::{CostTable, EngineConfig as Config, Features, Statistics};
pub use const_eval::ConstExprEvaluator;
pub use errors::Error;
pub use func::{Caller, Func, HostFunc};
pub use global::GlobalInstance as Global;
pub use instance::{Imports, Instance};
pub use linker::Linker;
pub use memory::Memory;
pub use module::Module;
pub use store::{Extern, Store};
pub use table::Table;
pub use trap::Trap;
pub use types::{BlockType, FuncType, GlobalType, Limits, MemoryType, Mutability, RefType, TableType, ValType};
pub use values::{Ref, Val};

pub type Result<T> = core::result::Result<T, Error>;

/// WebAssembly's fixed linear memory page size.
pub const WASM_PAGE_SIZE: u32 = 0x10000;
