//! The parsed, validated in-memory representation of a WebAssembly module:
//! every section's contents plus the bookkeeping needed to tell imported
//! entities apart from ones the module itself defines.

use crate::const_eval::ConstExpr;
use crate::indices::{
    DataIndex, DefinedFuncIndex, DefinedGlobalIndex, DefinedMemoryIndex, DefinedTableIndex,
    ElemIndex, EntityIndex, FuncIndex, GlobalIndex, MemoryIndex, TableIndex, TypeIndex,
};
use crate::instr::Instruction;
use crate::loader::Loader;
use crate::types::{FuncType, GlobalType, MemoryType, TableType, ValType};
use crate::validator::Validator;
use crate::{Config, Result};
use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use cranelift_entity::PrimaryMap;
use hashbrown::HashMap;

/// The type an import is expected to have, or an export actually has.
#[derive(Debug, Clone)]
pub enum EntityType {
    Function(TypeIndex),
    Table(TableType),
    Memory(MemoryType),
    Global(GlobalType),
}

#[derive(Debug, Clone)]
pub struct Import {
    pub module: String,
    pub name: String,
    pub desc: EntityType,
}

#[derive(Debug, Clone)]
pub struct FunctionBody {
    pub locals: Box<[ValType]>,
    pub instructions: Box<[Instruction]>,
}

#[derive(Debug, Clone)]
pub enum ElementItems {
    Func(Box<[FuncIndex]>),
    Expr(Box<[ConstExpr]>),
}

#[derive(Debug, Clone)]
pub enum ElementMode {
    Active {
        table: TableIndex,
        offset: ConstExpr,
    },
    Passive,
    Declarative,
}

#[derive(Debug, Clone)]
pub struct ElementSegment {
    pub mode: ElementMode,
    pub items: ElementItems,
}

#[derive(Debug, Clone)]
pub enum DataMode {
    Active {
        memory: MemoryIndex,
        offset: ConstExpr,
    },
    Passive,
}

#[derive(Debug, Clone)]
pub struct DataSegment {
    pub mode: DataMode,
    pub bytes: Box<[u8]>,
}

/// The full static contents of a module, split by index space. Following
/// this engine's own index-space convention, each entity-kind index space
/// (functions, tables, memories, globals) covers imports first, then
/// definitions, in section order; `num_imported_*` marks the boundary and
/// `defined_*_index`/`is_imported_*` translate between the "all entities"
/// index and the "defined only" index the runtime arenas use.
#[derive(Debug, Default)]
pub struct Module {
    pub types: PrimaryMap<TypeIndex, FuncType>,
    pub imports: Vec<Import>,
    /// Signature for every function, imported and defined, in index order.
    pub functions: PrimaryMap<FuncIndex, TypeIndex>,
    pub function_bodies: PrimaryMap<DefinedFuncIndex, FunctionBody>,
    pub tables: PrimaryMap<TableIndex, TableType>,
    pub memories: PrimaryMap<MemoryIndex, MemoryType>,
    pub globals: PrimaryMap<GlobalIndex, GlobalType>,
    pub global_initializers: PrimaryMap<DefinedGlobalIndex, ConstExpr>,
    pub elements: PrimaryMap<ElemIndex, ElementSegment>,
    pub data: PrimaryMap<DataIndex, DataSegment>,
    pub exports: HashMap<String, EntityIndex>,
    pub start: Option<FuncIndex>,
    pub name: Option<String>,
    /// Custom sections the loader does not interpret itself, preserved
    /// verbatim for embedders (e.g. a `name` section consumer, or tooling
    /// that inspects `producers`).
    pub customs: Vec<(String, Box<[u8]>)>,

    pub num_imported_funcs: u32,
    pub num_imported_tables: u32,
    pub num_imported_memories: u32,
    pub num_imported_globals: u32,

    /// Set from the data count section when present; used by the validator
    /// to check it against the actual number of data segments.
    pub data_count: Option<u32>,
}

impl Module {
    pub fn from_bytes(bytes: &[u8], config: &Config) -> Result<Self> {
        let module = Loader::new(&config.features).load(bytes)?;
        Validator::new(&config.features).validate(&module)?;
        Ok(module)
    }

    pub fn from_str(text: &str, config: &Config) -> Result<Self> {
        let bytes = wat::parse_str(text).map_err(|e| crate::Error::Wat(e.to_string()))?;
        Self::from_bytes(&bytes, config)
    }

    pub fn get_export(&self, name: &str) -> Option<EntityIndex> {
        self.exports.get(name).copied()
    }

    pub fn is_imported_function(&self, index: FuncIndex) -> bool {
        index.as_u32() < self.num_imported_funcs
    }

    pub fn defined_func_index(&self, index: FuncIndex) -> Option<DefinedFuncIndex> {
        if self.is_imported_function(index) {
            None
        } else {
            Some(DefinedFuncIndex::from_u32(
                index.as_u32() - self.num_imported_funcs,
            ))
        }
    }

    pub fn is_imported_table(&self, index: TableIndex) -> bool {
        index.as_u32() < self.num_imported_tables
    }

    pub fn defined_table_index(&self, index: TableIndex) -> Option<DefinedTableIndex> {
        if self.is_imported_table(index) {
            None
        } else {
            Some(DefinedTableIndex::from_u32(
                index.as_u32() - self.num_imported_tables,
            ))
        }
    }

    pub fn is_imported_memory(&self, index: MemoryIndex) -> bool {
        index.as_u32() < self.num_imported_memories
    }

    pub fn defined_memory_index(&self, index: MemoryIndex) -> Option<DefinedMemoryIndex> {
        if self.is_imported_memory(index) {
            None
        } else {
            Some(DefinedMemoryIndex::from_u32(
                index.as_u32() - self.num_imported_memories,
            ))
        }
    }

    pub fn is_imported_global(&self, index: GlobalIndex) -> bool {
        index.as_u32() < self.num_imported_globals
    }

    pub fn defined_global_index(&self, index: GlobalIndex) -> Option<DefinedGlobalIndex> {
        if self.is_imported_global(index) {
            None
        } else {
            Some(DefinedGlobalIndex::from_u32(
                index.as_u32() - self.num_imported_globals,
            ))
        }
    }

    pub fn num_defined_funcs(&self) -> u32 {
        self.functions.len() as u32 - self.num_imported_funcs
    }

    pub fn num_defined_tables(&self) -> u32 {
        self.tables.len() as u32 - self.num_imported_tables
    }

    pub fn num_defined_memories(&self) -> u32 {
        self.memories.len() as u32 - self.num_imported_memories
    }

    pub fn num_defined_globals(&self) -> u32 {
        self.globals.len() as u32 - self.num_imported_globals
    }

    pub fn func_type(&self, index: FuncIndex) -> &FuncType {
        &self.types[self.functions[index]]
    }
}
