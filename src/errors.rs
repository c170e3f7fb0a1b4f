//! Closed error taxonomies for each pipeline stage, unified by [`Error`].

use alloc::string::String;

/// Errors raised while decoding raw bytes (LEB128, names, byte slices).
///
/// This is the lowest-level error type in the pipeline; every other stage's
/// error type can be built from it.
#[derive(Debug, Clone, Copy, onlyerror::Error)]
pub enum DecodeError {
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof { offset: usize },
    #[error("LEB128 integer at offset {offset} uses more bytes than the encoded type allows")]
    IntegerTooLong { offset: usize },
    #[error("LEB128 integer at offset {offset} does not fit in the target type")]
    IntegerTooLarge { offset: usize },
    #[error("string at offset {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: usize },
    #[error("not a WebAssembly binary (bad magic number)")]
    BadMagic,
    #[error("unsupported WebAssembly version")]
    BadVersion,
}

/// Errors raised while walking sections and building the module AST.
#[derive(Debug, onlyerror::Error)]
pub enum LoaderError {
    #[error("{0}")]
    Decode(#[from] DecodeError),
    #[error("malformed section: {message} (offset {offset})")]
    MalformedSection { message: String, offset: usize },
    #[error("section id {id} out of the required ascending order")]
    SectionOutOfOrder { id: u8 },
    #[error("duplicate section id {id}")]
    DuplicateSection { id: u8 },
    #[error("unknown opcode 0x{opcode:02x} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: usize },
    #[error("feature '{0}' is required to use this construct but is disabled")]
    FeatureDisabled(&'static str),
    #[error("implementation limit exceeded: {0}")]
    ImplLimitExceeded(&'static str),
}

/// Errors raised by the structural validation pass.
#[derive(Debug, onlyerror::Error)]
pub enum ValidationError {
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },
    #[error("operand stack underflow")]
    StackUnderflow,
    #[error("unknown type index {0}")]
    UnknownType(u32),
    #[error("unknown function index {0}")]
    UnknownFunc(u32),
    #[error("unknown table index {0}")]
    UnknownTable(u32),
    #[error("unknown memory index {0}")]
    UnknownMemory(u32),
    #[error("unknown global index {0}")]
    UnknownGlobal(u32),
    #[error("unknown local index {0}")]
    UnknownLocal(u32),
    #[error("unknown label, branch depth {0} exceeds nesting")]
    UnknownLabel(u32),
    #[error("start function must take no parameters and return no values")]
    InvalidStartFunction,
    #[error("global is immutable")]
    ImmutableGlobal,
    #[error("constant expression is not valid in this context")]
    InvalidConstExpr,
    #[error("function and code section entry counts disagree")]
    FunctionCodeMismatch,
    #[error("data segment count does not match the data count section")]
    DataCountMismatch,
    #[error("multiple memories require the multi-memory feature")]
    FeatureDisabled(&'static str),
    #[error("control stack is empty")]
    EmptyControlStack,
    #[error("else without matching if")]
    UnmatchedElse,
}

/// Errors raised while instantiating a module into a [`crate::store::Store`].
#[derive(Debug, onlyerror::Error)]
pub enum InstantiationError {
    #[error("import #{index} ({module}.{name}) could not be resolved")]
    UnknownImport {
        index: u32,
        module: String,
        name: String,
    },
    #[error("import #{index} ({module}.{name}) has the wrong type")]
    ImportTypeMismatch {
        index: u32,
        module: String,
        name: String,
    },
    #[error("active element segment is out of table bounds")]
    ElementOutOfBounds,
    #[error("active data segment is out of memory bounds")]
    DataOutOfBounds,
    #[error("{0}")]
    Trap(#[from] crate::trap::Trap),
}

/// The crate-wide error type. Every stage's error converts into this via
/// `#[from]`, matching how embedders typically want a single `Result` type
/// without caring which stage failed.
#[derive(Debug, onlyerror::Error)]
pub enum Error {
    #[error("{0}")]
    Decode(#[from] DecodeError),
    #[error("{0}")]
    Loader(#[from] LoaderError),
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    Instantiation(#[from] InstantiationError),
    #[error("{0}")]
    Trap(#[from] crate::trap::Trap),
    #[error("{0}")]
    Wat(String),
}

#[macro_export]
macro_rules! loader_unsupported {
    ($feature:expr) => {
        $crate::errors::LoaderError::FeatureDisabled($feature)
    };
}
