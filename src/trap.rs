//! Trap codes: the reasons a WebAssembly computation can abort instead of
//! producing a result.

#[derive(onlyerror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trap {
    /// The current stack space was exhausted.
    #[error("call stack exhausted")]
    StackOverflow,
    /// An out-of-bounds memory access.
    #[error("out of bounds memory access")]
    MemoryOutOfBounds,
    /// Out-of-bounds access to a table.
    #[error("out of bounds table access")]
    TableOutOfBounds,
    /// Indirect call to a null table entry.
    #[error("accessed uninitialized table element")]
    IndirectCallToNull,
    /// Signature mismatch on indirect call.
    #[error("indirect call signature mismatch")]
    BadSignature,
    /// An integer arithmetic operation caused an overflow.
    #[error("integer overflow")]
    IntegerOverflow,
    /// An integer division by zero.
    #[error("integer division by zero")]
    IntegerDivisionByZero,
    /// Failed float-to-int conversion.
    #[error("invalid conversion to integer")]
    BadConversionToInteger,
    /// Code that was supposed to have been unreachable was reached.
    #[error("unreachable code executed")]
    UnreachableCodeReached,
    /// Call to a null reference.
    #[error("null reference called")]
    NullReference,
    /// The configured cost/gas limit was exceeded.
    #[error("cost limit exceeded")]
    CostLimitExceeded,
    /// A host function returned an error (as opposed to the `Terminated`
    /// clean-shutdown sentinel).
    #[error("host function failed")]
    HostFuncFailed,
    /// A host function's clean-shutdown sentinel. Surfaced as a `Trap`
    /// variant so a [`crate::func::HostFunc`] can return it through the
    /// same `Result<(), Trap>`, but treated as success once it reaches
    /// [`crate::interp::Interpreter::call`].
    #[error("terminated")]
    Terminated,
}

impl From<Trap> for u8 {
    fn from(value: Trap) -> Self {
        match value {
            Trap::StackOverflow => 0,
            Trap::MemoryOutOfBounds => 1,
            Trap::TableOutOfBounds => 2,
            Trap::IndirectCallToNull => 3,
            Trap::BadSignature => 4,
            Trap::IntegerOverflow => 5,
            Trap::IntegerDivisionByZero => 6,
            Trap::BadConversionToInteger => 7,
            Trap::UnreachableCodeReached => 8,
            Trap::NullReference => 9,
            Trap::CostLimitExceeded => 10,
            Trap::HostFuncFailed => 11,
            Trap::Terminated => 12,
        }
    }
}

impl TryFrom<u8> for Trap {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::StackOverflow),
            1 => Ok(Self::MemoryOutOfBounds),
            2 => Ok(Self::TableOutOfBounds),
            3 => Ok(Self::IndirectCallToNull),
            4 => Ok(Self::BadSignature),
            5 => Ok(Self::IntegerOverflow),
            6 => Ok(Self::IntegerDivisionByZero),
            7 => Ok(Self::BadConversionToInteger),
            8 => Ok(Self::UnreachableCodeReached),
            9 => Ok(Self::NullReference),
            10 => Ok(Self::CostLimitExceeded),
            11 => Ok(Self::HostFuncFailed),
            12 => Ok(Self::Terminated),
            _ => Err(()),
        }
    }
}
