//! Runtime values: the tagged union every value-stack slot, local, global,
//! and table element holds while a module is executing.

use crate::enum_accessors;
use crate::func::Func;
use crate::types::{RefType, ValType};

/// A runtime value that a WebAssembly module can consume or produce.
///
/// Floats are stored as their raw bits rather than as `f32`/`f64` so that
/// NaN payloads survive moves through the value stack untouched, matching
/// how the binary format itself treats floating point constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Val {
    I32(i32),
    I64(i64),
    /// Raw bits; use `f32::from_bits` to obtain an `f32`.
    F32(u32),
    /// Raw bits; use `f64::from_bits` to obtain an `f64`.
    F64(u64),
    V128(u128),
    FuncRef(Option<Func>),
    ExternRef(Option<ExternRef>),
}

impl Val {
    pub const fn null_func_ref() -> Self {
        Self::FuncRef(None)
    }

    /// The default value for a given value type, used to zero-initialize
    /// locals that were declared but not given an initial value.
    pub fn default_for(ty: ValType) -> Self {
        match ty {
            ValType::I32 => Self::I32(0),
            ValType::I64 => Self::I64(0),
            ValType::F32 => Self::F32(0),
            ValType::F64 => Self::F64(0),
            ValType::V128 => Self::V128(0),
            ValType::Ref(RefType::Func) => Self::FuncRef(None),
            ValType::Ref(RefType::Extern) => Self::ExternRef(None),
        }
    }

    pub fn ty(&self) -> ValType {
        match self {
            Self::I32(_) => ValType::I32,
            Self::I64(_) => ValType::I64,
            Self::F32(_) => ValType::F32,
            Self::F64(_) => ValType::F64,
            Self::V128(_) => ValType::V128,
            Self::FuncRef(_) => ValType::Ref(RefType::Func),
            Self::ExternRef(_) => ValType::Ref(RefType::Extern),
        }
    }

    enum_accessors! {
        e
        (I32(i32) is_i32 i32 unwrap_i32 *e)
        (I64(i64) is_i64 i64 unwrap_i64 *e)
        (F32(f32) is_f32 f32 unwrap_f32 f32::from_bits(*e))
        (F64(f64) is_f64 f64 unwrap_f64 f64::from_bits(*e))
        (V128(u128) is_v128 v128 unwrap_v128 *e)
    }
}

impl From<i32> for Val {
    fn from(val: i32) -> Val {
        Val::I32(val)
    }
}

impl From<i64> for Val {
    fn from(val: i64) -> Val {
        Val::I64(val)
    }
}

impl From<f32> for Val {
    fn from(val: f32) -> Val {
        Val::F32(val.to_bits())
    }
}

impl From<f64> for Val {
    fn from(val: f64) -> Val {
        Val::F64(val.to_bits())
    }
}

impl From<Ref> for Val {
    fn from(val: Ref) -> Val {
        match val {
            Ref::Func(f) => Val::FuncRef(f),
            Ref::Extern(e) => Val::ExternRef(e),
        }
    }
}

/// An opaque, embedder-assigned externref handle. This engine has no GC
/// heap of its own, so externref values carry only the `u32` the embedder
/// chose to tag them with rather than a reference to a host object; the
/// host is responsible for mapping the tag back to whatever it refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternRef(pub u32);

/// A reference value in isolation from the rest of [`Val`]'s variants,
/// used where only `funcref`/`externref` make sense (table elements,
/// `ref.null`/`ref.func` results).
#[derive(Debug, Clone, Copy)]
pub enum Ref {
    Func(Option<Func>),
    Extern(Option<ExternRef>),
}

impl Ref {
    pub fn null(ty: RefType) -> Self {
        match ty {
            RefType::Func => Ref::Func(None),
            RefType::Extern => Ref::Extern(None),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Func(None) | Self::Extern(None))
    }

    pub fn unwrap_func(&self) -> Option<Func> {
        match self {
            Self::Func(f) => *f,
            Self::Extern(_) => unreachable!("expected a funcref, found an externref; validation bug"),
        }
    }

    pub fn unwrap_extern(&self) -> Option<ExternRef> {
        match self {
            Self::Extern(e) => *e,
            Self::Func(_) => unreachable!("expected an externref, found a funcref; validation bug"),
        }
    }
}
