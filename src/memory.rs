//! Linear memory: a growable byte buffer with bounds-checked access.
//!
//! The teacher backs `Memory` with an `mmap`-based allocation plus guard
//! pages so Cranelift-compiled code can elide small-offset bounds checks.
//! An interpreter has no such need — every access already goes through a
//! Rust bounds check before touching the buffer — so this is a plain
//! `Vec<u8>` that reallocates on growth, matching how a tree-walking
//! interpreter is expected to represent memory.

use crate::trap::Trap;
use crate::types::{Limits, MemoryType};
use crate::WASM_PAGE_SIZE;
use alloc::vec;
use alloc::vec::Vec;

#[derive(Debug)]
pub struct Memory {
    ty: MemoryType,
    data: Vec<u8>,
}

impl Memory {
    pub fn new(ty: MemoryType) -> Self {
        let initial_bytes = ty.limits.min as usize * WASM_PAGE_SIZE as usize;
        Self {
            ty,
            data: vec![0; initial_bytes],
        }
    }

    pub fn ty(&self) -> MemoryType {
        self.ty
    }

    pub fn size_pages(&self) -> u32 {
        (self.data.len() / WASM_PAGE_SIZE as usize) as u32
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_slice_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Grows the memory by `delta` pages, returning the previous size in
    /// pages, or `None` (not a trap — `memory.grow` reports failure as
    /// `-1`, it never traps) if the growth would exceed the type's declared
    /// maximum or the engine-wide page cap.
    pub fn grow(&mut self, delta: u32, max_pages_cap: Option<u32>) -> Option<u32> {
        let old_pages = self.size_pages();
        let new_pages = old_pages.checked_add(delta)?;

        let limits = effective_limits(&self.ty.limits, max_pages_cap);
        if !limits.is_valid_growth(old_pages, new_pages) {
            return None;
        }

        let new_len = (new_pages as usize).checked_mul(WASM_PAGE_SIZE as usize)?;
        self.data.resize(new_len, 0);
        Some(old_pages)
    }

    fn check_bounds(&self, offset: u64, len: u32) -> Result<usize, Trap> {
        let end = offset
            .checked_add(u64::from(len))
            .ok_or(Trap::MemoryOutOfBounds)?;
        if end > self.data.len() as u64 {
            return Err(Trap::MemoryOutOfBounds);
        }
        Ok(offset as usize)
    }

    pub fn read(&self, offset: u64, buf: &mut [u8]) -> Result<(), Trap> {
        let start = self.check_bounds(offset, buf.len() as u32)?;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    pub fn write(&mut self, offset: u64, buf: &[u8]) -> Result<(), Trap> {
        let start = self.check_bounds(offset, buf.len() as u32)?;
        self.data[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    pub fn fill(&mut self, offset: u64, value: u8, len: u32) -> Result<(), Trap> {
        let start = self.check_bounds(offset, len)?;
        self.data[start..start + len as usize].fill(value);
        Ok(())
    }

    pub fn copy_within(&mut self, dst: u64, src: u64, len: u32) -> Result<(), Trap> {
        let dst_start = self.check_bounds(dst, len)?;
        let src_start = self.check_bounds(src, len)?;
        self.data.copy_within(src_start..src_start + len as usize, dst_start);
        Ok(())
    }
}

fn effective_limits(ty_limits: &Limits, cap: Option<u32>) -> Limits {
    match cap {
        Some(cap) => Limits {
            min: ty_limits.min,
            max: Some(ty_limits.max.map_or(cap, |m| m.min(cap))),
        },
        None => *ty_limits,
    }
}
