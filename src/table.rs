//! Tables: growable vectors of reference values, addressed by `table.get`
//! / `table.set` and populated by active or `table.init`-driven element
//! segments.
//!
//! Backed by a plain `Vec` rather than the teacher's guard-paged
//! `MmapVec<Option<NonNull<VMFuncRef>>>` — again, the raw-pointer element
//! representation there exists only to let compiled code load a table slot
//! directly; the interpreter already owns every `Ref` it touches.

use crate::trap::Trap;
use crate::types::TableType;
use crate::values::Ref;
use alloc::vec;
use alloc::vec::Vec;

#[derive(Debug)]
pub struct Table {
    ty: TableType,
    elements: Vec<Ref>,
}

impl Table {
    pub fn new(ty: TableType) -> Self {
        Self {
            elements: vec![Ref::null(ty.element); ty.limits.min as usize],
            ty,
        }
    }

    pub fn ty(&self) -> TableType {
        self.ty
    }

    pub fn size(&self) -> u32 {
        self.elements.len() as u32
    }

    pub fn get(&self, index: u32) -> Result<Ref, Trap> {
        self.elements
            .get(index as usize)
            .copied()
            .ok_or(Trap::TableOutOfBounds)
    }

    pub fn set(&mut self, index: u32, value: Ref) -> Result<(), Trap> {
        let slot = self
            .elements
            .get_mut(index as usize)
            .ok_or(Trap::TableOutOfBounds)?;
        *slot = value;
        Ok(())
    }

    pub fn grow(&mut self, delta: u32, init: Ref) -> Option<u32> {
        let old_size = self.size();
        let new_size = old_size.checked_add(delta)?;
        if !self.ty.limits.is_valid_growth(old_size, new_size) {
            return None;
        }
        self.elements.resize(new_size as usize, init);
        Some(old_size)
    }

    pub fn fill(&mut self, offset: u32, value: Ref, len: u32) -> Result<(), Trap> {
        let end = offset.checked_add(len).ok_or(Trap::TableOutOfBounds)?;
        if end as usize > self.elements.len() {
            return Err(Trap::TableOutOfBounds);
        }
        self.elements[offset as usize..end as usize].fill(value);
        Ok(())
    }

    pub fn copy_within(&mut self, dst: u32, src: u32, len: u32) -> Result<(), Trap> {
        let dst_end = dst.checked_add(len).ok_or(Trap::TableOutOfBounds)?;
        let src_end = src.checked_add(len).ok_or(Trap::TableOutOfBounds)?;
        if dst_end as usize > self.elements.len() || src_end as usize > self.elements.len() {
            return Err(Trap::TableOutOfBounds);
        }
        self.elements
            .copy_within(src as usize..src_end as usize, dst as usize);
        Ok(())
    }

    pub fn init(
        &mut self,
        dst: u32,
        src_items: &[Ref],
        src_offset: u32,
        len: u32,
    ) -> Result<(), Trap> {
        let dst_end = dst.checked_add(len).ok_or(Trap::TableOutOfBounds)?;
        let src_end = src_offset.checked_add(len).ok_or(Trap::TableOutOfBounds)?;
        if dst_end as usize > self.elements.len() || src_end as usize > src_items.len() {
            return Err(Trap::TableOutOfBounds);
        }
        self.elements[dst as usize..dst_end as usize]
            .copy_from_slice(&src_items[src_offset as usize..src_end as usize]);
        Ok(())
    }
}
