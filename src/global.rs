//! Global variables: a single typed, optionally mutable value cell.

use crate::trap::Trap;
use crate::types::GlobalType;
use crate::values::Val;

#[derive(Debug)]
pub struct GlobalInstance {
    pub ty: GlobalType,
    value: Val,
}

impl GlobalInstance {
    pub fn new(ty: GlobalType, value: Val) -> Self {
        Self { ty, value }
    }

    pub fn get(&self) -> Val {
        self.value
    }

    pub fn set(&mut self, value: Val) -> Result<(), Trap> {
        if !self.ty.is_mutable() {
            // Validation already rejects `global.set` on an immutable
            // global; reaching here would be an engine bug, not untrusted
            // input, so this is an assertion rather than a trap variant.
            unreachable!("attempted to set an immutable global");
        }
        self.value = value;
        Ok(())
    }
}
