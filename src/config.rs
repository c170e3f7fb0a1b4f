//! Engine-wide configuration: which WebAssembly proposals are accepted
//! beyond the MVP, resource limits, and optional cost metering.
//!
//! Configuration is a plain struct passed by reference into the loader,
//! validator, and instantiation entry points rather than global mutable
//! state, matching this engine's design note that all shared configuration
//! flows explicitly through call arguments.

/// Feature gates recognized by the loader and validator. Proposals beyond
/// this set (GC, typed function references, exceptions, threads, the
/// component model, ...) are out of scope and are rejected unconditionally
/// regardless of these flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features {
    pub reference_types: bool,
    pub bulk_memory: bool,
    pub multi_value: bool,
    pub multi_memory: bool,
    pub simd: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            reference_types: true,
            bulk_memory: true,
            multi_value: true,
            multi_memory: false,
            simd: true,
        }
    }
}

impl Features {
    /// Only the instructions and types defined by the MVP; every other
    /// proposal gate disabled. Useful for conformance testing against
    /// `assert_invalid` directives that rely on a feature being off.
    pub fn mvp() -> Self {
        Self {
            reference_types: false,
            bulk_memory: false,
            multi_value: false,
            multi_memory: false,
            simd: false,
        }
    }
}

/// Per-opcode execution cost, indexed by an opcode's position in
/// [`crate::interp::Interpreter`]'s dispatch table. `None` (the default)
/// means instructions are not metered at all.
#[derive(Debug, Clone)]
pub struct CostTable {
    default_cost: u64,
}

impl CostTable {
    pub fn uniform(cost: u64) -> Self {
        Self { default_cost: cost }
    }

    pub fn cost_of(&self, _instr: &crate::instr::Instruction) -> u64 {
        self.default_cost
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub features: Features,
    /// Hard cap on the number of 64KiB pages any memory in a store may grow
    /// to, independent of a memory type's own declared maximum.
    pub max_memory_pages: Option<u32>,
    pub cost_table: Option<CostTable>,
    /// Instruction budget under `cost_table`; exceeding it traps the call in
    /// progress rather than letting it run unbounded.
    pub cost_limit: Option<u64>,
}

impl EngineConfig {
    pub fn new(features: Features) -> Self {
        Self {
            features,
            ..Default::default()
        }
    }
}

/// Running counters exposed to embedders who want visibility into how much
/// work a call performed, mirroring the "Statistics & gas" facility named in
/// this engine's design notes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Statistics {
    pub instructions_executed: u64,
    pub gas_used: u64,
}

impl Statistics {
    pub(crate) fn record(&mut self, cost: u64) {
        self.instructions_executed += 1;
        self.gas_used += cost;
    }
}
