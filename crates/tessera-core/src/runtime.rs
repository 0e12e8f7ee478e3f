use std::collections::HashMap;
use std::fmt;

/// Source of execution profile data for the method being compiled.
pub trait RuntimeInterface: Send + Sync + fmt::Debug {
    fn branch_taken_counter(&self, _pc: u32) -> u64 {
        0
    }

    fn branch_not_taken_counter(&self, _pc: u32) -> u64 {
        0
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoProfile;

impl RuntimeInterface for NoProfile {}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BranchCounters {
    pub taken: u64,
    pub not_taken: u64,
}

/// Fixed branch counters keyed by bytecode pc, as recorded by a profiling run.
#[derive(Debug, Default, Clone)]
pub struct StaticProfile {
    branches: HashMap<u32, BranchCounters>,
}

impl StaticProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_branch(mut self, pc: u32, taken: u64, not_taken: u64) -> Self {
        self.set_branch(pc, taken, not_taken);
        self
    }

    pub fn set_branch(&mut self, pc: u32, taken: u64, not_taken: u64) {
        self.branches.insert(pc, BranchCounters { taken, not_taken });
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }
}

impl RuntimeInterface for StaticProfile {
    fn branch_taken_counter(&self, pc: u32) -> u64 {
        self.branches.get(&pc).map_or(0, |c| c.taken)
    }

    fn branch_not_taken_counter(&self, pc: u32) -> u64 {
        self.branches.get(&pc).map_or(0, |c| c.not_taken)
    }
}
