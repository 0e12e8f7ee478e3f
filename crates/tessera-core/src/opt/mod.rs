//! Optimizations that run on the graph through the pass manager.

pub mod scheduler;

pub use scheduler::Scheduler;
