/*! Control-flow graph and analysis core of an optimizing compiler backend.
 *
 * Every optimization in the backend leans on a handful of structural facts: which block dominates
 * which, what order the blocks are visited in, where each block lands in the final instruction
 * stream and which analyses are still trustworthy after a mutation. This crate owns the SSA
 * graph and keeps those facts consistent as the graph is rewritten.
 */

pub mod analysis;
pub mod arena;
pub mod block;
pub mod builder;
pub mod config;
pub mod graph;
pub mod inst;
pub mod marker;
pub mod opt;
pub mod runtime;
pub mod verify;

pub use analysis::{
    check_inst_alias, AliasType, Analysis, AnalysisID, DominatorsTree, LinearOrder, Loop,
    LoopAnalyzer, LoopId, Pass, PassManager, PassStatistics, Rpo, Statistics,
};
pub use arena::{ArenaMark, LocalArena, Span};
pub use block::{BasicBlock, BlockId};
pub use builder::{BuiltGraph, GraphBuilder, END};
pub use config::{CompilerOptions, OptionsError, VerificationLevel};
pub use graph::{Graph, GraphMode};
pub use inst::{ConditionCode, DataType, Inst, InstId, Opcode, User, INVALID_PC};
pub use marker::{Marker, MarkerManager, MarkerSet, MARKERS_COUNT};
pub use opt::Scheduler;
pub use runtime::{BranchCounters, NoProfile, RuntimeInterface, StaticProfile};
pub use verify::{GraphVerifier, VerifyError};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IrError {
    #[error("Unknown block: {0}")]
    UnknownBlock(String),
    #[error("Unknown instruction: {0}")]
    UnknownInst(String),
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),
    #[error("Builder error: {0}")]
    BuilderError(String),
    #[error("Options error: {0}")]
    Options(#[from] OptionsError),
}

pub type Result<T> = std::result::Result<T, IrError>;

#[cfg(test)]
mod tests;
