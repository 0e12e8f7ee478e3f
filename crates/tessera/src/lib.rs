/*! Unified interface for graph analysis and block layout.
 *
 * Single import for the SSA graph and its analyses, the `.tir` text format and the dumps and
 * reports built on top of them.
 */

pub use tessera_core as core;
pub use tessera_emit as emit;
pub use tessera_parser as parser;

pub use tessera_core::{
    BasicBlock, BlockId, CompilerOptions, DominatorsTree, Graph, GraphBuilder, GraphVerifier, Inst,
    InstId, LinearOrder, LoopAnalyzer, Opcode, PassManager, Rpo, Scheduler,
};

pub use tessera_emit::{AnalysisReport, GraphDumper};

pub use tessera_parser::{parse_file, parse_graph};
