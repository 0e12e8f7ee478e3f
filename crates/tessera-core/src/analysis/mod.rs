/*! Cached structural analyses and the pass pipeline.
 *
 * Optimizations query block order, dominance and loop structure far more often than they change
 * the CFG. Each analysis therefore keeps its result in the graph together with a validity flag;
 * mutation primitives clear the flag and the next query recomputes lazily.
 */

pub mod alias;
pub mod dominators;
pub mod linear_order;
pub mod loops;
pub mod pass;
pub mod rpo;

pub use alias::{check_inst_alias, AliasType};
pub use dominators::DominatorsTree;
pub use linear_order::LinearOrder;
pub use loops::{Loop, LoopAnalyzer, LoopId};
pub use pass::{AnalysisPass, Pass, PassManager, PassStatistics, PassTimer, Statistics};
pub use rpo::Rpo;

use crate::graph::Graph;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisID {
    Rpo,
    DominatorsTree,
    LinearOrder,
    LoopAnalyzer,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalysisState {
    valid: bool,
    runs: usize,
}

impl AnalysisState {
    pub(crate) fn record_run(&mut self, valid: bool) {
        self.runs += 1;
        self.valid = valid;
    }
}

/// An analysis whose result is cached in the graph.
pub trait Analysis: Default + fmt::Debug + 'static {
    const ID: AnalysisID;

    fn name(&self) -> &'static str;

    /// Recomputes the result from scratch.
    fn run_impl(&mut self, graph: &mut Graph) -> bool;

    fn state(&self) -> &AnalysisState;

    fn state_mut(&mut self) -> &mut AnalysisState;

    fn slot(set: &AnalysisSet) -> &Self;

    fn slot_mut(set: &mut AnalysisSet) -> &mut Self;

    fn is_valid(&self) -> bool {
        self.state().valid
    }

    fn set_valid(&mut self, valid: bool) {
        self.state_mut().valid = valid;
    }

    /// How many times the analysis has been computed.
    fn run_count(&self) -> usize {
        self.state().runs
    }
}

#[derive(Debug, Default)]
pub struct AnalysisSet {
    pub(crate) rpo: Rpo,
    pub(crate) dom_tree: DominatorsTree,
    pub(crate) linear_order: LinearOrder,
    pub(crate) loops: LoopAnalyzer,
}
