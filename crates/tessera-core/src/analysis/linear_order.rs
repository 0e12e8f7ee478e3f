/*! Final block layout.
 *
 * The bytecode optimizer keeps blocks in bytecode order. The optimizing compiler lays blocks out
 * in DFS order but moves the cold side of a strongly biased branch out of line, so the hot path
 * falls through. Once the order is fixed, every block learns whether it needs an explicit jump to
 * reach its successor, and two-way branches are flipped when that saves one.
 */

use super::{Analysis, AnalysisID, AnalysisSet, AnalysisState, Rpo};
use crate::block::BlockId;
use crate::graph::Graph;
use crate::inst::Opcode;
use tracing::warn;

#[derive(Debug, Default, Clone)]
pub struct LinearOrder {
    state: AnalysisState,
    blocks: Vec<BlockId>,
}

enum Step {
    Visit(BlockId, bool),
    Finish(BlockId),
}

struct Frame {
    block: BlockId,
    defer: bool,
    candidates: Vec<BlockId>,
    next: usize,
    deferred: Option<Vec<BlockId>>,
}

impl Frame {
    fn advance(&mut self, side: &mut Vec<BlockId>) -> Step {
        if self.deferred.is_none() {
            if let Some(&candidate) = self.candidates.get(self.next) {
                self.next += 1;
                return Step::Visit(candidate, self.defer);
            }
            if !self.defer {
                return Step::Finish(self.block);
            }
            self.deferred = Some(std::mem::take(side));
            self.next = 0;
        }
        match &self.deferred {
            Some(deferred) => match deferred.get(self.next) {
                Some(&candidate) => {
                    self.next += 1;
                    Step::Visit(candidate, false)
                }
                None => Step::Finish(self.block),
            },
            None => Step::Finish(self.block),
        }
    }
}

impl LinearOrder {
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Bytecode order: blocks taken in RPO are inserted after the last block whose pc does not
    /// exceed theirs.
    fn bytecode_order(graph: &Graph, rpo: &[BlockId]) -> Vec<BlockId> {
        let mut order: Vec<BlockId> = Vec::with_capacity(rpo.len());
        for &block in rpo {
            let pc = graph.block(block).guest_pc;
            let position = order
                .iter()
                .rposition(|&placed| pc >= graph.block(placed).guest_pc)
                .map_or(0, |p| p + 1);
            order.insert(position, block);
        }
        order
    }

    /// Successor to move out of line, if the branch of `block` is biased enough.
    fn least_likely_successor(graph: &Graph, block: BlockId) -> Option<BlockId> {
        let options = graph.options();
        if !options.freq_based_branch_reorder || graph.block(block).succs().len() != 2 {
            return None;
        }
        let counter0 = i128::from(graph.branch_counter(block, true));
        let counter1 = i128::from(graph.branch_counter(block, false));
        if counter0 == 0 && counter1 == 0 {
            return None;
        }
        let denom = counter0.max(counter1);
        let ratio = (counter0 - counter1) * 100 / denom;
        if ratio.abs() < i128::from(options.freq_based_branch_reorder_threshold) {
            return None;
        }
        let bb = graph.block(block);
        Some(if ratio < 0 {
            bb.true_successor()
        } else {
            bb.false_successor()
        })
    }

    /// DFS that defers the least likely successor of biased branches until the next
    /// deferral-enabled frame finishes. Returns blocks in reverse finish order.
    fn dfs_and_defer_least_frequent_branches(graph: &mut Graph, start: BlockId) -> Vec<BlockId> {
        let mut order: Vec<Option<BlockId>> = vec![None; graph.alive_blocks_count()];
        let mut remaining = order.len();

        let unreachable = graph.with_marker(|graph, marker| {
            let mut side = Vec::new();
            let mut stack: Vec<Frame> = Vec::new();
            let enter = |graph: &mut Graph, side: &mut Vec<BlockId>, block: BlockId, defer: bool| {
                graph.mark_block(block, marker);
                let least_likely = if defer {
                    Self::least_likely_successor(graph, block)
                } else {
                    None
                };
                let bb = graph.block(block);
                let candidates = match least_likely {
                    Some(cold) => {
                        side.push(cold);
                        let hot = if cold == bb.true_successor() {
                            bb.false_successor()
                        } else {
                            bb.true_successor()
                        };
                        vec![hot]
                    }
                    // Walk successors as they were before any earlier layout flipped them.
                    None if bb.is_inverted() => bb.succs().iter().rev().copied().collect(),
                    None => bb.succs().to_vec(),
                };
                Frame {
                    block,
                    defer,
                    candidates,
                    next: 0,
                    deferred: None,
                }
            };

            let frame = enter(graph, &mut side, start, true);
            stack.push(frame);
            while let Some(top) = stack.last_mut() {
                match top.advance(&mut side) {
                    Step::Visit(block, defer) => {
                        if !graph.is_block_marked(block, marker) {
                            let frame = enter(graph, &mut side, block, defer);
                            stack.push(frame);
                        }
                    }
                    Step::Finish(block) => {
                        stack.pop();
                        remaining -= 1;
                        order[remaining] = Some(block);
                    }
                }
            }

            if remaining == 0 {
                return Vec::new();
            }
            graph
                .blocks()
                .filter(|bb| !bb.markers().is_marked(marker))
                .map(|bb| bb.id)
                .collect::<Vec<_>>()
        });

        if !unreachable.is_empty() {
            if graph.options().verification_enabled() {
                panic!("unreachable blocks in linear order: {:?}", unreachable);
            }
            warn!(?unreachable, "linear order skipped unreachable blocks");
        }
        order.into_iter().flatten().collect()
    }

    /// Decides whether `prev` needs a jump now that `block` follows it, flipping two-way
    /// branches whose true successor falls through.
    fn handle_prev_instruction(graph: &mut Graph, block: BlockId, prev: BlockId) {
        let bb = graph.block(prev);
        debug_assert!(!bb.needs_jump);
        let Some(&first_succ) = bb.succs().first() else {
            return;
        };

        let Some(last) = bb.last_inst() else {
            if !graph.is_end_block(prev) && block != first_succ && !graph.is_end_block(first_succ) {
                graph.block_mut(prev).needs_jump = true;
            }
            return;
        };

        let last_inst = graph.inst(last);
        if last_inst.is_branch() {
            debug_assert_eq!(bb.succs().len(), 2);
            if block == bb.true_successor() {
                graph.swap_true_false_successors(prev);
                graph.inverse_condition_code(last);
            } else if block != bb.false_successor() {
                graph.block_mut(prev).needs_jump = true;
            }
            return;
        }
        if last_inst.opcode == Opcode::Throw || bb.is_try() {
            return;
        }
        if block != first_succ && !last_inst.is_control_flow() {
            graph.block_mut(prev).needs_jump = true;
        }
    }

    fn make_linear_order(graph: &mut Graph, blocks: &[BlockId]) {
        let mut prev: Option<BlockId> = None;
        for &block in blocks {
            if let Some(prev) = prev {
                Self::handle_prev_instruction(graph, block, prev);
            }
            prev = Some(block);
        }
        if let Some(last) = prev {
            if !graph.is_end_block(last) {
                graph.block_mut(last).needs_jump = true;
            }
        }
    }
}

impl Analysis for LinearOrder {
    const ID: AnalysisID = AnalysisID::LinearOrder;

    fn name(&self) -> &'static str {
        "LinearOrder"
    }

    fn run_impl(&mut self, graph: &mut Graph) -> bool {
        for block in graph.block_ids() {
            graph.block_mut(block).needs_jump = false;
        }
        self.blocks = if graph.is_bytecode_optimizer() {
            graph.run_analysis::<Rpo>();
            let rpo = graph.get_analysis::<Rpo>().blocks().to_vec();
            Self::bytecode_order(graph, &rpo)
        } else {
            match graph.start_block() {
                Some(start) => Self::dfs_and_defer_least_frequent_branches(graph, start),
                None => Vec::new(),
            }
        };
        Self::make_linear_order(graph, &self.blocks);
        true
    }

    fn state(&self) -> &AnalysisState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut AnalysisState {
        &mut self.state
    }

    fn slot(set: &AnalysisSet) -> &Self {
        &set.linear_order
    }

    fn slot_mut(set: &mut AnalysisSet) -> &mut Self {
        &mut set.linear_order
    }
}
