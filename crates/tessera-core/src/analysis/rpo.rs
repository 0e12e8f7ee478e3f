use super::{Analysis, AnalysisID, AnalysisSet, AnalysisState};
use crate::block::BlockId;
use crate::graph::Graph;
use tracing::warn;

/// Reverse postorder of the blocks reachable from the start block.
#[derive(Debug, Default, Clone)]
pub struct Rpo {
    state: AnalysisState,
    blocks: Vec<BlockId>,
}

impl Rpo {
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn position(&self, block: BlockId) -> Option<usize> {
        self.blocks.iter().position(|&b| b == block)
    }

    pub fn remove_basic_block(&mut self, block: BlockId) {
        let position = self.position(block);
        debug_assert!(position.is_some(), "{} is not in the rpo", block);
        if let Some(position) = position {
            self.blocks.remove(position);
        }
    }

    pub fn add_basic_block_before(&mut self, next: BlockId, block: BlockId) {
        let position = self
            .position(next)
            .unwrap_or_else(|| panic!("{} is not in the rpo", next));
        self.blocks.insert(position, block);
    }

    pub fn add_basic_block_after(&mut self, prev: BlockId, block: BlockId) {
        let position = self
            .position(prev)
            .unwrap_or_else(|| panic!("{} is not in the rpo", prev));
        self.blocks.insert(position + 1, block);
    }

    pub fn add_vector_after(&mut self, prev: BlockId, blocks: &[BlockId]) {
        let position = self
            .position(prev)
            .unwrap_or_else(|| panic!("{} is not in the rpo", prev));
        self.blocks
            .splice(position + 1..position + 1, blocks.iter().copied());
    }
}

impl Analysis for Rpo {
    const ID: AnalysisID = AnalysisID::Rpo;

    fn name(&self) -> &'static str {
        "RPO"
    }

    fn run_impl(&mut self, graph: &mut Graph) -> bool {
        self.blocks.clear();
        let Some(start) = graph.start_block() else {
            return true;
        };
        let mut order: Vec<Option<BlockId>> = vec![None; graph.alive_blocks_count()];
        let mut remaining = order.len();

        let unreachable = graph.with_marker(|graph, marker| {
            graph.mark_block(start, marker);
            let mut stack = vec![(start, 0usize)];
            while let Some((block, next)) = stack.pop() {
                match graph.block(block).succs().get(next).copied() {
                    Some(succ) => {
                        stack.push((block, next + 1));
                        if !graph.mark_block(succ, marker) {
                            stack.push((succ, 0));
                        }
                    }
                    None => {
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
                panic!("unreachable blocks in graph: {:?}", unreachable);
            }
            warn!(?unreachable, "rpo skipped unreachable blocks");
        }
        self.blocks = order.into_iter().flatten().collect();
        true
    }

    fn state(&self) -> &AnalysisState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut AnalysisState {
        &mut self.state
    }

    fn slot(set: &AnalysisSet) -> &Self {
        &set.rpo
    }

    fn slot_mut(set: &mut AnalysisSet) -> &mut Self {
        &mut set.rpo
    }
}
