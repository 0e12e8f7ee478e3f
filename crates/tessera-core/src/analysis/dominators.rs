/*! Immediate dominators by Lengauer-Tarjan.
 *
 * Results are stored on the blocks themselves (`dominator` and `dominated_blocks`), the analysis
 * object only tracks validity. Scratch arrays live in the local arena and are indexed by block id
 * or by DFS number; `NONE` doubles as "not visited yet" for the semidominator array.
 */

use super::{Analysis, AnalysisID, AnalysisSet, AnalysisState, Rpo};
use crate::arena::{LocalArena, Span};
use crate::block::BlockId;
use crate::graph::Graph;
use crate::marker::Marker;
use cranelift_entity::EntityRef;

const NONE: u32 = u32::MAX;

#[derive(Debug, Default, Clone)]
pub struct DominatorsTree {
    state: AnalysisState,
}

struct Scratch {
    semi: Span,
    parent: Span,
    ancestor: Span,
    label: Span,
    idom: Span,
    bucket_head: Span,
    bucket_next: Span,
    vertex: Span,
}

impl Scratch {
    fn new(arena: &mut LocalArena, blocks: usize) -> Self {
        Self {
            semi: arena.alloc(blocks, NONE),
            parent: arena.alloc(blocks, NONE),
            ancestor: arena.alloc(blocks, NONE),
            label: arena.alloc(blocks, NONE),
            idom: arena.alloc(blocks, NONE),
            bucket_head: arena.alloc(blocks, NONE),
            bucket_next: arena.alloc(blocks, NONE),
            vertex: arena.alloc(blocks, NONE),
        }
    }
}

fn idx(block: u32) -> usize {
    block as usize
}

fn id(block: u32) -> BlockId {
    BlockId::new(block as usize)
}

impl DominatorsTree {
    /// Numbers the blocks in DFS preorder and returns how many were reached.
    fn dfs_numbering(graph: &Graph, arena: &mut LocalArena, s: &Scratch, start: BlockId) -> usize {
        let mut count = 0usize;
        let mut number = |arena: &mut LocalArena, block: BlockId| {
            let b = block.index();
            arena.set(s.vertex, count, b as u32);
            arena.set(s.semi, b, count as u32);
            arena.set(s.label, b, b as u32);
            arena.set(s.ancestor, b, NONE);
            count += 1;
        };

        number(arena, start);
        let mut stack = vec![(start, 0usize)];
        while let Some((block, next)) = stack.pop() {
            let Some(succ) = graph.block(block).succs().get(next).copied() else {
                continue;
            };
            stack.push((block, next + 1));
            if arena.get(s.semi, succ.index()) == NONE {
                arena.set(s.parent, succ.index(), block.index() as u32);
                number(arena, succ);
                stack.push((succ, 0));
            }
        }
        count
    }

    fn compress(arena: &mut LocalArena, s: &Scratch, block: u32) {
        let mut chain = Vec::new();
        let mut current = block;
        loop {
            let ancestor = arena.get(s.ancestor, idx(current));
            if arena.get(s.ancestor, idx(ancestor)) == NONE {
                break;
            }
            chain.push(current);
            current = ancestor;
        }
        while let Some(v) = chain.pop() {
            let ancestor = arena.get(s.ancestor, idx(v));
            let ancestor_label = arena.get(s.label, idx(ancestor));
            let label = arena.get(s.label, idx(v));
            if arena.get(s.semi, idx(ancestor_label)) < arena.get(s.semi, idx(label)) {
                arena.set(s.label, idx(v), ancestor_label);
            }
            let next = arena.get(s.ancestor, idx(ancestor));
            arena.set(s.ancestor, idx(v), next);
        }
    }

    fn eval(arena: &mut LocalArena, s: &Scratch, block: u32) -> u32 {
        if arena.get(s.ancestor, idx(block)) == NONE {
            return block;
        }
        Self::compress(arena, s, block);
        arena.get(s.label, idx(block))
    }

    fn compute_immediate_dominators(graph: &Graph, arena: &mut LocalArena, s: &Scratch, dfs_num: usize) {
        for i in (1..=dfs_num).rev() {
            let current = arena.get(s.vertex, i);
            for &pred in graph.block(id(current)).preds() {
                let eval = Self::eval(arena, s, pred.index() as u32);
                let eval_semi = arena.get(s.semi, idx(eval));
                if eval_semi < arena.get(s.semi, idx(current)) {
                    arena.set(s.semi, idx(current), eval_semi);
                }
            }

            let semi_vertex = arena.get(s.vertex, arena.get(s.semi, idx(current)) as usize);
            let head = arena.get(s.bucket_head, idx(semi_vertex));
            arena.set(s.bucket_next, idx(current), head);
            arena.set(s.bucket_head, idx(semi_vertex), current);

            let parent = arena.get(s.parent, idx(current));
            arena.set(s.ancestor, idx(current), parent);

            let mut v = arena.get(s.bucket_head, idx(parent));
            while v != NONE {
                let eval = Self::eval(arena, s, v);
                let idom = if arena.get(s.semi, idx(eval)) < arena.get(s.semi, idx(v)) {
                    eval
                } else {
                    parent
                };
                arena.set(s.idom, idx(v), idom);
                v = arena.get(s.bucket_next, idx(v));
            }
            arena.set(s.bucket_head, idx(parent), NONE);
        }

        for i in 1..=dfs_num {
            let current = arena.get(s.vertex, i);
            let idom = arena.get(s.idom, idx(current));
            let semi_vertex = arena.get(s.vertex, arena.get(s.semi, idx(current)) as usize);
            if idom != semi_vertex {
                let idom_of_idom = arena.get(s.idom, idx(idom));
                arena.set(s.idom, idx(current), idom_of_idom);
            }
        }
    }
}

impl Analysis for DominatorsTree {
    const ID: AnalysisID = AnalysisID::DominatorsTree;

    fn name(&self) -> &'static str {
        "DominatorTree"
    }

    fn run_impl(&mut self, graph: &mut Graph) -> bool {
        graph.run_analysis::<Rpo>();
        let rpo = graph.get_analysis::<Rpo>().blocks().to_vec();
        for &block in &rpo {
            graph.block_mut(block).clear_dominator_data();
        }
        let Some(start) = graph.start_block() else {
            return true;
        };

        let pairs = graph.with_local_arena(|graph, arena| {
            let scratch = Scratch::new(arena, graph.vector_blocks_len());
            let count = Self::dfs_numbering(graph, arena, &scratch, start);
            debug_assert_eq!(count, rpo.len(), "unreachable blocks in dominator computation");
            let dfs_num = count - 1;
            Self::compute_immediate_dominators(graph, arena, &scratch, dfs_num);
            (1..=dfs_num)
                .map(|i| {
                    let block = arena.get(scratch.vertex, i);
                    (id(arena.get(scratch.idom, idx(block))), id(block))
                })
                .collect::<Vec<_>>()
        });

        for (dominator, block) in pairs {
            graph.set_dom_pair(dominator, block);
        }
        true
    }

    fn state(&self) -> &AnalysisState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut AnalysisState {
        &mut self.state
    }

    fn slot(set: &AnalysisSet) -> &Self {
        &set.dom_tree
    }

    fn slot_mut(set: &mut AnalysisSet) -> &mut Self {
        &mut set.dom_tree
    }
}

impl Graph {
    pub(crate) fn set_dom_pair(&mut self, dominator: BlockId, block: BlockId) {
        self.block_mut(block).dominator = Some(dominator);
        self.block_mut(dominator).dominated.push(block);
    }

    /// Whether `a` dominates `b`, according to the cached tree. Every block dominates itself.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        debug_assert!(
            self.is_analysis_valid::<DominatorsTree>(),
            "dominance query on a stale dominator tree"
        );
        let mut current = Some(b);
        while let Some(block) = current {
            if block == a {
                return true;
            }
            current = self.block(block).dominator;
        }
        false
    }

    pub fn strictly_dominates(&self, a: BlockId, b: BlockId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Fixes the dominator tree after `resolver` was spliced onto the edge `pred -> succ` and
    /// marks it valid again. The tree must have been valid before the splice.
    pub fn update_after_resolver_insertion(&mut self, pred: BlockId, succ: BlockId, resolver: BlockId) {
        debug_assert!(
            self.is_start_block(pred) || self.block(pred).dominator.is_some(),
            "{} has no dominator",
            pred
        );
        self.set_dom_pair(pred, resolver);
        if self.block(succ).dominator == Some(pred)
            && !self.resolver_is_bypassed(pred, succ, resolver)
        {
            self.block_mut(pred).dominated.retain(|&b| b != succ);
            self.set_dom_pair(resolver, succ);
        }
        self.get_analysis_mut::<DominatorsTree>().set_valid(true);
    }

    /// Whether `succ` stays reachable from another successor of `pred` without `resolver`.
    fn resolver_is_bypassed(&mut self, pred: BlockId, succ: BlockId, resolver: BlockId) -> bool {
        let others: Vec<BlockId> = self
            .block(pred)
            .succs()
            .iter()
            .copied()
            .filter(|&b| b != resolver)
            .collect();
        self.with_marker(|graph, marker| {
            others
                .iter()
                .any(|&other| graph.blocks_path_dfs_search(marker, other, succ, resolver))
        })
    }

    /// Whether `target` is reachable from `from` without passing through `exclude`. Blocks
    /// visited are marked with `marker`.
    pub fn blocks_path_dfs_search(
        &mut self,
        marker: Marker,
        from: BlockId,
        target: BlockId,
        exclude: BlockId,
    ) -> bool {
        let mut stack = vec![from];
        while let Some(block) = stack.pop() {
            if block == target {
                return true;
            }
            self.mark_block(block, marker);
            for &succ in self.block(block).succs().iter().rev() {
                if succ != exclude && !self.is_block_marked(succ, marker) {
                    stack.push(succ);
                }
            }
        }
        false
    }
}
