/*! Loop tree.
 *
 * Back edges are found with a gray/black DFS; every block that is the target of a back edge
 * heads a loop. Headers are processed in reverse RPO so inner loops are populated before the
 * loops that contain them. A loop whose header does not dominate one of its back edges is
 * irreducible and only holds its header and back-edge sources. Everything outside any loop
 * belongs to the synthetic root loop.
 */

use super::{Analysis, AnalysisID, AnalysisSet, AnalysisState, DominatorsTree, Rpo};
use crate::block::BlockId;
use crate::graph::Graph;
use cranelift_entity::{entity_impl, PrimaryMap};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopId(u32);
entity_impl!(LoopId, "loop");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loop {
    id: LoopId,
    header: Option<BlockId>,
    pre_header: Option<BlockId>,
    back_edges: Vec<BlockId>,
    blocks: Vec<BlockId>,
    inner_loops: Vec<LoopId>,
    outer_loop: Option<LoopId>,
    irreducible: bool,
    infinite: bool,
    depth: u32,
}

impl Loop {
    fn new(id: LoopId, header: Option<BlockId>) -> Self {
        Self {
            id,
            header,
            pre_header: None,
            back_edges: Vec::new(),
            blocks: Vec::new(),
            inner_loops: Vec::new(),
            outer_loop: None,
            irreducible: false,
            infinite: false,
            depth: 0,
        }
    }

    pub fn id(&self) -> LoopId {
        self.id
    }

    /// `None` for the root loop.
    pub fn header(&self) -> Option<BlockId> {
        self.header
    }

    pub fn pre_header(&self) -> Option<BlockId> {
        self.pre_header
    }

    pub fn back_edges(&self) -> &[BlockId] {
        &self.back_edges
    }

    /// Blocks that belong to this loop and to no inner loop.
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    pub fn inner_loops(&self) -> &[LoopId] {
        &self.inner_loops
    }

    pub fn outer_loop(&self) -> Option<LoopId> {
        self.outer_loop
    }

    pub fn is_root(&self) -> bool {
        self.header.is_none()
    }

    pub fn is_irreducible(&self) -> bool {
        self.irreducible
    }

    pub fn is_infinite(&self) -> bool {
        self.infinite
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }
}

#[derive(Debug, Default, Clone)]
pub struct LoopAnalyzer {
    state: AnalysisState,
    loops: PrimaryMap<LoopId, Loop>,
    root: Option<LoopId>,
}

impl LoopAnalyzer {
    pub fn root_loop(&self) -> Option<&Loop> {
        self.root.map(|root| &self.loops[root])
    }

    pub fn loop_data(&self, id: LoopId) -> &Loop {
        &self.loops[id]
    }

    pub fn try_loop(&self, id: LoopId) -> Option<&Loop> {
        self.loops.get(id)
    }

    pub fn loops(&self) -> impl Iterator<Item = &Loop> + '_ {
        self.loops.values()
    }

    /// Whether `inner` is `outer` or nested in it.
    pub fn is_inside(&self, inner: LoopId, outer: LoopId) -> bool {
        let mut current = Some(inner);
        while let Some(id) = current {
            if id == outer {
                return true;
            }
            current = self.loops[id].outer_loop;
        }
        false
    }

    fn create_loop(&mut self, header: Option<BlockId>) -> LoopId {
        let id = self.loops.next_key();
        self.loops.push(Loop::new(id, header))
    }

    fn append_block(&mut self, graph: &mut Graph, id: LoopId, block: BlockId) {
        debug_assert!(!self.loops[id].blocks.contains(&block));
        graph.block_mut(block).loop_id = Some(id);
        self.loops[id].blocks.push(block);
    }

    fn header_loop(&self, graph: &Graph, block: BlockId) -> Option<LoopId> {
        graph
            .block(block)
            .loop_id
            .filter(|&id| self.loops[id].header == Some(block))
    }

    fn collect_back_edges(&mut self, graph: &mut Graph, start: BlockId) {
        let gray = graph.new_marker();
        let black = graph.new_marker();
        graph.mark_block(start, gray);
        graph.mark_block(start, black);
        let mut stack = vec![(start, 0usize)];
        while let Some((block, next)) = stack.pop() {
            match graph.block(block).succs().get(next).copied() {
                Some(succ) => {
                    stack.push((block, next + 1));
                    if graph.is_block_marked(succ, gray) {
                        self.process_new_back_edge(graph, succ, block);
                    } else if !graph.is_block_marked(succ, black) {
                        graph.mark_block(succ, gray);
                        graph.mark_block(succ, black);
                        stack.push((succ, 0));
                    }
                }
                None => graph.unmark_block(block, gray),
            }
        }
        graph.erase_marker(black);
        graph.erase_marker(gray);

        for id in self.loops.keys().collect::<Vec<_>>() {
            let Some(header) = self.loops[id].header else {
                continue;
            };
            let irreducible = self.loops[id]
                .back_edges
                .iter()
                .any(|&back_edge| !graph.dominates(header, back_edge));
            self.loops[id].irreducible = irreducible;
        }
    }

    fn process_new_back_edge(&mut self, graph: &mut Graph, header: BlockId, back_edge: BlockId) {
        let id = match self.header_loop(graph, header) {
            Some(id) => id,
            None => {
                let id = self.create_loop(Some(header));
                self.append_block(graph, id, header);
                id
            }
        };
        if !self.loops[id].back_edges.contains(&back_edge) {
            self.loops[id].back_edges.push(back_edge);
        }
    }

    fn natural_loop_search(&mut self, graph: &mut Graph, id: LoopId) {
        let Some(header) = self.loops[id].header else {
            return;
        };
        let marker = graph.new_marker();
        graph.mark_block(header, marker);
        let mut stack: Vec<BlockId> = self.loops[id].back_edges.iter().rev().copied().collect();
        while let Some(block) = stack.pop() {
            if block == header || graph.mark_block(block, marker) {
                continue;
            }
            match graph.block(block).loop_id {
                None => self.append_block(graph, id, block),
                Some(block_loop) if block_loop != id => {
                    if self.loops[block_loop].outer_loop.is_none() {
                        self.loops[block_loop].outer_loop = Some(id);
                        self.loops[id].inner_loops.push(block_loop);
                    }
                }
                Some(_) => {}
            }
            stack.extend(graph.block(block).preds().iter().rev().copied());
        }
        graph.erase_marker(marker);
    }

    fn populate_loops(&mut self, graph: &mut Graph, rpo: &[BlockId], root: LoopId) {
        for &block in rpo.iter().rev() {
            let Some(id) = self.header_loop(graph, block) else {
                continue;
            };
            if self.loops[id].irreducible {
                for back_edge in self.loops[id].back_edges.clone() {
                    if graph.block(back_edge).loop_id.is_none() {
                        self.append_block(graph, id, back_edge);
                    }
                }
            } else {
                self.natural_loop_search(graph, id);
            }
        }

        for &block in rpo {
            match graph.block(block).loop_id {
                None => self.append_block(graph, root, block),
                Some(id) => {
                    if self.loops[id].header == Some(block) && self.loops[id].outer_loop.is_none() {
                        self.loops[id].outer_loop = Some(root);
                        self.loops[root].inner_loops.push(id);
                    }
                }
            }
        }
    }

    fn find_pre_headers(&mut self, graph: &Graph) {
        for id in self.loops.keys().collect::<Vec<_>>() {
            let Some(header) = self.loops[id].header else {
                continue;
            };
            let mut entries = graph
                .block(header)
                .preds()
                .iter()
                .copied()
                .filter(|pred| !self.loops[id].back_edges.contains(pred));
            let pre_header = match (entries.next(), entries.next()) {
                (Some(pred), None) if graph.block(pred).succs().len() == 1 => Some(pred),
                _ => None,
            };
            self.loops[id].pre_header = pre_header;
        }
    }

    fn compute_depths(&mut self, root: LoopId) {
        let mut stack = vec![(root, 0u32)];
        while let Some((id, depth)) = stack.pop() {
            self.loops[id].depth = depth;
            for &inner in &self.loops[id].inner_loops {
                stack.push((inner, depth + 1));
            }
        }
    }

    fn search_infinite_loops(&mut self, graph: &Graph) {
        for id in self.loops.keys().collect::<Vec<_>>() {
            if self.loops[id].is_root() {
                continue;
            }
            let mut members = Vec::new();
            let mut nested = vec![id];
            while let Some(current) = nested.pop() {
                members.extend_from_slice(&self.loops[current].blocks);
                nested.extend_from_slice(&self.loops[current].inner_loops);
            }
            let has_exit = members.iter().any(|&block| {
                graph.block(block).succs().iter().any(|&succ| {
                    graph
                        .block(succ)
                        .loop_id
                        .map_or(true, |succ_loop| !self.is_inside(succ_loop, id))
                })
            });
            self.loops[id].infinite = !has_exit;
        }
    }
}

impl Analysis for LoopAnalyzer {
    const ID: AnalysisID = AnalysisID::LoopAnalyzer;

    fn name(&self) -> &'static str {
        "LoopAnalysis"
    }

    fn run_impl(&mut self, graph: &mut Graph) -> bool {
        graph.run_analysis::<DominatorsTree>();
        let rpo = graph.get_analysis::<Rpo>().blocks().to_vec();
        for block in graph.block_ids() {
            graph.block_mut(block).loop_id = None;
        }
        self.loops.clear();
        let root = self.create_loop(None);
        self.root = Some(root);
        let Some(start) = graph.start_block() else {
            return true;
        };

        self.collect_back_edges(graph, start);
        self.populate_loops(graph, &rpo, root);
        self.find_pre_headers(graph);
        self.compute_depths(root);
        self.search_infinite_loops(graph);
        true
    }

    fn state(&self) -> &AnalysisState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut AnalysisState {
        &mut self.state
    }

    fn slot(set: &AnalysisSet) -> &Self {
        &set.loops
    }

    fn slot_mut(set: &mut AnalysisSet) -> &mut Self {
        &mut set.loops
    }
}

impl Graph {
    pub fn is_loop_header(&self, block: BlockId) -> bool {
        let loops = self.get_analysis::<LoopAnalyzer>();
        self.block(block)
            .loop_id()
            .and_then(|id| loops.try_loop(id))
            .is_some_and(|l| l.header() == Some(block))
    }
}
