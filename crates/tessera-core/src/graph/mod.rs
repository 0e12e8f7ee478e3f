/*! The SSA graph of one compiled method.
 *
 * The graph owns every block and instruction in two arenas addressed by stable ids. Removing a
 * node empties its slot; ids are never handed out twice, so a stale id fails loudly instead of
 * silently aliasing a newer node. Cached analyses live next to the arenas so that every mutation
 * primitive can invalidate exactly what it breaks.
 */

mod cfg;
mod insts;

use crate::analysis::{Analysis, AnalysisSet, LoopAnalyzer, Statistics};
use crate::analysis::{DominatorsTree, LinearOrder, PassStatistics, Rpo};
use crate::arena::LocalArena;
use crate::block::{BasicBlock, BlockId};
use crate::config::CompilerOptions;
use crate::inst::{Inst, InstId, INVALID_PC};
use crate::marker::{Marker, MarkerManager};
use crate::runtime::{NoProfile, RuntimeInterface};
use cranelift_entity::PrimaryMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::trace;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphMode {
    /// Compiling for the bytecode optimizer: the layout follows bytecode order.
    pub bytecode_optimizer: bool,
    pub osr: bool,
}

#[derive(Debug)]
pub struct Graph {
    blocks: PrimaryMap<BlockId, Option<BasicBlock>>,
    insts: PrimaryMap<InstId, Option<Inst>>,
    start_block: Option<BlockId>,
    end_block: Option<BlockId>,
    mode: GraphMode,
    options: Arc<CompilerOptions>,
    runtime: Arc<dyn RuntimeInterface>,
    statistics: Arc<Mutex<Statistics>>,
    pub(crate) analyses: AnalysisSet,
    markers: MarkerManager,
    pub(crate) local_arena: LocalArena,
    null_ptr: Option<InstId>,
    is_child: bool,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new(CompilerOptions::default())
    }
}

impl Graph {
    pub fn new(options: impl Into<Arc<CompilerOptions>>) -> Self {
        Self::with_runtime(options, Arc::new(NoProfile))
    }

    pub fn with_runtime(
        options: impl Into<Arc<CompilerOptions>>,
        runtime: Arc<dyn RuntimeInterface>,
    ) -> Self {
        Self {
            blocks: PrimaryMap::new(),
            insts: PrimaryMap::new(),
            start_block: None,
            end_block: None,
            mode: GraphMode::default(),
            options: options.into(),
            runtime,
            statistics: Arc::new(Mutex::new(Statistics::default())),
            analyses: AnalysisSet::default(),
            markers: MarkerManager::new(),
            local_arena: LocalArena::new(),
            null_ptr: None,
            is_child: false,
        }
    }

    /// Graph for an inlined callee: shares options, profile and statistics with this graph.
    pub fn new_child(&self) -> Self {
        let mut child = Self::with_runtime(Arc::clone(&self.options), Arc::clone(&self.runtime));
        child.statistics = Arc::clone(&self.statistics);
        child.mode = self.mode;
        child.is_child = true;
        child
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: impl Into<Arc<CompilerOptions>>) {
        self.options = options.into();
    }

    pub fn runtime(&self) -> &dyn RuntimeInterface {
        self.runtime.as_ref()
    }

    pub fn set_runtime(&mut self, runtime: Arc<dyn RuntimeInterface>) {
        self.runtime = runtime;
    }

    pub fn mode(&self) -> GraphMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: GraphMode) {
        self.mode = mode;
    }

    pub fn is_bytecode_optimizer(&self) -> bool {
        self.mode.bytecode_optimizer
    }

    pub fn is_osr(&self) -> bool {
        self.mode.osr
    }

    pub fn is_child(&self) -> bool {
        self.is_child
    }

    pub fn start_block(&self) -> Option<BlockId> {
        self.start_block
    }

    pub fn end_block(&self) -> Option<BlockId> {
        self.end_block
    }

    pub fn set_start_block(&mut self, block: BlockId) {
        self.start_block = Some(block);
    }

    pub fn set_end_block(&mut self, block: Option<BlockId>) {
        self.end_block = block;
    }

    pub fn is_start_block(&self, block: BlockId) -> bool {
        self.start_block == Some(block)
    }

    pub fn is_end_block(&self, block: BlockId) -> bool {
        self.end_block == Some(block)
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        self.blocks[id]
            .as_ref()
            .unwrap_or_else(|| panic!("{} was removed from the graph", id))
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        self.blocks[id]
            .as_mut()
            .unwrap_or_else(|| panic!("{} was removed from the graph", id))
    }

    pub fn try_block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id).and_then(Option::as_ref)
    }

    pub fn is_block_alive(&self, id: BlockId) -> bool {
        self.try_block(id).is_some()
    }

    pub fn inst(&self, id: InstId) -> &Inst {
        self.insts[id]
            .as_ref()
            .unwrap_or_else(|| panic!("{} was removed from the graph", id))
    }

    pub fn inst_mut(&mut self, id: InstId) -> &mut Inst {
        self.insts[id]
            .as_mut()
            .unwrap_or_else(|| panic!("{} was removed from the graph", id))
    }

    pub fn try_inst(&self, id: InstId) -> Option<&Inst> {
        self.insts.get(id).and_then(Option::as_ref)
    }

    pub fn is_inst_alive(&self, id: InstId) -> bool {
        self.try_inst(id).is_some()
    }

    /// Live blocks in id order.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> + '_ {
        self.blocks.values().filter_map(Option::as_ref)
    }

    /// Every slot of the block table, removed ones included.
    pub(crate) fn block_slots(&self) -> impl Iterator<Item = (BlockId, Option<&BasicBlock>)> + '_ {
        self.blocks.iter().map(|(id, slot)| (id, slot.as_ref()))
    }

    pub fn block_ids(&self) -> Vec<BlockId> {
        self.blocks().map(|bb| bb.id).collect()
    }

    /// Size of the block table including removed slots.
    pub fn vector_blocks_len(&self) -> usize {
        self.blocks.len()
    }

    pub fn alive_blocks_count(&self) -> usize {
        self.blocks().count()
    }

    pub fn insts(&self) -> impl Iterator<Item = &Inst> + '_ {
        self.insts.values().filter_map(Option::as_ref)
    }

    /// Instructions placed in a live block.
    pub fn insts_count(&self) -> usize {
        self.blocks().map(|bb| bb.phis.len() + bb.insts.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.alive_blocks_count() == 0
    }

    pub fn new_marker(&mut self) -> Marker {
        self.markers.new_marker()
    }

    pub fn erase_marker(&mut self, marker: Marker) {
        self.markers.erase_marker(marker);
    }

    pub fn with_marker<R>(&mut self, f: impl FnOnce(&mut Self, Marker) -> R) -> R {
        let marker = self.new_marker();
        let result = f(self, marker);
        self.erase_marker(marker);
        result
    }

    /// Marks `block` and returns whether it was already marked.
    pub fn mark_block(&mut self, block: BlockId, marker: Marker) -> bool {
        self.block_mut(block).markers.set_marker(marker)
    }

    pub fn is_block_marked(&self, block: BlockId, marker: Marker) -> bool {
        self.block(block).markers.is_marked(marker)
    }

    pub fn unmark_block(&mut self, block: BlockId, marker: Marker) {
        self.block_mut(block).markers.reset_marker(marker);
    }

    pub fn mark_inst(&mut self, inst: InstId, marker: Marker) -> bool {
        self.inst_mut(inst).markers.set_marker(marker)
    }

    pub fn is_inst_marked(&self, inst: InstId, marker: Marker) -> bool {
        self.inst(inst).markers.is_marked(marker)
    }

    /// Runs `f` with the pass-scoped scratch arena. Everything allocated inside is released on
    /// return.
    pub fn with_local_arena<R>(&mut self, f: impl FnOnce(&mut Self, &mut LocalArena) -> R) -> R {
        let mut arena = std::mem::take(&mut self.local_arena);
        let mark = arena.mark();
        let result = f(self, &mut arena);
        arena.reset_to(mark);
        self.local_arena = arena;
        result
    }

    pub fn local_arena(&self) -> &LocalArena {
        &self.local_arena
    }

    pub fn statistics(&self) -> Vec<PassStatistics> {
        self.statistics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .passes()
            .to_vec()
    }

    pub fn statistics_handle(&self) -> Arc<Mutex<Statistics>> {
        Arc::clone(&self.statistics)
    }

    pub(crate) fn record_statistics(&self, record: PassStatistics) {
        self.statistics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    /// Runs `A` unless its cached result is still valid.
    pub fn run_analysis<A: Analysis>(&mut self) -> bool {
        if A::slot(&self.analyses).is_valid() {
            return true;
        }
        let mut analysis = std::mem::take(A::slot_mut(&mut self.analyses));
        trace!(analysis = analysis.name(), "running analysis");
        let result = analysis.run_impl(self);
        analysis.state_mut().record_run(result);
        *A::slot_mut(&mut self.analyses) = analysis;
        result
    }

    /// Cached result of `A`, whether or not it is still valid.
    pub fn get_analysis<A: Analysis>(&self) -> &A {
        A::slot(&self.analyses)
    }

    pub(crate) fn get_analysis_mut<A: Analysis>(&mut self) -> &mut A {
        A::slot_mut(&mut self.analyses)
    }

    pub fn get_valid_analysis<A: Analysis>(&mut self) -> &A {
        let valid = self.run_analysis::<A>();
        debug_assert!(valid, "analysis failed to run");
        A::slot(&self.analyses)
    }

    pub fn is_analysis_valid<A: Analysis>(&self) -> bool {
        A::slot(&self.analyses).is_valid()
    }

    pub fn invalidate_analysis<A: Analysis>(&mut self) {
        let analysis = A::slot_mut(&mut self.analyses);
        if analysis.is_valid() {
            trace!(analysis = analysis.name(), "invalidated");
            analysis.set_valid(false);
        }
    }

    /// Invalidates every analysis that depends on the set of edges.
    pub fn invalidate_blocks_order_analyses(&mut self) {
        self.invalidate_analysis::<Rpo>();
        self.invalidate_analysis::<DominatorsTree>();
        self.invalidate_analysis::<LinearOrder>();
        self.invalidate_analysis::<LoopAnalyzer>();
    }

    /// Profile counter of the edge from two-way `block` to its true or false successor.
    pub fn branch_counter(&self, block: BlockId, true_succ: bool) -> u64 {
        let bb = self.block(block);
        let pc = bb
            .last_inst()
            .map(|inst| self.inst(inst).pc)
            .unwrap_or(INVALID_PC);
        if pc == INVALID_PC {
            return 0;
        }
        if bb.inverted == true_succ {
            self.runtime.branch_not_taken_counter(pc)
        } else {
            self.runtime.branch_taken_counter(pc)
        }
    }

    fn push_block(&mut self, guest_pc: Option<u32>) -> BlockId {
        let id = self.blocks.next_key();
        self.blocks.push(Some(BasicBlock::new(id, guest_pc)))
    }

    fn push_inst(&mut self, make: impl FnOnce(InstId) -> Inst) -> InstId {
        let id = self.insts.next_key();
        self.insts.push(Some(make(id)))
    }
}
