use super::Graph;
use crate::analysis::{DominatorsTree, LinearOrder, LoopAnalyzer, Rpo};
use crate::block::{BasicBlock, BlockId};
use crate::inst::InstId;
use tracing::debug;

impl Graph {
    pub fn create_empty_block(&mut self, guest_pc: Option<u32>) -> BlockId {
        let id = self.push_block(guest_pc);
        self.invalidate_blocks_order_analyses();
        id
    }

    /// Empty block with the bytecode pc and try region of `base`.
    pub fn create_empty_block_like(&mut self, base: BlockId) -> BlockId {
        let (pc, try_id) = {
            let bb = self.block(base);
            (bb.guest_pc, bb.try_id)
        };
        let id = self.create_empty_block(Some(pc));
        self.block_mut(id).try_id = try_id;
        id
    }

    pub fn create_start_block(&mut self) -> BlockId {
        let id = self.create_empty_block(Some(0));
        self.start_block = Some(id);
        id
    }

    pub fn create_end_block(&mut self, guest_pc: Option<u32>) -> BlockId {
        let id = self.create_empty_block(guest_pc);
        self.end_block = Some(id);
        id
    }

    pub fn add_succ(&mut self, block: BlockId, succ: BlockId) {
        debug_assert!(
            !self.block(block).succs.contains(&succ),
            "duplicate edge {} -> {}",
            block,
            succ
        );
        self.link(block, succ);
        self.invalidate_blocks_order_analyses();
    }

    /// Redirects the edge `block -> old` to `block -> new`, keeping its successor index.
    pub fn replace_succ(&mut self, block: BlockId, old: BlockId, new: BlockId) {
        let index = self.succ_index_of(block, old);
        self.block_mut(block).succs[index] = new;
        self.block_mut(new).preds.push(block);
        self.detach_pred(old, block);
        self.invalidate_blocks_order_analyses();
    }

    /// Redirects the edge `old -> block` to `new -> block`, keeping its predecessor index and the
    /// phi inputs that flowed along it.
    pub fn replace_pred(&mut self, block: BlockId, old: BlockId, new: BlockId) {
        let index = self.pred_index_of(block, old);
        self.block_mut(block).preds[index] = new;
        self.rename_phi_pred(block, old, new);
        let succ_index = self.succ_index_of(old, block);
        self.block_mut(old).succs.remove(succ_index);
        self.block_mut(new).succs.push(block);
        self.invalidate_blocks_order_analyses();
    }

    /// Removes the edge `block -> succ` and the phi inputs in `succ` that flowed along it.
    pub fn remove_succ(&mut self, block: BlockId, succ: BlockId) {
        let index = self.succ_index_of(block, succ);
        self.block_mut(block).succs.remove(index);
        self.detach_pred(succ, block);
        self.invalidate_blocks_order_analyses();
    }

    pub fn remove_pred(&mut self, block: BlockId, pred: BlockId) {
        self.remove_succ(pred, block);
    }

    /// Splits the edge `block -> succ` with a fresh empty block and returns it.
    pub fn insert_new_block_to_succ_edge(&mut self, block: BlockId, succ: BlockId) -> BlockId {
        let pc = self.block(succ).guest_pc;
        let new = self.create_empty_block(Some(pc));
        self.block_mut(new).try_id = self.block(block).try_id;

        let succ_index = self.succ_index_of(block, succ);
        self.block_mut(block).succs[succ_index] = new;
        self.block_mut(new).preds.push(block);

        let pred_index = self.pred_index_of(succ, block);
        self.block_mut(succ).preds[pred_index] = new;
        self.rename_phi_pred(succ, block, new);
        self.block_mut(new).succs.push(succ);
        new
    }

    /// Inserts an empty block that takes over all predecessors of `block`, together with its phis.
    pub fn insert_empty_block_before(&mut self, block: BlockId) -> BlockId {
        let new = self.create_empty_block_like(block);
        let preds = std::mem::take(&mut self.block_mut(block).preds);
        for &pred in &preds {
            let index = self.succ_index_of(pred, block);
            self.block_mut(pred).succs[index] = new;
        }
        self.block_mut(new).preds = preds;

        let phis = std::mem::take(&mut self.block_mut(block).phis);
        for &phi in &phis {
            self.inst_mut(phi).block = Some(new);
        }
        self.block_mut(new).phis = phis;
        self.link(new, block);
        new
    }

    /// Swaps the true and false successors of a two-way block and flips its `inverted` flag. The
    /// edge set is unchanged, so cached analyses stay valid.
    pub fn swap_true_false_successors(&mut self, block: BlockId) {
        let bb = self.block_mut(block);
        debug_assert_eq!(bb.succs.len(), 2, "{} is not a two-way block", block);
        bb.succs.swap(0, 1);
        bb.inverted = !bb.inverted;
    }

    /// Moves everything after `inst` into a new block that also takes over the successors.
    pub fn split_block_after_inst(&mut self, inst: InstId, make_edge: bool) -> BlockId {
        let (block, pos, is_phi) = self.position_of(inst);
        debug_assert!(!self.is_start_block(block) && !self.is_end_block(block));

        let moved = if is_phi {
            debug_assert_eq!(pos + 1, self.block(block).phis.len(), "split inside the phi list");
            std::mem::take(&mut self.block_mut(block).insts)
        } else {
            self.block_mut(block).insts.split_off(pos + 1)
        };
        let pc = moved.first().map(|&i| self.inst(i).pc);
        let new = self.create_empty_block(pc);
        self.block_mut(new).try_id = self.block(block).try_id;
        for &moved_inst in &moved {
            self.inst_mut(moved_inst).block = Some(new);
        }
        self.block_mut(new).insts = moved;

        let succs = std::mem::take(&mut self.block_mut(block).succs);
        for &succ in &succs {
            let index = self.pred_index_of(succ, block);
            self.block_mut(succ).preds[index] = new;
            self.rename_phi_pred(succ, block, new);
        }
        self.block_mut(new).succs = succs;

        if make_edge {
            self.link(block, new);
        }
        new
    }

    /// Merges the single successor of `block` into it. The successor must have `block` as its
    /// only predecessor.
    pub fn join_successor_block(&mut self, block: BlockId) {
        debug_assert_eq!(self.block(block).succs.len(), 1);
        let succ = self.block(block).succs[0];
        debug_assert!(!self.is_end_block(succ), "joining the end block");
        debug_assert_eq!(self.block(succ).preds.as_slice(), &[block]);

        for phi in self.block(succ).phis.clone() {
            let input = self.inst(phi).inputs[0];
            self.replace_users(phi, input);
            self.kill_inst(phi);
        }

        let moved = std::mem::take(&mut self.block_mut(succ).insts);
        for &inst in &moved {
            self.inst_mut(inst).block = Some(block);
        }
        self.block_mut(block).insts.extend(moved);

        let succ_succs = std::mem::take(&mut self.block_mut(succ).succs);
        for &next in &succ_succs {
            let index = self.pred_index_of(next, succ);
            self.block_mut(next).preds[index] = block;
            self.rename_phi_pred(next, succ, block);
        }
        self.block_mut(block).succs = succ_succs;
        self.block_mut(succ).preds.clear();
        self.blocks[succ] = None;
        self.invalidate_blocks_order_analyses();
    }

    /// Removes `pred` from the predecessors of `block` and fixes the phis of `block`: with two
    /// predecessors each phi collapses into its remaining input, with more the input is dropped.
    /// The successor list of `pred` is left to the caller.
    pub fn remove_predecessor_update_df(&mut self, block: BlockId, pred: BlockId) {
        let preds_count = self.block(block).preds.len();
        if preds_count == 2 {
            for phi in self.block(block).phis.clone() {
                let Some(index) = self.phi_input_index(phi, pred) else {
                    continue;
                };
                let remaining = self.inst(phi).inputs[1 - index];
                if remaining != phi && self.try_inst(remaining).is_some_and(|i| i.block.is_some())
                {
                    self.replace_users(phi, remaining);
                }
                self.kill_inst(phi);
            }
        } else if preds_count > 2 {
            for phi in self.block(block).phis.clone() {
                if let Some(index) = self.phi_input_index(phi, pred) {
                    self.remove_input(phi, index);
                }
            }
        } else {
            debug_assert_eq!(preds_count, 1);
        }
        let index = self.pred_index_of(block, pred);
        self.block_mut(block).preds.remove(index);
        self.invalidate_blocks_order_analyses();
    }

    pub fn remove_successors(&mut self, block: BlockId) {
        for succ in self.block(block).succs.clone() {
            self.remove_predecessor_update_df(succ, block);
        }
        self.block_mut(block).succs.clear();
        self.invalidate_blocks_order_analyses();
    }

    /// Drops every incoming edge of `block`. With `remove_last_inst`, predecessors that were
    /// two-way lose their branch.
    pub fn remove_predecessors(&mut self, block: BlockId, remove_last_inst: bool) {
        for pred in self.block(block).preds.clone() {
            if remove_last_inst && !self.block(pred).is_try() {
                if self.block(pred).succs.len() == 2 {
                    if let Some(last) = self.block(pred).last_inst() {
                        debug_assert!(self.inst(last).is_branch(), "{} does not end in a branch", pred);
                        self.kill_inst(last);
                    }
                } else {
                    debug_assert_eq!(self.block(pred).succs.as_slice(), &[block]);
                }
            }
            if let Some(index) = self.block(pred).succ_index(block) {
                self.block_mut(pred).succs.remove(index);
            }
        }
        self.block_mut(block).preds.clear();
        self.invalidate_blocks_order_analyses();
    }

    /// Cuts `block` out of the graph: removes its edges, fixes neighbouring phis, drops its
    /// instructions and erases it. With `fix_dom_tree` the blocks it dominated are handed to its
    /// dominator. Block-order analyses are invalid afterwards.
    pub fn disconnect_block(&mut self, block: BlockId, remove_last_inst: bool, fix_dom_tree: bool) {
        self.remove_predecessors(block, remove_last_inst);
        self.remove_successors(block);
        self.clear_block_insts(block);
        if self.is_end_block(block) {
            self.end_block = None;
        }
        if fix_dom_tree {
            self.reparent_dominated(block);
        }
        self.blocks[block] = None;
        self.invalidate_blocks_order_analyses();
    }

    /// Disconnects `block` if nothing but its own back edges reach it, then does the same for the
    /// successors it left behind.
    pub fn disconnect_block_rec(&mut self, block: BlockId, remove_last_inst: bool, fix_dom_tree: bool) {
        let mut worklist = vec![block];
        while let Some(current) = worklist.pop() {
            if !self.is_block_alive(current) {
                continue;
            }
            let bb = self.block(current);
            if bb.preds.is_empty() || self.reached_only_by_back_edges(current) {
                let succs = bb.succs.clone();
                self.disconnect_block(current, remove_last_inst, fix_dom_tree);
                worklist.extend(succs.into_iter().rev());
            }
        }
    }

    /// Removes a block's slot from the table and returns it.
    pub fn erase_block(&mut self, block: BlockId) -> Option<BasicBlock> {
        let erased = self.blocks.get_mut(block).and_then(Option::take);
        if erased.is_some() {
            self.invalidate_blocks_order_analyses();
        }
        erased
    }

    /// Puts a previously erased block back into its slot.
    pub fn restore_block(&mut self, block: BasicBlock) {
        let id = block.id;
        debug_assert!(self.blocks[id].is_none(), "{} is still alive", id);
        self.blocks[id] = Some(block);
        self.invalidate_blocks_order_analyses();
    }

    /// Removes a block without instructions or edges. The dominator tree must be valid and stays
    /// valid, as does a cached RPO.
    pub fn remove_empty_block(&mut self, block: BlockId) {
        debug_assert!(self.is_analysis_valid::<DominatorsTree>());
        let bb = self.block(block);
        debug_assert!(bb.is_empty(), "{} is not empty", block);
        debug_assert!(bb.preds.is_empty() && bb.succs.is_empty(), "{} has edges", block);
        self.finish_block_removal(block);
    }

    /// Removes a block with no ordinary instructions and a single successor, routing each of its
    /// predecessors straight to that successor. The dominator tree must be valid and stays valid,
    /// as does a cached RPO.
    pub fn remove_empty_block_with_phis(&mut self, block: BlockId) {
        debug_assert!(self.is_analysis_valid::<DominatorsTree>());
        let bb = self.block(block);
        debug_assert!(bb.insts.is_empty(), "{} is not empty", block);
        debug_assert!(!bb.preds.is_empty());
        debug_assert_eq!(bb.succs.len(), 1);

        let succ = bb.succs[0];
        let preds = bb.preds.clone();
        let succ_preds_count = self.block(succ).preds.len();
        debug_assert!(
            preds.iter().all(|p| !self.block(succ).preds.contains(p)),
            "removing {} would duplicate an edge into {}",
            block,
            succ
        );

        if preds.len() > 1 && succ_preds_count > 1 {
            self.spread_phi_inputs(block, succ, &preds);
        } else if preds.len() > 1 {
            debug_assert!(!self.block(succ).has_phis());
            let phis = std::mem::take(&mut self.block_mut(block).phis);
            for &phi in &phis {
                self.inst_mut(phi).block = Some(succ);
            }
            self.block_mut(succ).phis = phis;
        } else {
            self.rename_phi_pred(succ, block, preds[0]);
            for phi in self.block(block).phis.clone() {
                let input = self.inst(phi).inputs[0];
                self.replace_users(phi, input);
                self.kill_inst(phi);
            }
        }

        let first = preds[0];
        let index = self.succ_index_of(first, block);
        self.block_mut(first).succs[index] = succ;
        let index = self.pred_index_of(succ, block);
        self.block_mut(succ).preds[index] = first;
        for &pred in &preds[1..] {
            let index = self.succ_index_of(pred, block);
            self.block_mut(pred).succs[index] = succ;
            self.block_mut(succ).preds.push(pred);
        }

        let bb = self.block_mut(block);
        bb.preds.clear();
        bb.succs.clear();
        self.finish_block_removal(block);
    }

    /// Erases every block not reachable from the start block. Returns whether anything changed.
    pub fn remove_unreachable_blocks(&mut self) -> bool {
        let Some(start) = self.start_block else {
            return false;
        };
        let dead = self.with_marker(|graph, marker| {
            let mut stack = vec![start];
            graph.mark_block(start, marker);
            while let Some(block) = stack.pop() {
                for succ in graph.block(block).succs.clone() {
                    if !graph.mark_block(succ, marker) {
                        stack.push(succ);
                    }
                }
            }
            let dead: Vec<BlockId> = graph
                .blocks()
                .filter(|bb| !bb.markers.is_marked(marker))
                .map(|bb| bb.id)
                .collect();
            for &block in &dead {
                for succ in graph.block(block).succs.clone() {
                    if graph.is_block_marked(succ, marker) {
                        graph.remove_predecessor_update_df(succ, block);
                    }
                }
            }
            dead
        });
        if dead.is_empty() {
            return false;
        }

        for &block in &dead {
            for inst in self.block(block).all_insts().collect::<Vec<_>>() {
                self.remove_inputs(inst);
            }
        }
        for &block in &dead {
            for inst in self.block(block).all_insts().collect::<Vec<_>>() {
                self.free_inst(inst);
            }
            if self.is_end_block(block) {
                self.end_block = None;
            }
            self.blocks[block] = None;
        }
        debug!(removed = dead.len(), "removed unreachable blocks");
        self.invalidate_blocks_order_analyses();
        true
    }

    fn spread_phi_inputs(&mut self, block: BlockId, succ: BlockId, preds: &[BlockId]) {
        for phi in self.block(succ).phis.clone() {
            let Some(index) = self.phi_input_index(phi, block) else {
                continue;
            };
            let input = self.inst(phi).inputs[index];
            let from_block = self.inst(input).block == Some(block);
            debug_assert!(!from_block || self.inst(input).is_phi());

            let value_for = |graph: &Self, pred: BlockId| -> InstId {
                if from_block {
                    graph.phi_input_for(input, pred).unwrap_or(input)
                } else {
                    input
                }
            };
            let first = value_for(self, preds[0]);
            self.set_input(phi, index, first);
            self.inst_mut(phi).input_blocks[index] = preds[0];
            for &pred in &preds[1..] {
                let value = value_for(self, pred);
                self.append_phi_input(phi, value, pred);
            }
        }
        for phi in self.block(block).phis.clone() {
            debug_assert!(
                self.inst(phi).users.iter().all(|u| u.inst == phi),
                "{} is still used outside phis of {}",
                phi,
                succ
            );
            self.kill_inst(phi);
        }
    }

    fn finish_block_removal(&mut self, block: BlockId) {
        self.reparent_dominated(block);
        if self.is_analysis_valid::<Rpo>() {
            self.get_analysis_mut::<Rpo>().remove_basic_block(block);
        }
        self.blocks[block] = None;
        self.invalidate_analysis::<LinearOrder>();
        self.invalidate_analysis::<LoopAnalyzer>();
    }

    fn reparent_dominated(&mut self, block: BlockId) {
        let (dominator, dominated) = {
            let bb = self.block_mut(block);
            (bb.dominator.take(), std::mem::take(&mut bb.dominated))
        };
        let Some(dominator) = dominator else {
            return;
        };
        self.block_mut(dominator).dominated.retain(|&b| b != block);
        for child in dominated {
            debug_assert_eq!(self.block(child).dominator, Some(block));
            self.block_mut(child).dominator = Some(dominator);
            self.block_mut(dominator).dominated.push(child);
        }
    }

    fn reached_only_by_back_edges(&self, block: BlockId) -> bool {
        let loops = self.get_analysis::<LoopAnalyzer>();
        let Some(header_loop) = self.block(block).loop_id.and_then(|id| loops.try_loop(id)) else {
            return false;
        };
        header_loop.header() == Some(block)
            && self
                .block(block)
                .preds
                .iter()
                .all(|pred| header_loop.back_edges().contains(pred))
    }

    fn clear_block_insts(&mut self, block: BlockId) {
        let insts: Vec<InstId> = self.block(block).all_insts().collect();
        for &inst in &insts {
            self.remove_inputs(inst);
        }
        for inst in insts {
            self.free_inst(inst);
        }
    }

    /// Unlinks and frees `inst` regardless of remaining users.
    pub(crate) fn kill_inst(&mut self, inst: InstId) {
        self.remove_inputs(inst);
        self.free_inst(inst);
    }

    fn free_inst(&mut self, inst: InstId) {
        self.erase_inst(inst);
        if self.null_ptr == Some(inst) {
            self.null_ptr = None;
        }
        self.insts[inst] = None;
    }

    fn link(&mut self, from: BlockId, to: BlockId) {
        self.block_mut(from).succs.push(to);
        self.block_mut(to).preds.push(from);
    }

    fn detach_pred(&mut self, block: BlockId, pred: BlockId) {
        for phi in self.block(block).phis.clone() {
            if let Some(index) = self.phi_input_index(phi, pred) {
                self.remove_input(phi, index);
            }
        }
        let index = self.pred_index_of(block, pred);
        self.block_mut(block).preds.remove(index);
    }

    fn rename_phi_pred(&mut self, block: BlockId, old: BlockId, new: BlockId) {
        for phi in self.block(block).phis.clone() {
            for pred in self.inst_mut(phi).input_blocks.iter_mut() {
                if *pred == old {
                    *pred = new;
                }
            }
        }
    }

    fn succ_index_of(&self, block: BlockId, succ: BlockId) -> usize {
        self.block(block)
            .succ_index(succ)
            .unwrap_or_else(|| panic!("{} is not a successor of {}", succ, block))
    }

    fn pred_index_of(&self, block: BlockId, pred: BlockId) -> usize {
        self.block(block)
            .pred_index(pred)
            .unwrap_or_else(|| panic!("{} is not a predecessor of {}", pred, block))
    }
}
