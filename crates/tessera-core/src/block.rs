use crate::analysis::LoopId;
use crate::inst::{InstId, INVALID_PC};
use crate::marker::MarkerSet;
use cranelift_entity::entity_impl;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u32);
entity_impl!(BlockId, "bb");

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub guest_pc: u32,
    pub(crate) preds: Vec<BlockId>,
    pub(crate) succs: Vec<BlockId>,
    pub(crate) phis: Vec<InstId>,
    pub(crate) insts: Vec<InstId>,
    pub(crate) dominator: Option<BlockId>,
    pub(crate) dominated: Vec<BlockId>,
    pub(crate) loop_id: Option<LoopId>,
    pub try_begin: bool,
    pub try_end: bool,
    pub catch: bool,
    pub osr_entry: bool,
    pub try_id: Option<u32>,
    pub(crate) needs_jump: bool,
    /// Successors were swapped relative to the original branch; profile counters swap with them.
    pub(crate) inverted: bool,
    pub(crate) markers: MarkerSet,
}

impl BasicBlock {
    pub(crate) fn new(id: BlockId, guest_pc: Option<u32>) -> Self {
        Self {
            id,
            guest_pc: guest_pc.unwrap_or(INVALID_PC),
            preds: Vec::new(),
            succs: Vec::new(),
            phis: Vec::new(),
            insts: Vec::new(),
            dominator: None,
            dominated: Vec::new(),
            loop_id: None,
            try_begin: false,
            try_end: false,
            catch: false,
            osr_entry: false,
            try_id: None,
            needs_jump: false,
            inverted: false,
            markers: MarkerSet::default(),
        }
    }

    pub fn preds(&self) -> &[BlockId] {
        &self.preds
    }

    pub fn succs(&self) -> &[BlockId] {
        &self.succs
    }

    pub fn pred(&self, index: usize) -> BlockId {
        self.preds[index]
    }

    pub fn succ(&self, index: usize) -> BlockId {
        self.succs[index]
    }

    pub fn true_successor(&self) -> BlockId {
        debug_assert!(self.succs.len() == 2, "{} is not a two-way block", self.id);
        self.succs[0]
    }

    pub fn false_successor(&self) -> BlockId {
        debug_assert!(self.succs.len() == 2, "{} is not a two-way block", self.id);
        self.succs[1]
    }

    pub fn pred_index(&self, pred: BlockId) -> Option<usize> {
        self.preds.iter().position(|&p| p == pred)
    }

    pub fn succ_index(&self, succ: BlockId) -> Option<usize> {
        self.succs.iter().position(|&s| s == succ)
    }

    pub fn phis(&self) -> &[InstId] {
        &self.phis
    }

    /// Non-phi instructions in program order.
    pub fn insts(&self) -> &[InstId] {
        &self.insts
    }

    /// Phis followed by ordinary instructions.
    pub fn all_insts(&self) -> impl Iterator<Item = InstId> + '_ {
        self.phis.iter().chain(self.insts.iter()).copied()
    }

    pub fn last_inst(&self) -> Option<InstId> {
        self.insts.last().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.phis.is_empty() && self.insts.is_empty()
    }

    pub fn has_phis(&self) -> bool {
        !self.phis.is_empty()
    }

    pub fn dominator(&self) -> Option<BlockId> {
        self.dominator
    }

    pub fn dominated_blocks(&self) -> &[BlockId] {
        &self.dominated
    }

    pub fn loop_id(&self) -> Option<LoopId> {
        self.loop_id
    }

    pub fn needs_jump(&self) -> bool {
        self.needs_jump
    }

    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    pub fn markers(&self) -> &MarkerSet {
        &self.markers
    }

    pub fn is_try(&self) -> bool {
        self.try_begin || self.try_end
    }

    pub(crate) fn clear_dominator_data(&mut self) {
        self.dominator = None;
        self.dominated.clear();
    }
}
