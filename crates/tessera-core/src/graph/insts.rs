use super::Graph;
use crate::block::BlockId;
use crate::inst::{ConditionCode, DataType, Inst, InstId, Opcode, User};

impl Graph {
    pub fn create_inst(&mut self, opcode: Opcode, ty: DataType) -> InstId {
        self.push_inst(|id| Inst::new(id, opcode, ty))
    }

    pub fn create_inst_with_inputs(
        &mut self,
        opcode: Opcode,
        ty: DataType,
        inputs: &[InstId],
    ) -> InstId {
        let inst = self.create_inst(opcode, ty);
        for &input in inputs {
            self.append_input(inst, input);
        }
        inst
    }

    /// Appends to the phi list for phis, to the instruction list otherwise.
    pub fn append_inst(&mut self, block: BlockId, inst: InstId) {
        self.attach(inst, block);
        let is_phi = self.inst(inst).is_phi();
        let bb = self.block_mut(block);
        if is_phi {
            bb.phis.push(inst);
        } else {
            bb.insts.push(inst);
        }
    }

    pub fn prepend_inst(&mut self, block: BlockId, inst: InstId) {
        self.attach(inst, block);
        let is_phi = self.inst(inst).is_phi();
        let bb = self.block_mut(block);
        if is_phi {
            bb.phis.insert(0, inst);
        } else {
            bb.insts.insert(0, inst);
        }
    }

    pub fn append_phi(&mut self, block: BlockId, phi: InstId) {
        debug_assert!(self.inst(phi).is_phi(), "{} is not a phi", phi);
        self.append_inst(block, phi);
    }

    pub fn insert_before(&mut self, anchor: InstId, inst: InstId) {
        let (block, pos, is_phi) = self.position_of(anchor);
        debug_assert_eq!(is_phi, self.inst(inst).is_phi(), "phis and instructions do not mix");
        self.attach(inst, block);
        let bb = self.block_mut(block);
        let list = if is_phi { &mut bb.phis } else { &mut bb.insts };
        list.insert(pos, inst);
    }

    pub fn insert_after(&mut self, anchor: InstId, inst: InstId) {
        let (block, pos, is_phi) = self.position_of(anchor);
        debug_assert_eq!(is_phi, self.inst(inst).is_phi(), "phis and instructions do not mix");
        self.attach(inst, block);
        let bb = self.block_mut(block);
        let list = if is_phi { &mut bb.phis } else { &mut bb.insts };
        list.insert(pos + 1, inst);
    }

    /// Unlinks `inst` from its block without touching its inputs or users.
    pub fn erase_inst(&mut self, inst: InstId) {
        let Some(block) = self.inst(inst).block else {
            return;
        };
        let bb = self.block_mut(block);
        bb.phis.retain(|&i| i != inst);
        bb.insts.retain(|&i| i != inst);
        self.inst_mut(inst).block = None;
    }

    /// Unlinks `inst`, drops its inputs and frees its slot. The instruction must have no users.
    pub fn remove_inst(&mut self, inst: InstId) {
        debug_assert!(
            !self.inst(inst).has_users(),
            "removing {} which still has users",
            inst
        );
        self.kill_inst(inst);
    }

    pub fn remove_inputs(&mut self, inst: InstId) {
        let inputs = std::mem::take(&mut self.inst_mut(inst).inputs);
        self.inst_mut(inst).input_blocks.clear();
        for (index, input) in inputs.into_iter().enumerate() {
            self.remove_user(input, User { inst, index });
        }
    }

    pub fn set_input(&mut self, inst: InstId, index: usize, value: InstId) {
        let old = self.inst(inst).inputs[index];
        self.remove_user(old, User { inst, index });
        self.inst_mut(inst).inputs[index] = value;
        self.inst_mut(value).users.push(User { inst, index });
    }

    pub fn append_input(&mut self, inst: InstId, value: InstId) -> usize {
        let index = self.inst(inst).inputs.len();
        self.inst_mut(inst).inputs.push(value);
        self.inst_mut(value).users.push(User { inst, index });
        index
    }

    pub fn append_phi_input(&mut self, phi: InstId, value: InstId, pred: BlockId) -> usize {
        debug_assert!(self.inst(phi).is_phi(), "{} is not a phi", phi);
        let index = self.append_input(phi, value);
        self.inst_mut(phi).input_blocks.push(pred);
        index
    }

    pub fn remove_input(&mut self, inst: InstId, index: usize) {
        let removed = self.inst(inst).inputs[index];
        self.remove_user(removed, User { inst, index });
        let later: Vec<InstId> = self.inst(inst).inputs[index + 1..].to_vec();
        for (offset, value) in later.into_iter().enumerate() {
            let old_index = index + 1 + offset;
            if let Some(user) = self
                .insts
                .get_mut(value)
                .and_then(Option::as_mut)
                .and_then(|v| {
                    v.users
                        .iter_mut()
                        .find(|u| u.inst == inst && u.index == old_index)
                })
            {
                user.index = old_index - 1;
            }
        }
        let target = self.inst_mut(inst);
        target.inputs.remove(index);
        if index < target.input_blocks.len() {
            target.input_blocks.remove(index);
        }
    }

    /// Index of the phi input flowing in from `pred`.
    pub fn phi_input_index(&self, phi: InstId, pred: BlockId) -> Option<usize> {
        self.inst(phi).input_blocks.iter().position(|&b| b == pred)
    }

    pub fn phi_input_for(&self, phi: InstId, pred: BlockId) -> Option<InstId> {
        self.phi_input_index(phi, pred)
            .map(|index| self.inst(phi).inputs[index])
    }

    /// Points every user of `old` at `new`.
    pub fn replace_users(&mut self, old: InstId, new: InstId) {
        let users = std::mem::take(&mut self.inst_mut(old).users);
        for user in users {
            self.inst_mut(user.inst).inputs[user.index] = new;
            self.inst_mut(new).users.push(user);
        }
    }

    pub fn inverse_condition_code(&mut self, inst: InstId) {
        let target = self.inst_mut(inst);
        debug_assert!(target.opcode.is_branch() || target.opcode == Opcode::Compare);
        target.cc = target.cc.inverse();
    }

    pub fn set_condition_code(&mut self, inst: InstId, cc: ConditionCode) {
        self.inst_mut(inst).cc = cc;
    }

    /// Block and list position of `inst`, and whether it sits in the phi list.
    pub fn position_of(&self, inst: InstId) -> (BlockId, usize, bool) {
        let block = self
            .inst(inst)
            .block
            .unwrap_or_else(|| panic!("{} is not placed in a block", inst));
        let bb = self.block(block);
        if let Some(pos) = bb.phis.iter().position(|&i| i == inst) {
            return (block, pos, true);
        }
        let pos = bb
            .insts
            .iter()
            .position(|&i| i == inst)
            .unwrap_or_else(|| panic!("{} is not listed in {}", inst, block));
        (block, pos, false)
    }

    /// Whether `a` dominates `b`. Phis of a block precede its ordinary instructions.
    pub fn inst_dominates(&self, a: InstId, b: InstId) -> bool {
        let (block_a, pos_a, phi_a) = self.position_of(a);
        let (block_b, pos_b, phi_b) = self.position_of(b);
        if block_a != block_b {
            return self.dominates(block_a, block_b);
        }
        match (phi_a, phi_b) {
            (true, false) => true,
            (false, true) => false,
            _ => pos_a < pos_b,
        }
    }

    pub fn find_constant(&self, ty: DataType, value: i64) -> Option<InstId> {
        let start = self.start_block?;
        self.block(start).insts.iter().copied().find(|&id| {
            let inst = self.inst(id);
            inst.opcode == Opcode::Constant && inst.ty == ty && inst.imm == value
        })
    }

    /// Constants live in the start block and are shared by value.
    pub fn find_or_add_constant(&mut self, ty: DataType, value: i64) -> InstId {
        if let Some(existing) = self.find_constant(ty, value) {
            return existing;
        }
        let inst = self.create_inst(Opcode::Constant, ty);
        self.inst_mut(inst).imm = value;
        self.append_to_start_block(inst);
        inst
    }

    pub fn add_new_parameter(&mut self, index: u32, ty: DataType) -> InstId {
        let inst = self.create_inst(Opcode::Parameter, ty);
        self.inst_mut(inst).imm = i64::from(index);
        let start = self.start_block_or_create();
        let last_param = self
            .block(start)
            .insts
            .iter()
            .rposition(|&i| self.inst(i).opcode == Opcode::Parameter);
        self.attach(inst, start);
        let pos = last_param.map_or(0, |p| p + 1);
        self.block_mut(start).insts.insert(pos, inst);
        inst
    }

    pub fn parameters(&self) -> Vec<InstId> {
        let Some(start) = self.start_block else {
            return Vec::new();
        };
        self.block(start)
            .insts
            .iter()
            .copied()
            .filter(|&i| self.inst(i).opcode == Opcode::Parameter)
            .collect()
    }

    pub fn get_or_create_null_ptr(&mut self) -> InstId {
        if let Some(null_ptr) = self.null_ptr {
            return null_ptr;
        }
        let inst = self.create_inst(Opcode::NullPtr, DataType::Reference);
        self.append_to_start_block(inst);
        self.null_ptr = Some(inst);
        inst
    }

    fn append_to_start_block(&mut self, inst: InstId) {
        let start = self.start_block_or_create();
        self.attach(inst, start);
        let terminator = self
            .block(start)
            .last_inst()
            .filter(|&last| self.inst(last).is_control_flow());
        let bb = self.block_mut(start);
        match terminator {
            Some(_) => {
                let pos = bb.insts.len() - 1;
                bb.insts.insert(pos, inst);
            }
            None => bb.insts.push(inst),
        }
    }

    fn start_block_or_create(&mut self) -> BlockId {
        match self.start_block {
            Some(start) => start,
            None => self.create_start_block(),
        }
    }

    fn attach(&mut self, inst: InstId, block: BlockId) {
        let target = self.inst_mut(inst);
        debug_assert!(target.block.is_none(), "{} is already placed", inst);
        target.block = Some(block);
    }

    /// Drops the user record of `user` from `value`. Values already freed are skipped.
    pub(crate) fn remove_user(&mut self, value: InstId, user: User) {
        if let Some(def) = self.insts.get_mut(value).and_then(Option::as_mut) {
            if let Some(pos) = def.users.iter().position(|&u| u == user) {
                def.users.swap_remove(pos);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_def_use_edges() {
        let mut graph = Graph::default();
        let start = graph.create_start_block();
        let a = graph.add_new_parameter(0, DataType::I64);
        let b = graph.add_new_parameter(1, DataType::I64);
        let add = graph.create_inst_with_inputs(Opcode::Add, DataType::I64, &[a, b]);
        graph.append_inst(start, add);

        assert_eq!(graph.inst(a).users(), &[User { inst: add, index: 0 }]);
        assert_eq!(graph.inst(b).users(), &[User { inst: add, index: 1 }]);

        graph.set_input(add, 1, a);
        assert!(graph.inst(b).users().is_empty());
        assert_eq!(graph.inst(a).users().len(), 2);

        graph.remove_input(add, 0);
        assert_eq!(graph.inst(add).inputs(), &[a]);
        assert_eq!(graph.inst(a).users(), &[User { inst: add, index: 0 }]);
    }

    #[test]
    fn test_replace_users() {
        let mut graph = Graph::default();
        let start = graph.create_start_block();
        let a = graph.add_new_parameter(0, DataType::I64);
        let c = graph.find_or_add_constant(DataType::I64, 5);
        let neg = graph.create_inst_with_inputs(Opcode::Neg, DataType::I64, &[a]);
        graph.append_inst(start, neg);

        graph.replace_users(a, c);
        assert_eq!(graph.inst(neg).inputs(), &[c]);
        assert!(!graph.inst(a).has_users());
        assert_eq!(graph.inst(c).users(), &[User { inst: neg, index: 0 }]);
    }

    #[test]
    fn test_constants_are_shared() {
        let mut graph = Graph::default();
        let one = graph.find_or_add_constant(DataType::I64, 1);
        assert_eq!(graph.find_or_add_constant(DataType::I64, 1), one);
        assert_ne!(graph.find_or_add_constant(DataType::I32, 1), one);
        let null_ptr = graph.get_or_create_null_ptr();
        assert_eq!(graph.get_or_create_null_ptr(), null_ptr);
    }

    #[test]
    fn test_parameters_stay_first() {
        let mut graph = Graph::default();
        graph.find_or_add_constant(DataType::I64, 3);
        let p0 = graph.add_new_parameter(0, DataType::I64);
        let p1 = graph.add_new_parameter(1, DataType::I64);
        let start = graph.start_block().unwrap();
        assert_eq!(&graph.block(start).insts()[..2], &[p0, p1]);
        assert_eq!(graph.parameters(), vec![p0, p1]);
    }

    #[test]
    fn test_insert_and_remove() {
        let mut graph = Graph::default();
        let start = graph.create_start_block();
        let a = graph.add_new_parameter(0, DataType::I64);
        let neg = graph.create_inst_with_inputs(Opcode::Neg, DataType::I64, &[a]);
        graph.append_inst(start, neg);
        let not = graph.create_inst_with_inputs(Opcode::Not, DataType::I64, &[a]);
        graph.insert_before(neg, not);
        assert_eq!(graph.block(start).insts(), &[a, not, neg]);

        graph.remove_inst(not);
        assert_eq!(graph.block(start).insts(), &[a, neg]);
        assert!(!graph.is_inst_alive(not));
        assert_eq!(graph.inst(a).users(), &[User { inst: neg, index: 0 }]);
    }
}
