/*! Declarative graph construction.
 *
 * Tests and the text format describe graphs by user-chosen numbers: blocks list their successors
 * by number, instructions list their inputs by number, and phis name the predecessor each input
 * flows in from. The start block falls through to the first declared block and answers to number
 * 0 unless a block claims it; `END` stands for the end block, which is only created when some
 * block flows into it.
 */

use crate::block::BlockId;
use crate::config::CompilerOptions;
use crate::graph::{Graph, GraphMode};
use crate::inst::{ConditionCode, DataType, InstId, Opcode};
use crate::runtime::StaticProfile;
use crate::{IrError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Successor number that stands for the end block.
pub const END: u32 = u32::MAX;

#[derive(Debug, Clone)]
enum Operands {
    Values(Vec<u32>),
    /// `(value, predecessor block)` pairs.
    Phi(Vec<(u32, u32)>),
}

#[derive(Debug, Clone)]
struct InstSpec {
    number: u32,
    opcode: Opcode,
    ty: DataType,
    operands: Operands,
    cc: Option<ConditionCode>,
    imm: i64,
    pc: Option<u32>,
    volatile: bool,
}

#[derive(Debug, Clone, Default)]
struct BlockSpec {
    number: u32,
    succs: Vec<u32>,
    pc: Option<u32>,
    try_begin: bool,
    try_end: bool,
    catch: bool,
    try_id: Option<u32>,
    insts: Vec<InstSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    Start,
    Block(usize),
}

#[derive(Debug, Default)]
pub struct GraphBuilder {
    options: CompilerOptions,
    mode: GraphMode,
    profile: StaticProfile,
    start: BlockSpec,
    blocks: Vec<BlockSpec>,
    cursor: Option<Cursor>,
    errors: Vec<String>,
}

/// A built graph together with the numbering it was described with.
#[derive(Debug)]
pub struct BuiltGraph {
    pub graph: Graph,
    blocks: HashMap<u32, BlockId>,
    insts: HashMap<u32, InstId>,
}

impl BuiltGraph {
    pub fn block(&self, number: u32) -> BlockId {
        self.try_block(number)
            .unwrap_or_else(|| panic!("no block numbered {}", number))
    }

    pub fn try_block(&self, number: u32) -> Option<BlockId> {
        match self.blocks.get(&number) {
            Some(&block) => Some(block),
            None if number == END => self.graph.end_block(),
            None if number == 0 => self.graph.start_block(),
            None => None,
        }
    }

    pub fn inst(&self, number: u32) -> InstId {
        self.try_inst(number)
            .unwrap_or_else(|| panic!("no instruction numbered {}", number))
    }

    pub fn try_inst(&self, number: u32) -> Option<InstId> {
        self.insts.get(&number).copied()
    }

    /// Number `block` was declared with.
    pub fn block_number(&self, block: BlockId) -> Option<u32> {
        self.blocks
            .iter()
            .find(|(_, &id)| id == block)
            .map(|(&number, _)| number)
    }

    pub fn into_graph(self) -> Graph {
        self.graph
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: CompilerOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn options_mut(&mut self) -> &mut CompilerOptions {
        &mut self.options
    }

    pub fn bytecode_optimizer(&mut self, enabled: bool) -> &mut Self {
        self.mode.bytecode_optimizer = enabled;
        self
    }

    pub fn osr(&mut self, enabled: bool) -> &mut Self {
        self.mode.osr = enabled;
        self
    }

    /// Branch counters for the branch at bytecode `pc`.
    pub fn profile(&mut self, pc: u32, taken: u64, not_taken: u64) -> &mut Self {
        self.profile.set_branch(pc, taken, not_taken);
        self
    }

    /// Continues with the start block.
    pub fn start(&mut self) -> &mut Self {
        self.cursor = Some(Cursor::Start);
        self
    }

    /// Declares block `number` flowing into `succs` and continues with it.
    pub fn block(&mut self, number: u32, succs: &[u32]) -> &mut Self {
        if number == END || self.blocks.iter().any(|b| b.number == number) {
            self.errors
                .push(format!("block {} declared twice or reserved", number));
        }
        self.blocks.push(BlockSpec {
            number,
            succs: succs.to_vec(),
            ..BlockSpec::default()
        });
        self.cursor = Some(Cursor::Block(self.blocks.len() - 1));
        self
    }

    pub fn block_pc(&mut self, pc: u32) -> &mut Self {
        if let Some(block) = self.current_block() {
            block.pc = Some(pc);
        }
        self
    }

    pub fn try_begin(&mut self, try_id: u32) -> &mut Self {
        if let Some(block) = self.current_block() {
            block.try_begin = true;
            block.try_id = Some(try_id);
        }
        self
    }

    pub fn try_end(&mut self, try_id: u32) -> &mut Self {
        if let Some(block) = self.current_block() {
            block.try_end = true;
            block.try_id = Some(try_id);
        }
        self
    }

    pub fn catch_block(&mut self) -> &mut Self {
        if let Some(block) = self.current_block() {
            block.catch = true;
        }
        self
    }

    /// Appends instruction `number` to the current block.
    pub fn inst(&mut self, number: u32, opcode: Opcode, ty: DataType, inputs: &[u32]) -> &mut Self {
        self.push_inst(number, opcode, ty, Operands::Values(inputs.to_vec()))
    }

    /// Appends a phi; `inputs` pairs each value with the predecessor it flows in from.
    pub fn phi(&mut self, number: u32, ty: DataType, inputs: &[(u32, u32)]) -> &mut Self {
        self.push_inst(number, Opcode::Phi, ty, Operands::Phi(inputs.to_vec()))
    }

    pub fn param(&mut self, number: u32, index: u32, ty: DataType) -> &mut Self {
        let cursor = self.cursor.replace(Cursor::Start);
        self.push_inst(number, Opcode::Parameter, ty, Operands::Values(Vec::new()))
            .imm(i64::from(index));
        self.cursor = cursor;
        self
    }

    pub fn constant(&mut self, number: u32, ty: DataType, value: i64) -> &mut Self {
        let cursor = self.cursor.replace(Cursor::Start);
        self.push_inst(number, Opcode::Constant, ty, Operands::Values(Vec::new()))
            .imm(value);
        self.cursor = cursor;
        self
    }

    pub fn cc(&mut self, cc: ConditionCode) -> &mut Self {
        if let Some(inst) = self.current_inst() {
            inst.cc = Some(cc);
        }
        self
    }

    pub fn imm(&mut self, imm: i64) -> &mut Self {
        if let Some(inst) = self.current_inst() {
            inst.imm = imm;
        }
        self
    }

    pub fn pc(&mut self, pc: u32) -> &mut Self {
        if let Some(inst) = self.current_inst() {
            inst.pc = Some(pc);
        }
        self
    }

    pub fn volatile(&mut self) -> &mut Self {
        if let Some(inst) = self.current_inst() {
            inst.volatile = true;
        }
        self
    }

    pub fn build(&self) -> Result<BuiltGraph> {
        if let Some(error) = self.errors.first() {
            return Err(IrError::BuilderError(error.clone()));
        }

        let mut graph = Graph::with_runtime(self.options.clone(), Arc::new(self.profile.clone()));
        graph.set_mode(self.mode);
        let start = graph.create_start_block();
        let mut blocks = HashMap::new();
        for spec in &self.blocks {
            let block = graph.create_empty_block(spec.pc);
            let bb = graph.block_mut(block);
            bb.try_begin = spec.try_begin;
            bb.try_end = spec.try_end;
            bb.catch = spec.catch;
            bb.try_id = spec.try_id;
            blocks.insert(spec.number, block);
        }
        let flows_to_end = self.blocks.iter().any(|b| b.succs.contains(&END));
        let end = flows_to_end.then(|| graph.create_end_block(None));

        if let Some(first) = self.blocks.first() {
            graph.add_succ(start, blocks[&first.number]);
        }
        for spec in &self.blocks {
            let block = blocks[&spec.number];
            for &succ in &spec.succs {
                let target = match (succ, end) {
                    (END, Some(end)) => end,
                    _ => *blocks.get(&succ).ok_or_else(|| {
                        IrError::UnknownBlock(format!("{} (successor of {})", succ, spec.number))
                    })?,
                };
                if graph.block(block).succs().contains(&target) {
                    return Err(IrError::BuilderError(format!(
                        "duplicate edge {} -> {}",
                        spec.number, succ
                    )));
                }
                graph.add_succ(block, target);
            }
        }

        let placed = std::iter::once((start, &self.start))
            .chain(self.blocks.iter().map(|spec| (blocks[&spec.number], spec)));
        let mut insts = HashMap::new();
        let mut pending = Vec::new();
        for (block, spec) in placed {
            for inst_spec in &spec.insts {
                if insts.contains_key(&inst_spec.number) {
                    return Err(IrError::BuilderError(format!(
                        "instruction {} declared twice",
                        inst_spec.number
                    )));
                }
                let inst = graph.create_inst(inst_spec.opcode, inst_spec.ty);
                let data = graph.inst_mut(inst);
                data.imm = inst_spec.imm;
                data.volatile = inst_spec.volatile;
                if let Some(cc) = inst_spec.cc {
                    data.cc = cc;
                }
                if let Some(pc) = inst_spec.pc {
                    data.pc = pc;
                }
                graph.append_inst(block, inst);
                insts.insert(inst_spec.number, inst);
                pending.push((inst, inst_spec));
            }
        }

        let resolve = |number: u32, user: u32| -> Result<InstId> {
            insts.get(&number).copied().ok_or_else(|| {
                IrError::UnknownInst(format!("{} (input of {})", number, user))
            })
        };
        for (inst, spec) in pending {
            match &spec.operands {
                Operands::Values(values) => {
                    for &value in values {
                        let input = resolve(value, spec.number)?;
                        graph.append_input(inst, input);
                    }
                }
                Operands::Phi(pairs) => {
                    for &(value, pred) in pairs {
                        let input = resolve(value, spec.number)?;
                        let pred_block = match pred {
                            0 if !blocks.contains_key(&0) => start,
                            _ => *blocks.get(&pred).ok_or_else(|| {
                                IrError::UnknownBlock(format!("{} (phi {})", pred, spec.number))
                            })?,
                        };
                        graph.append_phi_input(inst, input, pred_block);
                    }
                }
            }
        }

        Ok(BuiltGraph {
            graph,
            blocks,
            insts,
        })
    }

    fn push_inst(&mut self, number: u32, opcode: Opcode, ty: DataType, operands: Operands) -> &mut Self {
        let spec = InstSpec {
            number,
            opcode,
            ty,
            operands,
            cc: None,
            imm: 0,
            pc: None,
            volatile: false,
        };
        match self.current_block() {
            Some(block) => block.insts.push(spec),
            None => self
                .errors
                .push(format!("instruction {} outside of a block", number)),
        }
        self
    }

    fn current_block(&mut self) -> Option<&mut BlockSpec> {
        match self.cursor? {
            Cursor::Start => Some(&mut self.start),
            Cursor::Block(index) => self.blocks.get_mut(index),
        }
    }

    fn current_inst(&mut self) -> Option<&mut InstSpec> {
        self.current_block()?.insts.last_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_diamond() {
        let built = GraphBuilder::new()
            .param(0, 0, DataType::I64)
            .constant(1, DataType::I64, 10)
            .block(2, &[3, 4])
            .inst(5, Opcode::Compare, DataType::Bool, &[0, 1])
            .cc(ConditionCode::Lt)
            .inst(6, Opcode::IfImm, DataType::Bool, &[5])
            .cc(ConditionCode::Ne)
            .block(3, &[7])
            .block(4, &[7])
            .block(7, &[END])
            .phi(8, DataType::I64, &[(0, 3), (1, 4)])
            .inst(9, Opcode::Return, DataType::I64, &[8])
            .build()
            .unwrap();

        let graph = &built.graph;
        let start = graph.start_block().unwrap();
        assert_eq!(graph.block(start).succs(), &[built.block(2)]);
        assert_eq!(graph.block(built.block(2)).succs(), &[built.block(3), built.block(4)]);
        assert_eq!(graph.block(built.block(7)).succs(), &[built.block(END)]);
        assert_eq!(graph.parameters(), vec![built.inst(0)]);
        assert_eq!(graph.inst(built.inst(6)).cc, ConditionCode::Ne);
        assert_eq!(graph.phi_input_for(built.inst(8), built.block(4)), Some(built.inst(1)));
        assert_eq!(built.block_number(built.block(3)), Some(3));
    }

    #[test]
    fn test_unknown_references() {
        let missing_block = GraphBuilder::new().block(2, &[9]).build();
        assert!(matches!(missing_block, Err(IrError::UnknownBlock(_))));

        let missing_inst = GraphBuilder::new()
            .block(2, &[END])
            .inst(3, Opcode::Return, DataType::I64, &[42])
            .build();
        assert!(matches!(missing_inst, Err(IrError::UnknownInst(_))));

        let twice = GraphBuilder::new().block(2, &[END]).block(2, &[END]).build();
        assert!(matches!(twice, Err(IrError::BuilderError(_))));
    }
}
