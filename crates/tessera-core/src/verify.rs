/*! Structural graph verification.
 *
 * `Cheap` covers the CFG and def-use invariants every mutation primitive must preserve. `Full`
 * also recomputes the dominator tree and the loop tree from scratch and compares them with the
 * cached results, then checks that every definition dominates its uses.
 */

use crate::analysis::{DominatorsTree, LoopAnalyzer};
use crate::block::BlockId;
use crate::config::VerificationLevel;
use crate::graph::Graph;
use crate::inst::{InstId, User};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("slot {slot} holds block {found}")]
    BlockIdMismatch { slot: BlockId, found: BlockId },
    #[error("edge {from} -> {to} is not mirrored")]
    AsymmetricEdge { from: BlockId, to: BlockId },
    #[error("duplicate edge {from} -> {to}")]
    DuplicateEdge { from: BlockId, to: BlockId },
    #[error("{block} has two successors but does not end in a branch")]
    MissingBranch { block: BlockId },
    #[error("{block} has {count} successors")]
    TooManySuccessors { block: BlockId, count: usize },
    #[error("{inst} is listed in {block} but belongs to {owner:?}")]
    InstBlockMismatch {
        inst: InstId,
        block: BlockId,
        owner: Option<BlockId>,
    },
    #[error("{inst} is in the wrong list of {block}")]
    MisplacedInst { inst: InstId, block: BlockId },
    #[error("{user} reads {def} but the use is not recorded")]
    MissingUse { def: InstId, user: InstId },
    #[error("{def} records a use by {user} that does not exist")]
    StaleUse { def: InstId, user: InstId },
    #[error("{inst} uses removed instruction {input}")]
    DeadInput { inst: InstId, input: InstId },
    #[error("phi {phi} has {inputs} inputs but {block} has {preds} predecessors")]
    PhiInputCount {
        phi: InstId,
        block: BlockId,
        inputs: usize,
        preds: usize,
    },
    #[error("phi {phi} has no input for predecessor {pred}")]
    PhiPredMismatch { phi: InstId, pred: BlockId },
    #[error("start block {block} has predecessors")]
    StartHasPredecessors { block: BlockId },
    #[error("end block {block} has successors")]
    EndHasSuccessors { block: BlockId },
    #[error("{block}: cached dominator {cached:?}, recomputed {fresh:?}")]
    DominatorMismatch {
        block: BlockId,
        cached: Option<BlockId>,
        fresh: Option<BlockId>,
    },
    #[error("loop tree differs from a fresh recomputation at header {header:?}")]
    LoopMismatch { header: Option<BlockId> },
    #[error("{def} does not dominate its use in {user}")]
    DefNotDominating { def: InstId, user: InstId },
    #[error("{count} instructions exceed the budget of {limit}")]
    InstBudgetExceeded { count: usize, limit: usize },
}

/// Shape of one loop, independent of loop numbering.
#[derive(Debug, PartialEq, Eq)]
struct LoopShape {
    header: Option<BlockId>,
    back_edges: Vec<BlockId>,
    blocks: Vec<BlockId>,
    inner_headers: Vec<Option<BlockId>>,
    irreducible: bool,
}

fn loop_shapes(graph: &Graph) -> Vec<LoopShape> {
    let loops = graph.get_analysis::<LoopAnalyzer>();
    let mut shapes: Vec<LoopShape> = loops
        .loops()
        .map(|l| {
            let mut back_edges = l.back_edges().to_vec();
            back_edges.sort();
            let mut blocks = l.blocks().to_vec();
            blocks.sort();
            let mut inner_headers: Vec<_> = l
                .inner_loops()
                .iter()
                .map(|&inner| loops.loop_data(inner).header())
                .collect();
            inner_headers.sort();
            LoopShape {
                header: l.header(),
                back_edges,
                blocks,
                inner_headers,
                irreducible: l.is_irreducible(),
            }
        })
        .collect();
    shapes.sort_by_key(|shape| shape.header);
    shapes
}

pub struct GraphVerifier {
    level: VerificationLevel,
    errors: Vec<VerifyError>,
}

impl GraphVerifier {
    pub fn new(level: VerificationLevel) -> Self {
        Self {
            level,
            errors: Vec::new(),
        }
    }

    /// Checks `graph` and returns every violation found. Under `Full` the dominator and loop
    /// trees are left freshly recomputed.
    pub fn verify(mut self, graph: &mut Graph) -> Result<(), Vec<VerifyError>> {
        if self.level == VerificationLevel::None {
            return Ok(());
        }
        self.check_block_table(graph);
        self.check_edges(graph);
        self.check_terminators(graph);
        self.check_inst_lists(graph);
        self.check_def_use(graph);
        self.check_phis(graph);
        self.check_budget(graph);

        if self.level == VerificationLevel::Full && self.errors.is_empty() {
            self.check_dominators(graph);
            self.check_loops(graph);
            if self.errors.is_empty() {
                self.check_dominance_of_uses(graph);
            }
        }

        debug!(errors = self.errors.len(), level = ?self.level, "graph verified");
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }

    /// Structural checks only; never touches cached analyses.
    pub fn check(graph: &Graph) -> Result<(), Vec<VerifyError>> {
        let mut verifier = Self::new(VerificationLevel::Cheap);
        verifier.check_block_table(graph);
        verifier.check_edges(graph);
        verifier.check_terminators(graph);
        verifier.check_inst_lists(graph);
        verifier.check_def_use(graph);
        verifier.check_phis(graph);
        verifier.check_budget(graph);
        if verifier.errors.is_empty() {
            Ok(())
        } else {
            Err(verifier.errors)
        }
    }

    fn check_block_table(&mut self, graph: &Graph) {
        for (slot, bb) in graph.block_slots() {
            if let Some(bb) = bb {
                if bb.id != slot {
                    self.errors.push(VerifyError::BlockIdMismatch {
                        slot,
                        found: bb.id,
                    });
                }
            }
        }
        if let Some(start) = graph.start_block() {
            if graph.try_block(start).is_some_and(|bb| !bb.preds().is_empty()) {
                self.errors
                    .push(VerifyError::StartHasPredecessors { block: start });
            }
        }
        if let Some(end) = graph.end_block() {
            if graph.try_block(end).is_some_and(|bb| !bb.succs().is_empty()) {
                self.errors.push(VerifyError::EndHasSuccessors { block: end });
            }
        }
    }

    fn check_edges(&mut self, graph: &Graph) {
        for bb in graph.blocks() {
            for (i, &succ) in bb.succs().iter().enumerate() {
                if bb.succs()[..i].contains(&succ) {
                    self.errors.push(VerifyError::DuplicateEdge {
                        from: bb.id,
                        to: succ,
                    });
                }
                let mirrored = graph.try_block(succ).is_some_and(|s| {
                    s.preds().iter().filter(|&&p| p == bb.id).count()
                        == bb.succs().iter().filter(|&&s| s == succ).count()
                });
                if !mirrored {
                    self.errors.push(VerifyError::AsymmetricEdge {
                        from: bb.id,
                        to: succ,
                    });
                }
            }
            for &pred in bb.preds() {
                if !graph
                    .try_block(pred)
                    .is_some_and(|p| p.succs().contains(&bb.id))
                {
                    self.errors.push(VerifyError::AsymmetricEdge {
                        from: pred,
                        to: bb.id,
                    });
                }
            }
        }
    }

    fn check_terminators(&mut self, graph: &Graph) {
        for bb in graph.blocks() {
            match bb.succs().len() {
                0 | 1 => {}
                2 => {
                    let ends_in_branch = bb
                        .last_inst()
                        .is_some_and(|last| graph.inst(last).is_branch());
                    if !ends_in_branch && !bb.is_try() {
                        self.errors
                            .push(VerifyError::MissingBranch { block: bb.id });
                    }
                }
                count => {
                    if !bb.is_try() {
                        self.errors.push(VerifyError::TooManySuccessors {
                            block: bb.id,
                            count,
                        });
                    }
                }
            }
        }
    }

    fn check_inst_lists(&mut self, graph: &Graph) {
        for bb in graph.blocks() {
            for (&inst, in_phi_list) in bb
                .phis()
                .iter()
                .map(|i| (i, true))
                .chain(bb.insts().iter().map(|i| (i, false)))
            {
                let Some(data) = graph.try_inst(inst) else {
                    self.errors.push(VerifyError::InstBlockMismatch {
                        inst,
                        block: bb.id,
                        owner: None,
                    });
                    continue;
                };
                if data.block() != Some(bb.id) {
                    self.errors.push(VerifyError::InstBlockMismatch {
                        inst,
                        block: bb.id,
                        owner: data.block(),
                    });
                }
                if data.is_phi() != in_phi_list {
                    self.errors
                        .push(VerifyError::MisplacedInst { inst, block: bb.id });
                }
            }
        }
    }

    fn check_def_use(&mut self, graph: &Graph) {
        for bb in graph.blocks() {
            for inst in bb.all_insts() {
                let Some(data) = graph.try_inst(inst) else {
                    continue;
                };
                for (index, &input) in data.inputs().iter().enumerate() {
                    match graph.try_inst(input) {
                        None => self.errors.push(VerifyError::DeadInput { inst, input }),
                        Some(def) => {
                            if !def.users().contains(&User { inst, index }) {
                                self.errors
                                    .push(VerifyError::MissingUse { def: input, user: inst });
                            }
                        }
                    }
                }
                for user in data.users() {
                    let recorded = graph
                        .try_inst(user.inst)
                        .and_then(|u| u.inputs().get(user.index))
                        .is_some_and(|&value| value == inst);
                    if !recorded {
                        self.errors.push(VerifyError::StaleUse {
                            def: inst,
                            user: user.inst,
                        });
                    }
                }
            }
        }
    }

    fn check_phis(&mut self, graph: &Graph) {
        for bb in graph.blocks() {
            for &phi in bb.phis() {
                let Some(data) = graph.try_inst(phi) else {
                    continue;
                };
                if data.inputs().len() != bb.preds().len() {
                    self.errors.push(VerifyError::PhiInputCount {
                        phi,
                        block: bb.id,
                        inputs: data.inputs().len(),
                        preds: bb.preds().len(),
                    });
                }
                for &pred in bb.preds() {
                    if !data.input_blocks().contains(&pred) {
                        self.errors.push(VerifyError::PhiPredMismatch { phi, pred });
                    }
                }
            }
        }
    }

    fn check_budget(&mut self, graph: &Graph) {
        let count = graph.insts_count();
        let limit = graph.options().max_insts_count;
        if count > limit {
            self.errors
                .push(VerifyError::InstBudgetExceeded { count, limit });
        }
    }

    fn check_dominators(&mut self, graph: &mut Graph) {
        if !graph.is_analysis_valid::<DominatorsTree>() {
            graph.run_analysis::<DominatorsTree>();
            return;
        }
        let cached: Vec<(BlockId, Option<BlockId>)> =
            graph.blocks().map(|bb| (bb.id, bb.dominator())).collect();
        graph.invalidate_analysis::<DominatorsTree>();
        graph.run_analysis::<DominatorsTree>();
        for (block, cached) in cached {
            let fresh = graph.block(block).dominator();
            if fresh != cached {
                self.errors.push(VerifyError::DominatorMismatch {
                    block,
                    cached,
                    fresh,
                });
            }
        }
    }

    fn check_loops(&mut self, graph: &mut Graph) {
        if !graph.is_analysis_valid::<LoopAnalyzer>() {
            return;
        }
        let cached = loop_shapes(graph);
        graph.invalidate_analysis::<LoopAnalyzer>();
        graph.run_analysis::<LoopAnalyzer>();
        let fresh = loop_shapes(graph);
        if cached.len() != fresh.len() {
            self.errors.push(VerifyError::LoopMismatch { header: None });
            return;
        }
        for (cached, fresh) in cached.iter().zip(&fresh) {
            if cached != fresh {
                self.errors.push(VerifyError::LoopMismatch {
                    header: cached.header,
                });
            }
        }
    }

    fn check_dominance_of_uses(&mut self, graph: &Graph) {
        for bb in graph.blocks() {
            for inst in bb.all_insts() {
                let data = graph.inst(inst);
                for (index, &input) in data.inputs().iter().enumerate() {
                    let dominated = if data.is_phi() {
                        let def_block = graph.inst(input).block();
                        match (def_block, data.input_blocks().get(index)) {
                            (Some(def_block), Some(&pred)) => graph.dominates(def_block, pred),
                            _ => false,
                        }
                    } else {
                        graph.inst(input).block().is_some() && graph.inst_dominates(input, inst)
                    };
                    if !dominated {
                        self.errors.push(VerifyError::DefNotDominating {
                            def: input,
                            user: inst,
                        });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerOptions;
    use crate::inst::{DataType, Opcode};
    use pretty_assertions::assert_eq;

    fn options(level: VerificationLevel) -> CompilerOptions {
        CompilerOptions {
            verification: level,
            ..CompilerOptions::default()
        }
    }

    #[test]
    fn test_well_formed_graph() {
        let mut graph = Graph::new(options(VerificationLevel::Full));
        let a = graph.add_new_parameter(0, DataType::I64);
        let start = graph.start_block().unwrap();
        let body = graph.create_empty_block(None);
        let end = graph.create_end_block(None);
        graph.add_succ(start, body);
        graph.add_succ(body, end);
        let ret = graph.create_inst_with_inputs(Opcode::Return, DataType::I64, &[a]);
        graph.append_inst(body, ret);

        graph.run_analysis::<LoopAnalyzer>();
        assert_eq!(GraphVerifier::new(VerificationLevel::Full).verify(&mut graph), Ok(()));
    }

    #[test]
    fn test_two_successors_need_a_branch() {
        let mut graph = Graph::default();
        let start = graph.create_start_block();
        let left = graph.create_empty_block(None);
        let right = graph.create_empty_block(None);
        graph.add_succ(start, left);
        graph.add_succ(start, right);

        let errors = GraphVerifier::check(&graph).unwrap_err();
        assert_eq!(errors, vec![VerifyError::MissingBranch { block: start }]);
    }

    #[test]
    fn test_phi_arity() {
        let mut graph = Graph::default();
        let value = graph.add_new_parameter(0, DataType::I64);
        let start = graph.start_block().unwrap();
        let join = graph.create_empty_block(None);
        graph.add_succ(start, join);
        let phi = graph.create_inst(Opcode::Phi, DataType::I64);
        graph.append_phi(join, phi);
        graph.append_phi_input(phi, value, start);
        graph.append_phi_input(phi, value, join);

        let errors = GraphVerifier::check(&graph).unwrap_err();
        assert_eq!(
            errors,
            vec![VerifyError::PhiInputCount {
                phi,
                block: join,
                inputs: 2,
                preds: 1,
            }]
        );
    }

    #[test]
    fn test_stale_dominators_are_reported() {
        let mut graph = Graph::new(options(VerificationLevel::Full));
        let start = graph.create_start_block();
        let a = graph.create_empty_block(None);
        let b = graph.create_empty_block(None);
        graph.add_succ(start, a);
        graph.add_succ(a, b);
        graph.run_analysis::<DominatorsTree>();
        graph.block_mut(b).dominator = Some(start);

        let errors = GraphVerifier::new(VerificationLevel::Full)
            .verify(&mut graph)
            .unwrap_err();
        assert_eq!(
            errors,
            vec![VerifyError::DominatorMismatch {
                block: b,
                cached: Some(start),
                fresh: Some(a),
            }]
        );
    }
}
