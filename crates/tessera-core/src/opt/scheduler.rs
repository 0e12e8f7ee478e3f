/*! Intra-block list scheduling.
 *
 * A block is cut into regions at control-flow instructions and barriers; only instructions
 * strictly between two cuts may trade places. Inside a region the scheduler builds a dependency
 * DAG (data, memory and exception ordering), weights every node with the longest latency path to
 * the end of the region, then issues one instruction per cycle: the highest-priority instruction
 * among those whose operands are ready, or the earliest one to become ready if none is.
 */

use crate::analysis::{check_inst_alias, AliasType, Pass, Rpo};
use crate::block::BlockId;
use crate::config::CompilerOptions;
use crate::graph::Graph;
use crate::inst::InstId;
use std::any::Any;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::ops::Range;
use tracing::{debug, trace};

/// Regions longer than this are left in program order.
const MAX_REGION_INSTS: usize = 64;

#[derive(Debug, Default)]
pub struct Scheduler {
    changed_blocks: Vec<BlockId>,
}

/// Dependency DAG of one region, indexed by position in the region.
struct Dependencies {
    succs: Vec<Vec<(usize, u32)>>,
}

impl Dependencies {
    fn build(graph: &Graph, insts: &[InstId]) -> Self {
        let position: HashMap<InstId, usize> =
            insts.iter().enumerate().map(|(i, &inst)| (inst, i)).collect();
        let mut deps = Self {
            succs: vec![Vec::new(); insts.len()],
        };
        let options = graph.options();
        let may_alias = |a: usize, b: usize| check_inst_alias(graph, insts[a], insts[b]) != AliasType::NoAlias;

        let mut loads: Vec<usize> = Vec::new();
        let mut stores: Vec<usize> = Vec::new();
        let mut special: Vec<usize> = Vec::new();
        for (i, &inst) in insts.iter().enumerate() {
            let data = graph.inst(inst);
            for &input in data.inputs() {
                if let Some(&def) = position.get(&input) {
                    deps.add(def, i, graph.inst(input).latency(options));
                }
            }

            if data.is_load() {
                for &store in &stores {
                    if may_alias(store, i) {
                        deps.add(store, i, 1);
                    }
                }
                loads.push(i);
            } else if data.is_store() {
                for &other in loads.iter().chain(&stores) {
                    if may_alias(other, i) {
                        deps.add(other, i, 1);
                    }
                }
                for &other in &special {
                    deps.add(other, i, 1);
                }
                stores.push(i);
            }

            if data.can_throw() || data.is_runtime_call() {
                for &other in stores.iter().chain(&special) {
                    deps.add(other, i, 1);
                }
                special.push(i);
            }
        }
        deps
    }

    fn add(&mut self, from: usize, to: usize, latency: u32) {
        if from == to {
            return;
        }
        debug_assert!(from < to, "dependency against program order");
        match self.succs[from].iter_mut().find(|(succ, _)| *succ == to) {
            Some(edge) => edge.1 = edge.1.max(latency),
            None => self.succs[from].push((to, latency)),
        }
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the last run reordered anything.
    pub fn changed(&self) -> bool {
        !self.changed_blocks.is_empty()
    }

    pub fn changed_blocks(&self) -> &[BlockId] {
        &self.changed_blocks
    }

    /// Schedules every block except the start block. Returns whether any block changed.
    pub fn schedule(&mut self, graph: &mut Graph) -> bool {
        self.changed_blocks.clear();
        graph.run_analysis::<Rpo>();
        let rpo = graph.get_analysis::<Rpo>().blocks().to_vec();
        for block in rpo {
            if graph.is_start_block(block) || graph.block(block).insts().len() < 2 {
                continue;
            }
            if Self::schedule_block(graph, block) {
                self.changed_blocks.push(block);
            }
        }
        debug!(changed = self.changed_blocks.len(), "scheduling finished");
        self.changed()
    }

    pub fn schedule_block(graph: &mut Graph, block: BlockId) -> bool {
        let mut changed = false;
        for region in Self::regions(graph, block) {
            let insts = graph.block(block).insts()[region.clone()].to_vec();
            if insts.len() > MAX_REGION_INSTS {
                trace!(%block, len = insts.len(), "region too long, skipped");
                continue;
            }
            let order = Self::schedule_region(graph, &insts);
            if order != insts {
                trace!(%block, ?order, "region reordered");
                graph.block_mut(block).insts[region].copy_from_slice(&order);
                changed = true;
            }
        }
        changed
    }

    /// Index ranges of the instruction list between control-flow instructions and barriers.
    /// Ranges of a single instruction are omitted.
    fn regions(graph: &Graph, block: BlockId) -> Vec<Range<usize>> {
        let insts = graph.block(block).insts();
        let mut regions = Vec::new();
        let mut begin = 0;
        for (i, &inst) in insts.iter().enumerate() {
            let data = graph.inst(inst);
            if data.is_barrier() || data.is_control_flow() {
                if i - begin > 1 {
                    regions.push(begin..i);
                }
                begin = i + 1;
            }
        }
        if insts.len().saturating_sub(begin) > 1 {
            regions.push(begin..insts.len());
        }
        regions
    }

    fn schedule_region(graph: &mut Graph, insts: &[InstId]) -> Vec<InstId> {
        let deps = Dependencies::build(graph, insts);
        let latencies: Vec<u32> = insts
            .iter()
            .map(|&inst| graph.inst(inst).latency(graph.options()))
            .collect();

        graph.with_local_arena(|_, arena| {
            let n = insts.len();
            let prio = arena.alloc(n, 0);
            let asap = arena.alloc(n, 0);
            let pending = arena.alloc(n, 0);

            for i in (0..n).rev() {
                let mut priority = latencies[i];
                for &(succ, latency) in &deps.succs[i] {
                    priority = priority.max(latency + arena.get(prio, succ));
                    arena.set(pending, succ, arena.get(pending, succ) + 1);
                }
                arena.set(prio, i, priority);
            }

            let mut waiting: BinaryHeap<Reverse<(u32, usize)>> = (0..n)
                .filter(|&i| arena.get(pending, i) == 0)
                .map(|i| Reverse((0, i)))
                .collect();
            let mut ready: BinaryHeap<(u32, Reverse<usize>)> = BinaryHeap::new();
            let mut order = Vec::with_capacity(n);
            let mut cycle = 0u32;

            while order.len() < n {
                while let Some(&Reverse((ready_at, i))) = waiting.peek() {
                    if ready_at > cycle {
                        break;
                    }
                    waiting.pop();
                    ready.push((arena.get(prio, i), Reverse(i)));
                }
                let Some((_, Reverse(i))) = ready.pop() else {
                    match waiting.peek() {
                        Some(&Reverse((ready_at, _))) => {
                            cycle = ready_at;
                            continue;
                        }
                        None => break,
                    }
                };

                order.push(insts[i]);
                for &(succ, latency) in &deps.succs[i] {
                    let at = arena.get(asap, succ).max(cycle + latency);
                    arena.set(asap, succ, at);
                    let left = arena.get(pending, succ) - 1;
                    arena.set(pending, succ, left);
                    if left == 0 {
                        waiting.push(Reverse((at, succ)));
                    }
                }
                cycle += 1;
            }
            debug_assert_eq!(order.len(), n, "dependency cycle in region");
            order
        })
    }
}

impl Pass for Scheduler {
    fn name(&self) -> &'static str {
        "Scheduler"
    }

    fn description(&self) -> &'static str {
        "Reorders instructions inside basic blocks to hide latencies"
    }

    fn is_enable(&self, options: &CompilerOptions) -> bool {
        options.scheduling && options.is_pass_enabled(self.name())
    }

    fn run_impl(&mut self, graph: &mut Graph) -> bool {
        self.schedule(graph);
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VerificationLevel;
    use crate::inst::{DataType, Opcode};
    use pretty_assertions::assert_eq;

    struct Fixture {
        graph: Graph,
        body: BlockId,
        params: Vec<InstId>,
    }

    fn fixture(options: CompilerOptions) -> Fixture {
        let mut graph = Graph::new(options);
        let params = (0..3)
            .map(|i| graph.add_new_parameter(i, DataType::I64))
            .collect();
        let start = graph.start_block().unwrap();
        let body = graph.create_empty_block(None);
        let end = graph.create_end_block(None);
        graph.add_succ(start, body);
        graph.add_succ(body, end);
        Fixture {
            graph,
            body,
            params,
        }
    }

    fn emit(graph: &mut Graph, block: BlockId, opcode: Opcode, inputs: &[InstId]) -> InstId {
        let inst = graph.create_inst_with_inputs(opcode, DataType::I64, inputs);
        graph.append_inst(block, inst);
        inst
    }

    #[test]
    fn test_long_latency_load_is_hoisted() {
        let Fixture {
            mut graph,
            body,
            params,
        } = fixture(CompilerOptions::default());
        let a = emit(&mut graph, body, Opcode::Add, &[params[0], params[1]]);
        let b = emit(&mut graph, body, Opcode::Add, &[a, params[0]]);
        let load = emit(&mut graph, body, Opcode::LoadObject, &[params[2]]);
        let sum = emit(&mut graph, body, Opcode::Add, &[load, b]);
        let ret = emit(&mut graph, body, Opcode::Return, &[sum]);

        let mut scheduler = Scheduler::new();
        assert!(graph.run_pass(&mut scheduler));
        assert!(scheduler.changed());
        assert_eq!(scheduler.changed_blocks(), &[body]);
        assert_eq!(graph.block(body).insts(), &[load, a, b, sum, ret]);
    }

    #[test]
    fn test_aliasing_store_keeps_load_below() {
        let Fixture {
            mut graph,
            body,
            params,
        } = fixture(CompilerOptions::default());
        let store = emit(&mut graph, body, Opcode::StoreObject, &[params[0], params[1]]);
        let same = emit(&mut graph, body, Opcode::LoadObject, &[params[0]]);
        graph.inst_mut(store).imm = 8;
        graph.inst_mut(same).imm = 8;

        assert!(!Scheduler::schedule_block(&mut graph, body));
        assert_eq!(graph.block(body).insts(), &[store, same]);

        graph.inst_mut(same).imm = 16;
        assert!(Scheduler::schedule_block(&mut graph, body));
        assert_eq!(graph.block(body).insts(), &[same, store]);
    }

    #[test]
    fn test_barriers_split_regions() {
        let Fixture {
            mut graph,
            body,
            params,
        } = fixture(CompilerOptions::default());
        let a = emit(&mut graph, body, Opcode::Add, &[params[0], params[1]]);
        let safe_point = emit(&mut graph, body, Opcode::SafePoint, &[]);
        let load = emit(&mut graph, body, Opcode::LoadObject, &[params[2]]);
        let ret = emit(&mut graph, body, Opcode::Return, &[a]);

        assert!(!Scheduler::schedule_block(&mut graph, body));
        assert_eq!(graph.block(body).insts(), &[a, safe_point, load, ret]);
    }

    #[test]
    fn test_defs_precede_uses() {
        let options = CompilerOptions {
            verification: VerificationLevel::Full,
            ..CompilerOptions::default()
        };
        let Fixture {
            mut graph,
            body,
            params,
        } = fixture(options);
        let mut prev = params[0];
        for i in 0..6 {
            let load = emit(&mut graph, body, Opcode::LoadObject, &[params[i % 3]]);
            prev = emit(&mut graph, body, Opcode::Add, &[prev, load]);
        }
        emit(&mut graph, body, Opcode::Return, &[prev]);

        assert!(graph.run_pass(&mut Scheduler::new()));
        let insts = graph.block(body).insts().to_vec();
        for (pos, &inst) in insts.iter().enumerate() {
            for input in graph.inst(inst).inputs() {
                if let Some(def_pos) = insts.iter().position(|i| i == input) {
                    assert!(def_pos < pos, "{} used before its definition", input);
                }
            }
        }
    }

    #[test]
    fn test_disabled_by_options() {
        let options = CompilerOptions {
            scheduling: false,
            ..CompilerOptions::default()
        };
        let Fixture { mut graph, .. } = fixture(options);
        assert!(!graph.run_pass(&mut Scheduler::new()));
        assert!(graph.statistics().is_empty());
    }
}
