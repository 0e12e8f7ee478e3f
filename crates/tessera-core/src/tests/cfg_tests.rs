use crate::analysis::{Analysis, DominatorsTree, LinearOrder, LoopAnalyzer, Rpo};
use crate::builder::{BuiltGraph, GraphBuilder, END};
use crate::config::VerificationLevel;
use crate::graph::Graph;
use crate::inst::{DataType, Opcode};
use crate::verify::GraphVerifier;
use pretty_assertions::assert_eq;

/// `start -> 2 -> {3, 4} -> 6 -> END` with a phi in 6 merging the parameter and a constant.
fn diamond_with_phi() -> BuiltGraph {
    GraphBuilder::new()
        .param(0, 0, DataType::I64)
        .constant(1, DataType::I64, 10)
        .block(2, &[3, 4])
        .inst(5, Opcode::IfImm, DataType::Bool, &[0])
        .block(3, &[6])
        .block(4, &[6])
        .block(6, &[END])
        .phi(7, DataType::I64, &[(0, 3), (1, 4)])
        .inst(8, Opcode::Return, DataType::I64, &[7])
        .build()
        .unwrap()
}

#[test]
fn test_disconnect_block_invalidates_analyses() {
    let mut built = diamond_with_phi();
    let (b2, b3, b4, b6) = (built.block(2), built.block(3), built.block(4), built.block(6));
    let (start, end) = (built.block(0), built.block(END));
    let (param, phi, ret) = (built.inst(0), built.inst(7), built.inst(8));
    let graph = &mut built.graph;

    graph.run_analysis::<DominatorsTree>();
    graph.run_analysis::<LinearOrder>();
    assert_eq!(graph.get_analysis::<Rpo>().run_count(), 1);

    graph.disconnect_block(b4, true, true);
    assert!(!graph.is_block_alive(b4));
    assert!(!graph.is_analysis_valid::<Rpo>());
    assert!(!graph.is_analysis_valid::<DominatorsTree>());
    assert!(!graph.is_analysis_valid::<LinearOrder>());

    assert_eq!(graph.block(b2).succs(), &[b3]);
    assert_eq!(graph.block(b2).last_inst(), None);
    assert_eq!(graph.block(b6).preds(), &[b3]);
    assert!(!graph.is_inst_alive(phi));
    assert_eq!(graph.inst(ret).inputs(), &[param]);

    let rpo = graph.get_valid_analysis::<Rpo>().blocks().to_vec();
    assert_eq!(rpo, vec![start, b2, b3, b6, end]);
    assert_eq!(graph.get_analysis::<Rpo>().run_count(), 2);
    assert_eq!(GraphVerifier::check(graph), Ok(()));
}

#[test]
fn test_disconnect_end_block_clears_it() {
    let mut built = diamond_with_phi();
    let (b6, end) = (built.block(6), built.block(END));
    let graph = &mut built.graph;
    graph.disconnect_block(end, false, false);
    assert_eq!(graph.end_block(), None);
    assert!(graph.block(b6).succs().is_empty());
}

#[test]
fn test_remove_empty_block_with_phis_keeps_dominators() {
    let mut built = diamond_with_phi();
    let (b2, b3, b4, b6) = (built.block(2), built.block(3), built.block(4), built.block(6));
    let (constant, phi) = (built.inst(1), built.inst(7));
    let graph = &mut built.graph;
    graph.run_analysis::<DominatorsTree>();
    graph.run_analysis::<LinearOrder>();

    graph.remove_empty_block_with_phis(b4);

    assert!(!graph.is_block_alive(b4));
    assert_eq!(graph.block(b2).succs(), &[b3, b6]);
    assert_eq!(graph.block(b6).preds(), &[b3, b2]);
    assert_eq!(graph.phi_input_for(phi, b2), Some(constant));
    assert!(!graph.block(b2).dominated_blocks().contains(&b4));

    assert!(graph.is_analysis_valid::<DominatorsTree>());
    assert!(graph.is_analysis_valid::<Rpo>());
    assert!(!graph.is_analysis_valid::<LinearOrder>());
    assert!(!graph.get_analysis::<Rpo>().blocks().contains(&b4));
    assert_eq!(graph.get_analysis::<Rpo>().run_count(), 1);

    assert_eq!(GraphVerifier::new(VerificationLevel::Full).verify(graph), Ok(()));
}

#[test]
fn test_remove_unreachable_blocks() {
    let mut built = diamond_with_phi();
    let (b6, end) = (built.block(6), built.block(END));
    let graph = &mut built.graph;
    let orphan = graph.create_empty_block(None);
    graph.add_succ(orphan, end);
    let before = graph.alive_blocks_count();

    assert!(graph.remove_unreachable_blocks());
    assert!(!graph.is_block_alive(orphan));
    assert_eq!(graph.block(end).preds(), &[b6]);
    assert_eq!(graph.alive_blocks_count(), before - 1);
    assert!(!graph.remove_unreachable_blocks());
}

#[test]
fn test_split_then_join_restores_block() {
    let mut built = GraphBuilder::new()
        .param(0, 0, DataType::I64)
        .block(2, &[END])
        .inst(3, Opcode::Add, DataType::I64, &[0, 0])
        .inst(4, Opcode::Mul, DataType::I64, &[3, 3])
        .inst(5, Opcode::Return, DataType::I64, &[4])
        .build()
        .unwrap();
    let (b2, end) = (built.block(2), built.block(END));
    let insts = built.graph.block(b2).insts().to_vec();
    let graph = &mut built.graph;

    let tail = graph.split_block_after_inst(insts[0], true);
    assert_eq!(graph.block(b2).insts(), &insts[..1]);
    assert_eq!(graph.block(tail).insts(), &insts[1..]);
    assert_eq!(graph.block(b2).succs(), &[tail]);
    assert_eq!(graph.block(tail).succs(), &[end]);
    assert_eq!(graph.block(end).preds(), &[tail]);
    assert_eq!(graph.inst(insts[2]).block(), Some(tail));

    graph.join_successor_block(b2);
    assert!(!graph.is_block_alive(tail));
    assert_eq!(graph.block(b2).insts(), insts.as_slice());
    assert_eq!(graph.block(b2).succs(), &[end]);
    assert_eq!(graph.block(end).preds(), &[b2]);
    assert_eq!(GraphVerifier::check(graph), Ok(()));
}

#[test]
fn test_insert_empty_block_before_moves_phis() {
    let mut built = diamond_with_phi();
    let (b3, b4, b6) = (built.block(3), built.block(4), built.block(6));
    let phi = built.inst(7);
    let graph = &mut built.graph;

    let new = graph.insert_empty_block_before(b6);
    assert_eq!(graph.block(new).preds(), &[b3, b4]);
    assert_eq!(graph.block(new).succs(), &[b6]);
    assert_eq!(graph.block(b6).preds(), &[new]);
    assert_eq!(graph.block(new).phis(), &[phi]);
    assert_eq!(graph.inst(phi).block(), Some(new));
    assert!(graph.block(b6).phis().is_empty());
}

#[test]
fn test_insert_new_block_on_edge_renames_phi_pred() {
    let mut built = diamond_with_phi();
    let (b4, b6) = (built.block(4), built.block(6));
    let (constant, phi) = (built.inst(1), built.inst(7));
    let graph = &mut built.graph;

    let new = graph.insert_new_block_to_succ_edge(b4, b6);
    assert_eq!(graph.block(b4).succs(), &[new]);
    assert_eq!(graph.block(b6).preds()[1], new);
    assert_eq!(graph.phi_input_for(phi, new), Some(constant));
    assert_eq!(graph.phi_input_for(phi, b4), None);
}

#[test]
fn test_swap_successors_keeps_analyses() {
    let mut built = diamond_with_phi();
    let (b2, b3, b4) = (built.block(2), built.block(3), built.block(4));
    let graph = &mut built.graph;
    graph.run_analysis::<DominatorsTree>();

    graph.swap_true_false_successors(b2);
    assert_eq!(graph.block(b2).succs(), &[b4, b3]);
    assert!(graph.block(b2).is_inverted());
    assert!(graph.is_analysis_valid::<DominatorsTree>());
    assert!(graph.is_analysis_valid::<Rpo>());
}

#[test]
fn test_disconnect_loop_reached_only_by_back_edges() {
    let mut graph = Graph::default();
    let start = graph.create_start_block();
    let b2 = graph.create_empty_block(None);
    let header = graph.create_empty_block(None);
    let latch = graph.create_empty_block(None);
    let end = graph.create_end_block(None);
    graph.add_succ(start, b2);
    graph.add_succ(b2, header);
    graph.add_succ(b2, end);
    graph.add_succ(header, latch);
    graph.add_succ(latch, header);
    graph.add_succ(latch, end);
    graph.run_analysis::<LoopAnalyzer>();

    graph.remove_succ(b2, header);
    graph.disconnect_block_rec(header, false, false);

    assert!(!graph.is_block_alive(header));
    assert!(!graph.is_block_alive(latch));
    assert_eq!(graph.block(end).preds(), &[b2]);
    assert_eq!(graph.alive_blocks_count(), 3);
}

#[test]
fn test_rpo_orders_forward_edges() {
    let mut built = GraphBuilder::new()
        .block(2, &[3])
        .block(3, &[4, 5])
        .block(4, &[3])
        .block(5, &[6, 7])
        .block(6, &[7])
        .block(7, &[END])
        .build()
        .unwrap();
    let graph = &mut built.graph;
    graph.run_analysis::<DominatorsTree>();
    let rpo = graph.get_analysis::<Rpo>().blocks().to_vec();

    assert_eq!(rpo.len(), graph.alive_blocks_count());
    assert_eq!(rpo[0], graph.start_block().unwrap());
    for &block in &rpo {
        let position = |b| rpo.iter().position(|&x| x == b).unwrap();
        for &succ in graph.block(block).succs() {
            if !graph.dominates(succ, block) {
                assert!(position(block) < position(succ), "{} -> {}", block, succ);
            }
        }
    }
}
