use crate::analysis::{Analysis, DominatorsTree, Rpo};
use crate::block::BlockId;
use crate::builder::{GraphBuilder, END};
use crate::graph::Graph;
use pretty_assertions::assert_eq;

type Snapshot = Vec<(BlockId, Option<BlockId>, Vec<BlockId>)>;

fn snapshot(graph: &Graph) -> Snapshot {
    graph
        .blocks()
        .map(|bb| {
            let mut dominated = bb.dominated_blocks().to_vec();
            dominated.sort();
            (bb.id, bb.dominator(), dominated)
        })
        .collect()
}

fn recomputed(graph: &mut Graph) -> Snapshot {
    graph.invalidate_analysis::<DominatorsTree>();
    graph.run_analysis::<DominatorsTree>();
    snapshot(graph)
}

#[test]
fn test_recomputation_is_stable() {
    let mut built = GraphBuilder::new()
        .block(2, &[3])
        .block(3, &[4, 7])
        .block(4, &[5, 6])
        .block(5, &[6])
        .block(6, &[3])
        .block(7, &[END])
        .build()
        .unwrap();
    let graph = &mut built.graph;
    graph.run_analysis::<DominatorsTree>();
    let first = snapshot(graph);
    assert_eq!(recomputed(graph), first);
    assert_eq!(graph.get_analysis::<DominatorsTree>().run_count(), 2);
}

#[test]
fn test_every_block_is_dominated_by_start() {
    let mut built = GraphBuilder::new()
        .block(2, &[3, 4])
        .block(3, &[5])
        .block(4, &[5])
        .block(5, &[END])
        .build()
        .unwrap();
    let graph = &mut built.graph;
    graph.run_analysis::<DominatorsTree>();
    let start = graph.start_block().unwrap();
    let rpo = graph.get_analysis::<Rpo>().blocks().to_vec();
    for &block in &rpo {
        assert!(graph.dominates(start, block));
        if let Some(dominator) = graph.block(block).dominator() {
            assert!(graph.block(dominator).dominated_blocks().contains(&block));
            let dominator_pos = rpo.iter().position(|&b| b == dominator);
            let block_pos = rpo.iter().position(|&b| b == block);
            assert!(dominator_pos < block_pos);
        }
    }
}

#[test]
fn test_resolver_insertion_matches_recomputation() {
    // 2 branches to 3 and straight to 5; 3 also flows into 5.
    let mut built = GraphBuilder::new()
        .block(2, &[3, 5])
        .block(3, &[5])
        .block(5, &[END])
        .build()
        .unwrap();
    let (b2, b3, b5, end) = (built.block(2), built.block(3), built.block(5), built.block(END));
    let graph = &mut built.graph;
    graph.run_analysis::<DominatorsTree>();

    let bypassed = graph.insert_new_block_to_succ_edge(b2, b5);
    graph.update_after_resolver_insertion(b2, b5, bypassed);
    assert_eq!(graph.block(b5).dominator(), Some(b2));

    let side = graph.insert_new_block_to_succ_edge(b3, b5);
    graph.update_after_resolver_insertion(b3, b5, side);
    assert_eq!(graph.block(side).dominator(), Some(b3));

    let tail = graph.insert_new_block_to_succ_edge(b5, end);
    graph.update_after_resolver_insertion(b5, end, tail);
    assert_eq!(graph.block(end).dominator(), Some(tail));

    assert!(graph.is_analysis_valid::<DominatorsTree>());
    let patched = snapshot(graph);
    assert_eq!(recomputed(graph), patched);
    assert_eq!(graph.get_analysis::<DominatorsTree>().run_count(), 2);
}
