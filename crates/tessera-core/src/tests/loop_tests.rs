use crate::analysis::{Analysis, DominatorsTree, LoopAnalyzer};
use crate::block::BlockId;
use crate::graph::Graph;
use pretty_assertions::assert_eq;

/// Graph with a start block at index 0 followed by `count` empty blocks, wired by index pairs.
fn wired(count: usize, edges: &[(usize, usize)]) -> (Graph, Vec<BlockId>) {
    let mut graph = Graph::default();
    let mut blocks = vec![graph.create_start_block()];
    for _ in 0..count {
        blocks.push(graph.create_empty_block(None));
    }
    for &(from, to) in edges {
        graph.add_succ(blocks[from], blocks[to]);
    }
    (graph, blocks)
}

#[test]
fn test_nested_loops() {
    // 1 is the outer header, 2 the inner header, 3 the inner latch, 4 the outer latch.
    let (mut graph, b) = wired(
        5,
        &[(0, 1), (1, 2), (1, 5), (2, 3), (2, 4), (3, 2), (4, 1)],
    );
    graph.run_analysis::<LoopAnalyzer>();
    let loops = graph.get_analysis::<LoopAnalyzer>();

    let outer = graph.block(b[1]).loop_id().unwrap();
    let inner = graph.block(b[2]).loop_id().unwrap();
    let root = loops.root_loop().unwrap();

    let outer_loop = loops.loop_data(outer);
    assert_eq!(outer_loop.header(), Some(b[1]));
    assert_eq!(outer_loop.back_edges(), &[b[4]]);
    assert_eq!(outer_loop.blocks(), &[b[1], b[4]]);
    assert_eq!(outer_loop.inner_loops(), &[inner]);
    assert_eq!(outer_loop.outer_loop(), Some(root.id()));
    assert_eq!(outer_loop.pre_header(), Some(b[0]));
    assert_eq!(outer_loop.depth(), 1);
    assert!(!outer_loop.is_irreducible());
    assert!(!outer_loop.is_infinite());

    let inner_loop = loops.loop_data(inner);
    assert_eq!(inner_loop.header(), Some(b[2]));
    assert_eq!(inner_loop.back_edges(), &[b[3]]);
    assert_eq!(inner_loop.blocks(), &[b[2], b[3]]);
    assert_eq!(inner_loop.outer_loop(), Some(outer));
    assert_eq!(inner_loop.pre_header(), None);
    assert_eq!(inner_loop.depth(), 2);
    assert!(!inner_loop.is_infinite());

    assert!(root.is_root());
    assert_eq!(root.depth(), 0);
    assert_eq!(root.blocks(), &[b[0], b[5]]);
    assert_eq!(root.inner_loops(), &[outer]);
    assert!(loops.is_inside(inner, root.id()));
    assert!(!loops.is_inside(outer, inner));

    assert!(graph.is_loop_header(b[1]));
    assert!(graph.is_loop_header(b[2]));
    assert!(!graph.is_loop_header(b[3]));
}

#[test]
fn test_irreducible_loop() {
    // Both 1 and 2 are entered from the start block, so neither dominates the other.
    let (mut graph, b) = wired(3, &[(0, 1), (0, 2), (1, 2), (2, 1), (2, 3)]);
    graph.run_analysis::<LoopAnalyzer>();
    let loops = graph.get_analysis::<LoopAnalyzer>();

    let id = graph.block(b[1]).loop_id().unwrap();
    let irreducible = loops.loop_data(id);
    assert!(irreducible.is_irreducible());
    assert_eq!(irreducible.back_edges(), &[b[2]]);
    assert_eq!(irreducible.blocks(), &[b[1], b[2]]);
    assert_eq!(irreducible.pre_header(), None);
    assert!(!irreducible.is_infinite());
}

#[test]
fn test_infinite_loop() {
    let (mut graph, b) = wired(2, &[(0, 1), (1, 2), (2, 1)]);
    graph.run_analysis::<LoopAnalyzer>();
    let loops = graph.get_analysis::<LoopAnalyzer>();
    let id = graph.block(b[1]).loop_id().unwrap();
    assert!(loops.loop_data(id).is_infinite());
    assert_eq!(loops.loop_data(id).pre_header(), Some(b[0]));
}

#[test]
fn test_self_loop() {
    let (mut graph, b) = wired(2, &[(0, 1), (1, 1), (1, 2)]);
    graph.run_analysis::<LoopAnalyzer>();
    let loops = graph.get_analysis::<LoopAnalyzer>();
    let id = graph.block(b[1]).loop_id().unwrap();
    assert_eq!(loops.loop_data(id).back_edges(), &[b[1]]);
    assert_eq!(loops.loop_data(id).blocks(), &[b[1]]);
    assert_eq!(graph.block(b[2]).loop_id(), loops.root_loop().map(|root| root.id()));
}

#[test]
fn test_rerun_after_edit() {
    let (mut graph, b) = wired(3, &[(0, 1), (1, 2), (2, 1), (1, 3)]);
    graph.run_analysis::<LoopAnalyzer>();
    assert!(graph.is_loop_header(b[1]));
    assert!(graph.is_analysis_valid::<DominatorsTree>());

    graph.remove_succ(b[2], b[1]);
    assert!(!graph.is_analysis_valid::<LoopAnalyzer>());
    graph.run_analysis::<LoopAnalyzer>();
    assert!(!graph.is_loop_header(b[1]));
    assert_eq!(graph.get_analysis::<LoopAnalyzer>().loops().count(), 1);
    assert_eq!(graph.get_analysis::<LoopAnalyzer>().run_count(), 2);
}
