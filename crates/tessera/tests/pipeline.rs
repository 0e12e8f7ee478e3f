use pretty_assertions::assert_eq;
use tessera::core::analysis::AnalysisPass;
use tessera::core::VerificationLevel;
use tessera::{
    AnalysisReport, DominatorsTree, GraphVerifier, LinearOrder, LoopAnalyzer, PassManager, Rpo,
    Scheduler,
};

const HOT_LOOP: &str = r#"
profile pc 4 taken 90 not_taken 10
start {
  0: parameter.ref imm=0
  1: parameter.i64 imm=1
  2: constant.i64 imm=0
}
bb 2 -> 3 { }
bb 3 -> 4, 5 {
  3: phi.i64 2@2, 6@4
  4: compare.b 3, 1 cc=lt
  5: if_imm.b 4 cc=ne pc=4
}
bb 4 -> 3 {
  6: load_object.i64 0 imm=8
}
bb 5 -> end { 7: return.i64 3 }
"#;

#[test]
fn test_text_to_report() {
    let mut graph = tessera::parse_graph(HOT_LOOP).unwrap().into_graph();

    let mut manager = PassManager::new();
    manager.register_pass(AnalysisPass::<Rpo>::new());
    manager.register_pass(AnalysisPass::<DominatorsTree>::new());
    manager.register_pass(AnalysisPass::<LoopAnalyzer>::new());
    manager.register_pass(Scheduler::new());
    manager.register_pass(AnalysisPass::<LinearOrder>::new());
    assert!(manager.run_all(&mut graph));
    assert_eq!(manager.statistics().len(), 5);

    assert_eq!(
        GraphVerifier::new(VerificationLevel::Full).verify(&mut graph),
        Ok(())
    );

    let report = AnalysisReport::collect(&mut graph);
    assert_eq!(report.rpo.len(), 6);
    assert_eq!(report.passes.len(), 5);
    assert!(report.loops.iter().any(|l| l.header.as_deref() == Some("bb2")));
}
