use pretty_assertions::assert_eq;
use tessera_core::{
    check_inst_alias, AliasType, ConditionCode, DataType, GraphBuilder, GraphVerifier,
    LinearOrder, Opcode, Scheduler, VerificationLevel, END,
};

fn branch(taken: u64, not_taken: u64) -> GraphBuilder {
    let mut builder = GraphBuilder::new();
    builder
        .profile(10, taken, not_taken)
        .param(0, 0, DataType::I64)
        .constant(1, DataType::I64, 10)
        .block(2, &[3, 4])
        .inst(5, Opcode::Compare, DataType::Bool, &[0, 1])
        .cc(ConditionCode::Lt)
        .inst(6, Opcode::IfImm, DataType::Bool, &[5])
        .cc(ConditionCode::Ne)
        .pc(10)
        .block(3, &[END])
        .inst(7, Opcode::Return, DataType::I64, &[0])
        .block(4, &[END])
        .inst(8, Opcode::ReturnVoid, DataType::NoType, &[]);
    builder
}

#[test]
fn test_hot_successor_falls_through() {
    let mut built = branch(100, 0).build().unwrap();
    let (b1, b2, b3) = (built.block(2), built.block(3), built.block(4));
    let graph = &mut built.graph;

    let order = graph.get_valid_analysis::<LinearOrder>().blocks().to_vec();
    let at = |block| order.iter().position(|&b| b == block).unwrap();
    assert_eq!(at(b2), at(b1) + 1);
    assert!(at(b3) > at(b2));
    assert!(!graph.block(b1).needs_jump());
    assert!(graph.block(b3).needs_jump());

    let first = order.clone();
    graph.invalidate_analysis::<LinearOrder>();
    assert_eq!(graph.get_valid_analysis::<LinearOrder>().blocks(), first.as_slice());
    assert_eq!(
        GraphVerifier::new(VerificationLevel::Full).verify(graph),
        Ok(())
    );
}

#[test]
fn test_scheduler_hoists_long_latency_load() {
    let mut builder = GraphBuilder::new();
    builder
        .param(0, 0, DataType::Reference)
        .param(1, 1, DataType::I64)
        .block(2, &[END])
        .inst(3, Opcode::Add, DataType::I64, &[1, 1])
        .inst(4, Opcode::LoadObject, DataType::I64, &[0])
        .imm(16)
        .inst(5, Opcode::Add, DataType::I64, &[3, 4])
        .inst(6, Opcode::Return, DataType::I64, &[5]);
    let mut built = builder.build().unwrap();
    let body = built.block(2);
    let expected = vec![built.inst(4), built.inst(3), built.inst(5), built.inst(6)];

    let mut scheduler = Scheduler::new();
    assert!(built.graph.run_pass(&mut scheduler));
    assert!(scheduler.changed());
    assert_eq!(scheduler.changed_blocks(), &[body]);
    assert_eq!(built.graph.block(body).insts(), expected.as_slice());
    assert_eq!(GraphVerifier::check(&built.graph), Ok(()));
}

#[test]
fn test_alias_of_object_fields() {
    let mut builder = GraphBuilder::new();
    builder
        .param(0, 0, DataType::Reference)
        .block(2, &[END])
        .inst(3, Opcode::LoadObject, DataType::I64, &[0])
        .imm(8)
        .inst(4, Opcode::StoreObject, DataType::NoType, &[0, 3])
        .imm(16)
        .inst(5, Opcode::LoadObject, DataType::I64, &[0])
        .imm(8)
        .inst(6, Opcode::ReturnVoid, DataType::NoType, &[]);
    let built = builder.build().unwrap();
    let graph = &built.graph;

    assert_eq!(check_inst_alias(graph, built.inst(3), built.inst(4)), AliasType::NoAlias);
    assert_eq!(check_inst_alias(graph, built.inst(3), built.inst(5)), AliasType::MustAlias);
}
