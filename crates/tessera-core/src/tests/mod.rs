/*! Scenario tests for the graph and its analyses.
 *
 * Analyses are only as good as their agreement with a fresh recomputation after the graph has
 * been rewritten. These tests drive the mutation primitives and the pass pipeline through whole
 * graphs and check the cached results against what a from-scratch run produces.
 */

#![allow(unused_imports)]
#![allow(unused_variables)]

mod cfg_tests;
mod dominator_tests;
mod loop_tests;

use crate::builder::{BuiltGraph, GraphBuilder, END};
use crate::inst::{ConditionCode, DataType, Opcode};

/// `start -> 2 (if) -> {3, 4} -> END`, with the branch at pc 10.
pub(crate) fn branch_graph(builder: &mut GraphBuilder) -> BuiltGraph {
    builder
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
        .inst(8, Opcode::ReturnVoid, DataType::NoType, &[])
        .build()
        .unwrap()
}
