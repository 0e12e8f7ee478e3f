use crate::graph::Graph;
use crate::inst::{Inst, InstId, Opcode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AliasType {
    NoAlias,
    MayAlias,
    MustAlias,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemoryKind {
    Object,
    Array,
    Static,
}

fn memory_kind(inst: &Inst) -> Option<MemoryKind> {
    match inst.opcode {
        Opcode::LoadObject | Opcode::StoreObject => Some(MemoryKind::Object),
        Opcode::LoadArray | Opcode::StoreArray => Some(MemoryKind::Array),
        Opcode::LoadStatic | Opcode::StoreStatic => Some(MemoryKind::Static),
        _ => None,
    }
}

/// Constant value of an array index operand, if it is one.
fn constant_index(graph: &Graph, inst: &Inst) -> Option<i64> {
    let index = graph.try_inst(*inst.inputs().get(1)?)?;
    (index.opcode == Opcode::Constant).then_some(index.imm)
}

/// Whether the memory accessed by `a` and `b` can overlap.
///
/// Object fields are addressed by `(base, imm)`, array elements by `(base, index)`, statics by
/// `imm` alone.
pub fn check_inst_alias(graph: &Graph, a: InstId, b: InstId) -> AliasType {
    let (ia, ib) = (graph.inst(a), graph.inst(b));
    let (Some(kind_a), Some(kind_b)) = (memory_kind(ia), memory_kind(ib)) else {
        debug_assert!(false, "alias query on non-memory instructions {} and {}", a, b);
        return AliasType::MayAlias;
    };
    if kind_a != kind_b {
        return AliasType::NoAlias;
    }

    match kind_a {
        MemoryKind::Static => {
            if ia.imm == ib.imm {
                AliasType::MustAlias
            } else {
                AliasType::NoAlias
            }
        }
        MemoryKind::Object => {
            if ia.input(0) != ib.input(0) {
                AliasType::MayAlias
            } else if ia.imm == ib.imm {
                AliasType::MustAlias
            } else {
                AliasType::NoAlias
            }
        }
        MemoryKind::Array => {
            if ia.input(0) != ib.input(0) {
                return AliasType::MayAlias;
            }
            if ia.input(1) == ib.input(1) {
                return AliasType::MustAlias;
            }
            match (constant_index(graph, ia), constant_index(graph, ib)) {
                (Some(x), Some(y)) if x == y => AliasType::MustAlias,
                (Some(_), Some(_)) => AliasType::NoAlias,
                _ => AliasType::MayAlias,
            }
        }
    }
}
