use crate::block::BlockId;
use crate::config::CompilerOptions;
use crate::marker::MarkerSet;
use cranelift_entity::entity_impl;
use std::fmt;
use std::str::FromStr;

/// Bytecode pc of instructions and blocks that have no bytecode origin.
pub const INVALID_PC: u32 = u32::MAX;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(u32);
entity_impl!(InstId, "v");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataType {
    #[default]
    NoType,
    Bool,
    I32,
    I64,
    U32,
    U64,
    F32,
    F64,
    Reference,
    Pointer,
    Any,
}

impl DataType {
    pub const ALL: [DataType; 11] = [
        DataType::NoType,
        DataType::Bool,
        DataType::I32,
        DataType::I64,
        DataType::U32,
        DataType::U64,
        DataType::F32,
        DataType::F64,
        DataType::Reference,
        DataType::Pointer,
        DataType::Any,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DataType::NoType => "void",
            DataType::Bool => "b",
            DataType::I32 => "i32",
            DataType::I64 => "i64",
            DataType::U32 => "u32",
            DataType::U64 => "u64",
            DataType::F32 => "f32",
            DataType::F64 => "f64",
            DataType::Reference => "ref",
            DataType::Pointer => "ptr",
            DataType::Any => "any",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.name() == s)
            .ok_or_else(|| format!("unknown type `{}`", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConditionCode {
    #[default]
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Unsigned below.
    B,
    Be,
    /// Unsigned above.
    A,
    Ae,
    TstEq,
    TstNe,
}

impl ConditionCode {
    pub const ALL: [ConditionCode; 12] = [
        ConditionCode::Eq,
        ConditionCode::Ne,
        ConditionCode::Lt,
        ConditionCode::Le,
        ConditionCode::Gt,
        ConditionCode::Ge,
        ConditionCode::B,
        ConditionCode::Be,
        ConditionCode::A,
        ConditionCode::Ae,
        ConditionCode::TstEq,
        ConditionCode::TstNe,
    ];

    pub fn inverse(self) -> Self {
        match self {
            ConditionCode::Eq => ConditionCode::Ne,
            ConditionCode::Ne => ConditionCode::Eq,
            ConditionCode::Lt => ConditionCode::Ge,
            ConditionCode::Ge => ConditionCode::Lt,
            ConditionCode::Le => ConditionCode::Gt,
            ConditionCode::Gt => ConditionCode::Le,
            ConditionCode::B => ConditionCode::Ae,
            ConditionCode::Ae => ConditionCode::B,
            ConditionCode::Be => ConditionCode::A,
            ConditionCode::A => ConditionCode::Be,
            ConditionCode::TstEq => ConditionCode::TstNe,
            ConditionCode::TstNe => ConditionCode::TstEq,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ConditionCode::Eq => "eq",
            ConditionCode::Ne => "ne",
            ConditionCode::Lt => "lt",
            ConditionCode::Le => "le",
            ConditionCode::Gt => "gt",
            ConditionCode::Ge => "ge",
            ConditionCode::B => "b",
            ConditionCode::Be => "be",
            ConditionCode::A => "a",
            ConditionCode::Ae => "ae",
            ConditionCode::TstEq => "tst_eq",
            ConditionCode::TstNe => "tst_ne",
        }
    }
}

impl fmt::Display for ConditionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConditionCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|cc| cc.name() == s)
            .ok_or_else(|| format!("unknown condition code `{}`", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Parameter,
    Constant,
    NullPtr,
    Phi,
    CatchPhi,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Neg,
    Not,
    Compare,
    Cast,
    LoadObject,
    StoreObject,
    LoadArray,
    StoreArray,
    LoadStatic,
    StoreStatic,
    NullCheck,
    BoundsCheck,
    ZeroCheck,
    SaveState,
    SafePoint,
    CallStatic,
    CallVirtual,
    Intrinsic,
    If,
    IfImm,
    AddOverflow,
    SubOverflow,
    Return,
    ReturnVoid,
    Throw,
    Deoptimize,
    Try,
}

impl Opcode {
    pub const ALL: [Opcode; 42] = [
        Opcode::Parameter,
        Opcode::Constant,
        Opcode::NullPtr,
        Opcode::Phi,
        Opcode::CatchPhi,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Mod,
        Opcode::And,
        Opcode::Or,
        Opcode::Xor,
        Opcode::Shl,
        Opcode::Shr,
        Opcode::Neg,
        Opcode::Not,
        Opcode::Compare,
        Opcode::Cast,
        Opcode::LoadObject,
        Opcode::StoreObject,
        Opcode::LoadArray,
        Opcode::StoreArray,
        Opcode::LoadStatic,
        Opcode::StoreStatic,
        Opcode::NullCheck,
        Opcode::BoundsCheck,
        Opcode::ZeroCheck,
        Opcode::SaveState,
        Opcode::SafePoint,
        Opcode::CallStatic,
        Opcode::CallVirtual,
        Opcode::Intrinsic,
        Opcode::If,
        Opcode::IfImm,
        Opcode::AddOverflow,
        Opcode::SubOverflow,
        Opcode::Return,
        Opcode::ReturnVoid,
        Opcode::Throw,
        Opcode::Deoptimize,
        Opcode::Try,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Parameter => "parameter",
            Opcode::Constant => "constant",
            Opcode::NullPtr => "null_ptr",
            Opcode::Phi => "phi",
            Opcode::CatchPhi => "catch_phi",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Mod => "mod",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            Opcode::Shl => "shl",
            Opcode::Shr => "shr",
            Opcode::Neg => "neg",
            Opcode::Not => "not",
            Opcode::Compare => "compare",
            Opcode::Cast => "cast",
            Opcode::LoadObject => "load_object",
            Opcode::StoreObject => "store_object",
            Opcode::LoadArray => "load_array",
            Opcode::StoreArray => "store_array",
            Opcode::LoadStatic => "load_static",
            Opcode::StoreStatic => "store_static",
            Opcode::NullCheck => "null_check",
            Opcode::BoundsCheck => "bounds_check",
            Opcode::ZeroCheck => "zero_check",
            Opcode::SaveState => "save_state",
            Opcode::SafePoint => "safe_point",
            Opcode::CallStatic => "call_static",
            Opcode::CallVirtual => "call_virtual",
            Opcode::Intrinsic => "intrinsic",
            Opcode::If => "if",
            Opcode::IfImm => "if_imm",
            Opcode::AddOverflow => "add_overflow",
            Opcode::SubOverflow => "sub_overflow",
            Opcode::Return => "return",
            Opcode::ReturnVoid => "return_void",
            Opcode::Throw => "throw",
            Opcode::Deoptimize => "deoptimize",
            Opcode::Try => "try",
        }
    }

    pub fn is_phi(self) -> bool {
        matches!(self, Opcode::Phi | Opcode::CatchPhi)
    }

    /// Instructions that end a block and decide where control goes next.
    pub fn is_control_flow(self) -> bool {
        matches!(
            self,
            Opcode::If
                | Opcode::IfImm
                | Opcode::AddOverflow
                | Opcode::SubOverflow
                | Opcode::Return
                | Opcode::ReturnVoid
                | Opcode::Throw
                | Opcode::Deoptimize
        )
    }

    /// Two-way branches: successor 0 is taken when the condition holds.
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Opcode::If | Opcode::IfImm | Opcode::AddOverflow | Opcode::SubOverflow
        )
    }

    pub fn is_load(self) -> bool {
        matches!(
            self,
            Opcode::LoadObject | Opcode::LoadArray | Opcode::LoadStatic
        )
    }

    pub fn is_store(self) -> bool {
        matches!(
            self,
            Opcode::StoreObject | Opcode::StoreArray | Opcode::StoreStatic
        )
    }

    pub fn is_memory(self) -> bool {
        self.is_load() || self.is_store()
    }

    pub fn can_throw(self) -> bool {
        matches!(
            self,
            Opcode::NullCheck
                | Opcode::BoundsCheck
                | Opcode::ZeroCheck
                | Opcode::CallStatic
                | Opcode::CallVirtual
                | Opcode::Intrinsic
                | Opcode::Throw
                | Opcode::Deoptimize
        )
    }

    pub fn is_runtime_call(self) -> bool {
        matches!(
            self,
            Opcode::CallStatic | Opcode::CallVirtual | Opcode::Intrinsic
        )
    }

    pub fn is_save_state(self) -> bool {
        matches!(self, Opcode::SaveState | Opcode::SafePoint)
    }

    pub fn is_barrier(self) -> bool {
        matches!(
            self,
            Opcode::SaveState
                | Opcode::SafePoint
                | Opcode::CallStatic
                | Opcode::CallVirtual
                | Opcode::Intrinsic
                | Opcode::Throw
                | Opcode::Deoptimize
                | Opcode::Try
        )
    }

    pub fn has_condition_code(self) -> bool {
        matches!(self, Opcode::Compare | Opcode::If | Opcode::IfImm)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Opcode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| format!("unknown opcode `{}`", s))
    }
}

/// A use of an instruction: `inst` reads the value through its input `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct User {
    pub inst: InstId,
    pub index: usize,
}

#[derive(Debug, Clone)]
pub struct Inst {
    pub id: InstId,
    pub opcode: Opcode,
    pub ty: DataType,
    pub cc: ConditionCode,
    /// Constant value, parameter index, field offset or array index depending on the opcode.
    pub imm: i64,
    pub pc: u32,
    pub volatile: bool,
    pub(crate) inputs: Vec<InstId>,
    /// For phis, the predecessor each input flows in from.
    pub(crate) input_blocks: Vec<BlockId>,
    pub(crate) users: Vec<User>,
    pub(crate) block: Option<BlockId>,
    pub(crate) markers: MarkerSet,
}

impl Inst {
    pub(crate) fn new(id: InstId, opcode: Opcode, ty: DataType) -> Self {
        Self {
            id,
            opcode,
            ty,
            cc: ConditionCode::default(),
            imm: 0,
            pc: INVALID_PC,
            volatile: false,
            inputs: Vec::new(),
            input_blocks: Vec::new(),
            users: Vec::new(),
            block: None,
            markers: MarkerSet::default(),
        }
    }

    pub fn inputs(&self) -> &[InstId] {
        &self.inputs
    }

    pub fn input(&self, index: usize) -> InstId {
        self.inputs[index]
    }

    pub fn input_blocks(&self) -> &[BlockId] {
        &self.input_blocks
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn has_users(&self) -> bool {
        !self.users.is_empty()
    }

    pub fn block(&self) -> Option<BlockId> {
        self.block
    }

    pub fn markers(&self) -> &MarkerSet {
        &self.markers
    }

    pub fn is_phi(&self) -> bool {
        self.opcode.is_phi()
    }

    pub fn is_control_flow(&self) -> bool {
        self.opcode.is_control_flow()
    }

    pub fn is_branch(&self) -> bool {
        self.opcode.is_branch()
    }

    pub fn is_load(&self) -> bool {
        self.opcode.is_load()
    }

    pub fn is_store(&self) -> bool {
        self.opcode.is_store()
    }

    pub fn is_memory(&self) -> bool {
        self.opcode.is_memory()
    }

    pub fn can_throw(&self) -> bool {
        self.opcode.can_throw()
    }

    pub fn is_runtime_call(&self) -> bool {
        self.opcode.is_runtime_call()
    }

    pub fn is_barrier(&self) -> bool {
        self.opcode.is_barrier() || (self.volatile && self.is_memory())
    }

    pub fn latency(&self, options: &CompilerOptions) -> u32 {
        if self.opcode == Opcode::Div || self.is_load() {
            options.sched_latency_long
        } else {
            options.sched_latency
        }
    }
}
