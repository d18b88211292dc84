//! Intermediate representation for decoded bitcode functions.
//!
//! The decoder hands us fully materialized functions: an ordered list of
//! blocks, each an ordered list of instructions whose operands are
//! [`Symbol`]s. The last instruction of every block must be a terminator.
//! Value-producing instructions name their result; that name is the key
//! under which the frame table interns the result's slot.

use crate::declare_entity;
use crate::entity::EntityVec;

declare_entity!(Block, "block");

/// Storage types, as declared by the decoder's type table. Only the
/// mapping to a slot kind matters for liveness; aggregate shapes are not
/// modeled beyond their tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    I1,
    I8,
    I16,
    I32,
    I64,
    Float,
    Double,
    Pointer,
    Vector,
    Array,
    Struct,
    Void,
    Metadata,
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            Type::I1 => "i1",
            Type::I8 => "i8",
            Type::I16 => "i16",
            Type::I32 => "i32",
            Type::I64 => "i64",
            Type::Float => "float",
            Type::Double => "double",
            Type::Pointer => "ptr",
            Type::Vector => "vector",
            Type::Array => "array",
            Type::Struct => "struct",
            Type::Void => "void",
            Type::Metadata => "metadata",
        };
        write!(f, "{}", s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    Shl,
    LShr,
    AShr,
    And,
    Or,
    Xor,
    FAdd,
    FSub,
    FMul,
    FDiv,
    FRem,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    UGt,
    UGe,
    ULt,
    ULe,
    SGt,
    SGe,
    SLt,
    SLe,
    FOEq,
    FONe,
    FOLt,
    FOGt,
    FUno,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CastOp {
    Trunc,
    ZExt,
    SExt,
    FpTrunc,
    FpExt,
    FpToSi,
    FpToUi,
    SiToFp,
    UiToFp,
    PtrToInt,
    IntToPtr,
    Bitcast,
}

/// A compile-time constant operand. Constants occupy no frame slot and
/// never contribute a read.
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Integer(i64),
    Fp(f64),
    Null,
    Undef,
}

/// Any operand value an instruction may reference.
#[derive(Clone, Debug, PartialEq)]
pub enum Symbol {
    /// Compile-time constant; no runtime storage.
    Constant(Constant),
    /// Global value, resolved statically; no frame slot.
    Global { name: String },
    /// Result of a value-producing instruction; reads its slot.
    InstructionResult { name: String, ty: Type },
    /// Function parameter; reads its slot.
    Parameter { name: String, ty: Type },
    /// Metadata reference. Never a valid read target; reaching one during
    /// read extraction is a modeling error.
    Metadata { index: u32 },
}

impl Symbol {
    pub fn constant(value: i64) -> Symbol {
        Symbol::Constant(Constant::Integer(value))
    }

    pub fn result(name: &str, ty: Type) -> Symbol {
        Symbol::InstructionResult {
            name: name.to_string(),
            ty,
        }
    }

    pub fn parameter(name: &str, ty: Type) -> Symbol {
        Symbol::Parameter {
            name: name.to_string(),
            ty,
        }
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Symbol::Constant(c) => write!(f, "{:?}", c),
            Symbol::Global { name } => write!(f, "@{}", name),
            Symbol::InstructionResult { name, .. } => write!(f, "%{}", name),
            Symbol::Parameter { name, .. } => write!(f, "%{}", name),
            Symbol::Metadata { index } => write!(f, "!{}", index),
        }
    }
}

/// One decoded instruction. A closed sum over all shapes the decoder can
/// produce, so operand-read and successor dispatch are exhaustive matches
/// checked at build time.
#[derive(Clone, Debug)]
pub enum Instruction {
    Alloc {
        name: String,
        ty: Type,
        count: Symbol,
    },
    Load {
        name: String,
        ty: Type,
        source: Symbol,
    },
    Store {
        source: Symbol,
        destination: Symbol,
    },
    Binary {
        name: String,
        ty: Type,
        op: BinOp,
        lhs: Symbol,
        rhs: Symbol,
    },
    Compare {
        name: String,
        ty: Type,
        op: CmpOp,
        lhs: Symbol,
        rhs: Symbol,
    },
    Cast {
        name: String,
        ty: Type,
        op: CastOp,
        value: Symbol,
    },
    GetElementPtr {
        name: String,
        ty: Type,
        base: Symbol,
        indices: Vec<Symbol>,
    },
    ExtractElement {
        name: String,
        ty: Type,
        index: Symbol,
        vector: Symbol,
    },
    InsertElement {
        name: String,
        ty: Type,
        index: Symbol,
        vector: Symbol,
        value: Symbol,
    },
    InsertValue {
        name: String,
        ty: Type,
        aggregate: Symbol,
        value: Symbol,
    },
    /// Present in the IR but carries no operand-read rule; see the read
    /// extractor.
    ExtractValue {
        name: String,
        ty: Type,
        aggregate: Symbol,
        index: u32,
    },
    ShuffleVector {
        name: String,
        ty: Type,
        mask: Symbol,
        vector1: Symbol,
        vector2: Symbol,
    },
    Select {
        name: String,
        ty: Type,
        condition: Symbol,
        true_value: Symbol,
        false_value: Symbol,
    },
    Call {
        name: String,
        ty: Type,
        callee: String,
        arguments: Vec<Symbol>,
    },
    VoidCall {
        callee: String,
        arguments: Vec<Symbol>,
    },
    /// Join point. Its incoming operands are not ordinary reads; they are
    /// resolved per predecessor edge through the phi table.
    Phi {
        name: String,
        ty: Type,
    },
    Branch {
        target: Block,
    },
    CondBranch {
        condition: Symbol,
        true_target: Option<Block>,
        false_target: Option<Block>,
    },
    IndirectBranch {
        address: Symbol,
        candidates: Vec<Block>,
    },
    Switch {
        condition: Symbol,
        default_target: Block,
        cases: Vec<(Constant, Block)>,
    },
    SwitchOld {
        condition: Symbol,
        default_target: Block,
        cases: Vec<(i64, Block)>,
    },
    Return {
        value: Option<Symbol>,
    },
    Unreachable,
}

impl Instruction {
    /// Result name and type, for value-producing instructions.
    pub fn result(&self) -> Option<(&str, Type)> {
        match self {
            Instruction::Alloc { name, ty, .. }
            | Instruction::Load { name, ty, .. }
            | Instruction::Binary { name, ty, .. }
            | Instruction::Compare { name, ty, .. }
            | Instruction::Cast { name, ty, .. }
            | Instruction::GetElementPtr { name, ty, .. }
            | Instruction::ExtractElement { name, ty, .. }
            | Instruction::InsertElement { name, ty, .. }
            | Instruction::InsertValue { name, ty, .. }
            | Instruction::ExtractValue { name, ty, .. }
            | Instruction::ShuffleVector { name, ty, .. }
            | Instruction::Select { name, ty, .. }
            | Instruction::Call { name, ty, .. }
            | Instruction::Phi { name, ty } => Some((name.as_str(), *ty)),
            Instruction::Store { .. }
            | Instruction::VoidCall { .. }
            | Instruction::Branch { .. }
            | Instruction::CondBranch { .. }
            | Instruction::IndirectBranch { .. }
            | Instruction::Switch { .. }
            | Instruction::SwitchOld { .. }
            | Instruction::Return { .. }
            | Instruction::Unreachable => None,
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instruction::Branch { .. }
                | Instruction::CondBranch { .. }
                | Instruction::IndirectBranch { .. }
                | Instruction::Switch { .. }
                | Instruction::SwitchOld { .. }
                | Instruction::Return { .. }
                | Instruction::Unreachable
        )
    }

    /// Stable variant name, used in diagnostics.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Alloc { .. } => "alloc",
            Instruction::Load { .. } => "load",
            Instruction::Store { .. } => "store",
            Instruction::Binary { .. } => "binary",
            Instruction::Compare { .. } => "compare",
            Instruction::Cast { .. } => "cast",
            Instruction::GetElementPtr { .. } => "getelementptr",
            Instruction::ExtractElement { .. } => "extractelement",
            Instruction::InsertElement { .. } => "insertelement",
            Instruction::InsertValue { .. } => "insertvalue",
            Instruction::ExtractValue { .. } => "extractvalue",
            Instruction::ShuffleVector { .. } => "shufflevector",
            Instruction::Select { .. } => "select",
            Instruction::Call { .. } => "call",
            Instruction::VoidCall { .. } => "voidcall",
            Instruction::Phi { .. } => "phi",
            Instruction::Branch { .. } => "branch",
            Instruction::CondBranch { .. } => "condbranch",
            Instruction::IndirectBranch { .. } => "indirectbranch",
            Instruction::Switch { .. } => "switch",
            Instruction::SwitchOld { .. } => "switchold",
            Instruction::Return { .. } => "return",
            Instruction::Unreachable => "unreachable",
        }
    }
}

/// Ordered instruction sequence; the last instruction must be a terminator.
#[derive(Clone, Debug, Default)]
pub struct InstructionBlock {
    pub insts: Vec<Instruction>,
}

impl InstructionBlock {
    pub fn new(insts: Vec<Instruction>) -> Self {
        InstructionBlock { insts }
    }

    pub fn terminator(&self) -> Option<&Instruction> {
        self.insts.last().filter(|i| i.is_terminator())
    }
}

#[derive(Clone, Debug, Default)]
pub struct FunctionDefinition {
    pub name: String,
    /// Parameter names and types; each parameter occupies a frame slot
    /// written by the function prologue.
    pub parameters: Vec<(String, Type)>,
    pub blocks: EntityVec<Block, InstructionBlock>,
}

impl FunctionDefinition {
    /// The entry block, by convention the first in the block list.
    pub fn entry(&self) -> Block {
        use crate::entity::EntityRef;
        Block::new(0)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Module {
    pub functions: Vec<FunctionDefinition>,
}
