//! Handler bytecode: instruction set, pattern compiler, registry, and VM.
//!
//! Simple handler bodies (state increment/decrement/scale/divide/assign/
//! toggle and a bounded host-call set) compile at build time into a short
//! instruction sequence instead of embedding source. Everything else falls
//! back to source-level transpilation. The instruction set is deliberately
//! minimal: no branch opcode, no loop opcode, so its semantics stay
//! trivially verifiable.

pub mod compiler;
pub mod registry;
pub mod vm;

use serde::Serialize;

pub use compiler::{compile_handler, CompileOutcome, Operation, UniversalPattern};
pub use registry::{HostFunctionDecl, MetadataRegistry, HOST_FUNCTION_ID_BASE};
pub use vm::{Value, Vm, VmError};

/// The closed opcode set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Opcode {
    GetState,
    SetState,
    PushInt,
    PushString,
    Add,
    Sub,
    Mul,
    Div,
    CallHost,
    Halt,
}

impl Opcode {
    pub fn name(self) -> &'static str {
        match self {
            Opcode::GetState => "GET_STATE",
            Opcode::SetState => "SET_STATE",
            Opcode::PushInt => "PUSH_INT",
            Opcode::PushString => "PUSH_STRING",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::CallHost => "CALL_HOST",
            Opcode::Halt => "HALT",
        }
    }
}

/// Instruction argument.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum InstructionArg {
    None,
    Int(i64),
    Str(String),
    Id(u32),
}

/// One VM instruction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub arg: InstructionArg,
}

impl Instruction {
    pub fn plain(opcode: Opcode) -> Self {
        Self {
            opcode,
            arg: InstructionArg::None,
        }
    }

    pub fn get_state(state_id: u32) -> Self {
        Self {
            opcode: Opcode::GetState,
            arg: InstructionArg::Id(state_id),
        }
    }

    pub fn set_state(state_id: u32) -> Self {
        Self {
            opcode: Opcode::SetState,
            arg: InstructionArg::Id(state_id),
        }
    }

    pub fn push_int(value: i64) -> Self {
        Self {
            opcode: Opcode::PushInt,
            arg: InstructionArg::Int(value),
        }
    }

    pub fn push_string(value: impl Into<String>) -> Self {
        Self {
            opcode: Opcode::PushString,
            arg: InstructionArg::Str(value.into()),
        }
    }

    pub fn call_host(func_id: u32) -> Self {
        Self {
            opcode: Opcode::CallHost,
            arg: InstructionArg::Id(func_id),
        }
    }

    pub fn has_arg(&self) -> bool {
        !matches!(self.arg, InstructionArg::None)
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.arg {
            InstructionArg::None => write!(f, "{}", self.opcode.name()),
            InstructionArg::Int(v) => write!(f, "{}({v})", self.opcode.name()),
            InstructionArg::Str(s) => write!(f, "{}({s:?})", self.opcode.name()),
            InstructionArg::Id(id) => write!(f, "{}({id})", self.opcode.name()),
        }
    }
}

/// A compiled handler: a deterministic function id plus its instructions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BytecodeFunction {
    pub id: u32,
    /// Source handler name, kept for diagnostics and serialization.
    pub name: String,
    pub instructions: Vec<Instruction>,
}
