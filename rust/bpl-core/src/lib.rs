//! BPL Core
//!
//! Shared types used by the VM and the command-line tools: runtime values,
//! the instruction table, programs with their constant pools, and the
//! disassembler.

pub mod disasm;
pub mod opcode;
pub mod program;
pub mod values;

pub use opcode::{InstructionInfo, InstructionTable, OpCode};
pub use program::{ConstantPool, Program, ProgramBuilder, ProgramError};
pub use values::{Complex, StrValue, Value, ValueError, ValueKind};
