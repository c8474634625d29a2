//! BPL VM: stack-based virtual machine for executing BPL bytecode.
//!
//! A [`Machine`] borrows a [`bpl_core::Program`], optionally loads native
//! arguments as its initial frame, and runs until it halts or hits a fatal
//! fault. Every fault is written as a structured report to the machine's
//! output before [`run`](Machine::run) returns.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod stack;
pub mod vm;

pub use config::VmConfig;
pub use error::{Fault, FaultKind, FaultOutcome, FaultReport, VmError};
pub use stack::OperandStack;
pub use vm::{DebugEvent, Machine, MachineState, HALT_LINK};
