//! Fault taxonomy and the error type handed back to hosts.

use crate::vm::MachineState;
use bpl_core::disasm::DISASM_HEADER;
use bpl_core::ValueError;
use std::fmt;
use std::io;
use strum::{Display, EnumIter, IntoStaticStr};
use thiserror::Error;

/// Every way an instruction can fail. Only [`FaultKind::TypeMismatch`] is
/// recoverable, and only while `fatal_type_mismatch` is off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FaultKind {
    StackUnderflow,
    StackOverflow,
    OutOfRangeFrameOffset,
    DivisionByZero,
    UnsignedOperandExpected,
    TypeMismatch,
    UnknownOpcode,
    InvalidReference,
    IndexOutOfRange,
    InvalidConstant,
    InvalidJumpTarget,
    TruncatedInstruction,
    InstructionLimitExceeded,
}

impl FaultKind {
    pub fn is_recoverable(self) -> bool {
        self == FaultKind::TypeMismatch
    }
}

/// A fault raised by an instruction handler, before it is numbered and
/// reported.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
}

impl Fault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<ValueError> for Fault {
    fn from(err: ValueError) -> Self {
        let kind = match err {
            ValueError::Unsupported { .. } | ValueError::TypeMismatch { .. } => {
                FaultKind::TypeMismatch
            }
            ValueError::IndexOutOfRange { .. } | ValueError::SliceOutOfRange { .. } => {
                FaultKind::IndexOutOfRange
            }
        };
        Fault::new(kind, err.to_string())
    }
}

/// What the engine does after a fault has been reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOutcome {
    /// Resume at the instruction after the faulting one.
    Continue,
    /// Stop the machine and hand the report to the host.
    Abort,
}

/// Structured description of one fault, as written to the output stream.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultReport {
    pub kind: FaultKind,
    pub message: String,
    /// 1-based count of faults raised by this machine so far.
    pub count: u64,
    /// Address of the faulting instruction.
    pub ip: usize,
    /// Disassembled faulting instruction.
    pub instruction: String,
    /// Operand stack at the moment of the fault, bottom to top.
    pub stack: String,
    pub outcome: FaultOutcome,
}

impl FaultReport {
    pub fn is_fatal(&self) -> bool {
        self.outcome == FaultOutcome::Abort
    }
}

impl fmt::Display for FaultReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({}) report:", self.kind, self.count)?;
        writeln!(f, "{}", self.message)?;
        writeln!(f, "{}", DISASM_HEADER)?;
        writeln!(f, "{}", self.instruction)?;
        writeln!(f, "Stack:")?;
        writeln!(f, "\t{}", self.stack)
    }
}

#[derive(Debug, Error)]
pub enum VmError {
    #[error("{} at 0x{:04X}: {}", .0.kind, .0.ip, .0.message)]
    Fatal(Box<FaultReport>),
    #[error("cannot load arguments: {0}")]
    Load(Fault),
    #[error("arguments must be loaded before the first instruction")]
    AlreadyStarted,
    #[error("machine is not running (state: {0})")]
    NotRunning(MachineState),
    #[error("output error: {0}")]
    Io(#[from] io::Error),
}

impl VmError {
    /// The report behind a fatal fault.
    pub fn report(&self) -> Option<&FaultReport> {
        match self {
            VmError::Fatal(report) => Some(report),
            _ => None,
        }
    }

    pub fn fault_kind(&self) -> Option<FaultKind> {
        match self {
            VmError::Fatal(report) => Some(report.kind),
            VmError::Load(fault) => Some(fault.kind),
            _ => None,
        }
    }

    pub fn is_division_by_zero(&self) -> bool {
        self.fault_kind() == Some(FaultKind::DivisionByZero)
    }

    pub fn is_instruction_limit_exceeded(&self) -> bool {
        self.fault_kind() == Some(FaultKind::InstructionLimitExceeded)
    }
}

/// Internal failure of an instruction handler: either a VM fault or a failed
/// write to the output sink.
#[derive(Debug)]
pub(crate) enum Trap {
    Fault(Fault),
    Io(io::Error),
}

impl From<Fault> for Trap {
    fn from(fault: Fault) -> Self {
        Trap::Fault(fault)
    }
}

impl From<ValueError> for Trap {
    fn from(err: ValueError) -> Self {
        Trap::Fault(err.into())
    }
}

impl From<io::Error> for Trap {
    fn from(err: io::Error) -> Self {
        Trap::Io(err)
    }
}
