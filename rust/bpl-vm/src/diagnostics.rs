//! Fault reporting: numbering, policy and the structured report.

use crate::config::VmConfig;
use crate::error::{Fault, FaultKind, FaultOutcome, FaultReport};
use crate::stack::OperandStack;
use bpl_core::disasm::disassemble_at;
use bpl_core::InstructionTable;
use std::io::{self, Write};

/// Numbers faults per machine and decides whether each one stops it.
#[derive(Debug, Clone)]
pub struct FaultReporter {
    count: u64,
    fatal_type_mismatch: bool,
}

impl FaultReporter {
    pub fn new(config: &VmConfig) -> Self {
        Self {
            count: 0,
            fatal_type_mismatch: config.fatal_type_mismatch,
        }
    }

    /// Faults reported so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn outcome(&self, kind: FaultKind) -> FaultOutcome {
        if kind.is_recoverable() && !self.fatal_type_mismatch {
            FaultOutcome::Continue
        } else {
            FaultOutcome::Abort
        }
    }

    /// Build the report for `fault` raised by the instruction at `ip`, write it
    /// to `out` and log it.
    pub fn report<W: Write>(
        &mut self,
        fault: Fault,
        ip: usize,
        code: &[i64],
        table: &InstructionTable,
        stack: &OperandStack,
        out: &mut W,
    ) -> io::Result<FaultReport> {
        self.count += 1;
        let instruction = match disassemble_at(code, ip, table) {
            Some(line) => line.to_string(),
            None => format!("0x{:04X}    | <end of code> | ", ip),
        };
        let report = FaultReport {
            kind: fault.kind,
            message: fault.message,
            count: self.count,
            ip,
            instruction,
            stack: stack.to_string(),
            outcome: self.outcome(fault.kind),
        };

        match report.outcome {
            FaultOutcome::Abort => tracing::error!(
                kind = %report.kind,
                ip = report.ip,
                count = report.count,
                "{}",
                report.message
            ),
            FaultOutcome::Continue => tracing::warn!(
                kind = %report.kind,
                ip = report.ip,
                count = report.count,
                "{}",
                report.message
            ),
        }

        write!(out, "{}", report)?;
        out.flush()?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bpl_core::{OpCode, Value};

    #[test]
    fn test_policy() {
        let lenient = FaultReporter::new(&VmConfig::default());
        assert_eq!(lenient.outcome(FaultKind::TypeMismatch), FaultOutcome::Continue);
        assert_eq!(lenient.outcome(FaultKind::DivisionByZero), FaultOutcome::Abort);

        let strict = FaultReporter::new(&VmConfig {
            fatal_type_mismatch: true,
            ..VmConfig::default()
        });
        assert_eq!(strict.outcome(FaultKind::TypeMismatch), FaultOutcome::Abort);
    }

    #[test]
    fn test_reports_are_numbered_and_written() {
        let mut reporter = FaultReporter::new(&VmConfig::default());
        let code = [OpCode::Iadd.word()];
        let mut stack = OperandStack::new(8);
        stack.push(Value::Int(1)).unwrap();
        stack.push(Value::Real(2.0)).unwrap();
        let mut out = Vec::new();

        let fault = Fault::new(FaultKind::TypeMismatch, "first");
        let table = InstructionTable::standard();
        let first = reporter.report(fault, 0, &code, table, &stack, &mut out).unwrap();
        let fault = Fault::new(FaultKind::TypeMismatch, "second");
        let second = reporter.report(fault, 0, &code, table, &stack, &mut out).unwrap();

        assert_eq!(first.count, 1);
        assert_eq!(second.count, 2);
        assert_eq!(reporter.count(), 2);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("TYPE_MISMATCH (1) report:\nfirst\n"));
        assert!(text.contains("TYPE_MISMATCH (2) report:"));
        assert!(text.contains("0x0000.30 |          iadd |"));
        assert!(text.contains("\t[1, 2.0]\n"));
    }
}
