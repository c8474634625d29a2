//! Disassembler shared by fault reports, execution tracing and the CLI.

use crate::opcode::InstructionTable;
use std::fmt;

/// Column header matching [`DisasmLine`]'s layout.
pub const DISASM_HEADER: &str = "    IP    |  INSTRUCTION  | ARGS";

const UNKNOWN_NAME: &str = "???";

/// One decoded instruction. Operands past the end of the code are `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisasmLine {
    pub addr: usize,
    pub word: i64,
    pub name: &'static str,
    pub operands: Vec<Option<i64>>,
}

impl DisasmLine {
    pub fn is_known(&self) -> bool {
        self.name != UNKNOWN_NAME
    }

    /// Address of the instruction that follows this one.
    pub fn next_addr(&self) -> usize {
        self.addr + 1 + self.operands.len()
    }
}

impl fmt::Display for DisasmLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}.{:02X} | {:>13} | ", self.addr, self.word, self.name)?;
        for (i, operand) in self.operands.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match operand {
                Some(v) => write!(f, "{:<8}", v)?,
                None => write!(f, "{:<8}", "?")?,
            }
        }
        Ok(())
    }
}

/// Decode the instruction at `addr`. `None` when `addr` is past the end.
pub fn disassemble_at(code: &[i64], addr: usize, table: &InstructionTable) -> Option<DisasmLine> {
    let word = *code.get(addr)?;
    let (name, arity) = match table.decode(word) {
        Some(info) => (info.name, info.arity),
        None => (UNKNOWN_NAME, 0),
    };
    let operands = (1..=arity).map(|i| code.get(addr + i).copied()).collect();
    Some(DisasmLine {
        addr,
        word,
        name,
        operands,
    })
}

/// Walk instruction boundaries from address 0 and decode the whole program.
pub fn disassemble(code: &[i64], table: &InstructionTable) -> Vec<DisasmLine> {
    let mut lines = Vec::new();
    let mut addr = 0;
    while let Some(line) = disassemble_at(code, addr, table) {
        addr = line.next_addr();
        lines.push(line);
    }
    lines
}
