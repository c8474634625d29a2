//! Instruction table: opcode numbers, symbolic names and operand arity.
//!
//! Opcode numbers are part of the bytecode format. Every opcode has a fixed
//! number of inline operands; the decoder and the disassembler both read the
//! arity from [`InstructionTable`], never from their own copy.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{EnumCount, EnumIter, FromRepr, IntoEnumIterator};

/// Opcodes for the BPL stack VM
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    EnumCount,
    FromRepr,
    Serialize,
    Deserialize,
)]
#[repr(u8)]
pub enum OpCode {
    // System
    Nop = 0x00,
    Halt = 0x01,
    NullRef = 0x02, // push Null

    // I/O
    LnFeed = 0x08,
    PrintVal = 0x09,
    PrintRef = 0x0A,
    PrintUni = 0x0B,
    PrintlnVal = 0x0C,
    PrintlnRef = 0x0D,
    PrintlnUni = 0x0E,

    // Integer constants
    Iconst0 = 0x10,
    Iconst1 = 0x11,
    Iconst2 = 0x12,
    Iconst3 = 0x13,
    Iconst4 = 0x14,
    Iconst5 = 0x15,
    Iconst = 0x16, // idx: ints[idx]

    // Real constants
    Rconst0 = 0x18,
    Rconst1 = 0x19,
    Rconst2 = 0x1A,
    Rconst3 = 0x1B,
    Rconst4 = 0x1C,
    Rconst5 = 0x1D,
    Rconst = 0x1E, // idx: reals[idx]
    RconstE = 0x20,
    RconstPi = 0x21,
    RconstPhi = 0x22,

    // String constants
    Sconst = 0x24, // idx: strings[idx]

    // Stack manipulation
    Drop = 0x28,
    Dup = 0x29,
    Dup2 = 0x2A,
    Swap = 0x2B,
    Swap2 = 0x2C,

    // Integer arithmetic
    Iadd = 0x30,
    Isub = 0x31,
    Imul = 0x32,
    Imod = 0x33,
    Ishl = 0x34,
    Ishr = 0x35,
    Iand = 0x36,
    Ior = 0x37,
    Ixor = 0x38,
    Inot = 0x39,
    Icompl1 = 0x3A,
    Icompl2 = 0x3B,
    Ieq = 0x3C,
    Ineq = 0x3D,

    // Real arithmetic
    Radd = 0x40,
    Rsub = 0x41,
    Rmul = 0x42,
    Div = 0x43,
    Rshl = 0x44, // r * 10^n
    Rshr = 0x45, // r * 10^-n

    // Conversions
    I2r = 0x48,
    R2i = 0x49,

    // Kind-preserving
    Inc = 0x4C,
    Dec = 0x4D,
    Neg = 0x4E,

    // Comparison
    Cmp = 0x50,
    Eq = 0x51,
    Neq = 0x52,
    Lt = 0x53,
    Leq = 0x54,
    Gt = 0x55,
    Geq = 0x56,

    // Strings
    Scat = 0x58,
    Slen = 0x59,
    Sbyte = 0x5A,
    Sslice = 0x5B,

    // Branch: one target, fall through when false
    Br = 0x60,
    Br0 = 0x61,
    BrN0 = 0x62,
    BrLt = 0x63,
    BrGt = 0x64,
    BrLeq = 0x65,
    BrGeq = 0x66,
    BrEq = 0x67,
    BrNeq = 0x68,
    BrNul = 0x69,
    BrNnul = 0x6A,

    // If-else: two targets, always jumps
    If0 = 0x70,
    IfN0 = 0x71,
    IfLt = 0x72,
    IfGt = 0x73,
    IfLeq = 0x74,
    IfGeq = 0x75,
    IfEq = 0x76,
    IfNeq = 0x77,
    IfNul = 0x78,
    IfNnul = 0x79,

    // Frames
    Alloc = 0x80,
    Arg = 0x81,
    Lget = 0x82,
    Lset = 0x83,
    Call = 0x84, // target, argc
    Clear = 0x85,
    Ret = 0x86,
}

impl OpCode {
    /// Symbolic name used by the disassembler.
    pub fn name(self) -> &'static str {
        use OpCode::*;
        match self {
            Nop => "nop",
            Halt => "halt",
            NullRef => "nullref",
            LnFeed => "lnfeed",
            PrintVal => "print_val",
            PrintRef => "print_ref",
            PrintUni => "print_uni",
            PrintlnVal => "println_val",
            PrintlnRef => "println_ref",
            PrintlnUni => "println_uni",
            Iconst0 => "iconst_0",
            Iconst1 => "iconst_1",
            Iconst2 => "iconst_2",
            Iconst3 => "iconst_3",
            Iconst4 => "iconst_4",
            Iconst5 => "iconst_5",
            Iconst => "iconst",
            Rconst0 => "rconst_0",
            Rconst1 => "rconst_1",
            Rconst2 => "rconst_2",
            Rconst3 => "rconst_3",
            Rconst4 => "rconst_4",
            Rconst5 => "rconst_5",
            Rconst => "rconst",
            RconstE => "rconst_e",
            RconstPi => "rconst_pi",
            RconstPhi => "rconst_phi",
            Sconst => "sconst",
            Drop => "drop",
            Dup => "dup",
            Dup2 => "dup2",
            Swap => "swap",
            Swap2 => "swap2",
            Iadd => "iadd",
            Isub => "isub",
            Imul => "imul",
            Imod => "imod",
            Ishl => "ishl",
            Ishr => "ishr",
            Iand => "iand",
            Ior => "ior",
            Ixor => "ixor",
            Inot => "inot",
            Icompl1 => "icompl1",
            Icompl2 => "icompl2",
            Ieq => "ieq",
            Ineq => "ineq",
            Radd => "radd",
            Rsub => "rsub",
            Rmul => "rmul",
            Div => "div",
            Rshl => "rshl",
            Rshr => "rshr",
            I2r => "i2r",
            R2i => "r2i",
            Inc => "inc",
            Dec => "dec",
            Neg => "neg",
            Cmp => "cmp",
            Eq => "eq",
            Neq => "neq",
            Lt => "lt",
            Leq => "leq",
            Gt => "gt",
            Geq => "geq",
            Scat => "scat",
            Slen => "slen",
            Sbyte => "sbyte",
            Sslice => "sslice",
            Br => "br",
            Br0 => "br_0",
            BrN0 => "br_n0",
            BrLt => "br_lt",
            BrGt => "br_gt",
            BrLeq => "br_leq",
            BrGeq => "br_geq",
            BrEq => "br_eq",
            BrNeq => "br_neq",
            BrNul => "br_nul",
            BrNnul => "br_nnul",
            If0 => "if_0",
            IfN0 => "if_n0",
            IfLt => "if_lt",
            IfGt => "if_gt",
            IfLeq => "if_leq",
            IfGeq => "if_geq",
            IfEq => "if_eq",
            IfNeq => "if_neq",
            IfNul => "if_nul",
            IfNnul => "if_nnul",
            Alloc => "alloc",
            Arg => "arg",
            Lget => "lget",
            Lset => "lset",
            Call => "call",
            Clear => "clear",
            Ret => "ret",
        }
    }

    /// Number of inline operand words following the opcode.
    pub fn arity(self) -> usize {
        use OpCode::*;
        match self {
            Iconst | Rconst | Sconst => 1,
            Br | Br0 | BrN0 | BrLt | BrGt | BrLeq | BrGeq | BrEq | BrNeq | BrNul | BrNnul => 1,
            If0 | IfN0 | IfLt | IfGt | IfLeq | IfGeq | IfEq | IfNeq | IfNul | IfNnul => 2,
            Alloc | Arg | Lget | Lset => 1,
            Call => 2,
            _ => 0,
        }
    }

    /// The bytecode word for this opcode.
    pub fn word(self) -> i64 {
        i64::from(self as u8)
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<OpCode> for i64 {
    fn from(op: OpCode) -> i64 {
        op.word()
    }
}

/// One row of the instruction table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionInfo {
    pub op: OpCode,
    pub name: &'static str,
    pub arity: usize,
}

/// Opcode byte → (name, arity). Built once and shared by reference.
#[derive(Debug)]
pub struct InstructionTable {
    entries: Vec<Option<InstructionInfo>>,
}

static STANDARD: Lazy<InstructionTable> = Lazy::new(InstructionTable::build);

impl InstructionTable {
    /// The process-wide table covering every [`OpCode`].
    pub fn standard() -> &'static InstructionTable {
        &STANDARD
    }

    fn build() -> Self {
        let mut entries = vec![None; usize::from(u8::MAX) + 1];
        for op in OpCode::iter() {
            entries[op as usize] = Some(InstructionInfo {
                op,
                name: op.name(),
                arity: op.arity(),
            });
        }
        Self { entries }
    }

    /// Look up a raw bytecode word. `None` for anything outside the table.
    pub fn decode(&self, word: i64) -> Option<&InstructionInfo> {
        let index = usize::try_from(word).ok()?;
        self.entries.get(index)?.as_ref()
    }

    pub fn lookup_name(&self, name: &str) -> Option<&InstructionInfo> {
        self.iter().find(|info| info.name == name)
    }

    /// Entries in opcode order.
    pub fn iter(&self) -> impl Iterator<Item = &InstructionInfo> {
        self.entries.iter().flatten()
    }

    pub fn len(&self) -> usize {
        OpCode::COUNT
    }

    pub fn is_empty(&self) -> bool {
        OpCode::COUNT == 0
    }
}
