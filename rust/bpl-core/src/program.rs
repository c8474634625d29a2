//! Loaded programs: the linear bytecode plus its constant pools.

use crate::opcode::OpCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Append-only table of wide literals addressed by index from the bytecode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstantPool<T> {
    items: Vec<T>,
}

impl<T> Default for ConstantPool<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> ConstantPool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a constant and return its index.
    pub fn push(&mut self, value: T) -> usize {
        self.items.push(value);
        self.items.len() - 1
    }

    /// Look up by a raw operand word; negative or out-of-range indices miss.
    pub fn get(&self, index: i64) -> Option<&T> {
        usize::try_from(index).ok().and_then(|i| self.items.get(i))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T> From<Vec<T>> for ConstantPool<T> {
    fn from(items: Vec<T>) -> Self {
        Self { items }
    }
}

#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("invalid program json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{op} takes {expected} operand(s), got {found} (at address {addr})")]
    Arity {
        op: OpCode,
        expected: usize,
        found: usize,
        addr: usize,
    },
}

/// A finished, linear program. Immutable once handed to a machine; several
/// machines may borrow the same program.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub code: Vec<i64>,
    #[serde(default)]
    pub ints: ConstantPool<i64>,
    #[serde(default)]
    pub reals: ConstantPool<f64>,
    #[serde(default)]
    pub strings: ConstantPool<String>,
}

impl Program {
    pub fn new(code: Vec<i64>) -> Self {
        Self {
            code,
            ..Self::default()
        }
    }

    /// Operand-free programs straight from a list of opcodes.
    pub fn from_ops(ops: &[OpCode]) -> Self {
        Program::new(ops.iter().map(|op| op.word()).collect())
    }

    pub fn from_json(src: &str) -> Result<Self, ProgramError> {
        Ok(serde_json::from_str(src)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, ProgramError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Assembles a [`Program`] while checking operand counts against the
/// instruction table. The first arity error is kept and reported by
/// [`ProgramBuilder::build`].
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    program: Program,
    error: Option<ProgramError>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address of the next emitted word.
    pub fn here(&self) -> i64 {
        self.program.code.len() as i64
    }

    pub fn emit(&mut self, op: OpCode, operands: &[i64]) -> &mut Self {
        if operands.len() != op.arity() && self.error.is_none() {
            self.error = Some(ProgramError::Arity {
                op,
                expected: op.arity(),
                found: operands.len(),
                addr: self.program.code.len(),
            });
        }
        self.program.code.push(op.word());
        self.program.code.extend_from_slice(operands);
        self
    }

    pub fn op(&mut self, op: OpCode) -> &mut Self {
        self.emit(op, &[])
    }

    pub fn ops(&mut self, ops: &[OpCode]) -> &mut Self {
        for &op in ops {
            self.emit(op, &[]);
        }
        self
    }

    /// Overwrite an already emitted word, typically a forward jump target.
    pub fn patch(&mut self, addr: i64, word: i64) -> &mut Self {
        if let Some(slot) = usize::try_from(addr)
            .ok()
            .and_then(|a| self.program.code.get_mut(a))
        {
            *slot = word;
        }
        self
    }

    pub fn int(&mut self, value: i64) -> i64 {
        self.program.ints.push(value) as i64
    }

    pub fn real(&mut self, value: f64) -> i64 {
        self.program.reals.push(value) as i64
    }

    pub fn string(&mut self, value: impl Into<String>) -> i64 {
        self.program.strings.push(value.into()) as i64
    }

    /// Push an integer literal, using the short forms for 0..=5.
    pub fn push_int(&mut self, value: i64) -> &mut Self {
        const SHORT: [OpCode; 6] = [
            OpCode::Iconst0,
            OpCode::Iconst1,
            OpCode::Iconst2,
            OpCode::Iconst3,
            OpCode::Iconst4,
            OpCode::Iconst5,
        ];
        match usize::try_from(value).ok().and_then(|i| SHORT.get(i)) {
            Some(&op) => self.op(op),
            None => {
                let idx = self.int(value);
                self.emit(OpCode::Iconst, &[idx])
            }
        }
    }

    pub fn push_real(&mut self, value: f64) -> &mut Self {
        let idx = self.real(value);
        self.emit(OpCode::Rconst, &[idx])
    }

    pub fn push_str(&mut self, value: impl Into<String>) -> &mut Self {
        let idx = self.string(value);
        self.emit(OpCode::Sconst, &[idx])
    }

    pub fn build(&mut self) -> Result<Program, ProgramError> {
        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(std::mem::take(&mut self.program)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_indices() {
        let mut pool = ConstantPool::new();
        assert_eq!(pool.push(10_i64), 0);
        assert_eq!(pool.push(20), 1);
        assert_eq!(pool.get(1), Some(&20));
        assert_eq!(pool.get(2), None);
        assert_eq!(pool.get(-1), None);
    }

    #[test]
    fn test_builder_tracks_addresses() {
        let mut b = ProgramBuilder::new();
        b.push_int(3);
        assert_eq!(b.here(), 1);
        b.push_int(1_000);
        assert_eq!(b.here(), 3);
        let program = b.op(OpCode::Halt).build().unwrap();
        assert_eq!(
            program.code,
            vec![OpCode::Iconst3.word(), OpCode::Iconst.word(), 0, OpCode::Halt.word()]
        );
        assert_eq!(program.ints.get(0), Some(&1_000));
    }

    #[test]
    fn test_builder_rejects_wrong_arity() {
        let err = ProgramBuilder::new()
            .emit(OpCode::Br, &[])
            .op(OpCode::Halt)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ProgramError::Arity { op: OpCode::Br, expected: 1, found: 0, addr: 0 }
        ));
    }

    #[test]
    fn test_patch_forward_jump() {
        let mut b = ProgramBuilder::new();
        b.emit(OpCode::Br, &[0]);
        let end = b.here();
        b.op(OpCode::Halt).patch(1, end);
        assert_eq!(b.build().unwrap().code[1], 2);
    }

    #[test]
    fn test_json_pools_default_to_empty() {
        let program = Program::from_json(r#"{"code":[17,1]}"#).unwrap();
        assert_eq!(program.code, vec![0x11, 0x01]);
        assert!(program.ints.is_empty());
        assert!(program.strings.is_empty());

        let full = Program::from_json(r#"{"code":[22,0,1],"ints":[99],"reals":[1.5],"strings":["s"]}"#)
            .unwrap();
        assert_eq!(full.ints.get(0), Some(&99));
        assert_eq!(full.reals.get(0), Some(&1.5));
        assert_eq!(full.strings.get(0).map(String::as_str), Some("s"));
    }
}
