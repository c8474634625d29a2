//! Operand stack with frame-relative addressing.
//!
//! A frame is described by its frame pointer `fp`, the index of its first
//! local. Below it sit the link word (`fp - 1`), the argument count
//! (`fp - 2`) and the arguments, argument 1 nearest the count word.

use crate::error::{Fault, FaultKind};
use bpl_core::Value;
use std::fmt;

#[derive(Debug, Clone)]
pub struct OperandStack {
    values: Vec<Value>,
    max_depth: usize,
}

impl OperandStack {
    pub fn new(max_depth: usize) -> Self {
        Self {
            values: Vec::new(),
            max_depth,
        }
    }

    pub fn set_max_depth(&mut self, max_depth: usize) {
        self.max_depth = max_depth;
    }

    pub fn depth(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Fails with StackOverflow unless `extra` more values fit. A `max_depth`
    /// of 0 means the stack only grows.
    pub fn reserve(&self, extra: usize) -> Result<(), Fault> {
        if self.max_depth > 0 && self.values.len().saturating_add(extra) > self.max_depth {
            return Err(Fault::new(
                FaultKind::StackOverflow,
                format!(
                    "pushing {} value(s) would exceed the stack limit of {}",
                    extra, self.max_depth
                ),
            ));
        }
        Ok(())
    }

    pub fn push(&mut self, value: Value) -> Result<(), Fault> {
        self.reserve(1)?;
        self.values.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Value, Fault> {
        self.values.pop().ok_or_else(|| underflow(1, 0))
    }

    /// Value `n` slots below the top; `peek(0)` is the top.
    pub fn peek(&self, n: usize) -> Result<&Value, Fault> {
        let len = self.values.len();
        if n >= len {
            return Err(underflow(n + 1, len));
        }
        Ok(&self.values[len - 1 - n])
    }

    /// The top `n` values, deepest first.
    pub fn top(&self, n: usize) -> Result<&[Value], Fault> {
        let len = self.values.len();
        if n > len {
            return Err(underflow(n, len));
        }
        Ok(&self.values[len - n..])
    }

    pub fn top_mut(&mut self, n: usize) -> Result<&mut [Value], Fault> {
        let len = self.values.len();
        if n > len {
            return Err(underflow(n, len));
        }
        Ok(&mut self.values[len - n..])
    }

    /// Drop the top `n` values.
    pub fn discard(&mut self, n: usize) -> Result<(), Fault> {
        let len = self.values.len();
        if n > len {
            return Err(underflow(n, len));
        }
        self.values.truncate(len - n);
        Ok(())
    }

    /// Pop the top `n` values and push `value` in their place.
    pub fn replace(&mut self, n: usize, value: Value) -> Result<(), Fault> {
        self.discard(n)?;
        self.values.push(value);
        Ok(())
    }

    /// Push copies of the top `n` values, preserving their order.
    pub fn duplicate(&mut self, n: usize) -> Result<(), Fault> {
        let len = self.values.len();
        if n > len {
            return Err(underflow(n, len));
        }
        self.reserve(n)?;
        self.values.extend_from_within(len - n..);
        Ok(())
    }

    pub fn truncate(&mut self, len: usize) {
        self.values.truncate(len);
    }

    /// Reserve `n` local slots, initialised to Null.
    pub fn alloc(&mut self, n: usize) -> Result<(), Fault> {
        self.reserve(n)?;
        let len = self.values.len();
        self.values.resize(len + n, Value::Null);
        Ok(())
    }

    /// Argument count word of the frame at `fp`.
    pub fn arg_count(&self, fp: usize) -> Result<i64, Fault> {
        fp.checked_sub(2)
            .and_then(|i| self.values.get(i))
            .and_then(Value::as_int)
            .ok_or_else(|| {
                Fault::new(
                    FaultKind::InvalidReference,
                    format!("frame at {} has no argument count word", fp),
                )
            })
    }

    /// Argument `n` of the frame at `fp`. Argument 0 is the argument count.
    pub fn get_arg(&self, fp: usize, n: i64) -> Result<&Value, Fault> {
        let argc = self.arg_count(fp)?;
        if n < 0 || n > argc {
            return Err(Fault::new(
                FaultKind::OutOfRangeFrameOffset,
                format!("argument {} outside a frame with {} argument(s)", n, argc),
            ));
        }
        (fp - 2)
            .checked_sub(n as usize)
            .and_then(|i| self.values.get(i))
            .ok_or_else(|| {
                Fault::new(
                    FaultKind::InvalidReference,
                    format!("argument {} lies below the bottom of the stack", n),
                )
            })
    }

    fn local_index(&self, fp: usize, n: i64, limit: usize) -> Result<usize, Fault> {
        usize::try_from(n)
            .ok()
            .and_then(|n| fp.checked_add(n))
            .filter(|&i| i < limit)
            .ok_or_else(|| {
                Fault::new(
                    FaultKind::OutOfRangeFrameOffset,
                    format!(
                        "local {} outside a frame with {} slot(s)",
                        n,
                        limit.saturating_sub(fp)
                    ),
                )
            })
    }

    /// Local slot `n` of the frame at `fp`.
    pub fn get_local(&self, fp: usize, n: i64) -> Result<&Value, Fault> {
        let i = self.local_index(fp, n, self.values.len())?;
        Ok(&self.values[i])
    }

    /// Pop the top value into local slot `n`. The slot must lie below the
    /// popped value.
    pub fn set_local(&mut self, fp: usize, n: i64) -> Result<(), Fault> {
        let len = self.values.len();
        if len == 0 {
            return Err(underflow(1, 0));
        }
        let i = self.local_index(fp, n, len - 1)?;
        let value = self.pop()?;
        self.values[i] = value;
        Ok(())
    }
}

fn underflow(needed: usize, depth: usize) -> Fault {
    Fault::new(
        FaultKind::StackUnderflow,
        format!("needs {} value(s), stack holds {}", needed, depth),
    )
}

impl fmt::Display for OperandStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, "]")
    }
}
