//! Tagged value representation for the BPL virtual machine.
//!
//! Every runtime value is one variant of [`Value`]. Operations never mutate a
//! value in place and never coerce between kinds: an operation either keeps
//! the kind of its operand or fails with a [`ValueError`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use strum::{Display, EnumCount, EnumIter, IntoStaticStr};
use thiserror::Error;

/// The kind of a [`Value`], as reported by [`Value::kind`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumIter,
    EnumCount,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
pub enum ValueKind {
    Null,
    Int,
    Real,
    Byte,
    UInt,
    Long,
    ULong,
    Float,
    Double,
    Complex,
    String,
    Ref,
}

impl ValueKind {
    /// Unsigned kinds saturate at zero on decrement and cannot be negated.
    pub fn is_unsigned(self) -> bool {
        matches!(self, ValueKind::Byte | ValueKind::UInt | ValueKind::ULong)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    #[error("cannot {operation} a value of kind {found}")]
    Unsupported {
        operation: &'static str,
        found: ValueKind,
    },
    #[error("cannot {operation}: expected {expected}, got {found}")]
    TypeMismatch {
        operation: &'static str,
        expected: ValueKind,
        found: ValueKind,
    },
    #[error("index {index} out of range for string of length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("slice {start}..{end} out of range for string of length {len}")]
    SliceOutOfRange { start: i64, end: i64, len: usize },
}

/// Immutable byte string. Cloning shares the underlying buffer.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrValue {
    bytes: Arc<[u8]>,
}

impl StrValue {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Bounds-checked indexed read.
    pub fn byte_at(&self, index: i64) -> Result<u8, ValueError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.bytes.get(i).copied())
            .ok_or(ValueError::IndexOutOfRange {
                index,
                len: self.len(),
            })
    }

    /// Bounds-checked sub-range `start..end`.
    pub fn slice(&self, start: i64, end: i64) -> Result<StrValue, ValueError> {
        let out_of_range = ValueError::SliceOutOfRange {
            start,
            end,
            len: self.len(),
        };
        let (Ok(s), Ok(e)) = (usize::try_from(start), usize::try_from(end)) else {
            return Err(out_of_range);
        };
        if s > e || e > self.len() {
            return Err(out_of_range);
        }
        Ok(StrValue::new(&self.bytes[s..e]))
    }

    pub fn concat(&self, other: &StrValue) -> StrValue {
        let mut joined = Vec::with_capacity(self.len() + other.len());
        joined.extend_from_slice(&self.bytes);
        joined.extend_from_slice(&other.bytes);
        StrValue::new(joined)
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

impl From<&str> for StrValue {
    fn from(s: &str) -> Self {
        StrValue::new(s.as_bytes())
    }
}

impl fmt::Debug for StrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.bytes))
    }
}

impl fmt::Display for StrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.bytes))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl fmt::Display for Complex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.im.is_sign_negative() { '-' } else { '+' };
        write!(
            f,
            "({}{}{}i)",
            format_float(self.re),
            sign,
            format_float(self.im.abs())
        )
    }
}

/// Runtime values in the BPL VM.
///
/// Derived equality compares the variant first, so values of different kinds
/// are never equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    Real(f64),
    Byte(u8),
    UInt(u32),
    Long(i64),
    ULong(u64),
    Float(f32),
    Double(f64),
    Complex(Complex),
    String(StrValue),
    Ref(u64),
}

impl Value {
    pub fn long(v: i64) -> Self {
        Value::Long(v)
    }

    pub fn double(v: f64) -> Self {
        Value::Double(v)
    }

    pub fn complex(re: f64, im: f64) -> Self {
        Value::Complex(Complex { re, im })
    }

    pub fn reference(handle: u64) -> Self {
        Value::Ref(handle)
    }

    /// Boolean results are Integers: 1 for true, 0 for false.
    pub fn bool(b: bool) -> Self {
        Value::Int(i64::from(b))
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Int(_) => ValueKind::Int,
            Value::Real(_) => ValueKind::Real,
            Value::Byte(_) => ValueKind::Byte,
            Value::UInt(_) => ValueKind::UInt,
            Value::Long(_) => ValueKind::Long,
            Value::ULong(_) => ValueKind::ULong,
            Value::Float(_) => ValueKind::Float,
            Value::Double(_) => ValueKind::Double,
            Value::Complex(_) => ValueKind::Complex,
            Value::String(_) => ValueKind::String,
            Value::Ref(_) => ValueKind::Ref,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truth of an integer-kind value (`!= 0`). `None` for every other kind.
    pub fn is_truthy(&self) -> Option<bool> {
        match self {
            Value::Int(n) | Value::Long(n) => Some(*n != 0),
            Value::Byte(n) => Some(*n != 0),
            Value::UInt(n) => Some(*n != 0),
            Value::ULong(n) => Some(*n != 0),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&StrValue> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer payload, or a type mismatch naming `operation`.
    pub fn expect_int(&self, operation: &'static str) -> Result<i64, ValueError> {
        self.as_int()
            .ok_or_else(|| self.mismatch(operation, ValueKind::Int))
    }

    /// Real payload, or a type mismatch naming `operation`. Integers are not
    /// promoted.
    pub fn expect_real(&self, operation: &'static str) -> Result<f64, ValueError> {
        self.as_real()
            .ok_or_else(|| self.mismatch(operation, ValueKind::Real))
    }

    pub fn expect_str(&self, operation: &'static str) -> Result<&StrValue, ValueError> {
        self.as_str()
            .ok_or_else(|| self.mismatch(operation, ValueKind::String))
    }

    fn mismatch(&self, operation: &'static str, expected: ValueKind) -> ValueError {
        ValueError::TypeMismatch {
            operation,
            expected,
            found: self.kind(),
        }
    }

    fn unsupported(&self, operation: &'static str) -> ValueError {
        ValueError::Unsupported {
            operation,
            found: self.kind(),
        }
    }

    /// Kind-preserving `+ 1`. Integer kinds wrap at their maximum.
    pub fn increment(&self) -> Result<Value, ValueError> {
        Ok(match self {
            Value::Int(n) => Value::Int(n.wrapping_add(1)),
            Value::Long(n) => Value::Long(n.wrapping_add(1)),
            Value::Byte(n) => Value::Byte(n.wrapping_add(1)),
            Value::UInt(n) => Value::UInt(n.wrapping_add(1)),
            Value::ULong(n) => Value::ULong(n.wrapping_add(1)),
            Value::Real(r) => Value::Real(r + 1.0),
            Value::Float(r) => Value::Float(r + 1.0),
            Value::Double(r) => Value::Double(r + 1.0),
            Value::Complex(c) => Value::complex(c.re + 1.0, c.im),
            _ => return Err(self.unsupported("increment")),
        })
    }

    /// Kind-preserving `- 1`. Unsigned kinds saturate at zero.
    pub fn decrement(&self) -> Result<Value, ValueError> {
        Ok(match self {
            Value::Int(n) => Value::Int(n.wrapping_sub(1)),
            Value::Long(n) => Value::Long(n.wrapping_sub(1)),
            Value::Byte(n) => Value::Byte(n.saturating_sub(1)),
            Value::UInt(n) => Value::UInt(n.saturating_sub(1)),
            Value::ULong(n) => Value::ULong(n.saturating_sub(1)),
            Value::Real(r) => Value::Real(r - 1.0),
            Value::Float(r) => Value::Float(r - 1.0),
            Value::Double(r) => Value::Double(r - 1.0),
            Value::Complex(c) => Value::complex(c.re - 1.0, c.im),
            _ => return Err(self.unsupported("decrement")),
        })
    }

    pub fn negate(&self) -> Result<Value, ValueError> {
        Ok(match self {
            Value::Int(n) => Value::Int(n.wrapping_neg()),
            Value::Long(n) => Value::Long(n.wrapping_neg()),
            Value::Real(r) => Value::Real(-r),
            Value::Float(r) => Value::Float(-r),
            Value::Double(r) => Value::Double(-r),
            Value::Complex(c) => Value::complex(-c.re, -c.im),
            _ => return Err(self.unsupported("negate")),
        })
    }

    /// Reference form used by the `*_REF` print opcodes: `*(0xHEX)`.
    pub fn reference_form(&self) -> Option<String> {
        match self {
            Value::Int(n) => Some(format!("*(0x{:X})", n)),
            Value::Ref(h) => Some(format!("*(0x{:X})", h)),
            _ => None,
        }
    }
}

/// Whole numbers keep one decimal so reals never read as integers.
fn format_float(f: f64) -> String {
    if f == f.floor() && f.abs() < 1e15 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

fn format_float32(f: f32) -> String {
    if f == f.floor() && f.abs() < 1e7 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Int(n) | Value::Long(n) => write!(f, "{}", n),
            Value::UInt(n) => write!(f, "{}", n),
            Value::ULong(n) => write!(f, "{}", n),
            Value::Real(r) | Value::Double(r) => write!(f, "{}", format_float(*r)),
            Value::Float(r) => write!(f, "{}", format_float32(*r)),
            Value::Byte(b) if b.is_ascii_graphic() || *b == b' ' => {
                write!(f, "'{}'", char::from(*b))
            }
            Value::Byte(b) => write!(f, "'\\x{:02X}'", b),
            Value::Complex(c) => write!(f, "{}", c),
            Value::String(s) => write!(f, "{}", s),
            Value::Ref(h) => write!(f, "*(0x{:X})", h),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Real(r)
    }
}

impl From<u8> for Value {
    fn from(b: u8) -> Self {
        Value::Byte(b)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::UInt(n)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::ULong(n)
    }
}

impl From<f32> for Value {
    fn from(r: f32) -> Self {
        Value::Float(r)
    }
}

impl From<Complex> for Value {
    fn from(c: Complex) -> Self {
        Value::Complex(c)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(StrValue::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(StrValue::new(s.into_bytes()))
    }
}

impl From<StrValue> for Value {
    fn from(s: StrValue) -> Self {
        Value::String(s)
    }
}
