//! Operand-level instruction handlers: arithmetic, comparison, strings, I/O
//! and branches.
//!
//! Each handler reads and validates its operands in place and only then
//! rewrites the stack, so a faulting handler leaves the stack untouched.

use super::Machine;
use crate::error::{Fault, FaultKind, Trap};
use bpl_core::{Value, ValueError};
use std::cmp::Ordering;
use std::io::Write;

pub(super) const GOLDEN_RATIO: f64 = 1.618_033_988_749_895;

/// Predicate shared by a `BR_*` opcode and its `IF_*` twin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Condition {
    Zero,
    NonZero,
    Lt,
    Gt,
    Leq,
    Geq,
    Eq,
    Neq,
    Null,
    NonNull,
}

pub(super) fn remainder(x: i64, y: i64) -> Result<i64, Fault> {
    if y == 0 {
        return Err(Fault::new(
            FaultKind::DivisionByZero,
            format!("cannot take {} modulo zero", x),
        ));
    }
    Ok(x.wrapping_rem(y))
}

fn shift_count(n: i64) -> Result<u32, Fault> {
    if n < 0 {
        return Err(Fault::new(
            FaultKind::UnsignedOperandExpected,
            format!("shift count must not be negative, got {}", n),
        ));
    }
    Ok(u32::try_from(n).unwrap_or(u32::MAX))
}

pub(super) fn shift_left(x: i64, n: i64) -> Result<i64, Fault> {
    Ok(x.checked_shl(shift_count(n)?).unwrap_or(0))
}

/// Arithmetic shift; counts of 64 or more leave only the sign.
pub(super) fn shift_right(x: i64, n: i64) -> Result<i64, Fault> {
    let fill = if x < 0 { -1 } else { 0 };
    Ok(x.checked_shr(shift_count(n)?).unwrap_or(fill))
}

pub(super) fn divide(x: f64, y: f64) -> Result<f64, Fault> {
    if y == 0.0 {
        return Err(Fault::new(
            FaultKind::DivisionByZero,
            format!("cannot divide {} by zero", Value::Real(x)),
        ));
    }
    Ok(x / y)
}

/// `r * 10^exponent`; negative exponents divide so exact decimals stay exact.
fn scale(r: f64, exponent: i64) -> f64 {
    let magnitude = i32::try_from(exponent.unsigned_abs()).unwrap_or(i32::MAX);
    if exponent < 0 {
        r / 10f64.powi(magnitude)
    } else {
        r * 10f64.powi(magnitude)
    }
}

fn three_way(x: f64, y: f64) -> i64 {
    match x.partial_cmp(&y) {
        Some(Ordering::Less) => -1,
        Some(Ordering::Greater) => 1,
        Some(Ordering::Equal) | None => 0,
    }
}

impl<'p, W: Write> Machine<'p, W> {
    /// The top `N` values as Integers, deepest first.
    fn ints<const N: usize>(&self, operation: &'static str) -> Result<[i64; N], Fault> {
        let mut out = [0; N];
        for (slot, v) in out.iter_mut().zip(self.stack.top(N)?) {
            *slot = v.expect_int(operation)?;
        }
        Ok(out)
    }

    /// The top `N` values as Reals, deepest first.
    fn reals<const N: usize>(&self, operation: &'static str) -> Result<[f64; N], Fault> {
        let mut out = [0.0; N];
        for (slot, v) in out.iter_mut().zip(self.stack.top(N)?) {
            *slot = v.expect_real(operation)?;
        }
        Ok(out)
    }

    pub(super) fn int_constant(&mut self, index: i64) -> Result<(), Fault> {
        let n = *self
            .program
            .ints
            .get(index)
            .ok_or_else(|| missing_constant("integer", index))?;
        self.stack.push(Value::Int(n))
    }

    pub(super) fn real_constant(&mut self, index: i64) -> Result<(), Fault> {
        let r = *self
            .program
            .reals
            .get(index)
            .ok_or_else(|| missing_constant("real", index))?;
        self.stack.push(Value::Real(r))
    }

    pub(super) fn string_constant(&mut self, index: i64) -> Result<(), Fault> {
        let s = self
            .program
            .strings
            .get(index)
            .ok_or_else(|| missing_constant("string", index))?;
        self.stack.push(Value::from(s.as_str()))
    }

    pub(super) fn int_unary(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(i64) -> i64,
    ) -> Result<(), Fault> {
        let [x] = self.ints::<1>(operation)?;
        self.stack.replace(1, Value::Int(f(x)))
    }

    pub(super) fn int_binary(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(i64, i64) -> Result<i64, Fault>,
    ) -> Result<(), Fault> {
        let [x, y] = self.ints::<2>(operation)?;
        let result = f(x, y)?;
        self.stack.replace(2, Value::Int(result))
    }

    pub(super) fn real_binary(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(f64, f64) -> Result<f64, Fault>,
    ) -> Result<(), Fault> {
        let [x, y] = self.reals::<2>(operation)?;
        let result = f(x, y)?;
        self.stack.replace(2, Value::Real(result))
    }

    pub(super) fn real_predicate(&mut self, f: impl FnOnce(f64, f64) -> bool) -> Result<(), Fault> {
        let [x, y] = self.reals::<2>("compare")?;
        self.stack.replace(2, Value::bool(f(x, y)))
    }

    pub(super) fn compare(&mut self) -> Result<(), Fault> {
        let [x, y] = self.reals::<2>("compare")?;
        self.stack.replace(2, Value::Int(three_way(x, y)))
    }

    pub(super) fn equality(&mut self, want_equal: bool) -> Result<(), Fault> {
        let pair = self.stack.top(2)?;
        let equal = pair[0] == pair[1];
        self.stack.replace(2, Value::bool(equal == want_equal))
    }

    /// RSHL / RSHR: Real below, Integer exponent on top.
    pub(super) fn scale_real(&mut self, down: bool) -> Result<(), Fault> {
        let pair = self.stack.top(2)?;
        let r = pair[0].expect_real("scale")?;
        let n = pair[1].expect_int("scale")?;
        let exponent = if down { n.saturating_neg() } else { n };
        self.stack.replace(2, Value::Real(scale(r, exponent)))
    }

    pub(super) fn int_to_real(&mut self) -> Result<(), Fault> {
        let [x] = self.ints::<1>("convert")?;
        self.stack.replace(1, Value::Real(x as f64))
    }

    /// Truncates toward zero; out-of-range values saturate and NaN becomes 0.
    pub(super) fn real_to_int(&mut self) -> Result<(), Fault> {
        let [r] = self.reals::<1>("convert")?;
        self.stack.replace(1, Value::Int(r as i64))
    }

    pub(super) fn map_top(
        &mut self,
        f: impl FnOnce(&Value) -> Result<Value, ValueError>,
    ) -> Result<(), Fault> {
        let result = f(self.stack.peek(0)?)?;
        self.stack.replace(1, result)
    }

    pub(super) fn concat(&mut self) -> Result<(), Fault> {
        let pair = self.stack.top(2)?;
        let joined = pair[0]
            .expect_str("concatenate")?
            .concat(pair[1].expect_str("concatenate")?);
        self.stack.replace(2, Value::String(joined))
    }

    pub(super) fn length(&mut self) -> Result<(), Fault> {
        let len = self.stack.peek(0)?.expect_str("measure")?.len();
        self.stack.replace(1, Value::Int(len as i64))
    }

    pub(super) fn byte_at(&mut self) -> Result<(), Fault> {
        let pair = self.stack.top(2)?;
        let s = pair[0].expect_str("index")?;
        let index = pair[1].expect_int("index")?;
        let byte = s.byte_at(index)?;
        self.stack.replace(2, Value::Byte(byte))
    }

    pub(super) fn slice(&mut self) -> Result<(), Fault> {
        let args = self.stack.top(3)?;
        let s = args[0].expect_str("slice")?;
        let start = args[1].expect_int("slice")?;
        let end = args[2].expect_int("slice")?;
        let sliced = s.slice(start, end)?;
        self.stack.replace(3, Value::String(sliced))
    }

    pub(super) fn print_value(&mut self, newline: bool) -> Result<(), Trap> {
        let text = self.stack.peek(0)?.to_string();
        self.write_text(&text, newline)?;
        self.stack.pop()?;
        Ok(())
    }

    pub(super) fn print_reference(&mut self, newline: bool) -> Result<(), Trap> {
        let top = self.stack.peek(0)?;
        let text = top.reference_form().ok_or_else(|| {
            Fault::new(
                FaultKind::InvalidReference,
                format!("cannot print a value of kind {} as a reference", top.kind()),
            )
        })?;
        self.write_text(&text, newline)?;
        self.stack.pop()?;
        Ok(())
    }

    pub(super) fn print_unicode(&mut self, newline: bool) -> Result<(), Trap> {
        let code = self.stack.peek(0)?.expect_int("print as a character")?;
        let ch = u32::try_from(code)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| {
                Fault::new(
                    FaultKind::TypeMismatch,
                    format!("{} is not a Unicode scalar value", code),
                )
            })?;
        let mut buf = [0; 4];
        self.write_text(ch.encode_utf8(&mut buf), newline)?;
        self.stack.pop()?;
        Ok(())
    }

    fn write_text(&mut self, text: &str, newline: bool) -> std::io::Result<()> {
        self.out.write_all(text.as_bytes())?;
        if newline {
            self.out.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Validate an absolute jump target.
    pub(super) fn jump_target(&self, target: i64) -> Result<usize, Fault> {
        usize::try_from(target)
            .ok()
            .filter(|&t| t < self.program.code.len())
            .ok_or_else(|| {
                Fault::new(
                    FaultKind::InvalidJumpTarget,
                    format!(
                        "jump target {} outside code of length {}",
                        target,
                        self.program.code.len()
                    ),
                )
            })
    }

    /// Whether `condition` holds, and how many operands it consumes.
    fn evaluate(&self, condition: Condition) -> Result<(bool, usize), Fault> {
        let truth = |operation: &'static str| -> Result<bool, Fault> {
            let top = self.stack.peek(0)?;
            top.is_truthy().ok_or_else(|| {
                Fault::new(
                    FaultKind::TypeMismatch,
                    format!("cannot {}: expected an integer, got {}", operation, top.kind()),
                )
            })
        };
        let relation = |f: fn(f64, f64) -> bool| -> Result<(bool, usize), Fault> {
            let [x, y] = self.reals::<2>("compare")?;
            Ok((f(x, y), 2))
        };
        match condition {
            Condition::Zero => Ok((!truth("test for zero")?, 1)),
            Condition::NonZero => Ok((truth("test for zero")?, 1)),
            Condition::Lt => relation(|x, y| x < y),
            Condition::Gt => relation(|x, y| x > y),
            Condition::Leq => relation(|x, y| x <= y),
            Condition::Geq => relation(|x, y| x >= y),
            Condition::Eq => relation(|x, y| x == y),
            Condition::Neq => relation(|x, y| x != y),
            Condition::Null => Ok((self.stack.peek(0)?.is_null(), 1)),
            Condition::NonNull => Ok((!self.stack.peek(0)?.is_null(), 1)),
        }
    }

    /// `BR_*`: jump when the condition holds, otherwise fall through.
    pub(super) fn branch(&mut self, condition: Condition, target: i64) -> Result<(), Fault> {
        let target = self.jump_target(target)?;
        let (holds, consumed) = self.evaluate(condition)?;
        self.stack.discard(consumed)?;
        if holds {
            self.ip = target;
        }
        Ok(())
    }

    /// `IF_*`: jump to `then` when the condition holds, else to `otherwise`.
    pub(super) fn if_else(
        &mut self,
        condition: Condition,
        then: i64,
        otherwise: i64,
    ) -> Result<(), Fault> {
        let then = self.jump_target(then)?;
        let otherwise = self.jump_target(otherwise)?;
        let (holds, consumed) = self.evaluate(condition)?;
        self.stack.discard(consumed)?;
        self.ip = if holds { then } else { otherwise };
        Ok(())
    }
}

fn missing_constant(pool: &str, index: i64) -> Fault {
    Fault::new(
        FaultKind::InvalidConstant,
        format!("{} pool has no entry {}", pool, index),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shifts() {
        assert_eq!(shift_left(1, 4).unwrap(), 16);
        assert_eq!(shift_left(1, 64).unwrap(), 0);
        assert_eq!(shift_right(-8, 1).unwrap(), -4);
        assert_eq!(shift_right(-8, 200).unwrap(), -1);
        assert_eq!(shift_right(8, 1 << 40).unwrap(), 0);
        assert_eq!(
            shift_left(1, -1).unwrap_err().kind,
            FaultKind::UnsignedOperandExpected
        );
    }

    #[test]
    fn test_remainder_by_zero() {
        assert_eq!(remainder(7, 3).unwrap(), 1);
        assert_eq!(remainder(i64::MIN, -1).unwrap(), 0);
        assert_eq!(remainder(7, 0).unwrap_err().kind, FaultKind::DivisionByZero);
    }

    #[test]
    fn test_divide_message_uses_real_form() {
        let err = divide(5.0, 0.0).unwrap_err();
        assert_eq!(err.message, "cannot divide 5.0 by zero");
        assert_eq!(divide(1.0, 4.0).unwrap(), 0.25);
    }

    #[test]
    fn test_scale_and_three_way() {
        assert_eq!(scale(1.5, 2), 150.0);
        assert_eq!(scale(150.0, -2), 1.5);
        assert_eq!(three_way(2.0, 3.0), -1);
        assert_eq!(three_way(3.0, 3.0), 0);
        assert_eq!(three_way(f64::NAN, 3.0), 0);
    }
}
