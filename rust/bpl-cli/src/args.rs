//! Native program arguments given on the command line.

use bpl_core::Value;

/// Parse one `--arg` value: an Integer if it parses as one, then a Real,
/// otherwise a String.
pub fn parse_arg(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::Int(n);
    }
    if let Ok(r) = raw.parse::<f64>() {
        return Value::Real(r);
    }
    Value::from(raw)
}

pub fn parse_args<S: AsRef<str>>(raw: &[S]) -> Vec<Value> {
    raw.iter().map(|s| parse_arg(s.as_ref())).collect()
}
