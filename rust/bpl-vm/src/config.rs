//! Engine limits and fault policy.
//!
//! Every limit defaults to 0, which disables it: a bare `Machine` runs until
//! HALT and bounding execution is up to the host. The CLI reads its own
//! defaults from the `[vm]` table of `bpl.toml`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Maximum number of values on the operand stack; 0 disables the limit.
    pub max_stack_depth: usize,
    /// Maximum number of nested CALL frames; 0 disables the limit.
    pub max_call_depth: usize,
    /// Instruction budget for one run; 0 disables the limit.
    pub max_instructions: u64,
    /// Emit every fetched instruction at TRACE level.
    pub trace: bool,
    /// Treat TypeMismatch as fatal instead of report-and-continue.
    pub fatal_type_mismatch: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_stack_depth: 0,
            max_call_depth: 0,
            max_instructions: 0,
            trace: false,
            fatal_type_mismatch: false,
        }
    }
}

impl VmConfig {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unbounded() {
        let cfg = VmConfig::default();
        assert_eq!(cfg.max_stack_depth, 0);
        assert_eq!(cfg.max_call_depth, 0);
        assert_eq!(cfg.max_instructions, 0);
        assert!(!cfg.fatal_type_mismatch);
    }
}
