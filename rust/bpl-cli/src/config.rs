//! Configuration file parsing for `bpl.toml`.
//!
//! Searches current directory then ancestors, falling back to
//! `~/.config/bpl/bpl.toml` if no project-level file is found.

use crate::error::CliError;
use bpl_vm::VmConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "bpl.toml";

/// Instruction budget `bpl run` applies unless `bpl.toml` or a flag says otherwise.
pub const DEFAULT_MAX_INSTRUCTIONS: u64 = 10_000_000;

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct BplConfig {
    #[serde(default)]
    pub vm: VmSection,
}

/// The `[vm]` table. Unset keys fall back to the CLI defaults.
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct VmSection {
    pub max_stack_depth: Option<usize>,
    pub max_call_depth: Option<usize>,
    pub max_instructions: Option<u64>,
    pub trace: Option<bool>,
    pub fatal_type_mismatch: Option<bool>,
}

impl VmSection {
    /// Engine config for a CLI run: library defaults, plus the CLI's
    /// instruction budget, overlaid with the keys set in the file.
    pub fn resolve(&self) -> VmConfig {
        let base = VmConfig::default();
        VmConfig {
            max_stack_depth: self.max_stack_depth.unwrap_or(base.max_stack_depth),
            max_call_depth: self.max_call_depth.unwrap_or(base.max_call_depth),
            max_instructions: self.max_instructions.unwrap_or(DEFAULT_MAX_INSTRUCTIONS),
            trace: self.trace.unwrap_or(base.trace),
            fatal_type_mismatch: self.fatal_type_mismatch.unwrap_or(base.fatal_type_mismatch),
        }
    }
}

impl BplConfig {
    /// Load config from `bpl.toml`, searching current dir then parents.
    /// Returns `Default` when no file is found.
    pub fn load() -> Result<Self, CliError> {
        match Self::find()? {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load config from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, CliError> {
        let content = std::fs::read_to_string(path).map_err(|source| CliError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| CliError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Path of the config file that [`BplConfig::load`] would read.
    pub fn find() -> Result<Option<PathBuf>, CliError> {
        let cwd = std::env::current_dir()?;
        Ok(Self::find_from(&cwd).or_else(global_config))
    }

    /// Nearest `bpl.toml` in `start` or one of its ancestors.
    pub fn find_from(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILE))
            .find(|candidate| candidate.is_file())
    }

    /// Parse a TOML string directly (useful for testing and embedding).
    pub fn parse(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Generate a default `bpl.toml` template.
    pub fn default_template() -> &'static str {
        r#"# BPL VM configuration

[vm]
# 0 disables a limit
# max_stack_depth = 0
# max_call_depth = 0
# max_instructions = 10000000
# trace = false
# fatal_type_mismatch = false
"#
    }
}

fn global_config() -> Option<PathBuf> {
    let home = std::env::var("HOME").ok().map(PathBuf::from)?;
    let path = home.join(".config").join("bpl").join(CONFIG_FILE);
    path.is_file().then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_returns_default() {
        let cfg = BplConfig::parse("").expect("empty toml is valid");
        assert_eq!(cfg, BplConfig::default());
    }

    #[test]
    fn partial_vm_table_keeps_other_defaults() {
        let cfg = BplConfig::parse(
            r#"
[vm]
max_instructions = 500
fatal_type_mismatch = true
"#,
        )
        .expect("should parse");
        let vm = cfg.vm.resolve();
        assert_eq!(vm.max_instructions, 500);
        assert!(vm.fatal_type_mismatch);
        assert_eq!(vm.max_call_depth, VmConfig::default().max_call_depth);
    }

    #[test]
    fn cli_applies_its_own_instruction_budget() {
        let vm = BplConfig::default().vm.resolve();
        assert_eq!(vm.max_instructions, DEFAULT_MAX_INSTRUCTIONS);
        assert_eq!(VmConfig::default().max_instructions, 0);

        let cfg = BplConfig::parse("[vm]\ntrace = true\n").expect("should parse");
        assert_eq!(cfg.vm.resolve().max_instructions, DEFAULT_MAX_INSTRUCTIONS);

        let cfg = BplConfig::parse("[vm]\nmax_instructions = 0\n").expect("should parse");
        assert_eq!(cfg.vm.resolve().max_instructions, 0);
    }

    #[test]
    fn invalid_toml_returns_error() {
        assert!(BplConfig::parse("[vm").is_err());
        assert!(BplConfig::parse("[vm]\nmax_call_depth = \"deep\"").is_err());
    }

    #[test]
    fn default_template_round_trips() {
        let cfg = BplConfig::parse(BplConfig::default_template())
            .expect("default template must be valid toml");
        assert_eq!(cfg, BplConfig::default());
    }

    #[test]
    fn finds_config_in_ancestor() {
        let root = std::env::temp_dir().join(format!("bpl-config-{}", std::process::id()));
        let nested = root.join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.join(CONFIG_FILE), "[vm]\ntrace = true\n").unwrap();

        let found = BplConfig::find_from(&nested).expect("config in ancestor");
        assert_eq!(found, root.join(CONFIG_FILE));
        assert_eq!(BplConfig::load_from(&found).unwrap().vm.trace, Some(true));

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = BplConfig::load_from(Path::new("/nonexistent/bpl.toml")).unwrap_err();
        assert!(matches!(err, CliError::Read { .. }));
    }
}
