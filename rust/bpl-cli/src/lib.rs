//! Support library for the `bpl` command-line runner.

pub mod args;
pub mod colors;
pub mod config;
pub mod error;

use bpl_core::Program;
use error::CliError;
use std::path::Path;

/// Read and decode a JSON program file.
pub fn load_program(path: &Path) -> Result<Program, CliError> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Program::from_json(&text).map_err(|source| CliError::Program {
        path: path.to_path_buf(),
        source,
    })
}
