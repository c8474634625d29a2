use bpl_core::ProgramError;
use bpl_vm::VmError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("cannot read '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid program '{}': {source}", .path.display())]
    Program {
        path: PathBuf,
        #[source]
        source: ProgramError,
    },
    #[error("invalid toml in '{}': {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{0} already exists, not overwriting")]
    AlreadyExists(PathBuf),
    #[error(transparent)]
    Vm(#[from] VmError),
    #[error(transparent)]
    Io(#[from] io::Error),
}
