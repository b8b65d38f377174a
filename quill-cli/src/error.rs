//! CLI failures that prevent a command from running at all
//!
//! Compilation diagnostics are not errors here: they are reported and
//! turned into the exit code.

use quill_config::ConfigError;
use quill_core::{CompileError, ResolutionFailure};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid project file '{path}': {source}")]
    ProjectFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid registry mirror '{path}': {message}")]
    RegistryMirror { path: PathBuf, message: String },

    #[error("cannot open log file '{path}': {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no entry modules: pass them on the command line or list them under \"entries\" in quill.json")]
    NoEntries,

    #[error(transparent)]
    Cache(#[from] CompileError),

    #[error(transparent)]
    Resolution(#[from] ResolutionFailure),
}

pub type CliResult<T> = Result<T, CliError>;
