//! CLI error types and exit codes

use std::path::PathBuf;

use thiserror::Error;

use dirsync_api::ApiError;
use dirsync_engine::{EngineError, StoreError};

/// Exit codes for the CLI
/// - 0: Every object converged
/// - 1: Objects did not converge, or a setup error
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: ApiError,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0} object(s) did not converge")]
    NotConverged(usize),

    #[error("Interrupted")]
    Interrupted,
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        1
    }

    /// Print the error to stderr.
    pub fn print(&self) {
        if std::env::var("NO_COLOR").is_err() {
            eprintln!("\x1b[31mError:\x1b[0m {self}");
        } else {
            eprintln!("Error: {self}");
        }
    }
}
