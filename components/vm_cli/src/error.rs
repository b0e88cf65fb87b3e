//! Error types for the CLI

use core_types::Trap;
use thiserror::Error;

/// CLI-specific errors
#[derive(Debug, Error)]
pub enum CliError {
    /// A source or module file could not be read or written
    #[error("cannot access '{path}': {source}")]
    Io {
        /// Path the operation was aimed at
        path: String,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// The text assembler rejected a line
    #[error("line {line}: {message}")]
    Assembly {
        /// 1-based source line
        line: usize,
        /// What was wrong with it
        message: String,
    },

    /// A binary module failed to decode
    #[error("malformed module: {0}")]
    ModuleFormat(String),

    /// The requested entry atom does not exist in the module
    #[error("no atom named '{0}' in the module")]
    MissingEntry(String),

    /// The program aborted while running
    #[error("{0}")]
    Aborted(#[from] Trap),

    /// The run report could not be encoded
    #[error("cannot encode the run report: {0}")]
    Report(#[from] serde_json::Error),
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
