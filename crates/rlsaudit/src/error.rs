//! Error types for rlsaudit

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Audit error type
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Ledger error: {0}")]
    Ledger(#[from] rusqlite::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid configuration:\n  - {}", .0.join("\n  - "))]
    InvalidConfig(Vec<String>),

    #[error("Cannot read identity file {path}: {source}")]
    Identity {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid output chain '{0}': only ASCII letters and digits are allowed")]
    InvalidChain(String),

    #[error("External command {command} failed: {message}")]
    Action { command: String, message: String },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AuditError>;
