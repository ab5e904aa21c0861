//! Error taxonomy shared by all actions.
//!
//! Configuration problems, per-statement database failures, replication
//! driver failures and operator interruption are kept as distinct variants
//! so the dispatcher can decide how loudly to report each one.

use std::path::PathBuf;

use crate::db::DbError;

/// Errors produced by the manager's actions.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// A file the action depends on does not exist.
    #[error("Unable to open file {}", path.display())]
    ConfigNotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// An operator-supplied `/regex/` pattern failed to compile.
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The pattern exactly as supplied.
        pattern: String,
        /// Underlying regex compilation error.
        #[source]
        source: regex::Error,
    },

    /// An option file could not be read or contains a malformed line.
    #[error("{}:{line}: {message}", path.display())]
    OptionFile {
        /// File containing the problem.
        path: PathBuf,
        /// 1-based line number, 0 when the whole file is affected.
        line: usize,
        /// Human-readable description.
        message: String,
    },

    /// A statement sent to the server failed.
    #[error(transparent)]
    Database(#[from] DbError),

    /// `SHOW SLAVE STATUS` returned no rows.
    #[error("server is not configured as a replica")]
    NotReplica,

    /// The operator interrupted the run.
    #[error("interrupted by operator")]
    Interrupted,
}

impl ManagerError {
    /// Whether this error is a missing-resource failure, reported without
    /// diagnostic detail.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ConfigNotFound { .. })
    }
}
