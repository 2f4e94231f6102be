//! Error types for the migration engine
//!
//! Reader and ledger failures surface as setup errors from the runner;
//! executor failures are folded into an `ExecutionResult` carrying the
//! migration's identity.

use std::path::PathBuf;
use thiserror::Error;

use crate::migrations::definitions::Version;

/// Result type alias for migration operations
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Error types for migration discovery, bookkeeping and execution
#[derive(Debug, Error)]
pub enum MigrateError {
    /// Migrations directory is absent or not a directory
    #[error("Migrations directory not found: {}", .0.display())]
    MissingDirectory(PathBuf),

    /// Filename does not start with a parseable identity
    #[error("Malformed migration identity in {}: {reason}", .path.display())]
    MalformedIdentity { path: PathBuf, reason: String },

    /// Two files resolve to the same identity
    #[error(
        "Duplicate migration identity {version}: {} and {}",
        .first.display(),
        .second.display()
    )]
    DuplicateIdentity {
        version: Version,
        first: PathBuf,
        second: PathBuf,
    },

    /// Migration file could not be read
    #[error("Failed to read migration file {}: {source}", .path.display())]
    UnreadableFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Database could not be reached
    #[error("Failed to connect to database: {0}")]
    Connection(String),

    /// Ledger table could not be created or read
    #[error("Migration ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// Ledger already holds an entry for this identity
    #[error("Migration {0} is already recorded in the ledger")]
    DuplicateLedgerEntry(Version),

    /// Recording the ledger entry failed for a reason other than a duplicate
    #[error("Failed to record migration {version}: {message}")]
    LedgerWrite { version: Version, message: String },

    /// The migration's own SQL failed
    #[error("Failed to execute migration {version}: {message}")]
    Execution { version: Version, message: String },

    /// Transaction could not be committed
    #[error("Failed to commit migration {version}: {message}")]
    Commit { version: Version, message: String },

    /// Ledger table name is not a plain SQL identifier
    #[error("Invalid ledger table name '{0}'")]
    InvalidTableName(String),
}

impl MigrateError {
    /// The identity this error is attached to, if any
    pub fn version(&self) -> Option<Version> {
        match self {
            MigrateError::DuplicateIdentity { version, .. }
            | MigrateError::LedgerWrite { version, .. }
            | MigrateError::Execution { version, .. }
            | MigrateError::Commit { version, .. } => Some(*version),
            MigrateError::DuplicateLedgerEntry(version) => Some(*version),
            _ => None,
        }
    }

    /// Message to show in a run report.
    ///
    /// SQL failures report the database's own text unchanged.
    pub fn detail(&self) -> String {
        match self {
            MigrateError::Execution { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Raw message text of a database error, without sqlx's wrapping prefix
pub(crate) fn database_message(err: &sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db_err) => db_err.message().to_string(),
        other => other.to_string(),
    }
}

/// True when the database rejected a write because of a unique or primary key constraint
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}
