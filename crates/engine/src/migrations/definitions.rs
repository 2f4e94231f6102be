//! Migration Definitions - Core types and structures for migrations
//!
//! Defines the types shared by the reader, ledger, planner, executor and
//! runner, including the run report handed back to callers.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use shiftlog_core::config::{AppConfig, DEFAULT_MIGRATIONS_DIR, DEFAULT_MIGRATIONS_TABLE};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Migration identity: the numeric prefix of a migration filename.
///
/// `20251031012958_create_wellness_schema.sql` has version `20251031012958`.
/// Ordering is numeric, so `9_a.sql` sorts before `10_b.sql`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(u64);

impl Version {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("identity prefix is empty".to_string());
        }
        if let Some(bad) = s.chars().find(|c| !c.is_ascii_digit()) {
            return Err(format!("identity prefix '{}' contains non-digit '{}'", s, bad));
        }
        s.parse::<u64>()
            .map(Version)
            .map_err(|_| format!("identity prefix '{}' does not fit in 64 bits", s))
    }
}

// Serialized as a string: 14-digit timestamps exceed what JSON consumers
// can hold exactly in a double.
impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Hex-encoded SHA-256 of a migration's SQL text
pub fn checksum(sql: &str) -> String {
    hex::encode(Sha256::digest(sql.as_bytes()))
}

/// A migration script discovered on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// Identity parsed from the filename prefix
    pub version: Version,
    /// Filename remainder after the first underscore, without extension
    pub description: String,
    /// SQL text, executed verbatim
    pub sql: String,
    /// Where the file was read from
    pub path: PathBuf,
}

impl MigrationFile {
    /// Content hash recorded in the ledger when this migration is applied
    pub fn checksum(&self) -> String {
        checksum(&self.sql)
    }
}

/// A row of the migration ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub version: Version,
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
}

/// Configuration for the migration runner
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Directory where migration files are stored
    pub migrations_dir: PathBuf,
    /// Table name for tracking migrations
    pub migrations_table: String,
    /// Connection URL understood by `sqlx::AnyConnection`
    pub database_url: String,
    /// Plan only, never execute
    pub dry_run: bool,
}

impl MigrationConfig {
    pub fn new(migrations_dir: impl Into<PathBuf>, database_url: impl Into<String>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
            migrations_table: DEFAULT_MIGRATIONS_TABLE.to_string(),
            database_url: database_url.into(),
            dry_run: false,
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.migrations_table = table.into();
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Build from validated application configuration.
    ///
    /// Returns `None` when no database URL is configured.
    pub fn from_app_config(config: &AppConfig) -> Option<Self> {
        let url = config.database_url.clone()?;
        Some(Self::new(config.migrations_dir.clone(), url).with_table(config.migrations_table.clone()))
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MIGRATIONS_DIR, String::new())
    }
}

/// Outcome of one migration within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Schema change and ledger entry committed together
    Applied,
    /// Nothing persisted; see the error detail
    Failed,
    /// Not attempted (dry run, cancellation, or an earlier failure)
    Skipped,
    /// Another runner recorded this migration first; nothing persisted by this run
    AppliedConcurrently,
}

impl ExecutionStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, ExecutionStatus::Failed)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            ExecutionStatus::Applied => "applied",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Skipped => "skipped",
            ExecutionStatus::AppliedConcurrently => "applied concurrently",
        };
        f.write_str(status)
    }
}

/// Per-migration result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub version: Version,
    pub description: String,
    pub status: ExecutionStatus,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub(crate) fn skipped(migration: &MigrationFile) -> Self {
        Self {
            version: migration.version,
            description: migration.description.clone(),
            status: ExecutionStatus::Skipped,
            error: None,
            duration_ms: 0,
        }
    }
}

/// Overall outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    CompletedWithFailure,
}

/// Ledger entry whose file content changed after it was applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecksumDrift {
    pub version: Version,
    pub recorded: String,
    pub current: String,
}

/// Ledger entry with no matching file in the migrations directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanedEntry {
    pub version: Version,
    pub applied_at: DateTime<Utc>,
}

/// Result of running migrations
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Overall status
    pub status: RunStatus,
    /// Whether execution was skipped on purpose
    pub dry_run: bool,
    /// One entry per planned migration, in plan order
    pub results: Vec<ExecutionResult>,
    /// Identities already in the ledger before this run, ascending; not re-run
    pub previously_applied: Vec<Version>,
    /// Applied migrations whose files have since changed
    pub drift: Vec<ChecksumDrift>,
    /// Ledger entries without a file
    pub orphans: Vec<OrphanedEntry>,
    /// Total execution time in milliseconds
    pub execution_time_ms: u64,
}

impl RunReport {
    /// Number of migrations this run committed
    pub fn applied_count(&self) -> usize {
        self.count(ExecutionStatus::Applied)
    }

    pub fn skipped_count(&self) -> usize {
        self.count(ExecutionStatus::Skipped)
    }

    /// The failure that stopped the run, if any
    pub fn first_failure(&self) -> Option<&ExecutionResult> {
        self.results.iter().find(|r| r.status.is_failure())
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    fn count(&self, status: ExecutionStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }
}

/// Migration status in the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MigrationState {
    /// Migration is pending (not yet applied)
    Pending,
    /// Migration has been applied
    Applied {
        applied_at: DateTime<Utc>,
        /// File content no longer matches the recorded checksum
        drifted: bool,
    },
}

/// One line of `shiftlog migrate status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub version: Version,
    pub description: String,
    #[serde(flatten)]
    pub state: MigrationState,
}
