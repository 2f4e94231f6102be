//! # shiftlog-engine
//!
//! Applies versioned SQL migration scripts to a database, recording each
//! applied script in a ledger table inside that same database.
//!
//! ```rust,no_run
//! use shiftlog_engine::{MigrationConfig, MigrationRunner};
//!
//! # async fn example() -> shiftlog_engine::MigrateResult<()> {
//! let config = MigrationConfig::new("migrations", "postgres://localhost/app");
//! let mut runner = MigrationRunner::new(config)?;
//! let report = runner.run().await?;
//! println!("applied {} migration(s)", report.applied_count());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod migrations;

pub use error::{MigrateError, MigrateResult};
pub use migrations::*;
