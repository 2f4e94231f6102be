//! Migration System
//!
//! Reader (`source`), ledger, planner, executor and runner for applying
//! `<identity>_<description>.sql` scripts in order.

pub mod definitions;
pub mod executor;
pub mod ledger;
pub mod planner;
pub mod runner;
pub mod source;

pub use definitions::*;
pub use executor::MigrationExecutor;
pub use ledger::Ledger;
pub use planner::{detect_drift, find_orphans, plan, ExecutionPlan};
pub use runner::{connect, CancellationFlag, MigrationRunner, RunnerState};
pub use source::MigrationSource;
