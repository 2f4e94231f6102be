//! Migration Runner - Executes migrations against the database
//!
//! Drives discovery, planning and execution for one invocation:
//! `Idle -> Planning -> Executing -> Completed | CompletedWithFailure`.
//! Migrations run strictly in order and the first failure stops the run.

use sqlx::{AnyConnection, Connection};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::definitions::{
    ExecutionResult, MigrationConfig, MigrationFile, MigrationState, MigrationStatus, RunReport,
    RunStatus,
};
use super::executor::{elapsed_ms, MigrationExecutor};
use super::ledger::Ledger;
use super::planner;
use super::source::MigrationSource;
use crate::error::{MigrateError, MigrateResult};

/// Lifecycle of a runner invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Planning,
    Executing,
    Completed,
    CompletedWithFailure,
}

impl RunnerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunnerState::Completed | RunnerState::CompletedWithFailure)
    }
}

/// Shared stop request, honoured between migrations only
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Open the single connection used for a whole invocation
pub async fn connect(database_url: &str) -> MigrateResult<AnyConnection> {
    sqlx::any::install_default_drivers();
    AnyConnection::connect(database_url)
        .await
        .map_err(|e| MigrateError::Connection(e.to_string()))
}

/// Migration runner that executes migrations against a database
pub struct MigrationRunner {
    config: MigrationConfig,
    source: MigrationSource,
    executor: MigrationExecutor,
    cancellation: CancellationFlag,
    state: RunnerState,
}

impl MigrationRunner {
    /// Create a new migration runner
    pub fn new(config: MigrationConfig) -> MigrateResult<Self> {
        let ledger = Ledger::new(config.migrations_table.clone())?;
        Ok(Self {
            source: MigrationSource::new(config.migrations_dir.clone()),
            executor: MigrationExecutor::new(ledger),
            cancellation: CancellationFlag::new(),
            state: RunnerState::Idle,
            config,
        })
    }

    /// Use a caller-owned cancellation flag
    pub fn with_cancellation(mut self, cancellation: CancellationFlag) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    pub fn cancellation(&self) -> CancellationFlag {
        self.cancellation.clone()
    }

    /// Run all pending migrations.
    ///
    /// Setup problems (files, connection, ledger) are returned as `Err`
    /// before any migration runs; migration failures are reported in the
    /// `RunReport`.
    pub async fn run(&mut self) -> MigrateResult<RunReport> {
        let started = Instant::now();
        self.transition(RunnerState::Planning);

        let migrations = match self.source.discover() {
            Ok(migrations) => migrations,
            Err(e) => return Err(self.abort(e)),
        };

        let mut conn = match connect(&self.config.database_url).await {
            Ok(conn) => conn,
            Err(e) => return Err(self.abort(e)),
        };

        let outcome = self.run_on(&mut conn, migrations, started).await;
        close(conn).await;

        outcome.map_err(|e| self.abort(e))
    }

    /// Status of every migration file without executing anything
    pub async fn status(&self) -> MigrateResult<Vec<MigrationStatus>> {
        let migrations = self.source.discover()?;
        let mut conn = connect(&self.config.database_url).await?;

        // Read-only: a database that was never migrated has no ledger yet.
        let entries = self.executor.ledger().entries_if_present(&mut conn).await;
        close(conn).await;
        let entries = entries?;

        let drifted: Vec<_> = planner::detect_drift(&migrations, &entries)
            .into_iter()
            .map(|d| d.version)
            .collect();

        Ok(migrations
            .into_iter()
            .map(|migration| {
                let state = match entries.iter().find(|e| e.version == migration.version) {
                    Some(entry) => MigrationState::Applied {
                        applied_at: entry.applied_at,
                        drifted: drifted.contains(&migration.version),
                    },
                    None => MigrationState::Pending,
                };
                MigrationStatus {
                    version: migration.version,
                    description: migration.description,
                    state,
                }
            })
            .collect())
    }

    async fn run_on(
        &mut self,
        conn: &mut AnyConnection,
        migrations: Vec<MigrationFile>,
        started: Instant,
    ) -> MigrateResult<RunReport> {
        let ledger = self.executor.ledger();
        let entries = if self.config.dry_run {
            ledger.entries_if_present(conn).await?
        } else {
            ledger.ensure(conn).await?;
            ledger.entries(conn).await?
        };
        let applied: BTreeSet<_> = entries.iter().map(|e| e.version).collect();

        let plan = planner::plan(&migrations, &applied);
        let drift = planner::detect_drift(&migrations, &entries);
        let orphans = planner::find_orphans(&migrations, &entries);

        for d in &drift {
            warn!(
                version = %d.version,
                recorded = %d.recorded,
                current = %d.current,
                "applied migration changed on disk; it will not be re-run"
            );
        }
        for o in &orphans {
            warn!(version = %o.version, "ledger entry has no migration file");
        }

        info!(
            total = migrations.len(),
            applied = entries.len(),
            pending = plan.len(),
            dry_run = self.config.dry_run,
            "migration plan ready"
        );

        let (results, halted) = if self.config.dry_run {
            (plan.migrations().iter().map(ExecutionResult::skipped).collect(), false)
        } else {
            self.transition(RunnerState::Executing);
            self.execute_plan(conn, plan.migrations()).await
        };

        let status = if halted {
            self.transition(RunnerState::CompletedWithFailure);
            RunStatus::CompletedWithFailure
        } else {
            self.transition(RunnerState::Completed);
            RunStatus::Completed
        };

        Ok(RunReport {
            status,
            dry_run: self.config.dry_run,
            results,
            previously_applied: applied.into_iter().collect(),
            drift,
            orphans,
            execution_time_ms: elapsed_ms(started),
        })
    }

    /// Apply `plan` in order; the flag is true when the run stopped early
    async fn execute_plan(
        &self,
        conn: &mut AnyConnection,
        plan: &[MigrationFile],
    ) -> (Vec<ExecutionResult>, bool) {
        let mut results = Vec::with_capacity(plan.len());
        let mut halted = false;

        for migration in plan {
            if halted {
                results.push(ExecutionResult::skipped(migration));
                continue;
            }
            if self.cancellation.is_cancelled() {
                warn!(version = %migration.version, "cancellation requested; not starting further migrations");
                halted = true;
                results.push(ExecutionResult::skipped(migration));
                continue;
            }

            let result = self.executor.apply(migration, conn).await;
            if result.status.is_failure() {
                // Later migrations may depend on this one's schema.
                halted = true;
            }
            results.push(result);
        }

        (results, halted)
    }

    fn transition(&mut self, next: RunnerState) {
        debug!(from = ?self.state, to = ?next, "runner state change");
        self.state = next;
    }

    fn abort(&mut self, err: MigrateError) -> MigrateError {
        self.transition(RunnerState::CompletedWithFailure);
        err
    }
}

async fn close(conn: AnyConnection) {
    if let Err(e) = conn.close().await {
        warn!(error = %e, "failed to close database connection cleanly");
    }
}
