//! Migration Executor - applies one migration inside one transaction
//!
//! The schema change and its ledger entry commit together or not at all.
//! A `sqlx::Transaction` rolls back when dropped, so any early exit leaves
//! nothing behind.

use chrono::Utc;
use sqlx::{Any, AnyConnection, Connection, Executor, Transaction};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::definitions::{ExecutionResult, ExecutionStatus, MigrationFile, Version};
use super::ledger::Ledger;
use crate::error::{database_message, MigrateError, MigrateResult};

/// Applies migrations one at a time
#[derive(Debug, Clone)]
pub struct MigrationExecutor {
    ledger: Ledger,
}

impl MigrationExecutor {
    pub fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Apply a single migration and report what happened.
    ///
    /// Never returns an error: failures are reported through the result's
    /// status and error detail.
    pub async fn apply(&self, migration: &MigrationFile, conn: &mut AnyConnection) -> ExecutionResult {
        let started = Instant::now();
        info!(version = %migration.version, description = %migration.description, "applying migration");

        let (status, error) = match self.apply_in_transaction(migration, conn).await {
            Ok(()) => (ExecutionStatus::Applied, None),
            Err(err) => self.reconcile(conn, migration.version, err).await,
        };

        let duration_ms = elapsed_ms(started);
        if status == ExecutionStatus::Applied {
            info!(version = %migration.version, duration_ms, "migration applied");
        }

        ExecutionResult {
            version: migration.version,
            description: migration.description.clone(),
            status,
            error,
            duration_ms,
        }
    }

    async fn apply_in_transaction(&self, migration: &MigrationFile, conn: &mut AnyConnection) -> MigrateResult<()> {
        let version = migration.version;
        let mut transaction = conn.begin().await.map_err(|e| MigrateError::Execution {
            version,
            message: format!("failed to start transaction: {}", database_message(&e)),
        })?;

        if !migration.sql.trim().is_empty() {
            if let Err(e) = (&mut *transaction).execute(migration.sql.as_str()).await {
                rollback(transaction, version).await;
                return Err(MigrateError::Execution {
                    version,
                    message: database_message(&e),
                });
            }
        }

        // A failed ledger write takes the schema change down with it.
        if let Err(e) = self
            .ledger
            .record_applied(&mut transaction, version, &migration.checksum(), Utc::now())
            .await
        {
            rollback(transaction, version).await;
            return Err(e);
        }

        transaction.commit().await.map_err(|e| MigrateError::Commit {
            version,
            message: database_message(&e),
        })
    }

    /// Decide what a rolled-back failure means.
    ///
    /// A racing runner can make this one fail on its own SQL (the table
    /// already exists) or on the ledger insert. Either way, if the identity
    /// is recorded now, the other runner applied it first.
    async fn reconcile(
        &self,
        conn: &mut AnyConnection,
        version: Version,
        err: MigrateError,
    ) -> (ExecutionStatus, Option<String>) {
        match self.ledger.contains(conn, version).await {
            Ok(true) => {
                warn!(%version, error = %err, "migration was applied concurrently by another runner");
                (ExecutionStatus::AppliedConcurrently, None)
            }
            Ok(false) => {
                error!(%version, error = %err, "migration failed");
                (ExecutionStatus::Failed, Some(err.detail()))
            }
            Err(check) => {
                error!(%version, error = %err, ledger_error = %check, "migration failed and the ledger could not be rechecked");
                (ExecutionStatus::Failed, Some(format!("{}; {}", err.detail(), check)))
            }
        }
    }
}

/// Milliseconds since `started`, saturating instead of truncating
pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

async fn rollback(transaction: Transaction<'_, Any>, version: Version) {
    match transaction.rollback().await {
        Ok(()) => debug!(%version, "transaction rolled back"),
        Err(e) => warn!(%version, error = %e, "rollback failed; the open transaction is discarded with the connection"),
    }
}
