//! Migration Ledger - Tracking table of applied migrations
//!
//! The ledger lives in the target database itself. Every column is TEXT:
//! it is the one column type `sqlx::Any` decodes on every backend.

use chrono::{DateTime, Utc};
use shiftlog_core::config::is_valid_identifier;
use sqlx::{AnyConnection, Row};
use std::collections::BTreeSet;
use tracing::debug;

use super::definitions::{LedgerEntry, Version};
use crate::error::{database_message, is_unique_violation, MigrateError, MigrateResult};

/// Handle on the ledger table
#[derive(Debug, Clone)]
pub struct Ledger {
    table: String,
}

impl Ledger {
    /// Create a ledger handle; the table name is interpolated into SQL, so it must be a plain identifier
    pub fn new(table: impl Into<String>) -> MigrateResult<Self> {
        let table = table.into();
        if !is_valid_identifier(&table) {
            return Err(MigrateError::InvalidTableName(table));
        }
        Ok(Self { table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the tracking table if it does not exist yet
    pub async fn ensure(&self, conn: &mut AnyConnection) -> MigrateResult<()> {
        sqlx::query(&self.create_table_sql())
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                MigrateError::LedgerUnavailable(format!(
                    "failed to create table {}: {}",
                    self.table,
                    database_message(&e)
                ))
            })?;
        Ok(())
    }

    /// Check whether the tracking table exists, without creating it
    pub async fn exists(&self, conn: &mut AnyConnection) -> MigrateResult<bool> {
        let sql = table_exists_sql(conn.backend_name());
        let row = sqlx::query(sql)
            .bind(self.table.clone())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| {
                MigrateError::LedgerUnavailable(format!(
                    "failed to look up table {}: {}",
                    self.table,
                    database_message(&e)
                ))
            })?;
        Ok(row.is_some())
    }

    /// Ledger rows for read-only callers; a missing table reads as empty
    pub async fn entries_if_present(&self, conn: &mut AnyConnection) -> MigrateResult<Vec<LedgerEntry>> {
        if self.exists(conn).await? {
            self.entries(conn).await
        } else {
            debug!(table = %self.table, "ledger table does not exist yet");
            Ok(Vec::new())
        }
    }

    /// All ledger rows, ascending by identity
    pub async fn entries(&self, conn: &mut AnyConnection) -> MigrateResult<Vec<LedgerEntry>> {
        let rows = sqlx::query(&self.select_entries_sql())
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| {
                MigrateError::LedgerUnavailable(format!(
                    "failed to query {}: {}",
                    self.table,
                    database_message(&e)
                ))
            })?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let identity: String = row
                .try_get("identity")
                .map_err(|e| MigrateError::LedgerUnavailable(format!("failed to get identity: {}", e)))?;
            let checksum: String = row
                .try_get("checksum")
                .map_err(|e| MigrateError::LedgerUnavailable(format!("failed to get checksum: {}", e)))?;
            let applied_at: String = row
                .try_get("applied_at")
                .map_err(|e| MigrateError::LedgerUnavailable(format!("failed to get applied_at: {}", e)))?;

            let version = identity.parse::<Version>().map_err(|reason| {
                MigrateError::LedgerUnavailable(format!("corrupt identity in {}: {}", self.table, reason))
            })?;
            let applied_at = DateTime::parse_from_rfc3339(&applied_at)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|e| {
                    MigrateError::LedgerUnavailable(format!(
                        "corrupt applied_at '{}' for {}: {}",
                        applied_at, version, e
                    ))
                })?;

            entries.push(LedgerEntry {
                version,
                checksum,
                applied_at,
            });
        }

        // Text ordering in SQL is lexicographic; identities order numerically.
        entries.sort_by_key(|entry| entry.version);
        debug!(table = %self.table, count = entries.len(), "loaded ledger entries");
        Ok(entries)
    }

    /// Identities of every applied migration
    pub async fn applied_identities(&self, conn: &mut AnyConnection) -> MigrateResult<BTreeSet<Version>> {
        Ok(self
            .entries(conn)
            .await?
            .into_iter()
            .map(|entry| entry.version)
            .collect())
    }

    /// Check whether an identity is recorded
    pub async fn contains(&self, conn: &mut AnyConnection, version: Version) -> MigrateResult<bool> {
        let row = sqlx::query(&self.check_entry_sql())
            .bind(version.to_string())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| MigrateError::LedgerUnavailable(database_message(&e)))?;
        Ok(row.is_some())
    }

    /// Insert one ledger row.
    ///
    /// Pass the connection of the migration's open transaction so the entry
    /// commits or rolls back together with the schema change.
    pub async fn record_applied(
        &self,
        conn: &mut AnyConnection,
        version: Version,
        checksum: &str,
        applied_at: DateTime<Utc>,
    ) -> MigrateResult<()> {
        sqlx::query(&self.record_entry_sql())
            .bind(version.to_string())
            .bind(checksum.to_string())
            .bind(applied_at.to_rfc3339())
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    MigrateError::DuplicateLedgerEntry(version)
                } else {
                    MigrateError::LedgerWrite {
                        version,
                        message: database_message(&e),
                    }
                }
            })?;
        Ok(())
    }

    /// SQL to create the migrations tracking table
    fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                identity TEXT PRIMARY KEY,\n    \
                checksum TEXT NOT NULL,\n    \
                applied_at TEXT NOT NULL\n\
            )",
            self.table
        )
    }

    /// SQL to get applied migrations
    fn select_entries_sql(&self) -> String {
        format!("SELECT identity, checksum, applied_at FROM {}", self.table)
    }

    /// SQL to check if a migration has been applied
    fn check_entry_sql(&self) -> String {
        format!("SELECT identity FROM {} WHERE identity = $1", self.table)
    }

    /// SQL to record a migration as applied
    fn record_entry_sql(&self) -> String {
        format!(
            "INSERT INTO {} (identity, checksum, applied_at) VALUES ($1, $2, $3)",
            self.table
        )
    }
}

/// Catalog query for a table name, per backend
fn table_exists_sql(backend: &str) -> &'static str {
    if backend.eq_ignore_ascii_case("sqlite") {
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = $1"
    } else {
        "SELECT table_name FROM information_schema.tables \
         WHERE table_schema = current_schema() AND table_name = $1"
    }
}
