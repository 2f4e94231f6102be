//! End-to-end runs against a temporary SQLite database through `sqlx::Any`.

use std::fs;
use std::path::Path;

use chrono::Utc;
use shiftlog_engine::{
    checksum, connect, CancellationFlag, ExecutionStatus, Ledger, MigrateError, MigrationConfig,
    MigrationExecutor, MigrationFile, MigrationRunner, MigrationState, RunStatus, RunnerState,
    Version,
};
use sqlx::{AnyConnection, Row};
use tempfile::TempDir;

struct Fixture {
    _root: TempDir,
    migrations_dir: std::path::PathBuf,
    database_url: String,
}

impl Fixture {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        let migrations_dir = root.path().join("migrations");
        fs::create_dir(&migrations_dir).unwrap();
        let database_url = format!("sqlite://{}?mode=rwc", root.path().join("app.db").display());
        Self {
            _root: root,
            migrations_dir,
            database_url,
        }
    }

    fn write(&self, name: &str, sql: &str) {
        fs::write(self.migrations_dir.join(name), sql).unwrap();
    }

    fn config(&self) -> MigrationConfig {
        MigrationConfig::new(&self.migrations_dir, &self.database_url)
    }

    fn runner(&self) -> MigrationRunner {
        MigrationRunner::new(self.config()).unwrap()
    }

    async fn conn(&self) -> AnyConnection {
        connect(&self.database_url).await.unwrap()
    }
}

async fn table_exists(conn: &mut AnyConnection, table: &str) -> bool {
    sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = $1")
        .bind(table.to_string())
        .fetch_optional(&mut *conn)
        .await
        .unwrap()
        .is_some()
}

async fn ledger_identities(conn: &mut AnyConnection) -> Vec<String> {
    sqlx::query("SELECT identity FROM schema_migrations ORDER BY identity")
        .fetch_all(&mut *conn)
        .await
        .unwrap()
        .iter()
        .map(|row| row.try_get::<String, _>("identity").unwrap())
        .collect()
}

fn seed_abc(fixture: &Fixture) {
    fixture.write("1_create_a.sql", "CREATE TABLE a (id INTEGER PRIMARY KEY);");
    fixture.write("2_create_b.sql", "CREATE TABLE b (id INTEGER PRIMARY KEY);");
    fixture.write("3_create_c.sql", "CREATE TABLE c (id INTEGER PRIMARY KEY);");
}

#[tokio::test]
async fn test_run_applies_all_and_is_idempotent() {
    let fixture = Fixture::new();
    seed_abc(&fixture);

    let mut runner = fixture.runner();
    let report = runner.run().await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(runner.state(), RunnerState::Completed);
    assert_eq!(report.applied_count(), 3);
    assert!(report.previously_applied.is_empty());
    let versions: Vec<u64> = report.results.iter().map(|r| r.version.value()).collect();
    assert_eq!(versions, vec![1, 2, 3]);

    let mut conn = fixture.conn().await;
    assert_eq!(ledger_identities(&mut conn).await, vec!["1", "2", "3"]);
    for table in ["a", "b", "c"] {
        assert!(table_exists(&mut conn, table).await);
    }

    // Second run: nothing new
    let report = fixture.runner().run().await.unwrap();
    assert_eq!(report.status, RunStatus::Completed);
    assert!(report.results.is_empty());
    assert_eq!(
        report.previously_applied,
        vec![Version::new(1), Version::new(2), Version::new(3)]
    );
    assert_eq!(ledger_identities(&mut conn).await.len(), 3);
}

#[tokio::test]
async fn test_only_unapplied_migrations_run_in_order() {
    let fixture = Fixture::new();
    fixture.write("1_create_a.sql", "CREATE TABLE a (id INTEGER PRIMARY KEY);");
    fixture.runner().run().await.unwrap();

    fixture.write("3_create_c.sql", "CREATE TABLE c (id INTEGER PRIMARY KEY, b_id INTEGER REFERENCES b (id));");
    fixture.write("2_create_b.sql", "CREATE TABLE b (id INTEGER PRIMARY KEY);");

    let report = fixture.runner().run().await.unwrap();
    let versions: Vec<u64> = report.results.iter().map(|r| r.version.value()).collect();
    assert_eq!(versions, vec![2, 3]);
    assert!(report.results.iter().all(|r| r.status == ExecutionStatus::Applied));
    assert_eq!(report.previously_applied, vec![Version::new(1)]);
}

#[tokio::test]
async fn test_failure_stops_the_run_and_leaves_no_trace() {
    let fixture = Fixture::new();
    fixture.write("1_create_a.sql", "CREATE TABLE a (id INTEGER PRIMARY KEY);");
    fixture.runner().run().await.unwrap();

    fixture.write(
        "2_create_b.sql",
        "CREATE TABLE b (id INTEGER PRIMARY KEY);\nINSERT INTO missing_table (id) VALUES (1);",
    );
    fixture.write("3_create_c.sql", "CREATE TABLE c (id INTEGER PRIMARY KEY);");

    let mut runner = fixture.runner();
    let report = runner.run().await.unwrap();

    assert_eq!(report.status, RunStatus::CompletedWithFailure);
    assert_eq!(runner.state(), RunnerState::CompletedWithFailure);
    // A is named as already applied and was not re-run
    assert_eq!(report.previously_applied, vec![Version::new(1)]);
    assert!(report.results.iter().all(|r| r.version != Version::new(1)));
    assert_eq!(report.results.len(), 2);

    let failed = &report.results[0];
    assert_eq!(failed.version, Version::new(2));
    assert_eq!(failed.status, ExecutionStatus::Failed);
    assert!(failed
        .error
        .as_deref()
        .unwrap()
        .contains("no such table: missing_table"));
    assert_eq!(report.first_failure().unwrap().version, Version::new(2));

    assert_eq!(report.results[1].version, Version::new(3));
    assert_eq!(report.results[1].status, ExecutionStatus::Skipped);

    let mut conn = fixture.conn().await;
    assert!(!table_exists(&mut conn, "b").await, "partial schema change was committed");
    assert!(!table_exists(&mut conn, "c").await, "migration after a failure was attempted");
    assert_eq!(ledger_identities(&mut conn).await, vec!["1"]);
}

#[tokio::test]
async fn test_ledger_write_failure_rolls_back_schema_change() {
    let fixture = Fixture::new();
    fixture.runner().run().await.unwrap();

    // The trigger makes the ledger insert fail after the migration's own SQL succeeded.
    fixture.write(
        "1_create_c.sql",
        "CREATE TABLE c (id INTEGER PRIMARY KEY);\n\
         CREATE TRIGGER reject_ledger BEFORE INSERT ON schema_migrations\n\
         BEGIN SELECT RAISE(ABORT, 'ledger is read-only'); END;",
    );

    let report = fixture.runner().run().await.unwrap();
    assert_eq!(report.status, RunStatus::CompletedWithFailure);
    let result = &report.results[0];
    assert_eq!(result.status, ExecutionStatus::Failed);
    let error = result.error.as_deref().unwrap();
    assert!(error.contains("Failed to record migration 1"), "{}", error);
    assert!(error.contains("ledger is read-only"), "{}", error);

    let mut conn = fixture.conn().await;
    assert!(!table_exists(&mut conn, "c").await);
    assert!(ledger_identities(&mut conn).await.is_empty());
}

#[tokio::test]
async fn test_dry_run_plans_without_executing() {
    let fixture = Fixture::new();
    seed_abc(&fixture);

    let mut runner = MigrationRunner::new(fixture.config().with_dry_run(true)).unwrap();
    let report = runner.run().await.unwrap();

    assert!(report.dry_run);
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.skipped_count(), 3);
    assert_eq!(report.applied_count(), 0);

    let mut conn = fixture.conn().await;
    assert!(!table_exists(&mut conn, "a").await);
    assert!(!table_exists(&mut conn, "schema_migrations").await, "dry run created the ledger");
}

#[tokio::test]
async fn test_dry_run_after_real_run_sees_ledger() {
    let fixture = Fixture::new();
    fixture.write("1_create_a.sql", "CREATE TABLE a (id INTEGER PRIMARY KEY);");
    fixture.runner().run().await.unwrap();
    fixture.write("2_create_b.sql", "CREATE TABLE b (id INTEGER PRIMARY KEY);");

    let report = MigrationRunner::new(fixture.config().with_dry_run(true))
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(report.previously_applied, vec![Version::new(1)]);
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].version, Version::new(2));
    assert_eq!(report.results[0].status, ExecutionStatus::Skipped);

    let mut conn = fixture.conn().await;
    assert!(!table_exists(&mut conn, "b").await);
    assert_eq!(ledger_identities(&mut conn).await, vec!["1"]);
}

#[tokio::test]
async fn test_duplicate_identity_fails_before_touching_database() {
    let fixture = Fixture::new();
    fixture.write("001_create_a.sql", "CREATE TABLE a (id INTEGER);");
    fixture.write("1_create_b.sql", "CREATE TABLE b (id INTEGER);");

    // A database that cannot be opened: discovery must fail first.
    let config = MigrationConfig::new(&fixture.migrations_dir, "sqlite:///nonexistent/dir/app.db");
    let mut runner = MigrationRunner::new(config).unwrap();
    let err = runner.run().await.unwrap_err();

    assert!(matches!(err, MigrateError::DuplicateIdentity { .. }), "{:?}", err);
    assert_eq!(runner.state(), RunnerState::CompletedWithFailure);
}

#[tokio::test]
async fn test_setup_errors() {
    let fixture = Fixture::new();

    let config = MigrationConfig::new(fixture.migrations_dir.join("missing"), &fixture.database_url);
    let err = MigrationRunner::new(config).unwrap().run().await.unwrap_err();
    assert!(matches!(err, MigrateError::MissingDirectory(_)));

    let unreachable = format!(
        "sqlite://{}?mode=rwc",
        fixture.migrations_dir.join("no").join("such").join("app.db").display()
    );
    let config = MigrationConfig::new(&fixture.migrations_dir, unreachable);
    let err = MigrationRunner::new(config).unwrap().run().await.unwrap_err();
    assert!(matches!(err, MigrateError::Connection(_)), "{:?}", err);
}

#[tokio::test]
async fn test_changed_file_is_reported_not_rerun() {
    let fixture = Fixture::new();
    fixture.write("1_create_a.sql", "CREATE TABLE a (id INTEGER PRIMARY KEY);");
    fixture.runner().run().await.unwrap();

    fixture.write("1_create_a.sql", "CREATE TABLE a (id INTEGER PRIMARY KEY, name TEXT);");
    let report = fixture.runner().run().await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert!(report.results.is_empty());
    assert_eq!(report.drift.len(), 1);
    assert_eq!(report.drift[0].version, Version::new(1));
    assert_eq!(
        report.drift[0].recorded,
        checksum("CREATE TABLE a (id INTEGER PRIMARY KEY);")
    );

    let statuses = fixture.runner().status().await.unwrap();
    assert!(matches!(
        statuses[0].state,
        MigrationState::Applied { drifted: true, .. }
    ));
}

#[tokio::test]
async fn test_removed_file_is_reported_as_orphan() {
    let fixture = Fixture::new();
    seed_abc(&fixture);
    fixture.runner().run().await.unwrap();

    fs::remove_file(fixture.migrations_dir.join("2_create_b.sql")).unwrap();
    let report = fixture.runner().run().await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.orphans.len(), 1);
    assert_eq!(report.orphans[0].version, Version::new(2));
}

#[tokio::test]
async fn test_status_lists_pending_and_applied() {
    let fixture = Fixture::new();
    fixture.write("1_create_a.sql", "CREATE TABLE a (id INTEGER PRIMARY KEY);");
    fixture.runner().run().await.unwrap();
    fixture.write("2_create_b.sql", "CREATE TABLE b (id INTEGER PRIMARY KEY);");

    let statuses = fixture.runner().status().await.unwrap();
    assert_eq!(statuses.len(), 2);
    assert!(matches!(
        statuses[0].state,
        MigrationState::Applied { drifted: false, .. }
    ));
    assert_eq!(statuses[1].state, MigrationState::Pending);
    assert_eq!(statuses[1].description, "create_b");
}

#[tokio::test]
async fn test_status_on_fresh_database_is_read_only() {
    let fixture = Fixture::new();
    seed_abc(&fixture);

    let statuses = fixture.runner().status().await.unwrap();
    assert_eq!(statuses.len(), 3);
    assert!(statuses.iter().all(|s| s.state == MigrationState::Pending));

    let mut conn = fixture.conn().await;
    assert!(!table_exists(&mut conn, "schema_migrations").await);
}

#[tokio::test]
async fn test_cancelled_run_starts_nothing() {
    let fixture = Fixture::new();
    seed_abc(&fixture);

    let flag = CancellationFlag::new();
    flag.cancel();
    let mut runner = fixture.runner().with_cancellation(flag);
    let report = runner.run().await.unwrap();

    assert_eq!(report.status, RunStatus::CompletedWithFailure);
    assert_eq!(report.skipped_count(), 3);
    let mut conn = fixture.conn().await;
    assert!(ledger_identities(&mut conn).await.is_empty());
}

#[tokio::test]
async fn test_runner_on_background_task() {
    let fixture = Fixture::new();
    seed_abc(&fixture);

    let mut runner = fixture.runner();
    let handle = tokio::spawn(async move { runner.run().await });
    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.applied_count(), 3);
}

#[tokio::test]
async fn test_executor_reconciles_concurrent_apply() {
    let fixture = Fixture::new();
    let mut conn = fixture.conn().await;
    let ledger = Ledger::new("schema_migrations").unwrap();
    ledger.ensure(&mut conn).await.unwrap();

    let migration = MigrationFile {
        version: Version::new(2),
        description: "create_b".to_string(),
        sql: "CREATE TABLE IF NOT EXISTS b (id INTEGER PRIMARY KEY);".to_string(),
        path: Path::new("2_create_b.sql").to_path_buf(),
    };

    // Another runner got there first
    ledger
        .record_applied(&mut conn, migration.version, &migration.checksum(), Utc::now())
        .await
        .unwrap();

    let executor = MigrationExecutor::new(ledger.clone());
    let result = executor.apply(&migration, &mut conn).await;
    assert_eq!(result.status, ExecutionStatus::AppliedConcurrently);
    assert!(result.error.is_none());
    assert_eq!(ledger_identities(&mut conn).await, vec!["2"]);
}

#[tokio::test]
async fn test_executor_reconciles_when_sql_loses_the_race() {
    let fixture = Fixture::new();
    let mut conn = fixture.conn().await;
    let ledger = Ledger::new("schema_migrations").unwrap();
    ledger.ensure(&mut conn).await.unwrap();

    let migration = MigrationFile {
        version: Version::new(1),
        description: "create_a".to_string(),
        sql: "CREATE TABLE a (id INTEGER PRIMARY KEY);".to_string(),
        path: Path::new("1_create_a.sql").to_path_buf(),
    };

    // The other runner created the table and recorded it before this one started
    sqlx::query(&migration.sql).execute(&mut conn).await.unwrap();
    ledger
        .record_applied(&mut conn, migration.version, &migration.checksum(), Utc::now())
        .await
        .unwrap();

    let executor = MigrationExecutor::new(ledger);
    let result = executor.apply(&migration, &mut conn).await;
    assert_eq!(result.status, ExecutionStatus::AppliedConcurrently);
    assert!(result.error.is_none());
    assert_eq!(ledger_identities(&mut conn).await, vec!["1"]);
}

#[tokio::test]
async fn test_executor_failure_without_ledger_entry_stays_failed() {
    let fixture = Fixture::new();
    let mut conn = fixture.conn().await;
    let ledger = Ledger::new("schema_migrations").unwrap();
    ledger.ensure(&mut conn).await.unwrap();
    sqlx::query("CREATE TABLE a (id INTEGER PRIMARY KEY)")
        .execute(&mut conn)
        .await
        .unwrap();

    let migration = MigrationFile {
        version: Version::new(1),
        description: "create_a".to_string(),
        sql: "CREATE TABLE a (id INTEGER PRIMARY KEY);".to_string(),
        path: Path::new("1_create_a.sql").to_path_buf(),
    };

    let result = MigrationExecutor::new(ledger).apply(&migration, &mut conn).await;
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(result.error.as_deref().unwrap().contains("already exists"));
    assert!(ledger_identities(&mut conn).await.is_empty());
}

#[tokio::test]
async fn test_ledger_rejects_duplicate_entries() {
    let fixture = Fixture::new();
    let mut conn = fixture.conn().await;
    let ledger = Ledger::new("schema_migrations").unwrap();

    // Creating the table twice is harmless
    ledger.ensure(&mut conn).await.unwrap();
    ledger.ensure(&mut conn).await.unwrap();

    let version = Version::new(20251031012958);
    ledger
        .record_applied(&mut conn, version, &checksum("SELECT 1;"), Utc::now())
        .await
        .unwrap();
    let err = ledger
        .record_applied(&mut conn, version, &checksum("SELECT 1;"), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, MigrateError::DuplicateLedgerEntry(v) if v == version));

    assert!(ledger.contains(&mut conn, version).await.unwrap());
    assert!(!ledger.contains(&mut conn, Version::new(1)).await.unwrap());
    let entries = ledger.entries(&mut conn).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].checksum, checksum("SELECT 1;"));
}

#[tokio::test]
async fn test_ledger_unavailable_when_table_unreadable() {
    let fixture = Fixture::new();
    let mut conn = fixture.conn().await;

    // Never ensured: reading fails
    let ledger = Ledger::new("schema_migrations").unwrap();
    let err = ledger.applied_identities(&mut conn).await.unwrap_err();
    assert!(matches!(err, MigrateError::LedgerUnavailable(_)));

    assert!(!ledger.exists(&mut conn).await.unwrap());
    assert!(ledger.entries_if_present(&mut conn).await.unwrap().is_empty());
    ledger.ensure(&mut conn).await.unwrap();
    assert!(ledger.exists(&mut conn).await.unwrap());
}
