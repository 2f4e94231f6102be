use anyhow::Context;
use shiftlog_core::AppConfig;
use shiftlog_engine::{MigrationConfig, MigrationRunner};
use tracing::{info, warn};

use super::{load_config, TargetArgs};
use crate::report;

fn migration_config(config: &AppConfig) -> anyhow::Result<MigrationConfig> {
    MigrationConfig::from_app_config(config).context("no database URL configured")
}

/// Apply pending migrations; returns the process exit code
pub async fn run(target: &TargetArgs, dry_run: bool, json: bool) -> anyhow::Result<i32> {
    let config = load_config(target)?;
    let mut runner = MigrationRunner::new(migration_config(&config)?.with_dry_run(dry_run))?;

    info!(
        database = %config.redacted_database_url().unwrap_or_default(),
        migrations_dir = %config.migrations_dir.display(),
        dry_run,
        "starting migration run"
    );

    // Ctrl-C lets the in-flight migration finish and stops the rest.
    let cancellation = runner.cancellation();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after the current migration");
            cancellation.cancel();
        }
    });

    let outcome = tokio::spawn(async move { runner.run().await })
        .await
        .context("migration task terminated unexpectedly")?;
    interrupt.abort();

    let report = outcome?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report::render_run_report(&report));
    }

    Ok(if report.is_success() { 0 } else { 1 })
}

/// Show which migrations are applied and which are pending
pub async fn status(target: &TargetArgs, json: bool) -> anyhow::Result<i32> {
    let config = load_config(target)?;
    let runner = MigrationRunner::new(migration_config(&config)?)?;

    let statuses = runner.status().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
    } else {
        println!("{}", report::render_status(&statuses));
    }

    Ok(0)
}
