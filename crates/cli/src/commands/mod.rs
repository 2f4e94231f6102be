pub mod config;
pub mod migrate;

use anyhow::Context;
use clap::Args;
use shiftlog_core::{init_logging, AppConfig, AppConfigTrait, LoggingConfig};
use std::env;
use std::path::PathBuf;

/// Flags that override the environment for a single invocation
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Directory holding `<digits>_<description>.sql` files
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Database connection URL (postgres:// or sqlite://)
    #[arg(long, value_name = "URL")]
    pub database_url: Option<String>,

    /// Name of the ledger table
    #[arg(long, value_name = "NAME")]
    pub table: Option<String>,
}

impl TargetArgs {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(dir) = &self.dir {
            config.override_migrations_dir(dir.clone());
        }
        if let Some(url) = &self.database_url {
            config.override_database_url(url.clone());
        }
        if let Some(table) = &self.table {
            config.override_migrations_table(table.clone());
        }
    }
}

/// Environment plus flags, with logging initialised but nothing validated
pub(crate) fn resolve_config(target: &TargetArgs) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::load(|key| env::var(key).ok()).context("invalid configuration")?;
    target.apply(&mut config);

    // A subscriber installed earlier in the process keeps receiving events.
    if let Err(e) = init_logging(LoggingConfig::from_app_config(&config)) {
        tracing::debug!(error = %e, "logging was already initialized");
    }

    Ok(config)
}

/// Resolved configuration that is ready to reach a database
pub(crate) fn load_config(target: &TargetArgs) -> anyhow::Result<AppConfig> {
    let config = resolve_config(target)?;
    config.validate().context("invalid configuration")?;
    tracing::debug!(
        environment = %config.environment,
        migrations_dir = %config.migrations_dir.display(),
        migrations_table = %config.migrations_table,
        "configuration loaded"
    );
    Ok(config)
}
