use console::style;
use shiftlog_core::{AppConfig, AppConfigTrait, ConfigSource};

use super::{resolve_config, TargetArgs};

const FIELDS: &[&str] = &[
    "environment",
    "database_url",
    "migrations_dir",
    "migrations_table",
    "log_level",
    "log_format",
];

/// Print every setting with its origin, then whether it validates
pub fn show(target: &TargetArgs) -> anyhow::Result<i32> {
    let config = resolve_config(target)?;
    println!("{}", render(&config));

    match config.validate() {
        Ok(()) => {
            println!("\n{}", style("Configuration is valid").green().bold());
            Ok(0)
        }
        Err(e) => {
            println!("\n{} {}", style("Configuration is invalid:").red().bold(), e);
            Ok(1)
        }
    }
}

fn render(config: &AppConfig) -> String {
    let sources = config.config_sources();
    let mut lines = vec![format!("{}", style("shiftlog configuration").bold())];

    for field in FIELDS {
        let value = value_of(config, field);
        let source = sources.get(*field).cloned().unwrap_or(ConfigSource::Unset);
        lines.push(format!(
            "  {:<18} {:<40} {}",
            field,
            value,
            style(source.description()).dim()
        ));
    }

    lines.join("\n")
}

fn value_of(config: &AppConfig, field: &str) -> String {
    match field {
        "environment" => config.environment.to_string(),
        "database_url" => config
            .redacted_database_url()
            .unwrap_or_else(|| "(not set)".to_string()),
        "migrations_dir" => config.migrations_dir.display().to_string(),
        "migrations_table" => config.migrations_table.clone(),
        "log_level" => config.log_level.clone(),
        "log_format" => config.log_format.clone(),
        _ => String::new(),
    }
}
