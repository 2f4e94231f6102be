//! # Structured Logging
//!
//! Logging setup shared by the shiftlog binaries. Output goes to stderr so
//! that stdout stays reserved for the run report.

use serde_json::{json, Value};
use std::io;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{AppConfig, Environment};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "warn")
    pub level: String,
    /// Enable JSON structured logging (vs plain text)
    pub json_format: bool,
    /// Include file and line number information
    pub include_location: bool,
    /// Include the tracing target in text output
    pub include_target: bool,
    /// Environment filter (e.g. "shiftlog=debug,sqlx=warn")
    pub env_filter: Option<String>,
    /// Fields attached to the initialization event
    pub global_fields: serde_json::Map<String, Value>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
            include_target: false,
            env_filter: None,
            global_fields: serde_json::Map::new(),
        }
    }
}

impl LoggingConfig {
    /// Create production logging configuration
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            json_format: true,
            include_location: false,
            include_target: true,
            env_filter: Some("shiftlog=info,sqlx=warn".to_string()),
            global_fields: {
                let mut fields = serde_json::Map::new();
                fields.insert("env".to_string(), json!("production"));
                fields
            },
        }
    }

    /// Create development logging configuration
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            json_format: false,
            include_location: true,
            include_target: true,
            env_filter: Some("shiftlog=debug,sqlx=info".to_string()),
            global_fields: {
                let mut fields = serde_json::Map::new();
                fields.insert("env".to_string(), json!("development"));
                fields
            },
        }
    }

    /// Create test logging configuration (minimal output)
    pub fn test() -> Self {
        Self {
            level: "error".to_string(),
            json_format: false,
            include_location: false,
            include_target: false,
            env_filter: Some("shiftlog=error".to_string()),
            global_fields: serde_json::Map::new(),
        }
    }

    /// Derive logging settings from the loaded application configuration
    pub fn from_app_config(config: &AppConfig) -> Self {
        let preset = match config.environment {
            Environment::Production => Self::production(),
            Environment::Testing => Self::test(),
            Environment::Development => Self::development(),
        };

        // LOG_LEVEL and LOG_FORMAT win over the preset
        let mut logging = preset
            .with_env_filter(format!("shiftlog={0},sqlx=warn,{0}", config.log_level))
            .with_global_field("env", config.environment.to_string());
        logging.level = config.log_level.clone();
        logging.json_format = config.is_json_logging();
        logging
    }

    /// Set environment filter
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Add a field reported with the initialization event
    pub fn with_global_field<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.global_fields.insert(key.into(), value.into());
        self
    }
}

/// Initialize structured logging for the process.
///
/// `RUST_LOG` takes precedence over the configured filter when set.
pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = config.env_filter.as_deref().unwrap_or(&config.level);

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(env_filter))?;

    if config.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                Layer::new()
                    .with_writer(io::stderr)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .json(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                Layer::new()
                    .with_writer(io::stderr)
                    .with_target(config.include_target)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location),
            )
            .try_init()?;
    }

    if config.global_fields.is_empty() {
        tracing::debug!(
            target: "shiftlog::logging",
            "logging initialized (level: {}, format: {})",
            config.level,
            if config.json_format { "json" } else { "text" }
        );
    } else {
        let mut init_msg = json!({
            "message": "logging initialized",
            "level": config.level,
            "json_format": config.json_format,
        });
        for (key, value) in config.global_fields {
            init_msg[key] = value;
        }
        tracing::debug!(target: "shiftlog::logging", "{}", init_msg);
    }

    Ok(())
}
