use crate::config::{
    ConfigError, ConfigSource, ConfigValidator, IdentifierValidator, OneOfValidator, UrlValidator,
};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

/// Default directory scanned for migration files
pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";

/// Default name of the ledger table
pub const DEFAULT_MIGRATIONS_TABLE: &str = "schema_migrations";

const DEFAULT_DB_PORT: u16 = 5432;
const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];
const LOG_FORMATS: &[&str] = &["text", "json"];

/// Configuration trait for application configuration
pub trait AppConfigTrait: Sized {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self, ConfigError>;

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError>;

    /// Get configuration source information for debugging
    fn config_sources(&self) -> HashMap<String, ConfigSource>;
}

/// Environment enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Testing,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testing" | "test" => Ok(Environment::Testing),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue {
                field: "environment".to_string(),
                value: s.to_string(),
                expected: "development, testing, or production".to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let env_str = match self {
            Environment::Development => "development",
            Environment::Testing => "testing",
            Environment::Production => "production",
        };
        write!(f, "{}", env_str)
    }
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Runtime configuration for the migration tool
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub database_url: Option<String>,
    pub migrations_dir: PathBuf,
    pub migrations_table: String,
    pub log_level: String,
    pub log_format: String,
    sources: HashMap<String, ConfigSource>,
}

impl AppConfig {
    /// Create a configuration holding only defaults
    pub fn new() -> Self {
        let mut sources = HashMap::new();
        sources.insert(
            "environment".to_string(),
            ConfigSource::Default("development".to_string()),
        );
        sources.insert("database_url".to_string(), ConfigSource::Unset);
        sources.insert(
            "migrations_dir".to_string(),
            ConfigSource::Default(DEFAULT_MIGRATIONS_DIR.to_string()),
        );
        sources.insert(
            "migrations_table".to_string(),
            ConfigSource::Default(DEFAULT_MIGRATIONS_TABLE.to_string()),
        );
        sources.insert(
            "log_level".to_string(),
            ConfigSource::Default("info".to_string()),
        );
        sources.insert(
            "log_format".to_string(),
            ConfigSource::Default("text".to_string()),
        );

        Self {
            environment: Environment::Development,
            database_url: None,
            migrations_dir: PathBuf::from(DEFAULT_MIGRATIONS_DIR),
            migrations_table: DEFAULT_MIGRATIONS_TABLE.to_string(),
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            sources,
        }
    }

    /// Read every recognised variable through `lookup` without validating.
    ///
    /// `from_env` is this plus `validate`; callers that apply command-line
    /// overrides load first and validate afterwards.
    pub fn load<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();

        if let Some(env_str) = lookup("ENVIRONMENT") {
            config.environment = env_str.parse()?;
            config.record("environment", ConfigSource::EnvVar("ENVIRONMENT".to_string()));
        }

        if config.environment.is_production() {
            config.log_format = "json".to_string();
            config.record(
                "log_format",
                ConfigSource::Default("json (production)".to_string()),
            );
        }

        if let Some(url) = lookup("DATABASE_URL") {
            config.database_url = Some(url);
            config.record("database_url", ConfigSource::EnvVar("DATABASE_URL".to_string()));
        } else if let Some(host) = lookup("DB_HOST") {
            config.database_url = Some(composite_database_url(&host, &lookup)?);
            config.record(
                "database_url",
                ConfigSource::Composite(
                    ["DB_HOST", "DB_PORT", "DB_USER", "DB_PASSWORD", "DB_NAME"]
                        .iter()
                        .filter(|key| lookup(key).is_some())
                        .map(|key| key.to_string())
                        .collect(),
                ),
            );
        }

        if let Some(dir) = lookup("MIGRATIONS_DIR") {
            config.migrations_dir = PathBuf::from(dir);
            config.record(
                "migrations_dir",
                ConfigSource::EnvVar("MIGRATIONS_DIR".to_string()),
            );
        }

        if let Some(table) = lookup("MIGRATIONS_TABLE") {
            config.migrations_table = table;
            config.record(
                "migrations_table",
                ConfigSource::EnvVar("MIGRATIONS_TABLE".to_string()),
            );
        }

        if let Some(log_level) = lookup("LOG_LEVEL") {
            config.log_level = log_level.to_lowercase();
            config.record("log_level", ConfigSource::EnvVar("LOG_LEVEL".to_string()));
        }

        if let Some(log_format) = lookup("LOG_FORMAT") {
            config.log_format = log_format.to_lowercase();
            config.record("log_format", ConfigSource::EnvVar("LOG_FORMAT".to_string()));
        }

        Ok(config)
    }

    /// Replace the database URL with one given on the command line
    pub fn override_database_url(&mut self, url: impl Into<String>) {
        self.database_url = Some(url.into());
        self.record("database_url", ConfigSource::CommandLine("--database-url".to_string()));
    }

    /// Replace the migrations directory with one given on the command line
    pub fn override_migrations_dir(&mut self, dir: impl Into<PathBuf>) {
        self.migrations_dir = dir.into();
        self.record("migrations_dir", ConfigSource::CommandLine("--dir".to_string()));
    }

    /// Replace the ledger table name with one given on the command line
    pub fn override_migrations_table(&mut self, table: impl Into<String>) {
        self.migrations_table = table.into();
        self.record("migrations_table", ConfigSource::CommandLine("--table".to_string()));
    }

    /// Database URL with any password replaced by `***`, safe to print
    pub fn redacted_database_url(&self) -> Option<String> {
        self.database_url.as_deref().map(redact_url)
    }

    /// Check if database is configured
    pub fn has_database(&self) -> bool {
        self.database_url.is_some()
    }

    pub fn is_json_logging(&self) -> bool {
        self.log_format == "json"
    }

    fn record(&mut self, field: &str, source: ConfigSource) {
        self.sources.insert(field.to_string(), source);
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AppConfigTrait for AppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let config = Self::load(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        OneOfValidator {
            field: "log_level".to_string(),
            allowed: LOG_LEVELS,
        }
        .validate(&self.log_level)?;

        OneOfValidator {
            field: "log_format".to_string(),
            allowed: LOG_FORMATS,
        }
        .validate(&self.log_format)?;

        IdentifierValidator::new("migrations_table").validate(&self.migrations_table)?;

        match &self.database_url {
            Some(url) => UrlValidator::default().validate(url)?,
            None => {
                return Err(ConfigError::missing_required(
                    "database_url",
                    "Set DATABASE_URL (or DB_HOST and friends) or pass --database-url",
                ))
            }
        }

        if self.migrations_dir.as_os_str().is_empty() {
            return Err(ConfigError::validation_failed(
                "migrations directory path is empty",
            ));
        }

        Ok(())
    }

    fn config_sources(&self) -> HashMap<String, ConfigSource> {
        self.sources.clone()
    }
}

fn composite_database_url<F>(host: &str, lookup: &F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let port = match lookup("DB_PORT") {
        Some(port_str) => port_str.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
            field: "db_port".to_string(),
            value: port_str,
            expected: "valid port number (1-65535)".to_string(),
        })?,
        None => DEFAULT_DB_PORT,
    };

    let mut url = Url::parse("postgres://localhost")?;
    url.set_host(Some(host))?;
    url.set_port(Some(port))
        .map_err(|_| ConfigError::environment_error("DB_PORT cannot be applied to the URL"))?;

    if let Some(user) = lookup("DB_USER") {
        url.set_username(&user)
            .map_err(|_| ConfigError::environment_error("DB_USER cannot be applied to the URL"))?;
    }
    if let Some(password) = lookup("DB_PASSWORD") {
        url.set_password(Some(&password)).map_err(|_| {
            ConfigError::environment_error("DB_PASSWORD cannot be applied to the URL")
        })?;
    }
    if let Some(name) = lookup("DB_NAME") {
        url.set_path(&name);
    }

    Ok(url.to_string())
}

fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) if url.password().is_some() => {
            if url.set_password(Some("***")).is_ok() {
                url.to_string()
            } else {
                raw.to_string()
            }
        }
        _ => raw.to_string(),
    }
}
