pub mod config;
pub mod logging;

pub use config::{AppConfig, AppConfigTrait, ConfigError, ConfigSource, Environment};
pub use logging::{init_logging, LoggingConfig};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get tool version
pub fn version() -> &'static str {
    VERSION
}
