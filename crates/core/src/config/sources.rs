/// Where a configuration value came from, for `shiftlog config` and debug logs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value loaded from environment variable
    EnvVar(String),
    /// Value assembled from several environment variables
    Composite(Vec<String>),
    /// Default value used
    Default(String),
    /// Value passed on the command line
    CommandLine(String),
    /// Not set anywhere
    Unset,
}

impl ConfigSource {
    /// Check if source is environment variable
    pub fn is_env_var(&self) -> bool {
        matches!(self, ConfigSource::EnvVar(_) | ConfigSource::Composite(_))
    }

    /// Check if source is default value
    pub fn is_default(&self) -> bool {
        matches!(self, ConfigSource::Default(_))
    }

    /// Get source description
    pub fn description(&self) -> String {
        match self {
            ConfigSource::EnvVar(var) => format!("Environment variable: {}", var),
            ConfigSource::Composite(vars) => {
                format!("Environment variables: {}", vars.join(", "))
            }
            ConfigSource::Default(value) => format!("Default value: {}", value),
            ConfigSource::CommandLine(flag) => format!("Command line: {}", flag),
            ConfigSource::Unset => "Not set".to_string(),
        }
    }
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}
