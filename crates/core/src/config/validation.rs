use thiserror::Error;

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field: {field}. {hint}")]
    MissingRequired { field: String, hint: String },

    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Configuration validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Environment variable error: {message}")]
    EnvironmentError { message: String },

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl ConfigError {
    /// Create a missing required field error
    pub fn missing_required(field: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::MissingRequired {
            field: field.into(),
            hint: hint.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    /// Create a validation failed error
    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }

    /// Create an environment error
    pub fn environment_error(message: impl Into<String>) -> Self {
        Self::EnvironmentError {
            message: message.into(),
        }
    }
}

/// Trait for validating configuration values
pub trait ConfigValidator<T: ?Sized> {
    /// Validate a configuration value
    fn validate(&self, value: &T) -> Result<(), ConfigError>;
}

/// Returns true when `name` can be interpolated into SQL as a bare table name.
///
/// Accepts ASCII letters, digits and underscores, not starting with a digit,
/// at most 63 bytes (the PostgreSQL identifier limit).
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// SQL identifier validator
pub struct IdentifierValidator {
    pub field: String,
}

impl IdentifierValidator {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

impl ConfigValidator<str> for IdentifierValidator {
    fn validate(&self, value: &str) -> Result<(), ConfigError> {
        if !is_valid_identifier(value) {
            return Err(ConfigError::invalid_value(
                &self.field,
                value,
                "identifier of letters, digits and underscores, not starting with a digit",
            ));
        }
        Ok(())
    }
}

/// Database URL validator
pub struct UrlValidator {
    pub schemes: Vec<String>,
}

impl Default for UrlValidator {
    fn default() -> Self {
        Self {
            schemes: vec![
                "postgres".to_string(),
                "postgresql".to_string(),
                "sqlite".to_string(),
            ],
        }
    }
}

impl ConfigValidator<str> for UrlValidator {
    fn validate(&self, value: &str) -> Result<(), ConfigError> {
        if value.is_empty() {
            return Err(ConfigError::invalid_value(
                "database_url",
                value,
                "non-empty URL",
            ));
        }

        // sqlite URLs such as `sqlite::memory:` are not hierarchical, so only
        // the scheme is checked here.
        let scheme = value.split(':').next().unwrap_or_default();
        if !self.schemes.iter().any(|s| s == scheme) {
            return Err(ConfigError::invalid_value(
                "database_url",
                value,
                format!("URL with scheme: {}", self.schemes.join(", ")),
            ));
        }

        Ok(())
    }
}

/// Validator accepting one of a fixed set of values
pub struct OneOfValidator {
    pub field: String,
    pub allowed: &'static [&'static str],
}

impl ConfigValidator<str> for OneOfValidator {
    fn validate(&self, value: &str) -> Result<(), ConfigError> {
        if !self.allowed.contains(&value) {
            return Err(ConfigError::invalid_value(
                &self.field,
                value,
                format!("one of: {}", self.allowed.join(", ")),
            ));
        }
        Ok(())
    }
}
