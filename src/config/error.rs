//! Configuration Error Types

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An explicitly requested configuration file does not exist
    #[error("{message}")]
    NotFound { path: PathBuf, message: String },

    #[error("Error reading configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML
    #[error("{message}")]
    Parse { location: String, message: String },

    /// A key holds a value of the wrong type or outside its vocabulary
    #[error("{message}")]
    InvalidValue { key: String, message: String },
}

impl ConfigError {
    pub fn not_found(path: PathBuf) -> Self {
        let message = format!(
            "The specified configuration file does not exist: {}",
            path.display()
        );
        ConfigError::NotFound { path, message }
    }

    pub fn parse(location: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        let location = location.into();
        let message = format!("Error parsing configuration {}: {}", location, detail);
        ConfigError::Parse { location, message }
    }

    pub fn invalid(key: &str, detail: impl std::fmt::Display) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{}: {}", key, detail),
        }
    }

    /// The configuration key at fault, if the error is tied to one
    pub fn key(&self) -> Option<&str> {
        match self {
            ConfigError::InvalidValue { key, .. } => Some(key),
            _ => None,
        }
    }
}

impl crate::core::error_handling::ContextualError for ConfigError {
    fn is_user_actionable(&self) -> bool {
        !matches!(self, ConfigError::Read { .. })
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            ConfigError::NotFound { message, .. }
            | ConfigError::Parse { message, .. }
            | ConfigError::InvalidValue { message, .. } => Some(message),
            ConfigError::Read { .. } => None,
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
