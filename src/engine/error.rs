//! Engine Error Types

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid image reference '{reference}': {message}")]
    InvalidReference { reference: String, message: String },

    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("{url} returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Failed to decode {what}: {message}")]
    Decode { what: String, message: String },

    #[error("Registry rejected '{reference}': {message}")]
    Registry { reference: String, message: String },

    #[error("Indexing of {manifest_hash} failed: {message}")]
    Index {
        manifest_hash: String,
        message: String,
    },

    #[error("Matcher has no vulnerability data yet")]
    NoVulnerabilityData,

    #[error("Cache directory {path} is unusable: {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Engine construction failed: {message}")]
    Construction { message: String },
}

impl EngineError {
    pub(crate) fn transport(url: &str, error: &reqwest::Error) -> Self {
        EngineError::Transport {
            url: url.to_string(),
            message: crate::core::error_handling::error_chain(error),
        }
    }
}

impl crate::core::error_handling::ContextualError for EngineError {
    fn is_user_actionable(&self) -> bool {
        matches!(self, EngineError::Construction { .. })
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            EngineError::Construction { message } => Some(message),
            _ => None,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
