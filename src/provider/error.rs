//! Image Provider Error Types

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Failed to read image list from {location}: {source}")]
    Read {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid image list from {location}: {message}")]
    Decode { location: String, message: String },

    #[error("Failed to write results to {location}: {source}")]
    Write {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Provider protocol violation: {message}")]
    Protocol { message: String },
}

// Messages need their location, so the full Display form is always logged
impl crate::core::error_handling::ContextualError for ProviderError {
    fn is_user_actionable(&self) -> bool {
        false
    }

    fn user_message(&self) -> Option<&str> {
        None
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;
