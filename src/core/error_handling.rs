//! Generic error handling utilities
//!
//! Fatal startup errors (bad configuration, unreachable engines) are reported
//! through [`log_error_with_context`], which prefers a specific message when the
//! operator can act on it and a generic context line otherwise.

/// Errors that can tell user-actionable failures apart from system failures
///
/// When `is_user_actionable()` returns `true`, `user_message()` must return
/// `Some(message)`; otherwise it returns `None`.
pub trait ContextualError: std::error::Error {
    /// True if the error message is something the operator can fix directly
    /// (for example an invalid severity label in the configuration file)
    fn is_user_actionable(&self) -> bool;

    /// The specific message to show for user-actionable errors
    fn user_message(&self) -> Option<&str>;
}

/// Log a fatal error with the detail level appropriate to its kind
///
/// # Examples
/// ```rust,no_run
/// # use imagegate::core::error_handling::log_error_with_context;
/// # use imagegate::config::ConfigError;
/// let err = ConfigError::invalid("vulnerabilities.severities", "unknown severity 'Severe'");
/// log_error_with_context(&err, "Loading configuration");
/// // Logs: "FATAL: vulnerabilities.severities: unknown severity 'Severe'"
/// ```
pub fn log_error_with_context<E: ContextualError + std::fmt::Display + std::fmt::Debug>(
    error: &E,
    operation_context: &str,
) {
    match error.user_message() {
        Some(user_msg) if error.is_user_actionable() => log::error!("FATAL: {}", user_msg),
        _ => log::error!("FATAL: {}: {}", operation_context, error),
    }
    log::debug!("DEBUG_DETAILS: {:?}", error);
}

/// Render an error and its `source()` chain on one line
///
/// Transport errors from the HTTP stack only carry the useful part (DNS
/// failure, refused connection) in their sources.
pub fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut current = error.source();
    while let Some(cause) = current {
        let cause_text = cause.to_string();
        if !rendered.contains(&cause_text) {
            rendered.push_str(": ");
            rendered.push_str(&cause_text);
        }
        current = cause.source();
    }
    rendered
}
