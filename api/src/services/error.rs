//! Error handling utilities for route handlers

use crate::error::CoreError;

/// Extension trait for logging errors and converting them to `CoreError`
pub trait LogErr<T> {
    /// Log error with context and return `CoreError::Internal`
    fn log_500(self, context: &str) -> Result<T, CoreError>;

    /// Log error with context and return `CoreError::BadRequest`
    fn log_400(self, context: &str) -> Result<T, CoreError>;
}

impl<T, E: std::fmt::Display> LogErr<T> for Result<T, E> {
    fn log_500(self, context: &str) -> Result<T, CoreError> {
        self.map_err(|e| {
            tracing::error!(error = %e, "{}", context);
            CoreError::Internal(context.to_string())
        })
    }

    fn log_400(self, context: &str) -> Result<T, CoreError> {
        self.map_err(|e| {
            tracing::debug!(error = %e, "{}", context);
            CoreError::BadRequest(format!("{context}: {e}"))
        })
    }
}
