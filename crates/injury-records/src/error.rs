//! Error types for record operations.

use backend_client::BackendError;
use thiserror::Error;

/// Errors that can occur while reading or writing records.
#[derive(Error, Debug)]
pub enum RecordsError {
    /// Input rejected before reaching the backend.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// Row-level security or missing credentials.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Backend error: {0}")]
    Backend(#[source] BackendError),
}

impl From<BackendError> for RecordsError {
    fn from(err: BackendError) -> Self {
        if err.is_permission_denied() {
            RecordsError::PermissionDenied(err.to_string())
        } else {
            RecordsError::Backend(err)
        }
    }
}

impl RecordsError {
    /// Returns true if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            RecordsError::Backend(e) => e.is_transient(),
            _ => false,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            RecordsError::Validation(message) => message.clone(),
            RecordsError::NotFound { kind, .. } => format!("That {} no longer exists.", kind),
            RecordsError::PermissionDenied(_) => {
                "You do not have permission to do that.".to_string()
            }
            RecordsError::Backend(e) if e.is_transient() => {
                "Could not reach the server. Check your connection and try again.".to_string()
            }
            RecordsError::Backend(_) => "Something went wrong. Please try again.".to_string(),
        }
    }
}

/// Result type alias using RecordsError.
pub type RecordsResult<T> = Result<T, RecordsError>;

/// Trimmed value of a required text field.
pub(crate) fn required(label: &str, value: &str) -> RecordsResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(RecordsError::Validation(format!("{} is required.", label)));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_classification() {
        let denied: RecordsError =
            BackendError::api(403, Some("42501"), "new row violates row-level security").into();
        assert!(matches!(denied, RecordsError::PermissionDenied(_)));

        let outage: RecordsError = BackendError::api(503, None, "unavailable").into();
        assert!(outage.is_transient());
        assert!(outage.user_message().contains("connection"));
    }

    #[test]
    fn test_required() {
        assert_eq!(required("Location", "  Dock 4 ").unwrap(), "Dock 4");
        let err = required("Location", " ").unwrap_err();
        assert_eq!(err.user_message(), "Location is required.");
    }
}
