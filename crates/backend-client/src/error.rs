//! Backend error types.

use thiserror::Error;

/// Error returned by any backend call.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Transport-level failure (connect, timeout, TLS, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status
    #[error("Backend rejected request ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Local session storage error
    #[error("Storage error: {0}")]
    Storage(#[from] session_storage::StorageError),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Operation needs a signed-in session
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Refresh retries exhausted
    #[error("Token refresh failed after {0} attempts")]
    RefreshExhausted(u32),

    /// The backend response did not have the expected shape
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Postgres `insufficient_privilege`, what row-level security denials report.
const PG_INSUFFICIENT_PRIVILEGE: &str = "42501";

impl BackendError {
    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Transient errors include connection failures, timeouts and 5xx responses.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                e.status().is_some_and(|status| status.is_server_error())
            }
            BackendError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// HTTP status of an API rejection, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::Api { status, .. } => Some(*status),
            BackendError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Machine-readable error code of an API rejection, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            BackendError::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Wrong email/password, or a credential grant the backend refused.
    pub fn is_invalid_credentials(&self) -> bool {
        match self {
            BackendError::Api {
                status,
                code,
                message,
            } => {
                matches!(
                    code.as_deref(),
                    Some("invalid_credentials" | "invalid_grant")
                ) || (*status == 400
                    && message.to_ascii_lowercase().contains("invalid login credentials"))
            }
            _ => false,
        }
    }

    /// Sign-up for an email that already has an account.
    pub fn is_already_registered(&self) -> bool {
        match self {
            BackendError::Api { code, message, .. } => {
                matches!(
                    code.as_deref(),
                    Some("user_already_exists" | "email_exists")
                ) || message.to_ascii_lowercase().contains("already registered")
            }
            _ => false,
        }
    }

    /// Authorization failure, including row-level security denials.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            BackendError::Api { status, code, .. } => {
                *status == 401
                    || *status == 403
                    || code.as_deref() == Some(PG_INSUFFICIENT_PRIVILEGE)
            }
            BackendError::NotAuthenticated => true,
            _ => false,
        }
    }

    /// Shorthand for building an API rejection.
    pub fn api(status: u16, code: Option<&str>, message: impl Into<String>) -> Self {
        BackendError::Api {
            status,
            code: code.map(String::from),
            message: message.into(),
        }
    }
}

/// Result type alias using BackendError.
pub type BackendResult<T> = Result<T, BackendError>;
