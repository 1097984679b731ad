//! Authentication error types.

use backend_client::BackendError;
use thiserror::Error;

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Input rejected before any backend call
    #[error("{0}")]
    Validation(String),

    /// Wrong email or password
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Sign-up for an email that already has an account
    #[error("An account with this email already exists")]
    AccountExists,

    /// Rejected by row-level security or missing authorization
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Profile exists but is deactivated
    #[error("Account disabled")]
    AccountDisabled,

    /// Department name did not match any department
    #[error("Unknown department: {0}")]
    UnknownDepartment(String),

    /// `initialize` has not been called
    #[error("Session store not initialized")]
    NotInitialized,

    /// Operation needs a loaded profile
    #[error("No profile loaded")]
    NoProfile,

    /// Operation needs a signed-in session
    #[error("Not logged in")]
    NotLoggedIn,

    /// A newer sign-out invalidated this operation's result
    #[error("Superseded by a newer session change")]
    Superseded,

    /// Invalid state transition in the auth FSM
    #[error("Invalid auth state transition: {0}")]
    InvalidStateTransition(String),

    /// Any other backend failure
    #[error("Backend error: {0}")]
    Backend(#[source] BackendError),
}

impl From<BackendError> for AuthError {
    fn from(err: BackendError) -> Self {
        if err.is_invalid_credentials() {
            AuthError::InvalidCredentials
        } else if err.is_already_registered() {
            AuthError::AccountExists
        } else if matches!(err, BackendError::NotAuthenticated) {
            AuthError::NotLoggedIn
        } else if err.is_permission_denied() {
            AuthError::PermissionDenied(err.to_string())
        } else {
            AuthError::Backend(err)
        }
    }
}

impl AuthError {
    /// Returns true if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Backend(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Message suitable for showing to the person using the app.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Validation(message) => message.clone(),
            AuthError::InvalidCredentials => "Invalid email or password.".to_string(),
            AuthError::AccountExists => {
                "An account with this email already exists. Try signing in instead.".to_string()
            }
            AuthError::PermissionDenied(_) => {
                "You do not have permission to do that.".to_string()
            }
            AuthError::AccountDisabled => {
                "Your account has been disabled. Contact your administrator.".to_string()
            }
            AuthError::UnknownDepartment(name) => {
                format!("Department \"{}\" was not found.", name)
            }
            AuthError::NoProfile => "Complete your profile first.".to_string(),
            AuthError::NotLoggedIn => "Please sign in again.".to_string(),
            AuthError::Superseded => "You were signed out. Please sign in again.".to_string(),
            AuthError::Backend(e) if e.is_transient() => {
                "Could not reach the server. Check your connection and try again.".to_string()
            }
            AuthError::NotInitialized
            | AuthError::InvalidStateTransition(_)
            | AuthError::Backend(_) => "Something went wrong. Please try again.".to_string(),
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
