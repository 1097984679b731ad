//! Auth types shared by every backend implementation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Remote auth user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Set once the user followed the verification mail.
    #[serde(default)]
    pub email_confirmed_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(id: impl Into<String>, email: Option<&str>) -> Self {
        Self {
            id: id.into(),
            email: email.map(String::from),
            email_confirmed_at: None,
        }
    }
}

/// Credential bundle for an authenticated user.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

impl Session {
    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    /// Whether fewer than `margin_secs` of validity remain.
    pub fn expires_within(&self, margin_secs: i64) -> bool {
        self.expires_at - Utc::now() < Duration::seconds(margin_secs)
    }

    /// Same user and same credentials.
    pub fn same_credentials(&self, other: &Session) -> bool {
        self.user.id == other.user.id
            && self.access_token == other.access_token
            && self.refresh_token == other.refresh_token
    }
}

// Tokens stay out of logs and panic messages.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Result of account creation.
///
/// `session` is only present when the project does not require email
/// verification.
#[derive(Debug, Clone)]
pub struct SignUpResponse {
    pub user: User,
    pub session: Option<Session>,
}

/// Session lifecycle notification.
#[derive(Debug, Clone)]
pub enum AuthChangeEvent {
    SignedIn(Session),
    SignedOut,
    TokenRefreshed(Session),
    PasswordRecovery(Session),
    UserUpdated(Session),
}

impl AuthChangeEvent {
    /// Short event name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            AuthChangeEvent::SignedIn(_) => "signed_in",
            AuthChangeEvent::SignedOut => "signed_out",
            AuthChangeEvent::TokenRefreshed(_) => "token_refreshed",
            AuthChangeEvent::PasswordRecovery(_) => "password_recovery",
            AuthChangeEvent::UserUpdated(_) => "user_updated",
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthChangeEvent::SignedIn(s)
            | AuthChangeEvent::TokenRefreshed(s)
            | AuthChangeEvent::PasswordRecovery(s)
            | AuthChangeEvent::UserUpdated(s) => Some(s),
            AuthChangeEvent::SignedOut => None,
        }
    }
}
