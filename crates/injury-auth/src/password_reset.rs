//! Password reset handshake: request the mail, adopt the link, set the password.

use crate::validation::{normalize_email, validate_new_password};
use crate::{AuthError, AuthResult};
use backend_client::{Backend, Session};
use injury_config::Config;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

/// Tokens carried by a recovery link.
#[derive(Clone, PartialEq, Eq)]
pub struct RecoveryTokens {
    pub access_token: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for RecoveryTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryTokens").finish_non_exhaustive()
    }
}

impl RecoveryTokens {
    /// Parse a recovery link.
    ///
    /// Tokens are read from the fragment (`#access_token=..`) and, failing
    /// that, from the query string. A `type` parameter, when present, must be
    /// `recovery`. Error parameters placed by the auth server (expired or
    /// reused links) become validation errors.
    pub fn from_link(link: &str) -> AuthResult<Self> {
        let invalid = || AuthError::Validation("This reset link is invalid.".to_string());
        let url = Url::parse(link.trim()).map_err(|_| invalid())?;

        let params: Vec<(String, String)> = match url.fragment().filter(|f| !f.is_empty()) {
            Some(fragment) => url::form_urlencoded::parse(fragment.as_bytes())
                .into_owned()
                .collect(),
            None => url.query_pairs().into_owned().collect(),
        };
        let param = |name: &str| {
            params
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone())
                .filter(|value| !value.is_empty())
        };

        if let Some(description) = param("error_description").or_else(|| param("error")) {
            return Err(AuthError::Validation(format!(
                "This reset link can no longer be used: {}",
                description
            )));
        }
        if let Some(kind) = param("type") {
            if kind != "recovery" {
                return Err(invalid());
            }
        }

        match (param("access_token"), param("refresh_token")) {
            (Some(access_token), Some(refresh_token)) => Ok(Self {
                access_token,
                refresh_token,
            }),
            _ => Err(invalid()),
        }
    }
}

/// Password reset flow against the backend.
pub struct PasswordReset {
    backend: Arc<dyn Backend>,
    redirect_url: String,
}

impl PasswordReset {
    pub fn new(backend: Arc<dyn Backend>, redirect_url: impl Into<String>) -> Self {
        Self {
            backend,
            redirect_url: redirect_url.into(),
        }
    }

    pub fn from_config(backend: Arc<dyn Backend>, config: &Config) -> Self {
        Self::new(backend, config.reset_redirect_url.clone())
    }

    /// Ask for a reset mail.
    ///
    /// Only input validation can fail; backend errors are logged and hidden
    /// so the result does not reveal whether an account exists.
    pub async fn request_reset(&self, identifier: &str) -> AuthResult<()> {
        let email = normalize_email(identifier)?;
        if let Err(e) = self
            .backend
            .reset_password_for_email(&email, &self.redirect_url)
            .await
        {
            warn!(error = %e, "Password reset request failed");
        }
        info!("Password reset requested");
        Ok(())
    }

    /// Adopt the session carried by a recovery link.
    ///
    /// The session also reaches any [`crate::SessionStore`] through the
    /// session-change stream.
    pub async fn accept_recovery_link(&self, link: &str) -> AuthResult<Session> {
        let tokens = RecoveryTokens::from_link(link)?;
        let session = self
            .backend
            .set_session(&tokens.access_token, &tokens.refresh_token)
            .await?;
        info!(user_id = %session.user.id, "Recovery session established");
        Ok(session)
    }

    /// Set a new password for the signed-in user.
    pub async fn update_password(&self, new_secret: &str) -> AuthResult<()> {
        validate_new_password(new_secret)?;
        self.backend.update_password(new_secret).await?;
        info!("Password changed");
        Ok(())
    }
}
