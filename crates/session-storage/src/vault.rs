//! High-level API for the persisted session.

use crate::{SecureStorage, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ACCESS_TOKEN_KEY: &str = "auth_access_token";
pub const REFRESH_TOKEN_KEY: &str = "auth_refresh_token";
/// JSON-encoded [`SessionMeta`].
pub const SESSION_META_KEY: &str = "auth_session_meta";

/// Session metadata stored next to the tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMeta {
    /// Auth user id
    pub user_id: String,
    /// Auth user email
    #[serde(default)]
    pub email: Option<String>,
    /// When the access token expires (RFC 3339)
    pub expires_at: String,
}

impl SessionMeta {
    /// Parsed expiry timestamp.
    pub fn expires_at(&self) -> StorageResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.expires_at)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| StorageError::Encoding(e.to_string()))
    }
}

/// Everything needed to resume a session after restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub access_token: String,
    pub refresh_token: String,
    pub meta: SessionMeta,
}

/// Typed access to the session credentials in a [`SecureStorage`].
pub struct SessionVault {
    storage: Box<dyn SecureStorage>,
}

impl SessionVault {
    /// Create a vault over the given storage backend
    pub fn new(storage: Box<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    /// Store access token
    pub fn set_access_token(&self, token: &str) -> StorageResult<()> {
        self.storage.set(ACCESS_TOKEN_KEY, token)
    }

    /// Retrieve access token
    pub fn get_access_token(&self) -> StorageResult<Option<String>> {
        self.storage.get(ACCESS_TOKEN_KEY)
    }

    /// Store refresh token
    pub fn set_refresh_token(&self, token: &str) -> StorageResult<()> {
        self.storage.set(REFRESH_TOKEN_KEY, token)
    }

    /// Retrieve refresh token
    pub fn get_refresh_token(&self) -> StorageResult<Option<String>> {
        self.storage.get(REFRESH_TOKEN_KEY)
    }

    /// Store session metadata
    pub fn set_session_meta(&self, meta: &SessionMeta) -> StorageResult<()> {
        let json =
            serde_json::to_string(meta).map_err(|e| StorageError::Encoding(e.to_string()))?;
        self.storage.set(SESSION_META_KEY, &json)
    }

    /// Retrieve session metadata
    pub fn get_session_meta(&self) -> StorageResult<Option<SessionMeta>> {
        match self.storage.get(SESSION_META_KEY)? {
            Some(json) => {
                let meta: SessionMeta = serde_json::from_str(&json)
                    .map_err(|e| StorageError::Encoding(e.to_string()))?;
                Ok(Some(meta))
            }
            None => Ok(None),
        }
    }

    /// Check if a complete session is stored
    pub fn has_session(&self) -> StorageResult<bool> {
        let has_access = self.storage.has(ACCESS_TOKEN_KEY)?;
        let has_refresh = self.storage.has(REFRESH_TOKEN_KEY)?;
        let has_meta = self.storage.has(SESSION_META_KEY)?;
        Ok(has_access && has_refresh && has_meta)
    }

    /// Whether the stored access token has fewer than `margin_secs` left.
    ///
    /// A missing session counts as expired.
    pub fn is_expired(&self, margin_secs: i64) -> StorageResult<bool> {
        match self.get_session_meta()? {
            Some(meta) => {
                let remaining = meta.expires_at()?.signed_duration_since(Utc::now());
                Ok(remaining.num_seconds() < margin_secs)
            }
            None => Ok(true),
        }
    }

    /// Store complete session (tokens + metadata)
    pub fn set_session(
        &self,
        access_token: &str,
        refresh_token: &str,
        meta: &SessionMeta,
    ) -> StorageResult<()> {
        self.set_access_token(access_token)?;
        self.set_refresh_token(refresh_token)?;
        self.set_session_meta(meta)?;
        tracing::debug!(user_id = %meta.user_id, "session persisted");
        Ok(())
    }

    /// Load the complete session, or `None` if any part is missing.
    pub fn load_session(&self) -> StorageResult<Option<StoredSession>> {
        let (Some(access_token), Some(refresh_token), Some(meta)) = (
            self.get_access_token()?,
            self.get_refresh_token()?,
            self.get_session_meta()?,
        ) else {
            return Ok(None);
        };

        Ok(Some(StoredSession {
            access_token,
            refresh_token,
            meta,
        }))
    }

    /// Remove every part of the stored session.
    pub fn clear_session(&self) -> StorageResult<()> {
        let mut first_err = None;
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, SESSION_META_KEY] {
            if let Err(e) = self.storage.delete(key) {
                tracing::warn!(key, error = %e, "failed to delete session key");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStorage;
    use chrono::Duration;

    fn vault() -> SessionVault {
        SessionVault::new(Box::new(MemoryStorage::new()))
    }

    fn meta_expiring_in(secs: i64) -> SessionMeta {
        SessionMeta {
            user_id: "user-123".to_string(),
            email: Some("worker@example.com".to_string()),
            expires_at: (Utc::now() + Duration::seconds(secs)).to_rfc3339(),
        }
    }

    #[test]
    fn test_session_roundtrip() {
        let vault = vault();
        assert!(!vault.has_session().unwrap());
        assert_eq!(vault.load_session().unwrap(), None);

        let meta = meta_expiring_in(3600);
        vault.set_session("access", "refresh", &meta).unwrap();

        assert!(vault.has_session().unwrap());
        let stored = vault.load_session().unwrap().unwrap();
        assert_eq!(stored.access_token, "access");
        assert_eq!(stored.refresh_token, "refresh");
        assert_eq!(stored.meta, meta);
    }

    #[test]
    fn test_partial_session_is_not_loaded() {
        let vault = vault();
        vault.set_access_token("access").unwrap();
        vault.set_session_meta(&meta_expiring_in(3600)).unwrap();

        assert!(!vault.has_session().unwrap());
        assert_eq!(vault.load_session().unwrap(), None);
    }

    #[test]
    fn test_expiry_respects_margin() {
        let vault = vault();
        assert!(vault.is_expired(60).unwrap());

        vault
            .set_session("a", "r", &meta_expiring_in(3600))
            .unwrap();
        assert!(!vault.is_expired(60).unwrap());

        vault.set_session("a", "r", &meta_expiring_in(30)).unwrap();
        assert!(vault.is_expired(60).unwrap());
        assert!(!vault.is_expired(0).unwrap());
    }

    #[test]
    fn test_invalid_expiry_is_encoding_error() {
        let vault = vault();
        let mut meta = meta_expiring_in(10);
        meta.expires_at = "tomorrow".to_string();
        vault.set_session_meta(&meta).unwrap();

        assert!(matches!(
            vault.is_expired(60),
            Err(StorageError::Encoding(_))
        ));
    }

    #[test]
    fn test_clear_session() {
        let vault = vault();
        vault
            .set_session("a", "r", &meta_expiring_in(3600))
            .unwrap();
        vault.clear_session().unwrap();
        assert!(!vault.has_session().unwrap());
        // Clearing twice is fine.
        vault.clear_session().unwrap();
    }
}
