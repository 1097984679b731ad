//! Local persistence for the authenticated session.
//!
//! The backend client keeps the session credential bundle here so that a
//! restarted process can resume without signing in again.
//!
//! - [`MemoryStorage`]: process-local, used in tests and ephemeral runs
//! - [`FileStorage`]: JSON file, written atomically, owner-only on unix
//! - [`SessionVault`]: typed API over either backend

mod file;
mod memory;
mod vault;

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use vault::{
    SessionMeta, SessionVault, StoredSession, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY,
    SESSION_META_KEY,
};

use std::path::Path;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific storage error
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Flat string key/value store holding session credentials.
pub trait SecureStorage: Send + Sync {
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Remove `key`; true if it was present.
    fn delete(&self, key: &str) -> StorageResult<bool>;

    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Create a vault backed by a JSON file at `path`.
pub fn create_file_vault(path: &Path) -> StorageResult<SessionVault> {
    let storage = FileStorage::open(path)?;
    Ok(SessionVault::new(Box::new(storage)))
}

/// Create a vault that lives only as long as the process.
pub fn create_memory_vault() -> SessionVault {
    SessionVault::new(Box::new(MemoryStorage::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_keys_unique() {
        let keys = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, SESSION_META_KEY];
        let unique: std::collections::HashSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), keys.len(), "Storage keys must be unique");
        assert!(keys.iter().all(|k| !k.is_empty()));
    }

    #[test]
    fn test_create_file_vault() {
        let dir = tempfile::tempdir().unwrap();
        let vault = create_file_vault(&dir.path().join("session.json")).unwrap();
        assert!(!vault.has_session().unwrap());
    }
}
