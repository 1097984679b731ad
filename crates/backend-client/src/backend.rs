//! The backend seam.

use crate::{AuthChangeEvent, BackendError, BackendResult, Filter, Query, Session, SignUpResponse};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

/// Hosted auth provider plus row-level-secured table store.
///
/// Implementations own the current session: they persist it, refresh it when
/// it is about to expire, and announce every change on [`Backend::subscribe`].
#[async_trait]
pub trait Backend: Send + Sync {
    /// Create an account. Never creates an application profile.
    async fn sign_up(&self, email: &str, password: &str) -> BackendResult<SignUpResponse>;

    /// Exchange email and password for a session.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> BackendResult<Session>;

    /// Invalidate the session remotely and forget it locally.
    ///
    /// The local session is cleared even when the remote call fails.
    async fn sign_out(&self) -> BackendResult<()>;

    /// Current session, refreshed first if it is about to expire.
    async fn get_session(&self) -> BackendResult<Option<Session>>;

    /// Adopt tokens handed over out of band (deep link).
    async fn set_session(&self, access_token: &str, refresh_token: &str)
        -> BackendResult<Session>;

    /// Change the signed-in user's password.
    async fn update_password(&self, new_password: &str) -> BackendResult<()>;

    /// Ask the backend to email a password-reset link.
    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> BackendResult<()>;

    /// Session-change notifications.
    fn subscribe(&self) -> broadcast::Receiver<AuthChangeEvent>;

    async fn select(&self, query: &Query) -> BackendResult<Vec<Value>>;

    /// Insert one row and return it as stored.
    async fn insert(&self, table: &str, row: Value) -> BackendResult<Value>;

    /// Patch every row matching `filters` and return the updated rows.
    async fn update(&self, table: &str, filters: &[Filter], patch: Value)
        -> BackendResult<Vec<Value>>;

    async fn delete(&self, table: &str, filters: &[Filter]) -> BackendResult<()>;
}

/// Select rows and decode them.
pub async fn select_rows<T, B>(backend: &B, query: &Query) -> BackendResult<Vec<T>>
where
    T: DeserializeOwned,
    B: Backend + ?Sized,
{
    backend
        .select(query)
        .await?
        .into_iter()
        .map(|row| serde_json::from_value(row).map_err(BackendError::from))
        .collect()
}

/// Select at most one row and decode it.
pub async fn select_one<T, B>(backend: &B, query: Query) -> BackendResult<Option<T>>
where
    T: DeserializeOwned,
    B: Backend + ?Sized,
{
    let rows = select_rows(backend, &query.limit(1)).await?;
    Ok(rows.into_iter().next())
}

/// Insert a typed row and decode the stored representation.
pub async fn insert_row<T, R, B>(backend: &B, table: &str, row: &R) -> BackendResult<T>
where
    T: DeserializeOwned,
    R: Serialize + ?Sized,
    B: Backend + ?Sized,
{
    let stored = backend.insert(table, serde_json::to_value(row)?).await?;
    Ok(serde_json::from_value(stored)?)
}

/// Patch rows with a typed patch and decode the updated rows.
pub async fn update_rows<T, P, B>(
    backend: &B,
    table: &str,
    filters: &[Filter],
    patch: &P,
) -> BackendResult<Vec<T>>
where
    T: DeserializeOwned,
    P: Serialize + ?Sized,
    B: Backend + ?Sized,
{
    backend
        .update(table, filters, serde_json::to_value(patch)?)
        .await?
        .into_iter()
        .map(|row| serde_json::from_value(row).map_err(BackendError::from))
        .collect()
}
