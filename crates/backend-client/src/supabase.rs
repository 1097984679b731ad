//! HTTP implementation of [`Backend`] for a Supabase project.
//!
//! Auth goes through the GoTrue endpoints under `/auth/v1`, table access
//! through PostgREST under `/rest/v1`. The session is mirrored into a
//! [`SessionVault`] so a restarted process resumes where it left off.

use crate::{
    AuthChangeEvent, Backend, BackendError, BackendResult, Filter, Query, Session,
    SignUpResponse, User,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, TimeZone, Utc};
use injury_config::{Config, RefreshPolicy};
use parking_lot::Mutex;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use session_storage::{SessionMeta, SessionVault, StoredSession};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

const EVENT_CHANNEL_CAPACITY: usize = 100;

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// Token grant response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    #[serde(default)]
    expires_at: Option<i64>,
    user: User,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or_else(|| Utc::now() + Duration::seconds(self.expires_in));

        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

/// Error body; GoTrue and PostgREST disagree on field names.
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

impl ApiErrorBody {
    fn into_error(self, status: u16) -> BackendError {
        let code = self
            .error_code
            .or_else(|| match self.code {
                Some(Value::String(code)) => Some(code),
                _ => None,
            })
            .or_else(|| self.error.clone());
        let message = self
            .msg
            .or(self.message)
            .or(self.error_description)
            .or(self.error)
            .unwrap_or_else(|| format!("HTTP {}", status));

        BackendError::Api {
            status,
            code,
            message,
        }
    }
}

/// Expiry claim of a JWT access token, without verifying it.
fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?.as_i64()?;
    Utc.timestamp_opt(exp, 0).single()
}

fn session_from_stored(stored: StoredSession) -> Session {
    // An unreadable expiry is treated as already expired so the first use refreshes.
    let expires_at = stored.meta.expires_at().unwrap_or_else(|_| Utc::now());
    Session {
        access_token: stored.access_token,
        refresh_token: stored.refresh_token,
        expires_at,
        user: User::new(stored.meta.user_id, stored.meta.email.as_deref()),
    }
}

/// [`Backend`] over the Supabase REST APIs.
pub struct SupabaseBackend {
    http_client: Client,
    api_url: String,
    publishable_key: String,
    vault: SessionVault,
    refresh_policy: RefreshPolicy,
    session: Mutex<Option<Session>>,
    /// Serializes refreshes so a rotated refresh token is never replayed.
    refresh_lock: tokio::sync::Mutex<()>,
    events: broadcast::Sender<AuthChangeEvent>,
}

impl SupabaseBackend {
    /// Create a backend for the configured project, resuming any session in `vault`.
    pub fn new(config: &Config, vault: SessionVault) -> BackendResult<Self> {
        let api_url = Url::parse(&config.supabase_url)?;
        let http_client = Client::builder().timeout(config.request_timeout()).build()?;

        let restored = vault.load_session()?.map(session_from_stored);
        if let Some(session) = &restored {
            debug!(user_id = %session.user.id, "restored persisted session");
        }

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            http_client,
            api_url: api_url.as_str().trim_end_matches('/').to_string(),
            publishable_key: config.supabase_publishable_key.clone(),
            vault,
            refresh_policy: config.refresh.clone(),
            session: Mutex::new(restored),
            refresh_lock: tokio::sync::Mutex::new(()),
            events,
        })
    }

    fn endpoint(&self, path: &str) -> BackendResult<Url> {
        Ok(Url::parse(&format!("{}/{}", self.api_url, path))?)
    }

    fn rest_url(&self, table: &str) -> BackendResult<Url> {
        self.endpoint(&format!("rest/v1/{}", table))
    }

    fn with_auth(&self, builder: RequestBuilder, bearer: &str) -> RequestBuilder {
        builder
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", bearer))
    }

    fn emit(&self, event: AuthChangeEvent) {
        let name = event.name();
        if self.events.send(event).is_err() {
            debug!(event = name, "no auth event listeners");
        }
    }

    fn cached_session(&self) -> Option<Session> {
        self.session.lock().clone()
    }

    fn store_session(&self, session: &Session) -> BackendResult<()> {
        self.vault.set_session(
            &session.access_token,
            &session.refresh_token,
            &SessionMeta {
                user_id: session.user.id.clone(),
                email: session.user.email.clone(),
                expires_at: session.expires_at.to_rfc3339(),
            },
        )?;
        *self.session.lock() = Some(session.clone());
        Ok(())
    }

    fn forget_session(&self) {
        *self.session.lock() = None;
        if let Err(e) = self.vault.clear_session() {
            warn!(error = %e, "failed to clear persisted session");
        }
    }

    /// Turn a non-success response into [`BackendError::Api`].
    async fn check(response: Response, context: &str) -> BackendResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let body_summary = summarize_response_body(&body);
        warn!(status = %status, body_summary = %body_summary, context, "backend request failed");

        let parsed: ApiErrorBody = serde_json::from_str(&body).unwrap_or_default();
        Err(parsed.into_error(status.as_u16()))
    }

    async fn request_token(&self, grant_type: &str, body: Value) -> BackendResult<Session> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);

        debug!(grant_type, "requesting token");

        let response = self
            .http_client
            .post(url)
            .header("apikey", &self.publishable_key)
            .json(&body)
            .send()
            .await?;
        let response = Self::check(response, "token request").await?;

        let data: TokenResponse = response.json().await?;
        Ok(data.into_session())
    }

    /// Refresh with exponential backoff.
    ///
    /// A rejected refresh token ends the session (`Ok(None)` plus a signed-out
    /// event). Exhausted transient retries keep the stored session so a later
    /// call can try again.
    async fn refresh_with_backoff(&self, refresh_token: &str) -> BackendResult<Option<Session>> {
        let max_retries = self.refresh_policy.max_retries;
        let mut last_error = None;

        for attempt in 0..max_retries {
            let body = json!({ "refresh_token": refresh_token });
            match self.request_token("refresh_token", body).await {
                Ok(session) => {
                    self.store_session(&session)?;
                    info!(user_id = %session.user.id, "Token refreshed successfully");
                    self.emit(AuthChangeEvent::TokenRefreshed(session.clone()));
                    return Ok(Some(session));
                }
                Err(e) if e.is_transient() => {
                    if attempt + 1 < max_retries {
                        let delay = self.refresh_policy.delay_for_attempt(attempt);
                        debug!(
                            attempt = attempt + 1,
                            max_retries,
                            delay_ms = delay.as_millis() as u64,
                            "Refresh failed with transient error, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(e);
                }
                Err(e) => {
                    warn!(error = %e, "Refresh token rejected, ending session");
                    self.forget_session();
                    self.emit(AuthChangeEvent::SignedOut);
                    return Ok(None);
                }
            }
        }

        warn!(max_retries, "Refresh failed after all attempts");
        Err(last_error.unwrap_or(BackendError::RefreshExhausted(max_retries)))
    }

    /// Current session, refreshing it first when it is close to expiry.
    async fn current_session(&self) -> BackendResult<Option<Session>> {
        let margin = self.refresh_policy.expiry_margin_secs;
        match self.cached_session() {
            None => return Ok(None),
            Some(session) if !session.expires_within(margin) => return Ok(Some(session)),
            Some(_) => {}
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited.
        match self.cached_session() {
            None => Ok(None),
            Some(session) if !session.expires_within(margin) => Ok(Some(session)),
            Some(session) => self.refresh_with_backoff(&session.refresh_token).await,
        }
    }

    async fn require_session(&self) -> BackendResult<Session> {
        self.current_session()
            .await?
            .ok_or(BackendError::NotAuthenticated)
    }

    /// Access token when signed in, otherwise the publishable key (anonymous role).
    async fn bearer(&self) -> BackendResult<String> {
        Ok(match self.current_session().await? {
            Some(session) => session.access_token,
            None => self.publishable_key.clone(),
        })
    }

    async fn fetch_user(&self, access_token: &str) -> BackendResult<User> {
        let url = self.endpoint("auth/v1/user")?;
        let response = self
            .with_auth(self.http_client.get(url), access_token)
            .send()
            .await?;
        let response = Self::check(response, "fetch user").await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl Backend for SupabaseBackend {
    async fn sign_up(&self, email: &str, password: &str) -> BackendResult<SignUpResponse> {
        let url = self.endpoint("auth/v1/signup")?;
        debug!(email = %email, "requesting sign-up");

        let response = self
            .http_client
            .post(url)
            .header("apikey", &self.publishable_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let response = Self::check(response, "sign-up").await?;
        let body: Value = response.json().await?;

        // With verification disabled the body is a full token grant;
        // otherwise it is the bare user (older servers nest it under "user").
        if body.get("access_token").is_some() {
            let session = serde_json::from_value::<TokenResponse>(body)?.into_session();
            self.store_session(&session)?;
            info!(user_id = %session.user.id, "Sign-up returned a session");
            self.emit(AuthChangeEvent::SignedIn(session.clone()));
            return Ok(SignUpResponse {
                user: session.user.clone(),
                session: Some(session),
            });
        }

        let user_value = match body.get("user") {
            Some(user) => user.clone(),
            None => body,
        };
        let user: User = serde_json::from_value(user_value)?;
        info!(user_id = %user.id, "Account created, awaiting email verification");
        Ok(SignUpResponse {
            user,
            session: None,
        })
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> BackendResult<Session> {
        debug!(email = %email, "Attempting email/password login");
        let session = self
            .request_token("password", json!({ "email": email, "password": password }))
            .await?;

        self.store_session(&session)?;
        info!(user_id = %session.user.id, "Login successful");
        self.emit(AuthChangeEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> BackendResult<()> {
        let result = match self.cached_session() {
            Some(session) => {
                let url = self.endpoint("auth/v1/logout")?;
                match self
                    .with_auth(self.http_client.post(url), &session.access_token)
                    .send()
                    .await
                {
                    Ok(response) => Self::check(response, "logout").await.map(|_| ()),
                    Err(e) => Err(BackendError::from(e)),
                }
            }
            None => Ok(()),
        };

        self.forget_session();
        self.emit(AuthChangeEvent::SignedOut);
        info!("Logged out");
        result
    }

    async fn get_session(&self) -> BackendResult<Option<Session>> {
        self.current_session().await
    }

    async fn set_session(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> BackendResult<Session> {
        let margin = self.refresh_policy.expiry_margin_secs;
        let expires_at = jwt_expiry(access_token);
        let still_valid =
            expires_at.is_some_and(|ts| ts - Utc::now() >= Duration::seconds(margin));

        let session = if still_valid {
            let user = self.fetch_user(access_token).await?;
            Session {
                access_token: access_token.to_string(),
                refresh_token: refresh_token.to_string(),
                expires_at: expires_at.unwrap_or_else(Utc::now),
                user,
            }
        } else {
            debug!("handed-over access token is expired, refreshing");
            self.request_token("refresh_token", json!({ "refresh_token": refresh_token }))
                .await?
        };

        self.store_session(&session)?;
        info!(user_id = %session.user.id, "Session adopted from handoff tokens");
        self.emit(AuthChangeEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn update_password(&self, new_password: &str) -> BackendResult<()> {
        let session = self.require_session().await?;
        let url = self.endpoint("auth/v1/user")?;

        let response = self
            .with_auth(self.http_client.put(url), &session.access_token)
            .json(&json!({ "password": new_password }))
            .send()
            .await?;
        let response = Self::check(response, "update password").await?;
        let user: User = response.json().await?;

        let updated = Session { user, ..session };
        self.store_session(&updated)?;
        info!(user_id = %updated.user.id, "Password updated");
        self.emit(AuthChangeEvent::UserUpdated(updated));
        Ok(())
    }

    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> BackendResult<()> {
        let mut url = self.endpoint("auth/v1/recover")?;
        url.query_pairs_mut().append_pair("redirect_to", redirect_to);

        let response = self
            .http_client
            .post(url)
            .header("apikey", &self.publishable_key)
            .json(&json!({ "email": email }))
            .send()
            .await?;
        Self::check(response, "password recovery").await?;
        debug!("Password recovery mail requested");
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthChangeEvent> {
        self.events.subscribe()
    }

    async fn select(&self, query: &Query) -> BackendResult<Vec<Value>> {
        let mut url = self.rest_url(&query.table)?;
        url.query_pairs_mut().extend_pairs(query.to_pairs());
        let bearer = self.bearer().await?;

        let response = self
            .with_auth(self.http_client.get(url), &bearer)
            .header("Accept", "application/json")
            .send()
            .await?;
        let response = Self::check(response, "select").await?;

        let rows: Vec<Value> = response.json().await?;
        debug!(table = %query.table, rows = rows.len(), "Fetched rows");
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: Value) -> BackendResult<Value> {
        let url = self.rest_url(table)?;
        let bearer = self.bearer().await?;

        let response = self
            .with_auth(self.http_client.post(url), &bearer)
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await?;
        let response = Self::check(response, "insert").await?;

        let rows: Vec<Value> = response.json().await?;
        debug!(table, "Inserted row");
        rows.into_iter().next().ok_or_else(|| {
            BackendError::UnexpectedResponse(format!("insert into {} returned no row", table))
        })
    }

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Value,
    ) -> BackendResult<Vec<Value>> {
        let mut url = self.rest_url(table)?;
        url.query_pairs_mut()
            .extend_pairs(filters.iter().map(Filter::to_pair));
        let bearer = self.bearer().await?;

        let response = self
            .with_auth(self.http_client.patch(url), &bearer)
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await?;
        let response = Self::check(response, "update").await?;

        let rows: Vec<Value> = response.json().await?;
        debug!(table, rows = rows.len(), "Updated rows");
        Ok(rows)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> BackendResult<()> {
        let mut url = self.rest_url(table)?;
        url.query_pairs_mut()
            .extend_pairs(filters.iter().map(Filter::to_pair));
        let bearer = self.bearer().await?;

        let response = self
            .with_auth(self.http_client.delete(url), &bearer)
            .send()
            .await?;
        Self::check(response, "delete").await?;
        debug!(table, "Deleted rows");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use session_storage::create_memory_vault;

    fn config() -> Config {
        Config {
            supabase_url: "https://test.supabase.co/".to_string(),
            supabase_publishable_key: "test-key".to_string(),
            ..Config::default()
        }
    }

    fn fake_jwt(exp: i64) -> String {
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"u-1","exp":{}}}"#, exp));
        format!("eyJhbGciOiJIUzI1NiJ9.{}.signature", payload)
    }

    #[test]
    fn test_summarize_response_body_hides_content() {
        let summary = summarize_response_body("password=hunter2");
        assert!(summary.starts_with("len=16,digest="));
        assert!(!summary.contains("hunter2"));
    }

    #[test]
    fn test_endpoint_urls() {
        let backend = SupabaseBackend::new(&config(), create_memory_vault()).unwrap();
        assert_eq!(
            backend.endpoint("auth/v1/token").unwrap().as_str(),
            "https://test.supabase.co/auth/v1/token"
        );
        assert_eq!(
            backend.rest_url("profiles").unwrap().as_str(),
            "https://test.supabase.co/rest/v1/profiles"
        );
    }

    #[test]
    fn test_gotrue_error_body() {
        let body: ApiErrorBody = serde_json::from_str(
            r#"{"code":400,"error_code":"invalid_credentials","msg":"Invalid login credentials"}"#,
        )
        .unwrap();
        let err = body.into_error(400);
        assert!(err.is_invalid_credentials());
        assert_eq!(err.code(), Some("invalid_credentials"));
    }

    #[test]
    fn test_postgrest_error_body() {
        let body: ApiErrorBody = serde_json::from_str(
            r#"{"code":"42501","message":"new row violates row-level security policy","details":null,"hint":null}"#,
        )
        .unwrap();
        let err = body.into_error(403);
        assert!(err.is_permission_denied());
        assert!(err.to_string().contains("row-level security"));
    }

    #[test]
    fn test_empty_error_body_falls_back_to_status() {
        let err = ApiErrorBody::default().into_error(502);
        assert!(err.is_transient());
        assert!(err.to_string().contains("HTTP 502"));
    }

    #[test]
    fn test_token_response_prefers_absolute_expiry() {
        let data: TokenResponse = serde_json::from_value(json!({
            "access_token": "a",
            "refresh_token": "r",
            "expires_in": 3600,
            "expires_at": 2_000_000_000,
            "user": { "id": "u-1", "email": "a@b.co" }
        }))
        .unwrap();
        let session = data.into_session();
        assert_eq!(session.expires_at.timestamp(), 2_000_000_000);
        assert_eq!(session.user.email.as_deref(), Some("a@b.co"));
    }

    #[test]
    fn test_jwt_expiry() {
        assert_eq!(
            jwt_expiry(&fake_jwt(1_900_000_000)).map(|ts| ts.timestamp()),
            Some(1_900_000_000)
        );
        assert_eq!(jwt_expiry("not-a-jwt"), None);
        assert_eq!(jwt_expiry("a.!!!.c"), None);
    }

    #[tokio::test]
    async fn test_restores_unexpired_session_without_network() {
        let vault = create_memory_vault();
        vault
            .set_session(
                "stored-access",
                "stored-refresh",
                &SessionMeta {
                    user_id: "user-9".to_string(),
                    email: None,
                    expires_at: (Utc::now() + Duration::hours(1)).to_rfc3339(),
                },
            )
            .unwrap();

        let backend = SupabaseBackend::new(&config(), vault).unwrap();
        let session = backend.get_session().await.unwrap().unwrap();
        assert_eq!(session.user.id, "user-9");
        assert_eq!(session.access_token, "stored-access");
    }

    #[tokio::test]
    async fn test_no_session_means_anonymous_bearer() {
        let backend = SupabaseBackend::new(&config(), create_memory_vault()).unwrap();
        assert!(backend.get_session().await.unwrap().is_none());
        assert_eq!(backend.bearer().await.unwrap(), "test-key");
        assert!(matches!(
            backend.update_password("whatever").await,
            Err(BackendError::NotAuthenticated)
        ));
    }
}
