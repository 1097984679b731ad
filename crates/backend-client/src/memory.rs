//! In-process [`Backend`] for tests and offline runs.
//!
//! Behaves like a small project: an account registry, tables held as JSON
//! rows, a current session and the session-change broadcast. Failures can be
//! queued per operation and sign-in can be held open to exercise races.

use crate::{
    AuthChangeEvent, Backend, BackendError, BackendResult, Filter, Query, Session,
    SignUpResponse, User,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, Notify};
use uuid::Uuid;

const SESSION_LIFETIME_SECS: i64 = 3600;

/// Backend operation, for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    SignUp,
    SignIn,
    SignOut,
    GetSession,
    SetSession,
    UpdatePassword,
    ResetPassword,
    Select,
    Insert,
    Update,
    Delete,
}

struct Account {
    user: User,
    password: String,
}

#[derive(Default)]
struct State {
    accounts: HashMap<String, Account>,
    tables: HashMap<String, Vec<Value>>,
    session: Option<Session>,
    handoff_tokens: HashMap<String, String>,
    failures: HashMap<Operation, VecDeque<BackendError>>,
    sign_in_emails: Vec<String>,
    sign_up_emails: Vec<String>,
    reset_requests: Vec<(String, String)>,
    require_email_confirmation: bool,
}

/// In-memory backend.
pub struct MemoryBackend {
    state: Mutex<State>,
    sign_in_gate: Mutex<Option<Arc<Notify>>>,
    events: broadcast::Sender<AuthChangeEvent>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn issue_session(user: &User) -> Session {
    Session {
        access_token: format!("access-{}", Uuid::new_v4()),
        refresh_token: format!("refresh-{}", Uuid::new_v4()),
        expires_at: Utc::now() + Duration::seconds(SESSION_LIFETIME_SECS),
        user: user.clone(),
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        // Nulls sort last ascending.
        (None | Some(Value::Null), _) => Ordering::Greater,
        (_, None | Some(Value::Null)) => Ordering::Less,
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

fn project(row: &Value, columns: &str) -> Value {
    if columns.trim() == "*" {
        return row.clone();
    }
    let mut out = Map::new();
    for column in columns.split(',').map(str::trim) {
        if let Some(value) = row.get(column) {
            out.insert(column.to_string(), value.clone());
        }
    }
    Value::Object(out)
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(100);
        Self {
            state: Mutex::new(State {
                require_email_confirmation: true,
                ..State::default()
            }),
            sign_in_gate: Mutex::new(None),
            events,
        }
    }

    /// Register an account directly, bypassing sign-up.
    pub fn add_account(&self, email: &str, password: &str) -> User {
        let user = User::new(Uuid::new_v4().to_string(), Some(email));
        self.state.lock().accounts.insert(
            email.to_string(),
            Account {
                user: user.clone(),
                password: password.to_string(),
            },
        );
        user
    }

    /// Whether sign-up withholds the session until the email is verified.
    pub fn set_require_email_confirmation(&self, required: bool) {
        self.state.lock().require_email_confirmation = required;
    }

    /// Append a row as-is.
    pub fn seed(&self, table: &str, row: Value) {
        self.state
            .lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    /// Snapshot of a table.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.state
            .lock()
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Make the next call of `operation` fail with `error`.
    pub fn fail_next(&self, operation: Operation, error: BackendError) {
        self.state
            .lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Hold every sign-in after credential checks until the returned gate is notified.
    pub fn hold_sign_in(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.sign_in_gate.lock() = Some(gate.clone());
        gate
    }

    /// Emails passed to sign-in, in call order.
    pub fn sign_in_emails(&self) -> Vec<String> {
        self.state.lock().sign_in_emails.clone()
    }

    /// Emails passed to sign-up, in call order.
    pub fn sign_up_emails(&self) -> Vec<String> {
        self.state.lock().sign_up_emails.clone()
    }

    /// `(email, redirect_to)` pairs passed to password reset.
    pub fn reset_requests(&self) -> Vec<(String, String)> {
        self.state.lock().reset_requests.clone()
    }

    /// Current password of an account, if it exists.
    pub fn password_of(&self, email: &str) -> Option<String> {
        self.state
            .lock()
            .accounts
            .get(email)
            .map(|a| a.password.clone())
    }

    /// The backend's view of the current session.
    pub fn current_session(&self) -> Option<Session> {
        self.state.lock().session.clone()
    }

    /// Drop the session silently, as a server-side revocation would.
    pub fn revoke_session(&self) {
        self.state.lock().session = None;
    }

    /// Rotate tokens of the current session and announce it.
    pub fn rotate_tokens(&self) -> Option<Session> {
        let rotated = {
            let mut state = self.state.lock();
            let current = state.session.as_ref()?;
            let rotated = issue_session(&current.user);
            state.session = Some(rotated.clone());
            rotated
        };
        self.emit(AuthChangeEvent::TokenRefreshed(rotated.clone()));
        Some(rotated)
    }

    /// Issue handoff tokens for an account, as a recovery mail link would carry.
    pub fn issue_recovery_tokens(&self, email: &str) -> Option<(String, String)> {
        let mut state = self.state.lock();
        state.accounts.get(email)?;
        let access = format!("recovery-access-{}", Uuid::new_v4());
        let refresh = format!("recovery-refresh-{}", Uuid::new_v4());
        state.handoff_tokens.insert(access.clone(), email.to_string());
        Some((access, refresh))
    }

    /// Broadcast an arbitrary session-change event.
    pub fn emit(&self, event: AuthChangeEvent) {
        let _ = self.events.send(event);
    }

    fn take_failure(&self, operation: Operation) -> BackendResult<()> {
        match self
            .state
            .lock()
            .failures
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn sign_up(&self, email: &str, password: &str) -> BackendResult<SignUpResponse> {
        self.take_failure(Operation::SignUp)?;
        let (user, session) = {
            let mut state = self.state.lock();
            state.sign_up_emails.push(email.to_string());
            if state.accounts.contains_key(email) {
                return Err(BackendError::api(
                    422,
                    Some("user_already_exists"),
                    "User already registered",
                ));
            }
            let user = User::new(Uuid::new_v4().to_string(), Some(email));
            state.accounts.insert(
                email.to_string(),
                Account {
                    user: user.clone(),
                    password: password.to_string(),
                },
            );
            let session = if state.require_email_confirmation {
                None
            } else {
                let session = issue_session(&user);
                state.session = Some(session.clone());
                Some(session)
            };
            (user, session)
        };

        if let Some(session) = &session {
            self.emit(AuthChangeEvent::SignedIn(session.clone()));
        }
        Ok(SignUpResponse { user, session })
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> BackendResult<Session> {
        self.take_failure(Operation::SignIn)?;
        let user = {
            let mut state = self.state.lock();
            state.sign_in_emails.push(email.to_string());
            match state.accounts.get(email) {
                Some(account) if account.password == password => account.user.clone(),
                _ => {
                    return Err(BackendError::api(
                        400,
                        Some("invalid_credentials"),
                        "Invalid login credentials",
                    ))
                }
            }
        };

        let gate = self.sign_in_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let session = issue_session(&user);
        self.state.lock().session = Some(session.clone());
        self.emit(AuthChangeEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> BackendResult<()> {
        let result = self.take_failure(Operation::SignOut);
        // Local session goes regardless of the remote outcome.
        self.state.lock().session = None;
        self.emit(AuthChangeEvent::SignedOut);
        result
    }

    async fn get_session(&self) -> BackendResult<Option<Session>> {
        self.take_failure(Operation::GetSession)?;
        Ok(self.state.lock().session.clone())
    }

    async fn set_session(
        &self,
        access_token: &str,
        _refresh_token: &str,
    ) -> BackendResult<Session> {
        self.take_failure(Operation::SetSession)?;
        let session = {
            let mut state = self.state.lock();
            let email = state
                .handoff_tokens
                .remove(access_token)
                .ok_or_else(|| BackendError::api(401, Some("bad_jwt"), "invalid JWT"))?;
            let user = state
                .accounts
                .get(&email)
                .map(|a| a.user.clone())
                .ok_or_else(|| BackendError::api(404, Some("user_not_found"), "User not found"))?;
            let session = issue_session(&user);
            state.session = Some(session.clone());
            session
        };
        self.emit(AuthChangeEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn update_password(&self, new_password: &str) -> BackendResult<()> {
        self.take_failure(Operation::UpdatePassword)?;
        let session = {
            let mut state = self.state.lock();
            let session = state.session.clone().ok_or(BackendError::NotAuthenticated)?;
            let email = session.user.email.clone().unwrap_or_default();
            let account = state
                .accounts
                .get_mut(&email)
                .ok_or(BackendError::NotAuthenticated)?;
            account.password = new_password.to_string();
            session
        };
        self.emit(AuthChangeEvent::UserUpdated(session));
        Ok(())
    }

    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> BackendResult<()> {
        self.state
            .lock()
            .reset_requests
            .push((email.to_string(), redirect_to.to_string()));
        self.take_failure(Operation::ResetPassword)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthChangeEvent> {
        self.events.subscribe()
    }

    async fn select(&self, query: &Query) -> BackendResult<Vec<Value>> {
        self.take_failure(Operation::Select)?;
        let state = self.state.lock();
        let mut rows: Vec<Value> = state
            .tables
            .get(&query.table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| Query::matches(&query.filters, row))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ordering = compare_values(a.get(&order.column), b.get(&order.column));
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        if let Some(columns) = &query.columns {
            rows = rows.iter().map(|row| project(row, columns)).collect();
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, row: Value) -> BackendResult<Value> {
        self.take_failure(Operation::Insert)?;
        let Value::Object(mut fields) = row else {
            return Err(BackendError::api(400, Some("PGRST102"), "row must be an object"));
        };
        fields
            .entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        fields
            .entry("created_at")
            .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));

        let stored = Value::Object(fields);
        self.state
            .lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Value,
    ) -> BackendResult<Vec<Value>> {
        self.take_failure(Operation::Update)?;
        let Value::Object(patch) = patch else {
            return Err(BackendError::api(400, Some("PGRST102"), "patch must be an object"));
        };

        let mut state = self.state.lock();
        let mut updated = Vec::new();
        if let Some(rows) = state.tables.get_mut(table) {
            for row in rows.iter_mut().filter(|row| Query::matches(filters, row)) {
                if let Value::Object(fields) = row {
                    for (key, value) in &patch {
                        fields.insert(key.clone(), value.clone());
                    }
                }
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> BackendResult<()> {
        self.take_failure(Operation::Delete)?;
        if let Some(rows) = self.state.lock().tables.get_mut(table) {
            rows.retain(|row| !Query::matches(filters, row));
        }
        Ok(())
    }
}
