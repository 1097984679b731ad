//! Shared fixtures for store tests.

#![allow(dead_code)]

use backend_client::{MemoryBackend, User};
use injury_auth::{AuthSnapshot, SessionStore, DEPARTMENTS_TABLE, PROFILES_TABLE};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

pub const EMAIL: &str = "worker@example.com";
pub const PASSWORD: &str = "secret123";

pub struct Harness {
    pub backend: Arc<MemoryBackend>,
    pub store: SessionStore,
}

pub fn backend() -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::new());
    backend.seed(DEPARTMENTS_TABLE, json!({ "id": "dep-assembly", "name": "Assembly" }));
    backend.seed(DEPARTMENTS_TABLE, json!({ "id": "dep-warehouse", "name": "Warehouse" }));
    backend
}

/// Store over a fresh backend, not yet initialized.
pub fn harness() -> Harness {
    let backend = backend();
    let store = SessionStore::new(backend.clone());
    Harness { backend, store }
}

/// Store over a fresh backend, initialized with no session.
pub async fn initialized() -> Harness {
    let harness = harness();
    harness.store.initialize().await.unwrap();
    harness
}

pub fn profile_row(user: &User, active: bool) -> Value {
    json!({
        "id": format!("profile-{}", user.id),
        "user_id": user.id,
        "full_name": "Ana Ruiz",
        "employee_id": "EMP-0A1B2C3D",
        "department_id": "dep-assembly",
        "position": "operator",
        "is_active": active,
        "phone": null,
        "company": "Acme",
        "created_at": "2024-01-15T10:30:00Z"
    })
}

/// Account with a profile row.
pub fn add_worker(backend: &MemoryBackend, active: bool) -> User {
    let user = backend.add_account(EMAIL, PASSWORD);
    backend.seed(PROFILES_TABLE, profile_row(&user, active));
    user
}

/// Let the listener task drain queued session events.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
}

/// Wait until a committed snapshot satisfies `predicate`.
pub async fn wait_for<F>(store: &SessionStore, predicate: F) -> AuthSnapshot
where
    F: Fn(&AuthSnapshot) -> bool,
{
    let mut rx = store.watch();
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let snapshot = rx.borrow_and_update().clone();
            if predicate(&snapshot) {
                return snapshot;
            }
            if rx.changed().await.is_err() {
                panic!("store dropped while waiting");
            }
        }
    })
    .await
    .expect("timed out waiting for store state")
}
