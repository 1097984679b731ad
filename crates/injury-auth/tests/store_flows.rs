//! Session store operations end to end over the in-memory backend.

mod common;

use backend_client::{Backend, BackendError, Operation};
use common::*;
use injury_auth::{AuthError, AuthState, ProfileFields, ProfileUpdate, PROFILES_TABLE};
use std::sync::Arc;

fn onboarding_fields(department: &str) -> ProfileFields {
    ProfileFields {
        full_name: "Ana Ruiz".to_string(),
        department: department.to_string(),
        position: "operator".to_string(),
        phone: Some(" 555-0100 ".to_string()),
        company: None,
    }
}

#[tokio::test]
async fn operations_before_initialize_fail() {
    let h = harness();
    assert!(h.store.is_loading());
    assert!(matches!(
        h.store.login(EMAIL, PASSWORD).await,
        Err(AuthError::NotInitialized)
    ));
    assert!(matches!(h.store.logout().await, Err(AuthError::NotInitialized)));
    assert!(matches!(h.store.refresh().await, Err(AuthError::NotInitialized)));
    assert!(h.backend.sign_in_emails().is_empty());
}

#[tokio::test]
async fn initialize_without_session_is_unauthenticated() {
    let h = harness();
    let state = h.store.initialize().await.unwrap();

    assert_eq!(state, AuthState::Unauthenticated);
    assert!(!h.store.is_loading());
    assert!(h.store.session().is_none());
    assert!(h.store.profile().is_none());
}

#[tokio::test]
async fn initialize_restores_session_and_profile() {
    let backend = backend();
    let user = add_worker(&backend, true);
    backend.sign_in_with_password(EMAIL, PASSWORD).await.unwrap();

    let store = injury_auth::SessionStore::new(backend.clone());
    assert_eq!(store.initialize().await.unwrap(), AuthState::AuthenticatedWithProfile);
    assert_eq!(store.session().unwrap().user.id, user.id);
    assert_eq!(store.profile().unwrap().user_id, user.id);
}

#[tokio::test]
async fn initialize_twice_matches_once() {
    let backend = backend();
    add_worker(&backend, true);
    backend.sign_in_with_password(EMAIL, PASSWORD).await.unwrap();

    let store = injury_auth::SessionStore::new(backend.clone());
    store.initialize().await.unwrap();
    let first = store.snapshot();

    store.initialize().await.unwrap();
    assert_eq!(store.snapshot(), first);
    assert!(!store.is_loading());
}

#[tokio::test]
async fn initialize_softens_profile_errors() {
    let backend = backend();
    add_worker(&backend, true);
    backend.sign_in_with_password(EMAIL, PASSWORD).await.unwrap();
    backend.fail_next(Operation::Select, BackendError::api(503, None, "unavailable"));

    let store = injury_auth::SessionStore::new(backend.clone());
    assert_eq!(store.initialize().await.unwrap(), AuthState::AuthenticatedNoProfile);
    assert!(store.session().is_some());
}

#[tokio::test]
async fn initialize_survives_session_restore_failure() {
    let h = harness();
    h.backend
        .fail_next(Operation::GetSession, BackendError::api(500, None, "boom"));

    assert_eq!(h.store.initialize().await.unwrap(), AuthState::Unauthenticated);
    assert!(!h.store.is_loading());
}

#[tokio::test]
async fn login_with_active_profile_sets_session_and_profile() {
    let h = initialized().await;
    let user = add_worker(&h.backend, true);

    let snapshot = h.store.login(EMAIL, PASSWORD).await.unwrap();

    assert_eq!(snapshot.state, AuthState::AuthenticatedWithProfile);
    assert_eq!(snapshot.user_id.as_deref(), Some(user.id.as_str()));
    assert_eq!(h.store.profile().unwrap().employee_id, "EMP-0A1B2C3D");
}

#[tokio::test]
async fn login_with_deactivated_profile_fails_without_session() {
    let h = initialized().await;
    add_worker(&h.backend, false);

    let result = h.store.login(EMAIL, PASSWORD).await;
    assert!(matches!(result, Err(AuthError::AccountDisabled)));
    assert!(h.store.session().is_none());
    assert!(h.store.profile().is_none());

    settle().await;
    assert_eq!(h.store.state(), AuthState::Unauthenticated);
    assert!(h.backend.current_session().is_none());
}

#[tokio::test]
async fn login_prefers_active_profile_over_newer_deactivated_one() {
    let h = initialized().await;
    let user = add_worker(&h.backend, true);
    let mut retired = profile_row(&user, false);
    retired["id"] = "profile-retired".into();
    retired["created_at"] = "2024-06-01T00:00:00Z".into();
    h.backend.seed(PROFILES_TABLE, retired);

    let snapshot = h.store.login(EMAIL, PASSWORD).await.unwrap();

    assert_eq!(snapshot.state, AuthState::AuthenticatedWithProfile);
    let profile = h.store.profile().unwrap();
    assert_eq!(profile.id, format!("profile-{}", user.id));
    assert!(profile.is_active);
}

#[tokio::test]
async fn login_without_profile_keeps_session_only() {
    let h = initialized().await;
    h.backend.add_account(EMAIL, PASSWORD);

    let snapshot = h.store.login(EMAIL, PASSWORD).await.unwrap();
    assert_eq!(snapshot.state, AuthState::AuthenticatedNoProfile);
    assert!(h.store.session().is_some());
    assert!(h.store.profile().is_none());
}

#[tokio::test]
async fn login_normalizes_identifier() {
    let h = initialized().await;
    add_worker(&h.backend, true);

    h.store.login("User@Example.com ", PASSWORD).await.unwrap_err();
    assert_eq!(h.backend.sign_in_emails(), vec!["user@example.com".to_string()]);

    h.store.login("  WORKER@example.COM", PASSWORD).await.unwrap();
    assert_eq!(h.backend.sign_in_emails()[1], EMAIL);
}

#[tokio::test]
async fn failed_login_leaves_state_untouched() {
    let h = initialized().await;
    add_worker(&h.backend, true);
    h.store.login(EMAIL, PASSWORD).await.unwrap();
    settle().await;
    let before = h.store.snapshot();

    let err = h.store.login(EMAIL, "wrong-password").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
    assert_eq!(err.user_message(), "Invalid email or password.");
    assert_eq!(h.store.snapshot(), before);
}

#[tokio::test]
async fn login_validates_before_calling_backend() {
    let h = initialized().await;

    assert!(matches!(
        h.store.login("not-an-email", PASSWORD).await,
        Err(AuthError::Validation(_))
    ));
    assert!(matches!(
        h.store.login(EMAIL, "").await,
        Err(AuthError::Validation(_))
    ));
    assert!(h.backend.sign_in_emails().is_empty());
}

#[tokio::test]
async fn signup_then_login_has_no_profile() {
    let h = initialized().await;

    let outcome = h.store.signup(" New.Worker@Example.com", PASSWORD).await.unwrap();
    assert!(!outcome.session_started);
    assert_eq!(h.backend.sign_up_emails(), vec!["new.worker@example.com".to_string()]);
    assert!(h.backend.rows(PROFILES_TABLE).is_empty());

    let snapshot = h.store.login("new.worker@example.com", PASSWORD).await.unwrap();
    assert_eq!(snapshot.state, AuthState::AuthenticatedNoProfile);
    assert!(snapshot.profile.is_none());
}

#[tokio::test]
async fn signup_rejects_duplicates_and_short_passwords() {
    let h = initialized().await;
    h.backend.add_account(EMAIL, PASSWORD);

    assert!(matches!(
        h.store.signup(EMAIL, PASSWORD).await,
        Err(AuthError::AccountExists)
    ));
    assert!(matches!(
        h.store.signup("other@example.com", "12345").await,
        Err(AuthError::Validation(_))
    ));
    assert_eq!(h.backend.sign_up_emails().len(), 1);
}

#[tokio::test]
async fn complete_profile_with_unknown_department_creates_nothing() {
    let h = initialized().await;
    h.backend.add_account(EMAIL, PASSWORD);
    let snapshot = h.store.login(EMAIL, PASSWORD).await.unwrap();
    let user_id = snapshot.user_id.unwrap();
    settle().await;

    let result = h
        .store
        .complete_profile(&user_id, onboarding_fields("Loading Dock"))
        .await;

    assert!(matches!(result, Err(AuthError::UnknownDepartment(name)) if name == "Loading Dock"));
    assert!(h.backend.rows(PROFILES_TABLE).is_empty());
    assert_eq!(h.store.state(), AuthState::AuthenticatedNoProfile);
}

#[tokio::test]
async fn complete_profile_moves_to_ready() {
    let h = initialized().await;
    h.backend.add_account(EMAIL, PASSWORD);
    let user_id = h.store.login(EMAIL, PASSWORD).await.unwrap().user_id.unwrap();
    settle().await;

    let profile = h
        .store
        .complete_profile(&user_id, onboarding_fields("Warehouse"))
        .await
        .unwrap();

    assert_eq!(profile.department_id, "dep-warehouse");
    assert_eq!(profile.phone.as_deref(), Some("555-0100"));
    assert!(profile.employee_id.starts_with("EMP-"));
    assert!(profile.is_active);
    assert_eq!(h.store.state(), AuthState::AuthenticatedWithProfile);
    assert_eq!(h.store.profile(), Some(profile));
}

#[tokio::test]
async fn complete_profile_validates_required_fields() {
    let h = initialized().await;
    let fields = ProfileFields {
        full_name: "  ".to_string(),
        ..onboarding_fields("Warehouse")
    };

    assert!(matches!(
        h.store.complete_profile("user-1", fields).await,
        Err(AuthError::Validation(_))
    ));
    assert!(h.backend.rows(PROFILES_TABLE).is_empty());
}

#[tokio::test]
async fn complete_profile_without_local_session_is_not_stored() {
    let h = initialized().await;
    let outcome = h.store.signup(EMAIL, PASSWORD).await.unwrap();

    let profile = h
        .store
        .complete_profile(&outcome.user.id, onboarding_fields("Assembly"))
        .await
        .unwrap();

    assert_eq!(profile.user_id, outcome.user.id);
    assert_eq!(h.backend.rows(PROFILES_TABLE).len(), 1);
    assert_eq!(h.store.state(), AuthState::Unauthenticated);
    assert!(h.store.profile().is_none());
}

#[tokio::test]
async fn refresh_without_backend_session_clears_profile() {
    let h = initialized().await;
    add_worker(&h.backend, true);
    h.store.login(EMAIL, PASSWORD).await.unwrap();
    settle().await;
    assert!(h.store.profile().is_some());

    h.backend.revoke_session();
    let snapshot = h.store.refresh().await.unwrap();

    assert_eq!(snapshot.state, AuthState::Unauthenticated);
    assert!(h.store.profile().is_none());
    assert!(h.store.session().is_none());
}

#[tokio::test]
async fn refresh_propagates_profile_errors() {
    let h = initialized().await;
    add_worker(&h.backend, true);
    h.store.login(EMAIL, PASSWORD).await.unwrap();
    settle().await;
    let before = h.store.snapshot();

    h.backend
        .fail_next(Operation::Select, BackendError::api(503, None, "unavailable"));
    let err = h.store.refresh().await.unwrap_err();

    assert!(err.is_transient());
    assert_eq!(h.store.snapshot(), before);
}

#[tokio::test]
async fn refresh_propagates_session_errors() {
    let h = initialized().await;
    h.backend
        .fail_next(Operation::GetSession, BackendError::api(500, None, "boom"));

    assert!(matches!(h.store.refresh().await, Err(AuthError::Backend(_))));
}

#[tokio::test]
async fn logout_clears_even_when_backend_fails() {
    let h = initialized().await;
    add_worker(&h.backend, true);
    h.store.login(EMAIL, PASSWORD).await.unwrap();
    settle().await;

    h.backend
        .fail_next(Operation::SignOut, BackendError::api(503, None, "unavailable"));
    h.store.logout().await.unwrap();

    assert_eq!(h.store.state(), AuthState::Unauthenticated);
    assert!(h.store.session().is_none());
    assert!(h.store.profile().is_none());
}

#[tokio::test]
async fn slow_login_superseded_by_logout_stays_signed_out() {
    let h = initialized().await;
    add_worker(&h.backend, true);
    let gate = h.backend.hold_sign_in();
    let store = Arc::new(h.store);

    let login = {
        let store = store.clone();
        tokio::spawn(async move { store.login(EMAIL, PASSWORD).await })
    };
    while h.backend.sign_in_emails().is_empty() {
        tokio::task::yield_now().await;
    }

    store.logout().await.unwrap();
    gate.notify_one();

    let result = login.await.unwrap();
    assert!(matches!(result, Err(AuthError::Superseded)));

    settle().await;
    assert_eq!(store.state(), AuthState::Unauthenticated);
    assert!(store.session().is_none());
    assert!(h.backend.current_session().is_none());
}

#[tokio::test]
async fn update_profile_resolves_department() {
    let h = initialized().await;
    add_worker(&h.backend, true);
    h.store.login(EMAIL, PASSWORD).await.unwrap();
    settle().await;

    let updated = h
        .store
        .update_profile(ProfileUpdate {
            department: Some("Warehouse".to_string()),
            position: Some("shift lead".to_string()),
            ..ProfileUpdate::default()
        })
        .await
        .unwrap();

    assert_eq!(updated.department_id, "dep-warehouse");
    assert_eq!(updated.position, "shift lead");
    assert_eq!(h.store.profile(), Some(updated));
}

#[tokio::test]
async fn update_profile_failure_leaves_profile_unchanged() {
    let h = initialized().await;
    add_worker(&h.backend, true);
    h.store.login(EMAIL, PASSWORD).await.unwrap();
    settle().await;
    let before = h.store.profile();

    assert!(matches!(
        h.store
            .update_profile(ProfileUpdate {
                department: Some("Nowhere".to_string()),
                ..ProfileUpdate::default()
            })
            .await,
        Err(AuthError::UnknownDepartment(_))
    ));

    h.backend.fail_next(
        Operation::Update,
        BackendError::api(403, Some("42501"), "row-level security"),
    );
    assert!(matches!(
        h.store
            .update_profile(ProfileUpdate {
                full_name: Some("Ana R.".to_string()),
                ..ProfileUpdate::default()
            })
            .await,
        Err(AuthError::PermissionDenied(_))
    ));
    assert_eq!(h.store.profile(), before);
}

#[tokio::test]
async fn update_profile_requires_profile() {
    let h = initialized().await;
    assert!(matches!(
        h.store.update_profile(ProfileUpdate::default()).await,
        Err(AuthError::NoProfile)
    ));
}

#[tokio::test]
async fn update_profile_blank_optional_fields_clear_them() {
    let h = initialized().await;
    add_worker(&h.backend, true);
    h.store.login(EMAIL, PASSWORD).await.unwrap();
    settle().await;
    assert_eq!(h.store.profile().unwrap().company.as_deref(), Some("Acme"));

    let updated = h
        .store
        .update_profile(ProfileUpdate {
            company: Some("  ".to_string()),
            ..ProfileUpdate::default()
        })
        .await
        .unwrap();

    assert_eq!(updated.company, None);
    assert_eq!(h.store.profile().unwrap().company, None);
    let rows = h.backend.rows(PROFILES_TABLE);
    assert!(rows[0]["company"].is_null());
}
