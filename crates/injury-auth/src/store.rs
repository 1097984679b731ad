//! Session/profile store.
//!
//! Single source of truth for who is signed in and what their profile is,
//! reconciled against the backend's session lifecycle. The store owns one
//! listener task that applies session-change events for as long as the
//! store lives.
//!
//! Every commit to local state goes through the auth FSM under one short
//! lock. A generation counter, bumped by every sign-out path, lets slow
//! operations detect that the session they resolved is no longer wanted.

use crate::auth_fsm::{AuthMachine, AuthMachineInput, AuthState};
use crate::profile::{
    generate_employee_id, NewProfile, ProfileFields, ProfilePatch, ProfileRepository,
    ProfileUpdate, UserProfile,
};
use crate::validation::{normalize_email, optional, require_password, required, validate_new_password};
use crate::{AuthError, AuthResult};
use backend_client::{AuthChangeEvent, Backend, Session, User};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Point-in-time view of the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthSnapshot {
    pub state: AuthState,
    pub user_id: Option<String>,
    pub email: Option<String>,
    #[serde(skip)]
    pub session: Option<Session>,
    pub profile: Option<UserProfile>,
}

impl AuthSnapshot {
    pub fn is_loading(&self) -> bool {
        self.state.is_loading()
    }
}

/// Result of a sign-up.
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    pub user: User,
    /// False when the backend waits for email verification first.
    pub session_started: bool,
}

/// Where a session lookup landed.
enum Resolution {
    Anonymous,
    WithoutProfile(Session),
    WithProfile(Session, UserProfile),
}

impl Resolution {
    fn input(&self) -> AuthMachineInput {
        match self {
            Resolution::Anonymous => AuthMachineInput::ResolvedAnonymous,
            Resolution::WithoutProfile(_) => AuthMachineInput::ResolvedWithoutProfile,
            Resolution::WithProfile(..) => AuthMachineInput::ResolvedWithProfile,
        }
    }
}

/// Profile lookup result before commit.
enum Lookup {
    Resolved(Resolution),
    Deactivated(Session),
}

/// How profile lookup errors are treated.
#[derive(Clone, Copy, PartialEq, Eq)]
enum ProfileErrors {
    /// Logged and treated as "no profile".
    Soften,
    /// Returned to the caller.
    Propagate,
}

struct StoreState {
    machine: AuthMachine,
    session: Option<Session>,
    profile: Option<UserProfile>,
    generation: u64,
}

impl StoreState {
    fn auth_state(&self) -> AuthState {
        AuthState::from(self.machine.state())
    }

    fn transition(&mut self, input: &AuthMachineInput) -> AuthResult<AuthState> {
        let old_state = self.auth_state();

        self.machine.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                self.machine.state()
            ))
        })?;

        let new_state = self.auth_state();
        if old_state != new_state {
            debug!(old_state = ?old_state, new_state = ?new_state, "Auth state transition");
        }
        Ok(new_state)
    }

    fn snapshot(&self) -> AuthSnapshot {
        AuthSnapshot {
            state: self.auth_state(),
            user_id: self.session.as_ref().map(|s| s.user.id.clone()),
            email: self.session.as_ref().and_then(|s| s.user.email.clone()),
            session: self.session.clone(),
            profile: self.profile.clone(),
        }
    }
}

struct Inner {
    backend: Arc<dyn Backend>,
    profiles: ProfileRepository,
    state: Mutex<StoreState>,
    snapshots: watch::Sender<AuthSnapshot>,
}

/// Explicitly constructed session/profile store.
///
/// Must be created inside a tokio runtime; the session-change listener is
/// spawned on construction and stopped by [`SessionStore::shutdown`] or drop.
pub struct SessionStore {
    inner: Arc<Inner>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let state = StoreState {
            machine: AuthMachine::new(),
            session: None,
            profile: None,
            generation: 0,
        };
        let (snapshots, _) = watch::channel(state.snapshot());

        let inner = Arc::new(Inner {
            profiles: ProfileRepository::new(backend.clone()),
            backend,
            state: Mutex::new(state),
            snapshots,
        });

        let events = inner.backend.subscribe();
        let listener = tokio::spawn(Inner::listen(inner.clone(), events));

        Self {
            inner,
            listener: Mutex::new(Some(listener)),
        }
    }

    /// Profile and department repository sharing this store's backend.
    pub fn profiles(&self) -> &ProfileRepository {
        &self.inner.profiles
    }

    /// Restore any persisted session and its profile.
    ///
    /// The first call leaves `Loading` exactly once, whatever happens. Later
    /// calls re-synchronize with the backend without re-entering `Loading`.
    pub async fn initialize(&self) -> AuthResult<AuthState> {
        let generation = {
            let mut state = self.inner.state.lock();
            if state.auth_state() == AuthState::Uninitialized {
                state.transition(&AuthMachineInput::Initialize)?;
                self.inner.publish(&state);
                info!("Initializing session store");
            }
            state.generation
        };

        let session = match self.inner.backend.get_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Session restore failed, starting signed out");
                None
            }
        };

        let lookup = self
            .inner
            .lookup(session, ProfileErrors::Soften)
            .await?;
        let resolution = match lookup {
            Lookup::Resolved(resolution) => resolution,
            Lookup::Deactivated(session) => {
                warn!(user_id = %session.user.id, "Restored session belongs to a disabled account");
                self.inner.force_sign_out("account disabled").await;
                return Ok(self.state());
            }
        };

        match self.inner.commit(generation, resolution) {
            Ok(state) => {
                info!(state = ?state, "Session store initialized");
                Ok(state)
            }
            Err(AuthError::Superseded) => {
                debug!("Initialization result discarded after a sign-out");
                Ok(self.state())
            }
            Err(e) => Err(e),
        }
    }

    /// Sign in with email and password.
    ///
    /// A missing profile is not an error (the caller routes to onboarding).
    /// A disabled profile signs the session out again and fails.
    pub async fn login(&self, identifier: &str, secret: &str) -> AuthResult<AuthSnapshot> {
        self.inner.ensure_initialized()?;
        let email = normalize_email(identifier)?;
        require_password(secret)?;

        let generation = self.inner.generation();
        let session = self
            .inner
            .backend
            .sign_in_with_password(&email, secret)
            .await?;

        let resolution = match self
            .inner
            .lookup(Some(session), ProfileErrors::Soften)
            .await?
        {
            Lookup::Resolved(resolution) => resolution,
            Lookup::Deactivated(session) => {
                warn!(user_id = %session.user.id, "Login refused for disabled account");
                self.inner.force_sign_out("account disabled").await;
                return Err(AuthError::AccountDisabled);
            }
        };

        match self.inner.commit(generation, resolution) {
            Ok(state) => {
                info!(state = ?state, "Login complete");
                Ok(self.snapshot())
            }
            Err(AuthError::Superseded) => {
                // Signed out while the login was in flight; do not resurrect it.
                warn!("Login result arrived after sign-out, discarding");
                self.inner.force_sign_out("superseded login").await;
                Err(AuthError::Superseded)
            }
            Err(e) => Err(e),
        }
    }

    /// Create an account. Never creates a profile.
    ///
    /// If the backend starts a session right away, it reaches the store
    /// through the session-change stream.
    pub async fn signup(&self, identifier: &str, secret: &str) -> AuthResult<SignUpOutcome> {
        self.inner.ensure_initialized()?;
        let email = normalize_email(identifier)?;
        validate_new_password(secret)?;

        let response = self.inner.backend.sign_up(&email, secret).await?;
        info!(
            user_id = %response.user.id,
            session_started = response.session.is_some(),
            "Account created"
        );

        Ok(SignUpOutcome {
            user: response.user,
            session_started: response.session.is_some(),
        })
    }

    /// One-time onboarding: create the profile of `remote_user_id`.
    ///
    /// The created profile is stored locally only when the store holds that
    /// user's session; otherwise it is just returned.
    pub async fn complete_profile(
        &self,
        remote_user_id: &str,
        fields: ProfileFields,
    ) -> AuthResult<UserProfile> {
        self.inner.ensure_initialized()?;
        let user_id = required("User id", remote_user_id)?;
        let fields = fields.validate()?;

        let generation = self.inner.generation();
        let department = self.inner.profiles.resolve_department(&fields.department).await?;

        let new_profile = NewProfile {
            user_id: user_id.clone(),
            full_name: fields.full_name,
            employee_id: generate_employee_id(),
            department_id: department.id,
            position: fields.position,
            is_active: true,
            phone: fields.phone,
            company: fields.company,
        };
        self.inner.profiles.create(&new_profile).await?;

        let profile = self
            .inner
            .profiles
            .fetch_for_user(&user_id)
            .await?
            .ok_or(AuthError::NoProfile)?;

        self.inner.store_profile(generation, &profile)?;
        Ok(profile)
    }

    /// Self-service edit of the loaded profile.
    pub async fn update_profile(&self, update: ProfileUpdate) -> AuthResult<UserProfile> {
        self.inner.ensure_initialized()?;
        let current = self.profile().ok_or(AuthError::NoProfile)?;
        if update.is_empty() {
            return Ok(current);
        }

        let generation = self.inner.generation();
        let department_id = match update.department.as_deref() {
            Some(name) => {
                let name = required("Department", name)?;
                Some(self.inner.profiles.resolve_department(&name).await?.id)
            }
            None => None,
        };
        let patch = ProfilePatch {
            full_name: update
                .full_name
                .as_deref()
                .map(|v| required("Full name", v))
                .transpose()?,
            department_id,
            position: update
                .position
                .as_deref()
                .map(|v| required("Position", v))
                .transpose()?,
            phone: update.phone.as_deref().map(|v| optional(Some(v))),
            company: update.company.as_deref().map(|v| optional(Some(v))),
            is_active: None,
        };

        self.inner.profiles.update(&current.id, &patch).await?;
        let profile = self
            .inner
            .profiles
            .fetch_for_user(&current.user_id)
            .await?
            .ok_or(AuthError::NoProfile)?;

        self.inner.store_profile(generation, &profile)?;
        info!(profile_id = %profile.id, "Profile updated");
        Ok(profile)
    }

    /// Re-fetch the session and profile. Errors are returned, not softened.
    pub async fn refresh(&self) -> AuthResult<AuthSnapshot> {
        self.inner.ensure_initialized()?;
        let generation = self.inner.generation();

        let session = self.inner.backend.get_session().await?;
        let resolution = match self
            .inner
            .lookup(session, ProfileErrors::Propagate)
            .await?
        {
            Lookup::Resolved(resolution) => resolution,
            Lookup::Deactivated(_) => {
                self.inner.force_sign_out("account disabled").await;
                return Err(AuthError::AccountDisabled);
            }
        };

        self.inner.commit(generation, resolution)?;
        Ok(self.snapshot())
    }

    /// Sign out remotely, then clear local state regardless of the outcome.
    pub async fn logout(&self) -> AuthResult<()> {
        self.inner.ensure_initialized()?;
        if let Err(e) = self.inner.backend.sign_out().await {
            warn!(error = %e, "Backend sign-out failed, clearing local session anyway");
        }
        self.inner.clear("logout");
        info!("Logged out");
        Ok(())
    }

    pub fn state(&self) -> AuthState {
        self.inner.state.lock().auth_state()
    }

    pub fn session(&self) -> Option<Session> {
        self.inner.state.lock().session.clone()
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.inner.state.lock().profile.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state().is_loading()
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.inner.state.lock().snapshot()
    }

    /// Receiver that observes every committed change.
    pub fn watch(&self) -> watch::Receiver<AuthSnapshot> {
        self.inner.snapshots.subscribe()
    }

    /// Stop reacting to session-change events.
    pub fn shutdown(&self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
            debug!("Session store listener stopped");
        }
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    fn publish(&self, state: &StoreState) {
        self.snapshots.send_replace(state.snapshot());
    }

    fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    fn ensure_initialized(&self) -> AuthResult<()> {
        if self.state.lock().auth_state() == AuthState::Uninitialized {
            return Err(AuthError::NotInitialized);
        }
        Ok(())
    }

    async fn lookup(&self, session: Option<Session>, errors: ProfileErrors) -> AuthResult<Lookup> {
        let Some(session) = session else {
            return Ok(Lookup::Resolved(Resolution::Anonymous));
        };

        match self.profiles.fetch_for_user(&session.user.id).await {
            Ok(None) => Ok(Lookup::Resolved(Resolution::WithoutProfile(session))),
            Ok(Some(profile)) if !profile.is_active => Ok(Lookup::Deactivated(session)),
            Ok(Some(profile)) => Ok(Lookup::Resolved(Resolution::WithProfile(session, profile))),
            Err(e) if errors == ProfileErrors::Propagate => Err(e),
            Err(e) => {
                warn!(
                    user_id = %session.user.id,
                    error = %e,
                    "Profile lookup failed, continuing without profile"
                );
                Ok(Lookup::Resolved(Resolution::WithoutProfile(session)))
            }
        }
    }

    /// Apply a resolution unless a sign-out happened since `generation`.
    fn commit(&self, generation: u64, resolution: Resolution) -> AuthResult<AuthState> {
        let mut state = self.state.lock();
        if state.generation != generation {
            return Err(AuthError::Superseded);
        }

        let new_state = state.transition(&resolution.input())?;
        let (session, profile) = match resolution {
            Resolution::Anonymous => (None, None),
            Resolution::WithoutProfile(session) => (Some(session), None),
            Resolution::WithProfile(session, profile) => (Some(session), Some(profile)),
        };
        state.session = session;
        state.profile = profile;
        self.publish(&state);
        Ok(new_state)
    }

    /// Store a freshly written profile if it belongs to the current session.
    fn store_profile(&self, generation: u64, profile: &UserProfile) -> AuthResult<()> {
        let mut state = self.state.lock();
        if state.generation != generation {
            return Err(AuthError::Superseded);
        }
        let owns_session = state
            .session
            .as_ref()
            .is_some_and(|s| s.user.id == profile.user_id);
        if !owns_session {
            debug!(user_id = %profile.user_id, "Profile saved for a user without a local session");
            return Ok(());
        }

        let input = if state.auth_state() == AuthState::AuthenticatedNoProfile {
            AuthMachineInput::ProfileCompleted
        } else {
            AuthMachineInput::ResolvedWithProfile
        };
        state.transition(&input)?;
        state.profile = Some(profile.clone());
        self.publish(&state);
        Ok(())
    }

    /// Drop session and profile and invalidate in-flight operations.
    fn clear(&self, reason: &str) {
        let mut state = self.state.lock();
        state.generation += 1;
        if state.auth_state() == AuthState::Uninitialized {
            return;
        }
        if let Err(e) = state.transition(&AuthMachineInput::ResolvedAnonymous) {
            warn!(error = %e, "Unexpected state while clearing session");
        }
        state.session = None;
        state.profile = None;
        self.publish(&state);
        debug!(reason, "Local session cleared");
    }

    /// Clear locally, then end the backend session.
    async fn force_sign_out(&self, reason: &str) {
        self.clear(reason);
        if let Err(e) = self.backend.sign_out().await {
            warn!(error = %e, reason, "Backend sign-out failed");
        }
    }

    async fn listen(inner: Arc<Inner>, mut events: broadcast::Receiver<AuthChangeEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => inner.handle_event(event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed session events, re-synchronizing");
                    inner.resync().await;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Session event stream closed");
                    break;
                }
            }
        }
    }

    async fn handle_event(&self, event: AuthChangeEvent) {
        if self.state.lock().auth_state() == AuthState::Uninitialized {
            debug!(event = event.name(), "Ignoring session event before initialize");
            return;
        }
        debug!(event = event.name(), "Session event");

        match event {
            AuthChangeEvent::SignedIn(session) | AuthChangeEvent::PasswordRecovery(session) => {
                self.on_signed_in(session).await
            }
            AuthChangeEvent::SignedOut => self.clear("signed-out event"),
            AuthChangeEvent::TokenRefreshed(session) | AuthChangeEvent::UserUpdated(session) => {
                self.replace_credentials(session)
            }
        }
    }

    async fn on_signed_in(&self, session: Session) {
        let generation = self.generation();

        // Events can trail the backend; only act on its current session.
        let session = match self.backend.get_session().await {
            Ok(Some(current)) if current.user.id == session.user.id => current,
            Ok(_) => {
                debug!(user_id = %session.user.id, "Ignoring stale signed-in event");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Could not confirm signed-in session, using event session");
                session
            }
        };

        let lookup = match self.lookup(Some(session), ProfileErrors::Soften).await {
            Ok(lookup) => lookup,
            Err(e) => {
                warn!(error = %e, "Signed-in handling failed");
                return;
            }
        };

        match lookup {
            Lookup::Deactivated(session) => {
                warn!(user_id = %session.user.id, "Signed-in account is disabled, signing out");
                self.force_sign_out("account disabled").await;
            }
            Lookup::Resolved(resolution) => match self.commit(generation, resolution) {
                Ok(_) | Err(AuthError::Superseded) => {}
                Err(e) => warn!(error = %e, "Could not apply signed-in event"),
            },
        }
    }

    fn replace_credentials(&self, session: Session) {
        let mut state = self.state.lock();
        match &state.session {
            Some(current) if current.user.id == session.user.id => {
                state.session = Some(session);
                self.publish(&state);
                debug!("Session credentials replaced");
            }
            Some(_) => warn!("Credential update for a different user ignored"),
            None => debug!("Credential update without a local session ignored"),
        }
    }

    async fn resync(&self) {
        let generation = self.generation();
        let session = match self.backend.get_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Re-synchronization failed");
                return;
            }
        };
        match self.lookup(session, ProfileErrors::Soften).await {
            Ok(Lookup::Resolved(resolution)) => {
                if let Err(e) = self.commit(generation, resolution) {
                    debug!(error = %e, "Re-synchronization result discarded");
                }
            }
            Ok(Lookup::Deactivated(_)) => self.force_sign_out("account disabled").await,
            Err(e) => warn!(error = %e, "Re-synchronization failed"),
        }
    }
}
