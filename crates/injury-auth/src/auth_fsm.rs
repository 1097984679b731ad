//! Session/profile state machine using rust-fsm.
//!
//! ```text
//!  Uninitialized
//!       │ Initialize
//!       ▼
//!    Loading ──────────────┬──────────────────┐
//!       │ ResolvedAnonymous│ ResolvedWithout  │ ResolvedWithProfile
//!       ▼                  ▼ Profile          ▼
//!  Unauthenticated ◄──► NeedsProfile ──────► Ready
//!                         ProfileCompleted
//! ```
//!
//! Every settled state accepts all three `Resolved*` inputs, so login,
//! logout, refresh and session events can move between them freely. Nothing
//! re-enters `Loading` and nothing leaves `Uninitialized` except `Initialize`.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub auth_machine(Uninitialized)

    Uninitialized => {
        Initialize => Loading
    },
    Loading => {
        ResolvedAnonymous => Unauthenticated,
        ResolvedWithoutProfile => NeedsProfile,
        ResolvedWithProfile => Ready
    },
    Unauthenticated => {
        ResolvedAnonymous => Unauthenticated,
        ResolvedWithoutProfile => NeedsProfile,
        ResolvedWithProfile => Ready
    },
    NeedsProfile => {
        ResolvedAnonymous => Unauthenticated,
        ResolvedWithoutProfile => NeedsProfile,
        ResolvedWithProfile => Ready,
        ProfileCompleted => Ready
    },
    Ready => {
        ResolvedAnonymous => Unauthenticated,
        ResolvedWithoutProfile => NeedsProfile,
        ResolvedWithProfile => Ready
    }
}

pub use auth_machine::Input as AuthMachineInput;
pub use auth_machine::State as AuthMachineState;
pub use auth_machine::StateMachine as AuthMachine;

/// Externally visible auth state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// `initialize` has not been called yet.
    Uninitialized,
    /// First session restore in progress.
    Loading,
    /// No session.
    Unauthenticated,
    /// Signed in, onboarding (profile completion) pending.
    AuthenticatedNoProfile,
    /// Signed in with an active profile.
    AuthenticatedWithProfile,
}

impl AuthState {
    pub fn is_loading(&self) -> bool {
        matches!(self, AuthState::Uninitialized | AuthState::Loading)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(
            self,
            AuthState::AuthenticatedNoProfile | AuthState::AuthenticatedWithProfile
        )
    }

    pub fn has_profile(&self) -> bool {
        matches!(self, AuthState::AuthenticatedWithProfile)
    }
}

impl From<&AuthMachineState> for AuthState {
    fn from(state: &AuthMachineState) -> Self {
        match state {
            AuthMachineState::Uninitialized => AuthState::Uninitialized,
            AuthMachineState::Loading => AuthState::Loading,
            AuthMachineState::Unauthenticated => AuthState::Unauthenticated,
            AuthMachineState::NeedsProfile => AuthState::AuthenticatedNoProfile,
            AuthMachineState::Ready => AuthState::AuthenticatedWithProfile,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(input: AuthMachineInput) -> AuthMachine {
        let mut machine = AuthMachine::new();
        machine.consume(&AuthMachineInput::Initialize).unwrap();
        machine.consume(&input).unwrap();
        machine
    }

    #[test]
    fn test_initial_state_is_uninitialized() {
        let machine = AuthMachine::new();
        assert_eq!(*machine.state(), AuthMachineState::Uninitialized);
        assert!(AuthState::from(machine.state()).is_loading());
    }

    #[test]
    fn test_cannot_skip_loading() {
        let mut machine = AuthMachine::new();
        assert!(machine.consume(&AuthMachineInput::ResolvedWithProfile).is_err());
        assert!(machine.consume(&AuthMachineInput::ResolvedAnonymous).is_err());
        assert_eq!(*machine.state(), AuthMachineState::Uninitialized);
    }

    #[test]
    fn test_loading_resolves_to_each_settled_state() {
        assert_eq!(
            *loaded(AuthMachineInput::ResolvedAnonymous).state(),
            AuthMachineState::Unauthenticated
        );
        assert_eq!(
            *loaded(AuthMachineInput::ResolvedWithoutProfile).state(),
            AuthMachineState::NeedsProfile
        );
        assert_eq!(
            *loaded(AuthMachineInput::ResolvedWithProfile).state(),
            AuthMachineState::Ready
        );
    }

    #[test]
    fn test_initialize_only_once() {
        let mut machine = loaded(AuthMachineInput::ResolvedAnonymous);
        assert!(machine.consume(&AuthMachineInput::Initialize).is_err());
    }

    #[test]
    fn test_profile_completion_only_from_needs_profile() {
        let mut machine = loaded(AuthMachineInput::ResolvedWithoutProfile);
        machine.consume(&AuthMachineInput::ProfileCompleted).unwrap();
        assert_eq!(*machine.state(), AuthMachineState::Ready);

        let mut machine = loaded(AuthMachineInput::ResolvedAnonymous);
        assert!(machine.consume(&AuthMachineInput::ProfileCompleted).is_err());
    }

    #[test]
    fn test_logout_from_ready() {
        let mut machine = loaded(AuthMachineInput::ResolvedWithProfile);
        machine.consume(&AuthMachineInput::ResolvedAnonymous).unwrap();
        assert_eq!(
            AuthState::from(machine.state()),
            AuthState::Unauthenticated
        );
    }

    #[test]
    fn test_auth_state_helpers() {
        assert!(AuthState::AuthenticatedNoProfile.is_authenticated());
        assert!(!AuthState::AuthenticatedNoProfile.has_profile());
        assert!(AuthState::AuthenticatedWithProfile.has_profile());
        assert!(!AuthState::Unauthenticated.is_authenticated());
        assert!(!AuthState::Unauthenticated.is_loading());
    }

    #[test]
    fn test_auth_state_serialization() {
        let json = serde_json::to_string(&AuthState::AuthenticatedNoProfile).unwrap();
        assert_eq!(json, "\"authenticated_no_profile\"");
    }
}
