//! Session and profile store for the injury reporting client.
//!
//! - [`SessionStore`]: who is signed in and what their profile is
//! - [`ProfileRepository`]: profile and department records
//! - [`PasswordReset`]: reset mail, recovery link and password change

mod auth_fsm;
mod error;
mod password_reset;
mod profile;
mod store;
mod validation;

pub use auth_fsm::{AuthMachine, AuthMachineInput, AuthMachineState, AuthState};
pub use error::{AuthError, AuthResult};
pub use password_reset::{PasswordReset, RecoveryTokens};
pub use profile::{
    generate_employee_id, Department, NewProfile, ProfileFields, ProfilePatch,
    ProfileRepository, ProfileUpdate, UserProfile, DEPARTMENTS_TABLE, PROFILES_TABLE,
};
pub use store::{AuthSnapshot, SessionStore, SignUpOutcome};
pub use validation::{normalize_email, validate_new_password, MIN_PASSWORD_LEN};
