//! Authentication commands.

use super::{auth_error, prompt_secret, value_or_prompt, App};
use crate::output::{self, OutputFormat};
use anyhow::{bail, Result};
use injury_auth::{AuthState, PasswordReset};
use serde_json::json;

/// Login with email and password.
pub async fn login(app: &App, email: Option<String>, format: &OutputFormat) -> Result<()> {
    if let Some(session) = app.store.session() {
        let who = session.user.email.unwrap_or(session.user.id);
        output::print_success(&format!("Already logged in as {}", who), format);
        return Ok(());
    }

    let email = value_or_prompt(email, "Email")?;
    let password = prompt_secret("Password")?;

    let snapshot = app.store.login(&email, &password).await.map_err(auth_error)?;
    let who = snapshot.email.or(snapshot.user_id).unwrap_or_default();
    output::print_success(&format!("Logged in as {}", who), format);

    if snapshot.state == AuthState::AuthenticatedNoProfile {
        output::print_success(
            "Your profile is not set up yet. Run 'injury complete-profile' to finish.",
            format,
        );
    }
    Ok(())
}

/// Create an account.
pub async fn signup(app: &App, email: Option<String>, format: &OutputFormat) -> Result<()> {
    let email = value_or_prompt(email, "Email")?;
    let password = prompt_secret("Password")?;
    let confirm = prompt_secret("Confirm password")?;
    if password != confirm {
        bail!("Passwords do not match.");
    }

    let outcome = app.store.signup(&email, &password).await.map_err(auth_error)?;
    let message = if outcome.session_started {
        "Account created. Run 'injury complete-profile' to finish onboarding."
    } else {
        "Account created. Check your inbox to confirm your email, then log in."
    };

    match format {
        OutputFormat::Text => println!("{}", message),
        OutputFormat::Json => output::print_json(&json!({
            "status": "success",
            "user_id": outcome.user.id,
            "session_started": outcome.session_started,
            "message": message,
        }))?,
    }
    Ok(())
}

/// Logout and clear the stored session.
pub async fn logout(app: &App, format: &OutputFormat) -> Result<()> {
    app.store.logout().await.map_err(auth_error)?;
    output::print_success("Logged out successfully", format);
    Ok(())
}

/// Show who is signed in.
pub async fn status(app: &App, format: &OutputFormat) -> Result<()> {
    let snapshot = app.store.snapshot();

    match format {
        OutputFormat::Text => {
            output::print_heading("Authentication");
            match &snapshot.session {
                Some(session) => {
                    output::print_row("State", state_label(snapshot.state));
                    output::print_row("User ID", &session.user.id);
                    output::print_row("Email", output::or_dash(session.user.email.as_deref()));
                    output::print_row("Expires", &session.expires_at.to_rfc3339());
                }
                None => output::print_row("State", "not logged in"),
            }
            if let Some(profile) = &snapshot.profile {
                output::print_heading("Profile");
                output::print_row("Name", &profile.full_name);
                output::print_row("Employee ID", &profile.employee_id);
                output::print_row("Position", &profile.position);
                output::print_row("Department", &profile.department_id);
                output::print_row("Phone", output::or_dash(profile.phone.as_deref()));
                output::print_row("Company", output::or_dash(profile.company.as_deref()));
            }
        }
        OutputFormat::Json => {
            let expires_at = snapshot.session.as_ref().map(|s| s.expires_at.to_rfc3339());
            output::print_json(&json!({
                "logged_in": snapshot.state.is_authenticated(),
                "snapshot": snapshot,
                "expires_at": expires_at,
            }))?;
        }
    }
    Ok(())
}

fn state_label(state: AuthState) -> &'static str {
    match state {
        AuthState::Uninitialized | AuthState::Loading => "loading",
        AuthState::Unauthenticated => "not logged in",
        AuthState::AuthenticatedNoProfile => "logged in, profile incomplete",
        AuthState::AuthenticatedWithProfile => "logged in",
    }
}

/// Send a password reset email.
pub async fn reset_password(app: &App, email: Option<String>, format: &OutputFormat) -> Result<()> {
    let email = value_or_prompt(email, "Email")?;
    let reset = PasswordReset::from_config(app.backend.clone(), &app.config);
    reset.request_reset(&email).await.map_err(auth_error)?;
    output::print_success(
        "If an account exists for that address, a reset link is on its way.",
        format,
    );
    Ok(())
}

/// Open a recovery link and choose a new password.
pub async fn recover_password(app: &App, link: &str, format: &OutputFormat) -> Result<()> {
    let reset = PasswordReset::from_config(app.backend.clone(), &app.config);
    let session = reset.accept_recovery_link(link).await.map_err(auth_error)?;

    let password = prompt_secret("New password")?;
    let confirm = prompt_secret("Confirm new password")?;
    if password != confirm {
        bail!("Passwords do not match.");
    }
    reset.update_password(&password).await.map_err(auth_error)?;

    let who = session.user.email.unwrap_or(session.user.id);
    output::print_success(&format!("Password updated for {}", who), format);
    Ok(())
}
