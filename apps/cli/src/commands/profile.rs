//! Onboarding and profile commands.

use super::{auth_error, value_or_prompt, App};
use crate::output::{self, OutputFormat};
use anyhow::Result;
use clap::Args;
use injury_auth::{ProfileFields, ProfileUpdate, UserProfile};

#[derive(Args, Debug)]
pub struct OnboardingArgs {
    /// Full name
    #[arg(long)]
    pub full_name: Option<String>,
    /// Department name (see 'injury departments')
    #[arg(long)]
    pub department: Option<String>,
    /// Job position
    #[arg(long)]
    pub position: Option<String>,
    #[arg(long)]
    pub phone: Option<String>,
    #[arg(long)]
    pub company: Option<String>,
}

#[derive(Args, Debug)]
pub struct ProfileEditArgs {
    #[arg(long)]
    pub full_name: Option<String>,
    #[arg(long)]
    pub department: Option<String>,
    #[arg(long)]
    pub position: Option<String>,
    /// Phone number; pass "" to clear
    #[arg(long)]
    pub phone: Option<String>,
    /// Company; pass "" to clear
    #[arg(long)]
    pub company: Option<String>,
}

/// Create the profile of the signed-in user.
pub async fn complete_profile(app: &App, args: OnboardingArgs, format: &OutputFormat) -> Result<()> {
    let user_id = app.require_user()?;
    if let Some(profile) = app.store.profile() {
        output::print_success(
            &format!("Profile already complete ({})", profile.employee_id),
            format,
        );
        return Ok(());
    }

    let fields = ProfileFields {
        full_name: value_or_prompt(args.full_name, "Full name")?,
        department: value_or_prompt(args.department, "Department")?,
        position: value_or_prompt(args.position, "Position")?,
        phone: args.phone,
        company: args.company,
    };

    let profile = app
        .store
        .complete_profile(&user_id, fields)
        .await
        .map_err(auth_error)?;
    print_profile(&profile, "Profile created", format)
}

/// Edit the signed-in user's profile.
pub async fn update_profile(app: &App, args: ProfileEditArgs, format: &OutputFormat) -> Result<()> {
    let update = ProfileUpdate {
        full_name: args.full_name,
        department: args.department,
        position: args.position,
        phone: args.phone,
        company: args.company,
    };
    let profile = app.store.update_profile(update).await.map_err(auth_error)?;
    print_profile(&profile, "Profile updated", format)
}

/// List departments.
pub async fn departments(app: &App, format: &OutputFormat) -> Result<()> {
    let departments = app
        .store
        .profiles()
        .list_departments()
        .await
        .map_err(auth_error)?;

    match format {
        OutputFormat::Text => {
            output::print_heading("Departments");
            for department in &departments {
                println!("  {}", department.name);
            }
        }
        OutputFormat::Json => output::print_json(&departments)?,
    }
    Ok(())
}

fn print_profile(profile: &UserProfile, heading: &str, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            output::print_heading(heading);
            output::print_row("Name", &profile.full_name);
            output::print_row("Employee ID", &profile.employee_id);
            output::print_row("Department", &profile.department_id);
            output::print_row("Position", &profile.position);
            output::print_row("Phone", output::or_dash(profile.phone.as_deref()));
            output::print_row("Company", output::or_dash(profile.company.as_deref()));
        }
        OutputFormat::Json => output::print_json(profile)?,
    }
    Ok(())
}
