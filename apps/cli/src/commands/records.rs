//! Incident report and preventive action commands.

use super::{auth_error, records_error, App};
use crate::output::{self, OutputFormat};
use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::Args;
use injury_records::{
    ActionFilter, ActionRepository, ActionStatus, IncidentFilter, IncidentReport,
    IncidentRepository, NewIncident, NewPreventiveAction, PreventiveAction, ReportStatus,
    Severity,
};

#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Where it happened
    #[arg(long)]
    pub location: String,
    /// What happened
    #[arg(long)]
    pub description: String,
    /// Kind of injury, e.g. cut, sprain, burn
    #[arg(long)]
    pub injury_type: String,
    /// minor, moderate, serious or critical
    #[arg(long)]
    pub severity: Severity,
    /// When it happened (RFC 3339); defaults to now
    #[arg(long)]
    pub occurred_at: Option<DateTime<Utc>>,
    /// Department name; defaults to your own
    #[arg(long)]
    pub department: Option<String>,
}

fn incidents(app: &App) -> IncidentRepository {
    IncidentRepository::new(app.backend.clone())
}

fn actions(app: &App) -> ActionRepository {
    ActionRepository::new(app.backend.clone())
}

/// Submit a new incident report.
pub async fn reports_create(app: &App, args: ReportArgs, format: &OutputFormat) -> Result<()> {
    let reporter_id = app.require_user()?;
    let department_id = match &args.department {
        Some(name) => {
            app.store
                .profiles()
                .resolve_department(name)
                .await
                .map_err(auth_error)?
                .id
        }
        None => app
            .store
            .profile()
            .map(|profile| profile.department_id)
            .ok_or_else(|| anyhow!("No department given and your profile is incomplete."))?,
    };

    let report = NewIncident {
        department_id,
        occurred_at: args.occurred_at.unwrap_or_else(Utc::now),
        location: args.location,
        description: args.description,
        injury_type: args.injury_type,
        severity: args.severity,
    };
    let created = incidents(app)
        .create(&reporter_id, &report)
        .await
        .map_err(records_error)?;
    print_report(&created, "Report submitted", format)
}

/// List reports, newest first.
pub async fn reports_list(
    app: &App,
    status: Option<ReportStatus>,
    mine: bool,
    format: &OutputFormat,
) -> Result<()> {
    let filter = IncidentFilter {
        status,
        department_id: None,
        reporter_id: if mine { Some(app.require_user()?) } else { None },
    };
    let reports = incidents(app).list(&filter).await.map_err(records_error)?;

    match format {
        OutputFormat::Text => {
            output::print_heading("Incident reports");
            if reports.is_empty() {
                println!("  (none)");
            }
            for report in &reports {
                println!(
                    "  {:<36}  {:<13} {:<9} {}  {}",
                    report.id,
                    report.status,
                    report.severity,
                    report.occurred_at.format("%Y-%m-%d %H:%M"),
                    report.location
                );
            }
        }
        OutputFormat::Json => output::print_json(&reports)?,
    }
    Ok(())
}

/// Show one report with its preventive actions.
pub async fn reports_show(app: &App, id: &str, format: &OutputFormat) -> Result<()> {
    let report = incidents(app)
        .get(id)
        .await
        .map_err(records_error)?
        .ok_or_else(|| anyhow!("Report {} not found.", id))?;
    let actions = actions(app)
        .list(&ActionFilter {
            incident_id: Some(report.id.clone()),
            status: None,
        })
        .await
        .map_err(records_error)?;

    match format {
        OutputFormat::Text => {
            print_report(&report, "Incident report", format)?;
            print_actions(&actions);
        }
        OutputFormat::Json => output::print_json(&serde_json::json!({
            "report": report,
            "actions": actions,
        }))?,
    }
    Ok(())
}

pub async fn reports_set_status(
    app: &App,
    id: &str,
    status: ReportStatus,
    format: &OutputFormat,
) -> Result<()> {
    let report = incidents(app)
        .update_status(id, status)
        .await
        .map_err(records_error)?;
    print_report(&report, "Report updated", format)
}

pub async fn reports_delete(app: &App, id: &str, format: &OutputFormat) -> Result<()> {
    incidents(app).delete(id).await.map_err(records_error)?;
    output::print_success(&format!("Report {} deleted", id), format);
    Ok(())
}

pub async fn actions_list(
    app: &App,
    incident: Option<String>,
    status: Option<ActionStatus>,
    format: &OutputFormat,
) -> Result<()> {
    let actions = actions(app)
        .list(&ActionFilter {
            incident_id: incident,
            status,
        })
        .await
        .map_err(records_error)?;

    match format {
        OutputFormat::Text => print_actions(&actions),
        OutputFormat::Json => output::print_json(&actions)?,
    }
    Ok(())
}

pub async fn actions_add(
    app: &App,
    incident: String,
    description: String,
    responsible: String,
    due: Option<NaiveDate>,
    format: &OutputFormat,
) -> Result<()> {
    let action = actions(app)
        .create(&NewPreventiveAction {
            incident_id: incident,
            description,
            responsible,
            due_date: due,
        })
        .await
        .map_err(records_error)?;

    match format {
        OutputFormat::Text => {
            output::print_success(&format!("Preventive action {} added", action.id), format)
        }
        OutputFormat::Json => output::print_json(&action)?,
    }
    Ok(())
}

pub async fn actions_set_status(
    app: &App,
    id: &str,
    status: ActionStatus,
    format: &OutputFormat,
) -> Result<()> {
    let action = actions(app)
        .update_status(id, status)
        .await
        .map_err(records_error)?;

    match format {
        OutputFormat::Text => output::print_success(
            &format!("Preventive action {} is now {}", action.id, action.status),
            format,
        ),
        OutputFormat::Json => output::print_json(&action)?,
    }
    Ok(())
}

fn print_report(report: &IncidentReport, heading: &str, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            output::print_heading(heading);
            output::print_row("ID", &report.id);
            output::print_row("Status", report.status.as_str());
            output::print_row("Severity", report.severity.as_str());
            output::print_row("Injury", &report.injury_type);
            output::print_row("Occurred", &report.occurred_at.to_rfc3339());
            output::print_row("Location", &report.location);
            output::print_row("Department", &report.department_id);
            output::print_row("Description", &report.description);
        }
        OutputFormat::Json => output::print_json(report)?,
    }
    Ok(())
}

fn print_actions(actions: &[PreventiveAction]) {
    output::print_heading("Preventive actions");
    if actions.is_empty() {
        println!("  (none)");
    }
    for action in actions {
        let due = action
            .due_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<36}  {:<11} due {:<10}  {} ({})",
            action.id, action.status, due, action.description, action.responsible
        );
    }
}
