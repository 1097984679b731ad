//! Injury Reports CLI - sign in, onboarding and incident records.

mod commands;
mod output;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use commands::{App, OnboardingArgs, ProfileEditArgs, ReportArgs};
use injury_records::{ActionStatus, ReportStatus};

/// Injury Reports CLI - manage your account and workplace incident reports.
#[derive(Parser)]
#[command(name = "injury")]
#[command(about = "Injury Reports CLI for authentication and incident records")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error); defaults to the configured level
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Login with email and password
    Login {
        #[arg(long)]
        email: Option<String>,
    },

    /// Create an account
    Signup {
        #[arg(long)]
        email: Option<String>,
    },

    /// Logout and clear session
    Logout,

    /// Show authentication and profile status
    Status,

    /// Finish onboarding by creating your profile
    CompleteProfile(OnboardingArgs),

    /// Edit your profile
    UpdateProfile(ProfileEditArgs),

    /// Email a password reset link
    ResetPassword {
        #[arg(long)]
        email: Option<String>,
    },

    /// Open a reset link and set a new password
    RecoverPassword {
        /// The full link from the reset email
        link: String,
    },

    /// List departments
    Departments,

    /// Manage incident reports
    Reports {
        #[command(subcommand)]
        command: ReportCommands,
    },

    /// Manage preventive actions
    Actions {
        #[command(subcommand)]
        command: ActionCommands,
    },
}

#[derive(Subcommand)]
enum ReportCommands {
    /// List reports
    List {
        /// open, investigating or closed
        #[arg(short, long)]
        status: Option<ReportStatus>,
        /// Only reports you submitted
        #[arg(long)]
        mine: bool,
    },
    /// Show a report and its preventive actions
    Show { id: String },
    /// Submit a report
    Create(ReportArgs),
    /// Change a report's status
    SetStatus { id: String, status: ReportStatus },
    /// Delete a report
    Delete { id: String },
}

#[derive(Subcommand)]
enum ActionCommands {
    /// List preventive actions
    List {
        /// Only actions of this report
        #[arg(short, long)]
        incident: Option<String>,
        /// pending, in_progress or done
        #[arg(short, long)]
        status: Option<ActionStatus>,
    },
    /// Add a preventive action to a report
    Add {
        /// Report ID
        incident: String,
        #[arg(long)]
        description: String,
        /// Person responsible
        #[arg(long)]
        responsible: String,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<NaiveDate>,
    },
    /// Change an action's status
    SetStatus { id: String, status: ActionStatus },
}

async fn run(app: &App, command: Commands, format: &output::OutputFormat) -> anyhow::Result<()> {
    match command {
        Commands::Login { email } => commands::login(app, email, format).await,
        Commands::Signup { email } => commands::signup(app, email, format).await,
        Commands::Logout => commands::logout(app, format).await,
        Commands::Status => commands::status(app, format).await,
        Commands::CompleteProfile(args) => commands::complete_profile(app, args, format).await,
        Commands::UpdateProfile(args) => commands::update_profile(app, args, format).await,
        Commands::ResetPassword { email } => commands::reset_password(app, email, format).await,
        Commands::RecoverPassword { link } => commands::recover_password(app, &link, format).await,
        Commands::Departments => commands::departments(app, format).await,
        Commands::Reports { command } => match command {
            ReportCommands::List { status, mine } => {
                commands::reports_list(app, status, mine, format).await
            }
            ReportCommands::Show { id } => commands::reports_show(app, &id, format).await,
            ReportCommands::Create(args) => commands::reports_create(app, args, format).await,
            ReportCommands::SetStatus { id, status } => {
                commands::reports_set_status(app, &id, status, format).await
            }
            ReportCommands::Delete { id } => commands::reports_delete(app, &id, format).await,
        },
        Commands::Actions { command } => match command {
            ActionCommands::List { incident, status } => {
                commands::actions_list(app, incident, status, format).await
            }
            ActionCommands::Add {
                incident,
                description,
                responsible,
                due,
            } => commands::actions_add(app, incident, description, responsible, due, format).await,
            ActionCommands::SetStatus { id, status } => {
                commands::actions_set_status(app, &id, status, format).await
            }
        },
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match App::start(cli.log_level.as_deref()).await {
        Ok(app) => {
            let result = run(&app, cli.command, &cli.format).await;
            app.store.shutdown();
            result
        }
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        output::print_error(&e.to_string(), &cli.format);
        std::process::exit(1);
    }
}
