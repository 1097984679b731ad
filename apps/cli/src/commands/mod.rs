//! CLI command implementations.

mod auth;
mod profile;
mod records;

pub use auth::{login, logout, recover_password, reset_password, signup, status};
pub use profile::{complete_profile, departments, update_profile, OnboardingArgs, ProfileEditArgs};
pub use records::{
    actions_add, actions_list, actions_set_status, reports_create, reports_delete, reports_list,
    reports_set_status, reports_show, ReportArgs,
};

use anyhow::{anyhow, Result};
use backend_client::{Backend, SupabaseBackend};
use injury_auth::{AuthError, SessionStore};
use injury_config::{init_logging, Config, Paths};
use injury_records::RecordsError;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{debug, warn};

/// Everything a command needs, wired from config.
pub struct App {
    pub config: Config,
    pub backend: Arc<dyn Backend>,
    pub store: SessionStore,
}

impl App {
    /// Load config, start logging, restore the persisted session.
    pub async fn start(log_level: Option<&str>) -> Result<Self> {
        let paths = Paths::new()?;
        paths.ensure_dirs()?;
        let config = Config::load(&paths)?;

        let level = log_level.unwrap_or(&config.log_level);
        if let Err(e) = init_logging(&paths, level, false) {
            eprintln!("Warning: logging disabled: {}", e);
        }

        let vault = session_storage::create_file_vault(&paths.session_file())?;
        let backend: Arc<dyn Backend> = Arc::new(SupabaseBackend::new(&config, vault)?);
        let store = SessionStore::new(backend.clone());
        let state = store.initialize().await.map_err(auth_error)?;
        debug!(state = ?state, "Client ready");

        Ok(Self {
            config,
            backend,
            store,
        })
    }

    /// Id of the signed-in user.
    pub fn require_user(&self) -> Result<String> {
        self.store
            .session()
            .map(|session| session.user.id)
            .ok_or_else(|| anyhow!("Not logged in. Run 'injury login' first."))
    }
}

/// Log the full error, surface the human-readable message.
pub fn auth_error(err: AuthError) -> anyhow::Error {
    warn!(error = %err, "Command failed");
    anyhow!(err.user_message())
}

pub fn records_error(err: RecordsError) -> anyhow::Error {
    warn!(error = %err, "Command failed");
    anyhow!(err.user_message())
}

/// Read a line from stdin after showing `label`.
fn prompt(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut value = String::new();
    io::stdin().read_line(&mut value)?;
    Ok(value.trim().to_string())
}

/// Use `given` or ask for it.
fn value_or_prompt(given: Option<String>, label: &str) -> Result<String> {
    match given {
        Some(value) => Ok(value),
        None => prompt(label),
    }
}

/// Read a secret without echo.
fn prompt_secret(label: &str) -> Result<String> {
    Ok(rpassword::prompt_password(format!("{}: ", label))?)
}
