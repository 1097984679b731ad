//! Incident reports and their preventive actions.
//!
//! Thin typed repositories over the backend's table API. Writes are
//! validated before any request; backend rejections, row-level security
//! denials included, come back as [`RecordsError`].

mod action;
mod error;
mod incident;
mod kinds;

pub use action::{
    ActionFilter, ActionRepository, NewPreventiveAction, PreventiveAction,
    PREVENTIVE_ACTIONS_TABLE,
};
pub use error::{RecordsError, RecordsResult};
pub use incident::{
    IncidentFilter, IncidentReport, IncidentRepository, NewIncident, INCIDENT_REPORTS_TABLE,
};
pub use kinds::{ActionStatus, ReportStatus, Severity};
