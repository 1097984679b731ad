//! Incident reports.

use crate::error::required;
use crate::{RecordsError, RecordsResult, ReportStatus, Severity};
use backend_client::{
    insert_row, select_one, select_rows, update_rows, Backend, Filter, Order, Query,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

pub const INCIDENT_REPORTS_TABLE: &str = "incident_reports";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentReport {
    pub id: String,
    pub reporter_id: String,
    pub department_id: String,
    pub occurred_at: DateTime<Utc>,
    pub location: String,
    pub description: String,
    pub injury_type: String,
    pub severity: Severity,
    pub status: ReportStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Report as submitted by the reporter.
#[derive(Debug, Clone)]
pub struct NewIncident {
    pub department_id: String,
    pub occurred_at: DateTime<Utc>,
    pub location: String,
    pub description: String,
    pub injury_type: String,
    pub severity: Severity,
}

#[derive(Serialize)]
struct IncidentRow {
    reporter_id: String,
    department_id: String,
    occurred_at: DateTime<Utc>,
    location: String,
    description: String,
    injury_type: String,
    severity: Severity,
    status: ReportStatus,
}

impl NewIncident {
    fn validate(&self, reporter_id: &str) -> RecordsResult<IncidentRow> {
        if self.occurred_at > Utc::now() {
            return Err(RecordsError::Validation(
                "Occurrence time cannot be in the future.".to_string(),
            ));
        }
        Ok(IncidentRow {
            reporter_id: required("Reporter", reporter_id)?,
            department_id: required("Department", &self.department_id)?,
            occurred_at: self.occurred_at,
            location: required("Location", &self.location)?,
            description: required("Description", &self.description)?,
            injury_type: required("Injury type", &self.injury_type)?,
            severity: self.severity,
            status: ReportStatus::Open,
        })
    }
}

/// Optional equality filters for listing; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct IncidentFilter {
    pub status: Option<ReportStatus>,
    pub department_id: Option<String>,
    pub reporter_id: Option<String>,
}

impl IncidentFilter {
    fn apply(&self, mut query: Query) -> Query {
        if let Some(status) = self.status {
            query = query.eq("status", status);
        }
        if let Some(department_id) = &self.department_id {
            query = query.eq("department_id", department_id);
        }
        if let Some(reporter_id) = &self.reporter_id {
            query = query.eq("reporter_id", reporter_id);
        }
        query
    }
}

#[derive(Serialize)]
pub(crate) struct StatusPatch<S> {
    pub(crate) status: S,
}

#[derive(Clone)]
pub struct IncidentRepository {
    backend: Arc<dyn Backend>,
}

impl IncidentRepository {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Submit a new report. Reports always start `open`.
    pub async fn create(&self, reporter_id: &str, report: &NewIncident) -> RecordsResult<IncidentReport> {
        let row = report.validate(reporter_id)?;
        let created: IncidentReport =
            insert_row(self.backend.as_ref(), INCIDENT_REPORTS_TABLE, &row).await?;
        info!(
            report_id = %created.id,
            severity = %created.severity,
            "Incident report submitted"
        );
        Ok(created)
    }

    pub async fn get(&self, id: &str) -> RecordsResult<Option<IncidentReport>> {
        let query = Query::table(INCIDENT_REPORTS_TABLE).eq("id", id);
        Ok(select_one(self.backend.as_ref(), query).await?)
    }

    /// Matching reports, newest first.
    pub async fn list(&self, filter: &IncidentFilter) -> RecordsResult<Vec<IncidentReport>> {
        let query = filter.apply(
            Query::table(INCIDENT_REPORTS_TABLE).order(Order::desc("created_at")),
        );
        let reports: Vec<IncidentReport> = select_rows(self.backend.as_ref(), &query).await?;
        debug!(count = reports.len(), "Incident reports listed");
        Ok(reports)
    }

    pub async fn update_status(&self, id: &str, status: ReportStatus) -> RecordsResult<IncidentReport> {
        let rows: Vec<IncidentReport> = update_rows(
            self.backend.as_ref(),
            INCIDENT_REPORTS_TABLE,
            &[Filter::eq("id", id)],
            &StatusPatch { status },
        )
        .await?;
        let report = rows.into_iter().next().ok_or_else(|| RecordsError::NotFound {
            kind: "incident report",
            id: id.to_string(),
        })?;
        info!(report_id = id, status = %status, "Incident report status changed");
        Ok(report)
    }

    pub async fn delete(&self, id: &str) -> RecordsResult<()> {
        self.backend
            .delete(INCIDENT_REPORTS_TABLE, &[Filter::eq("id", id)])
            .await?;
        info!(report_id = id, "Incident report deleted");
        Ok(())
    }
}
