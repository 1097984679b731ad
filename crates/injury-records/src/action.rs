//! Preventive actions attached to incident reports.

use crate::error::required;
use crate::incident::StatusPatch;
use crate::{ActionStatus, RecordsError, RecordsResult};
use backend_client::{
    insert_row, select_one, select_rows, update_rows, Backend, Filter, Order, Query,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub const PREVENTIVE_ACTIONS_TABLE: &str = "preventive_actions";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreventiveAction {
    pub id: String,
    pub incident_id: String,
    pub description: String,
    pub responsible: String,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    pub status: ActionStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewPreventiveAction {
    pub incident_id: String,
    pub description: String,
    /// Person accountable for carrying the action out.
    pub responsible: String,
    pub due_date: Option<NaiveDate>,
}

#[derive(Serialize)]
struct ActionRow {
    incident_id: String,
    description: String,
    responsible: String,
    due_date: Option<NaiveDate>,
    status: ActionStatus,
}

impl NewPreventiveAction {
    fn validate(&self) -> RecordsResult<ActionRow> {
        Ok(ActionRow {
            incident_id: required("Incident", &self.incident_id)?,
            description: required("Description", &self.description)?,
            responsible: required("Responsible person", &self.responsible)?,
            due_date: self.due_date,
            status: ActionStatus::Pending,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ActionFilter {
    pub incident_id: Option<String>,
    pub status: Option<ActionStatus>,
}

#[derive(Clone)]
pub struct ActionRepository {
    backend: Arc<dyn Backend>,
}

impl ActionRepository {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub async fn create(&self, action: &NewPreventiveAction) -> RecordsResult<PreventiveAction> {
        let row = action.validate()?;
        let created: PreventiveAction =
            insert_row(self.backend.as_ref(), PREVENTIVE_ACTIONS_TABLE, &row).await?;
        info!(
            action_id = %created.id,
            incident_id = %created.incident_id,
            "Preventive action created"
        );
        Ok(created)
    }

    pub async fn get(&self, id: &str) -> RecordsResult<Option<PreventiveAction>> {
        let query = Query::table(PREVENTIVE_ACTIONS_TABLE).eq("id", id);
        Ok(select_one(self.backend.as_ref(), query).await?)
    }

    /// Matching actions, newest first.
    pub async fn list(&self, filter: &ActionFilter) -> RecordsResult<Vec<PreventiveAction>> {
        let mut query = Query::table(PREVENTIVE_ACTIONS_TABLE).order(Order::desc("created_at"));
        if let Some(incident_id) = &filter.incident_id {
            query = query.eq("incident_id", incident_id);
        }
        if let Some(status) = filter.status {
            query = query.eq("status", status);
        }
        Ok(select_rows(self.backend.as_ref(), &query).await?)
    }

    pub async fn update_status(
        &self,
        id: &str,
        status: ActionStatus,
    ) -> RecordsResult<PreventiveAction> {
        let rows: Vec<PreventiveAction> = update_rows(
            self.backend.as_ref(),
            PREVENTIVE_ACTIONS_TABLE,
            &[Filter::eq("id", id)],
            &StatusPatch { status },
        )
        .await?;
        let action = rows.into_iter().next().ok_or_else(|| RecordsError::NotFound {
            kind: "preventive action",
            id: id.to_string(),
        })?;
        info!(action_id = id, status = %status, "Preventive action status changed");
        Ok(action)
    }

    pub async fn delete(&self, id: &str) -> RecordsResult<()> {
        self.backend
            .delete(PREVENTIVE_ACTIONS_TABLE, &[Filter::eq("id", id)])
            .await?;
        info!(action_id = id, "Preventive action deleted");
        Ok(())
    }
}
