//! Profile and department records.

use crate::validation::{optional, required};
use crate::{AuthError, AuthResult};
use backend_client::{
    insert_row, select_one, select_rows, update_rows, Backend, Filter, Order, Query,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub const PROFILES_TABLE: &str = "profiles";
pub const DEPARTMENTS_TABLE: &str = "departments";

/// Department reference data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: String,
    pub name: String,
}

/// Application profile of an auth user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub user_id: String,
    pub full_name: String,
    pub employee_id: String,
    pub department_id: String,
    pub position: String,
    pub is_active: bool,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Fields collected by the onboarding form.
#[derive(Debug, Clone, Default)]
pub struct ProfileFields {
    pub full_name: String,
    /// Department name as shown to the user.
    pub department: String,
    pub position: String,
    pub phone: Option<String>,
    pub company: Option<String>,
}

/// Self-service profile edit; `None` leaves a field unchanged. A blank
/// phone or company clears it.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    /// Department name as shown to the user.
    pub department: Option<String>,
    pub position: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.department.is_none()
            && self.position.is_none()
            && self.phone.is_none()
            && self.company.is_none()
    }
}

/// Row inserted on profile completion.
#[derive(Debug, Clone, Serialize)]
pub struct NewProfile {
    pub user_id: String,
    pub full_name: String,
    pub employee_id: String,
    pub department_id: String,
    pub position: String,
    pub is_active: bool,
    pub phone: Option<String>,
    pub company: Option<String>,
}

/// Column patch sent on update.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    /// `Some(None)` writes a null.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

/// Fresh employee identifier, e.g. `EMP-3F9A21C0`.
pub fn generate_employee_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("EMP-{}", hex[..8].to_uppercase())
}

/// Validated onboarding fields, department still by name.
pub(crate) struct ValidatedFields {
    pub full_name: String,
    pub department: String,
    pub position: String,
    pub phone: Option<String>,
    pub company: Option<String>,
}

impl ProfileFields {
    pub(crate) fn validate(&self) -> AuthResult<ValidatedFields> {
        Ok(ValidatedFields {
            full_name: required("Full name", &self.full_name)?,
            department: required("Department", &self.department)?,
            position: required("Position", &self.position)?,
            phone: optional(self.phone.as_deref()),
            company: optional(self.company.as_deref()),
        })
    }
}

/// Typed access to the profile and department tables.
#[derive(Clone)]
pub struct ProfileRepository {
    backend: Arc<dyn Backend>,
}

impl ProfileRepository {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Profile of an auth user: the active one when there is one, otherwise
    /// the newest deactivated row.
    pub async fn fetch_for_user(&self, user_id: &str) -> AuthResult<Option<UserProfile>> {
        let by_user = || {
            Query::table(PROFILES_TABLE)
                .eq("user_id", user_id)
                .order(Order::desc("created_at"))
        };
        let mut profile: Option<UserProfile> =
            select_one(self.backend.as_ref(), by_user().eq("is_active", true)).await?;
        if profile.is_none() {
            profile = select_one(self.backend.as_ref(), by_user()).await?;
        }
        debug!(
            user_id,
            found = profile.is_some(),
            active = profile.as_ref().map(|p| p.is_active),
            "Profile lookup"
        );
        Ok(profile)
    }

    pub async fn find_department_by_name(&self, name: &str) -> AuthResult<Option<Department>> {
        let query = Query::table(DEPARTMENTS_TABLE)
            .select("id,name")
            .eq("name", name.trim());
        Ok(select_one(self.backend.as_ref(), query).await?)
    }

    /// All departments, by name.
    pub async fn list_departments(&self) -> AuthResult<Vec<Department>> {
        let query = Query::table(DEPARTMENTS_TABLE)
            .select("id,name")
            .order(Order::asc("name"));
        Ok(select_rows(self.backend.as_ref(), &query).await?)
    }

    /// Resolve a department name, failing when it does not exist.
    pub async fn resolve_department(&self, name: &str) -> AuthResult<Department> {
        self.find_department_by_name(name)
            .await?
            .ok_or_else(|| AuthError::UnknownDepartment(name.trim().to_string()))
    }

    pub async fn create(&self, profile: &NewProfile) -> AuthResult<UserProfile> {
        let created: UserProfile =
            insert_row(self.backend.as_ref(), PROFILES_TABLE, profile).await?;
        info!(
            user_id = %created.user_id,
            employee_id = %created.employee_id,
            "Profile created"
        );
        Ok(created)
    }

    pub async fn update(&self, profile_id: &str, patch: &ProfilePatch) -> AuthResult<UserProfile> {
        let rows: Vec<UserProfile> = update_rows(
            self.backend.as_ref(),
            PROFILES_TABLE,
            &[Filter::eq("id", profile_id)],
            patch,
        )
        .await?;
        // Zero rows back means the row is gone or hidden by row-level security.
        rows.into_iter().next().ok_or(AuthError::NoProfile)
    }

    /// Every profile, newest first. Administrative.
    pub async fn list_all(&self) -> AuthResult<Vec<UserProfile>> {
        let query = Query::table(PROFILES_TABLE).order(Order::desc("created_at"));
        Ok(select_rows(self.backend.as_ref(), &query).await?)
    }

    /// Toggle the activation flag. Administrative.
    pub async fn set_active(&self, profile_id: &str, active: bool) -> AuthResult<UserProfile> {
        let patch = ProfilePatch {
            is_active: Some(active),
            ..ProfilePatch::default()
        };
        let profile = self.update(profile_id, &patch).await?;
        info!(profile_id, active, "Profile activation changed");
        Ok(profile)
    }

    /// Administrative delete.
    pub async fn delete(&self, profile_id: &str) -> AuthResult<()> {
        self.backend
            .delete(PROFILES_TABLE, &[Filter::eq("id", profile_id)])
            .await?;
        info!(profile_id, "Profile deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend_client::{BackendError, MemoryBackend, Operation};
    use serde_json::json;

    fn repo() -> (Arc<MemoryBackend>, ProfileRepository) {
        let backend = Arc::new(MemoryBackend::new());
        backend.seed(DEPARTMENTS_TABLE, json!({ "id": "d-2", "name": "Warehouse" }));
        backend.seed(DEPARTMENTS_TABLE, json!({ "id": "d-1", "name": "Assembly" }));
        let repo = ProfileRepository::new(backend.clone());
        (backend, repo)
    }

    fn new_profile(user_id: &str) -> NewProfile {
        NewProfile {
            user_id: user_id.to_string(),
            full_name: "Ana Ruiz".to_string(),
            employee_id: generate_employee_id(),
            department_id: "d-1".to_string(),
            position: "operator".to_string(),
            is_active: true,
            phone: None,
            company: Some("Acme".to_string()),
        }
    }

    #[test]
    fn test_employee_id_format() {
        let id = generate_employee_id();
        assert_eq!(id.len(), 12);
        assert!(id.starts_with("EMP-"));
        assert!(id[4..]
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        assert_ne!(id, generate_employee_id());
    }

    #[test]
    fn test_profile_fields_validation() {
        let fields = ProfileFields {
            full_name: " Ana ".to_string(),
            department: "Assembly".to_string(),
            position: "operator".to_string(),
            phone: Some("  ".to_string()),
            company: None,
        };
        let valid = fields.validate().unwrap();
        assert_eq!(valid.full_name, "Ana");
        assert_eq!(valid.phone, None);

        let missing = ProfileFields {
            position: String::new(),
            ..fields
        };
        assert!(matches!(missing.validate(), Err(AuthError::Validation(_))));
    }

    #[test]
    fn test_patch_skips_unset_fields() {
        let patch = ProfilePatch {
            position: Some("lead".to_string()),
            ..ProfilePatch::default()
        };
        assert_eq!(serde_json::to_value(&patch).unwrap(), json!({ "position": "lead" }));

        let clear = ProfilePatch {
            phone: Some(None),
            ..ProfilePatch::default()
        };
        assert_eq!(serde_json::to_value(&clear).unwrap(), json!({ "phone": null }));
    }

    #[tokio::test]
    async fn test_departments_sorted_and_resolved() {
        let (_, repo) = repo();
        let names: Vec<_> = repo
            .list_departments()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["Assembly", "Warehouse"]);

        assert_eq!(repo.resolve_department(" Warehouse ").await.unwrap().id, "d-2");
        assert!(matches!(
            repo.resolve_department("Dock").await,
            Err(AuthError::UnknownDepartment(name)) if name == "Dock"
        ));
    }

    #[tokio::test]
    async fn test_create_fetch_and_admin_operations() {
        let (_, repo) = repo();
        assert!(repo.fetch_for_user("u-1").await.unwrap().is_none());

        let created = repo.create(&new_profile("u-1")).await.unwrap();
        let fetched = repo.fetch_for_user("u-1").await.unwrap().unwrap();
        assert_eq!(fetched.id, created.id);
        assert!(fetched.is_active);

        let disabled = repo.set_active(&created.id, false).await.unwrap();
        assert!(!disabled.is_active);
        let fetched = repo.fetch_for_user("u-1").await.unwrap().unwrap();
        assert_eq!(fetched.id, created.id);
        assert!(!fetched.is_active);

        repo.create(&new_profile("u-2")).await.unwrap();
        assert_eq!(repo.list_all().await.unwrap().len(), 2);

        repo.delete(&created.id).await.unwrap();
        assert!(repo.fetch_for_user("u-1").await.unwrap().is_none());
        assert!(matches!(
            repo.set_active(&created.id, true).await,
            Err(AuthError::NoProfile)
        ));
    }

    #[tokio::test]
    async fn test_row_level_denial_maps_to_permission_denied() {
        let (backend, repo) = repo();
        backend.fail_next(
            Operation::Insert,
            BackendError::api(403, Some("42501"), "row-level security"),
        );
        assert!(matches!(
            repo.create(&new_profile("u-1")).await,
            Err(AuthError::PermissionDenied(_))
        ));
    }
}
