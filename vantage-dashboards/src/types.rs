//! Dashboard records and request payloads.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vantage_cache::CacheableRecord;
use vantage_core::{CollectionKind, OwnerId, ValidationError};

/// Longest accepted dashboard name, in characters, after trimming.
pub const MAX_NAME_LEN: usize = 120;

/// Dashboard identifier (UUIDv7, so ids sort by creation time).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DashboardId(Uuid);

impl DashboardId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn now_v7() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for DashboardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A dashboard owned by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dashboard {
    pub dashboard_id: DashboardId,
    pub owner_id: OwnerId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Dashboard {
    /// Build a new dashboard from a validated request.
    pub fn create(owner_id: OwnerId, req: &CreateDashboardRequest) -> Result<Self, ValidationError> {
        let name = validate_name(&req.name)?;
        let now = Utc::now();
        Ok(Self {
            dashboard_id: DashboardId::now_v7(),
            owner_id,
            name,
            description: req.description.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply an update and bump `updated_at`.
    pub fn apply(&mut self, update: &UpdateDashboardRequest) -> Result<(), ValidationError> {
        if let Some(name) = &update.name {
            self.name = validate_name(name)?;
        }
        if let Some(description) = &update.description {
            self.description = Some(description.clone());
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

impl CacheableRecord for Dashboard {
    fn collection_kind() -> CollectionKind {
        CollectionKind::from_static("dashboards")
    }
}

/// Request to create a dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDashboardRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Request to update a dashboard. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDashboardRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl UpdateDashboardRequest {
    /// Check the request without applying it.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        Ok(())
    }
}

/// Trim a dashboard name and check its length.
pub fn validate_name(raw: &str) -> Result<String, ValidationError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "name".to_string(),
        });
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::invalid(
            "name",
            format!("longer than {} characters", MAX_NAME_LEN),
        ));
    }
    Ok(name.to_string())
}
