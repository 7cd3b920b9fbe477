//! Dashboard storage, the source of truth behind the cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use vantage_cache::{CacheableRecord, SourceOfTruth};
use vantage_core::{CacheKey, OwnerId, SourceError};

use crate::types::{Dashboard, DashboardId, UpdateDashboardRequest};

/// Persistent dashboard storage.
///
/// Every operation is scoped to an owner; a dashboard id that exists under
/// another owner is reported as `NotFound`.
#[async_trait]
pub trait DashboardRepository: Send + Sync {
    /// All dashboards of `owner`, oldest first. Empty if the owner has none.
    async fn list_for_owner(&self, owner: &OwnerId) -> Result<Vec<Dashboard>, SourceError>;

    /// Store a new dashboard.
    async fn insert(&self, dashboard: Dashboard) -> Result<Dashboard, SourceError>;

    /// Apply an update to one of `owner`'s dashboards.
    async fn update(
        &self,
        owner: &OwnerId,
        id: DashboardId,
        update: &UpdateDashboardRequest,
    ) -> Result<Dashboard, SourceError>;

    /// Remove one of `owner`'s dashboards.
    async fn delete(&self, owner: &OwnerId, id: DashboardId) -> Result<(), SourceError>;
}

/// In-memory repository for tests and local runs.
#[derive(Debug, Default)]
pub struct InMemoryDashboardRepository {
    dashboards: RwLock<HashMap<DashboardId, Dashboard>>,
    fail_next: AtomicBool,
}

impl InMemoryDashboardRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next operation fail as if storage were down.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), SourceError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(SourceError::unavailable("dashboard storage unavailable"));
        }
        Ok(())
    }
}

fn not_found(id: DashboardId) -> SourceError {
    SourceError::not_found(format!("dashboard {}", id))
}

#[async_trait]
impl DashboardRepository for InMemoryDashboardRepository {
    async fn list_for_owner(&self, owner: &OwnerId) -> Result<Vec<Dashboard>, SourceError> {
        self.check_available()?;
        let dashboards = self.dashboards.read().await;
        let mut owned: Vec<Dashboard> = dashboards
            .values()
            .filter(|d| &d.owner_id == owner)
            .cloned()
            .collect();
        owned.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.dashboard_id.cmp(&b.dashboard_id))
        });
        Ok(owned)
    }

    async fn insert(&self, dashboard: Dashboard) -> Result<Dashboard, SourceError> {
        self.check_available()?;
        let mut dashboards = self.dashboards.write().await;
        if dashboards.contains_key(&dashboard.dashboard_id) {
            return Err(SourceError::Rejected {
                reason: format!("dashboard {} already exists", dashboard.dashboard_id),
            });
        }
        dashboards.insert(dashboard.dashboard_id, dashboard.clone());
        Ok(dashboard)
    }

    async fn update(
        &self,
        owner: &OwnerId,
        id: DashboardId,
        update: &UpdateDashboardRequest,
    ) -> Result<Dashboard, SourceError> {
        self.check_available()?;
        let mut dashboards = self.dashboards.write().await;
        let dashboard = dashboards
            .get_mut(&id)
            .filter(|d| &d.owner_id == owner)
            .ok_or_else(|| not_found(id))?;
        dashboard.apply(update).map_err(|e| SourceError::Rejected {
            reason: e.to_string(),
        })?;
        Ok(dashboard.clone())
    }

    async fn delete(&self, owner: &OwnerId, id: DashboardId) -> Result<(), SourceError> {
        self.check_available()?;
        let mut dashboards = self.dashboards.write().await;
        match dashboards.get(&id) {
            Some(d) if &d.owner_id == owner => {
                dashboards.remove(&id);
                Ok(())
            }
            _ => Err(not_found(id)),
        }
    }
}

/// Serves dashboard lists to the cache coordinator from a repository.
pub struct DashboardSource<R: ?Sized> {
    repository: Arc<R>,
}

impl<R: DashboardRepository + ?Sized> DashboardSource<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }
}

impl<R: ?Sized> Clone for DashboardSource<R> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
        }
    }
}

#[async_trait]
impl<R: DashboardRepository + ?Sized> SourceOfTruth<Dashboard> for DashboardSource<R> {
    async fn fetch(&self, key: &CacheKey) -> Result<Vec<Dashboard>, SourceError> {
        if key.kind() != &Dashboard::collection_kind() {
            return Err(SourceError::Rejected {
                reason: format!("{} is not a dashboard list key", key),
            });
        }
        self.repository.list_for_owner(key.owner()).await
    }
}
