//! Cached dashboard service.
//!
//! Lists go through the read-through cache. Mutations are committed to the
//! repository first and only then invalidate the owner's cached list, so a
//! failed commit never drops a good entry and a failed invalidation never
//! fails a committed mutation.

use std::sync::Arc;

use vantage_cache::{open_store, CacheRead, CacheStore, CacheableRecord, ReadThroughCache, WriteOutcome};
use vantage_core::{CacheSettings, OwnerId, SourceError, VantageResult};

use crate::repository::{DashboardRepository, DashboardSource};
use crate::types::{CreateDashboardRequest, Dashboard, DashboardId, UpdateDashboardRequest};

/// Dashboard service with a read-through cache in front of the repository.
///
/// # Usage
///
/// ```ignore
/// let dashboards = CachedDashboards::open(repo, &CacheSettings::from_env()?).await?;
///
/// // Served from the cache after the first call
/// let list = dashboards.list(&owner).await?;
///
/// // Commits, then invalidates `dashboards:{owner}`
/// dashboards.create(&owner, &req).await?;
/// ```
pub struct CachedDashboards<R: ?Sized, C: CacheStore + ?Sized> {
    source: DashboardSource<R>,
    cache: ReadThroughCache<C>,
}

impl<R: DashboardRepository + ?Sized> CachedDashboards<R, dyn CacheStore> {
    /// Build the service over the store the settings describe.
    pub async fn open(repository: Arc<R>, settings: &CacheSettings) -> VantageResult<Self> {
        let store = open_store(settings).await?;
        Ok(Self::new(repository, ReadThroughCache::new(store)))
    }
}

impl<R, C> CachedDashboards<R, C>
where
    R: DashboardRepository + ?Sized,
    C: CacheStore + ?Sized + 'static,
{
    pub fn new(repository: Arc<R>, cache: ReadThroughCache<C>) -> Self {
        Self {
            source: DashboardSource::new(repository),
            cache,
        }
    }

    /// The underlying cache coordinator.
    pub fn cache(&self) -> &ReadThroughCache<C> {
        &self.cache
    }

    /// The underlying repository.
    pub fn repository(&self) -> &R {
        self.source.repository()
    }

    /// All dashboards of `owner`, from the cache when possible.
    pub async fn list(&self, owner: &OwnerId) -> Result<CacheRead<Vec<Dashboard>>, SourceError> {
        self.cache.fetch_owned::<Dashboard, _>(owner, &self.source).await
    }

    /// Create a dashboard for `owner`.
    pub async fn create(
        &self,
        owner: &OwnerId,
        req: &CreateDashboardRequest,
    ) -> VantageResult<Dashboard> {
        let dashboard = Dashboard::create(owner.clone(), req)?;
        let dashboard = self.repository().insert(dashboard).await?;

        self.invalidate_owner(owner).await;
        tracing::info!(
            owner_id = %owner,
            dashboard_id = %dashboard.dashboard_id,
            "dashboard created"
        );
        Ok(dashboard)
    }

    /// Update one of `owner`'s dashboards.
    pub async fn update(
        &self,
        owner: &OwnerId,
        id: DashboardId,
        req: &UpdateDashboardRequest,
    ) -> VantageResult<Dashboard> {
        req.validate()?;
        let dashboard = self.repository().update(owner, id, req).await?;

        self.invalidate_owner(owner).await;
        tracing::info!(owner_id = %owner, dashboard_id = %id, "dashboard updated");
        Ok(dashboard)
    }

    /// Delete one of `owner`'s dashboards.
    pub async fn delete(&self, owner: &OwnerId, id: DashboardId) -> VantageResult<()> {
        self.repository().delete(owner, id).await?;

        self.invalidate_owner(owner).await;
        tracing::info!(owner_id = %owner, dashboard_id = %id, "dashboard deleted");
        Ok(())
    }

    /// Drop `owner`'s cached list. Failures are logged by the coordinator.
    async fn invalidate_owner(&self, owner: &OwnerId) -> WriteOutcome {
        self.cache.invalidate(&Dashboard::cache_key(owner.clone())).await
    }
}

impl<R: ?Sized, C: CacheStore + ?Sized> Clone for CachedDashboards<R, C> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            cache: self.cache.clone(),
        }
    }
}
