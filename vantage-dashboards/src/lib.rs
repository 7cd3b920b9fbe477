//! Vantage Dashboards - Cached Dashboard Lists
//!
//! The dashboard service whose per-owner lists are served through the
//! read-through cache, plus the tracing setup used by binaries embedding it.

pub mod cached;
pub mod repository;
pub mod telemetry;
pub mod types;

pub use cached::CachedDashboards;
pub use repository::{DashboardRepository, DashboardSource, InMemoryDashboardRepository};
pub use telemetry::{init_from_env, init_tracing, LogFormat, TelemetryConfig, TelemetryError};
pub use types::{
    validate_name, CreateDashboardRequest, Dashboard, DashboardId, UpdateDashboardRequest,
    MAX_NAME_LEN,
};
