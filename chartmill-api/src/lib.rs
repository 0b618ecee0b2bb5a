//! chartmill API - multi-tenant chart repository server
//!
//! Serves a repository index (`index.yaml`) and chart packages for every
//! tenant found in object storage. Tenants are path prefixes of a fixed or
//! per-request depth. Indexes are built lazily, cached per tenant, and
//! rebuilt through single-flight coordinators so any number of concurrent
//! readers cause one storage listing and one rebuild.

pub mod cache;
pub mod constants;
pub mod error;
pub mod jobs;
pub mod router;
pub mod routes;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use cache::{CacheSettings, IndexCache, RefreshOutcome};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use jobs::{cache_refresh_task, CacheEvent, CacheRefreshConfig};
pub use router::{Capability, RouteTable, TenantDepth};
pub use routes::{create_router, route_table, Endpoint};
pub use state::{storage_from_config, AppState};
