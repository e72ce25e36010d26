//! Gearbase Infrastructure Library
//!
//! Shared plumbing for services that serve tenant traffic:
//! - Tenant resolution middleware (request -> tenant key -> tenant pool)
//! - HTTP error responses for `AppError`
//! - Telemetry initialization

pub mod error;
pub mod middleware;
pub mod telemetry;

pub use error::{ErrorResponse, HttpAppError};
pub use middleware::{
    tenant_connection_middleware, PgTenantContext, TenantContext, TenantKeySource,
    TenantResolverState,
};
pub use telemetry::{init_telemetry, shutdown_telemetry, LogFormat};
