//! Control-plane repositories
//!
//! Direct parameterized queries against the tenant directory and plan catalog. Nothing
//! here touches a tenant's isolated database.
//
// Tenant directory and plan catalog
pub mod control;

pub use control::{PlanRepository, TenantRepository};
