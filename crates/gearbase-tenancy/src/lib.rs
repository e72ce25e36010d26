//! Gearbase tenancy
//!
//! Provisioning of isolated tenant databases and the per-process router that maps a
//! tenant key to a live connection pool on that tenant's database.

pub mod provisioning;
pub mod routing;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use provisioning::{
    MigratorSchema, PgStoreAdmin, ProvisionRequest, ProvisionedTenant, ProvisionerOptions,
    SchemaApplier, StoreAdmin, TenantProvisioner,
};
pub use routing::{
    PgTenantConnector, PgTenantRouter, RouterOptions, TenantConnection, TenantConnector,
    TenantPool, TenantRouter,
};
