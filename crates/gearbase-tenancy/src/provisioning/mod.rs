//! Tenant store provisioning

pub mod provisioner;
pub mod schema;
pub mod store_admin;


pub use provisioner::{ProvisionRequest, ProvisionedTenant, ProvisionerOptions, TenantProvisioner};
pub use schema::{MigratorSchema, SchemaApplier};
pub use store_admin::{PgStoreAdmin, StoreAdmin};
