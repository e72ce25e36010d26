//! Tenant directory trait
//!
//! The minimal slice of the control-plane store that the connection router and the
//! provisioner depend on, so both can be exercised without a database.

use async_trait::async_trait;
use gearbase_core::error::AppError;
use gearbase_core::models::{NewTenant, Tenant};

use crate::db::control::TenantRepository;

#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Case-insensitive lookup by subdomain key
    async fn find_tenant_by_key(&self, key: &str) -> Result<Option<Tenant>, AppError>;

    /// Register a tenant; `DuplicateKey` when the key or id is taken
    async fn insert_tenant(&self, tenant: NewTenant) -> Result<Tenant, AppError>;
}

#[async_trait]
impl TenantDirectory for TenantRepository {
    async fn find_tenant_by_key(&self, key: &str) -> Result<Option<Tenant>, AppError> {
        TenantRepository::find_tenant_by_key(self, key).await
    }

    async fn insert_tenant(&self, tenant: NewTenant) -> Result<Tenant, AppError> {
        TenantRepository::insert_tenant(self, tenant).await
    }
}
