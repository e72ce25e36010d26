//! Tenant store connectors
//!
//! A connector turns a tenant's connection descriptor into a live handle. The router
//! owns the handles it gets back and closes them through the same connector.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use gearbase_core::models::ConnectionDescriptor;
use gearbase_core::TenancyConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

#[async_trait]
pub trait TenantConnector: Send + Sync + 'static {
    type Handle: Clone + Send + Sync + 'static;

    /// Open a handle to the store behind `descriptor`.
    async fn open(&self, key: &str, descriptor: &ConnectionDescriptor) -> Result<Self::Handle>;

    /// Release a handle previously returned by `open`.
    async fn close(&self, handle: &Self::Handle);
}

/// Opens one bounded `PgPool` per tenant database.
#[derive(Debug, Clone)]
pub struct PgTenantConnector {
    max_connections: u32,
    acquire_timeout: Duration,
}

impl PgTenantConnector {
    pub fn new(max_connections: u32, acquire_timeout: Duration) -> Self {
        Self {
            max_connections,
            acquire_timeout,
        }
    }

    pub fn from_config(config: &TenancyConfig) -> Self {
        Self::new(
            config.tenant_pool_max_connections,
            config.tenant_connect_timeout(),
        )
    }
}

#[async_trait]
impl TenantConnector for PgTenantConnector {
    type Handle = PgPool;

    async fn open(&self, key: &str, descriptor: &ConnectionDescriptor) -> Result<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(1800))
            .connect(descriptor.expose())
            .await
            .with_context(|| format!("Failed to connect to store for tenant '{}'", key))?;

        tracing::info!(
            tenant_key = %key,
            store = %descriptor,
            max_connections = self.max_connections,
            "Opened tenant connection pool"
        );
        Ok(pool)
    }

    async fn close(&self, handle: &PgPool) {
        handle.close().await;
    }
}
