use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use gearbase_core::models::ConnectionDescriptor;
use gearbase_core::TenancyConfig;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;

/// Brings a tenant store up to the current business schema.
///
/// Applying to a store that is already current must succeed without changes.
#[async_trait]
pub trait SchemaApplier: Send + Sync {
    async fn apply(&self, descriptor: &ConnectionDescriptor) -> Result<()>;
}

/// Runs the sqlx migrations found in the tenant migrations directory.
#[derive(Debug, Clone)]
pub struct MigratorSchema {
    migrations_dir: PathBuf,
    connect_timeout: Duration,
}

impl MigratorSchema {
    pub fn new(migrations_dir: impl Into<PathBuf>, connect_timeout: Duration) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
            connect_timeout,
        }
    }

    pub fn from_config(config: &TenancyConfig) -> Self {
        Self::new(
            config.tenant_migrations_dir.clone(),
            config.tenant_connect_timeout(),
        )
    }
}

#[async_trait]
impl SchemaApplier for MigratorSchema {
    async fn apply(&self, descriptor: &ConnectionDescriptor) -> Result<()> {
        let migrator = Migrator::new(self.migrations_dir.as_path())
            .await
            .with_context(|| {
                format!(
                    "Failed to load tenant migrations from {}",
                    self.migrations_dir.display()
                )
            })?;

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(self.connect_timeout)
            .connect(descriptor.expose())
            .await
            .with_context(|| format!("Failed to connect to tenant store {}", descriptor))?;

        let applied = migrator.run(&pool).await;
        pool.close().await;
        applied.context("Failed to apply tenant schema")?;

        tracing::info!(
            store = %descriptor,
            migrations = migrator.iter().count(),
            "Tenant schema is current"
        );
        Ok(())
    }
}
