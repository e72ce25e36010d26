//! Physical store administration
//!
//! Creating and dropping tenant databases. Store names reaching this module are
//! derived from validated tenant keys, so they only contain `[a-z0-9_]`; they are
//! still quoted as identifiers because DDL cannot take bind parameters.

use async_trait::async_trait;
use gearbase_core::models::ConnectionDescriptor;
use gearbase_core::{AppError, TenancyConfig, TenancyError};
use sqlx::PgPool;

const DUPLICATE_DATABASE: &str = "42P04";

#[async_trait]
pub trait StoreAdmin: Send + Sync {
    /// Connection descriptor for the store with this name.
    fn descriptor_for(&self, store: &str) -> ConnectionDescriptor;

    async fn store_exists(&self, store: &str) -> Result<bool, AppError>;

    /// Create an empty store. `StoreAlreadyExists` if the name is taken.
    async fn create_store(&self, store: &str) -> Result<(), AppError>;

    async fn drop_store(&self, store: &str) -> Result<(), AppError>;
}

/// Creates tenant databases on the Postgres server behind the control-plane pool.
#[derive(Clone)]
pub struct PgStoreAdmin {
    pool: PgPool,
    config: TenancyConfig,
}

impl PgStoreAdmin {
    pub fn new(pool: PgPool, config: TenancyConfig) -> Self {
        Self { pool, config }
    }
}

#[async_trait]
impl StoreAdmin for PgStoreAdmin {
    fn descriptor_for(&self, store: &str) -> ConnectionDescriptor {
        self.config.descriptor_for(store)
    }

    async fn store_exists(&self, store: &str) -> Result<bool, AppError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)")
                .bind(store)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    tracing::error!(store = %store, error = %e, "Failed to check tenant store");
                    AppError::Database(e)
                })?;

        Ok(exists)
    }

    async fn create_store(&self, store: &str) -> Result<(), AppError> {
        if self.store_exists(store).await? {
            return Err(TenancyError::StoreAlreadyExists {
                store: store.to_string(),
            }
            .into());
        }

        let statement = format!("CREATE DATABASE {}", quote_ident(store));
        sqlx::raw_sql(&statement)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                let duplicate = e
                    .as_database_error()
                    .and_then(|db| db.code())
                    .is_some_and(|code| code == DUPLICATE_DATABASE);
                if duplicate {
                    return AppError::Tenancy(TenancyError::StoreAlreadyExists {
                        store: store.to_string(),
                    });
                }
                tracing::error!(store = %store, error = %e, "Failed to create tenant store");
                AppError::Database(e)
            })?;

        tracing::info!(store = %store, "Created tenant store");
        Ok(())
    }

    async fn drop_store(&self, store: &str) -> Result<(), AppError> {
        let statement = format!("DROP DATABASE IF EXISTS {} WITH (FORCE)", quote_ident(store));
        sqlx::raw_sql(&statement)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(store = %store, error = %e, "Failed to drop tenant store");
                AppError::Database(e)
            })?;

        tracing::info!(store = %store, "Dropped tenant store");
        Ok(())
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("tenant_acme"), "\"tenant_acme\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
