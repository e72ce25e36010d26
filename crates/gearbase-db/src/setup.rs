//! Control-plane database setup and initialization

use anyhow::{Context, Result};
use gearbase_core::TenancyConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

/// Connect to the control-plane store and apply its migrations.
pub async fn connect_control_plane(config: &TenancyConfig) -> Result<PgPool> {
    tracing::info!("Connecting to control-plane database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(config.db_timeout())
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.control_plane_database_url)
        .await
        .context("Failed to connect to the control-plane database")?;

    tracing::info!(
        max_connections = config.db_max_connections,
        "Control-plane database connected"
    );

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .context("Failed to run control-plane migrations")?;
    tracing::info!("Control-plane migrations applied");

    Ok(pool)
}
