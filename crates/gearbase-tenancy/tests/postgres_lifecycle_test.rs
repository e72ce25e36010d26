//! End-to-end tenant lifecycle against a real Postgres server.
//!
//! Needs DATABASE_URL pointing at a role that may CREATE DATABASE; run with `--ignored`.

use std::sync::Arc;

use gearbase_core::models::TenantStatus;
use gearbase_core::{TenancyConfig, TenancyError};
use gearbase_db::{connect_control_plane, TenantRepository};
use gearbase_tenancy::{
    MigratorSchema, PgStoreAdmin, PgTenantConnector, PgTenantRouter, ProvisionRequest,
    ProvisionerOptions, RouterOptions, StoreAdmin, TenantProvisioner,
};

fn config(url: &str) -> TenancyConfig {
    let migrations = format!("{}/../../tenant_migrations", env!("CARGO_MANIFEST_DIR"));
    TenancyConfig::from_lookup(|name| match name {
        "CONTROL_PLANE_DATABASE_URL" => Some(url.to_string()),
        "TENANT_DATABASE_PREFIX" => Some("gbtest_".to_string()),
        "TENANT_MIGRATIONS_DIR" => Some(migrations.clone()),
        "PROVISIONING_CLEANUP" => Some("drop".to_string()),
        _ => None,
    })
    .unwrap()
}

#[tokio::test]
#[ignore = "requires Postgres via DATABASE_URL with CREATEDB"]
async fn provision_route_deactivate_and_clean_up() {
    let url = std::env::var("DATABASE_URL").unwrap();
    let config = config(&url);
    let pool = connect_control_plane(&config).await.unwrap();
    let repo = TenantRepository::new(pool.clone());
    let stores = PgStoreAdmin::new(pool.clone(), config.clone());

    let key = format!("it{}", &uuid::Uuid::new_v4().simple().to_string()[..10]);
    let provisioner = TenantProvisioner::new(
        Arc::new(repo.clone()),
        Arc::new(stores.clone()),
        Arc::new(MigratorSchema::from_config(&config)),
        ProvisionerOptions::from_config(&config),
    );

    let provisioned = provisioner
        .provision_tenant(ProvisionRequest::new(&key, "Integration Rentals", "it@example.com"))
        .await
        .unwrap();
    assert!(stores.store_exists(&provisioned.store).await.unwrap());

    let router = PgTenantRouter::new(
        Arc::new(repo.clone()),
        PgTenantConnector::from_config(&config),
        RouterOptions::from_config(&config),
    );
    let conn = router.resolve(&key).await.unwrap();
    let settings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tenant_settings")
        .fetch_one(conn.handle())
        .await
        .unwrap();
    assert_eq!(settings, 1);

    let duplicate = provisioner
        .provision_tenant(ProvisionRequest::new(&key, "Again", "it@example.com"))
        .await
        .unwrap_err();
    assert_eq!(
        duplicate.as_tenancy(),
        Some(&TenancyError::DuplicateKey(key.clone()))
    );

    repo.update_tenant_status(provisioned.tenant.id, TenantStatus::Inactive, 1)
        .await
        .unwrap();
    router.invalidate(&key).await;
    assert_eq!(
        router.resolve(&key).await.unwrap_err(),
        TenancyError::TenantInactive(key.clone())
    );
    router.shutdown().await;

    sqlx::query("DELETE FROM tenants WHERE key = $1")
        .bind(&key)
        .execute(&pool)
        .await
        .unwrap();
    assert!(provisioner.discard_orphaned_store(&key).await.unwrap());
    assert!(!stores.store_exists(&provisioned.store).await.unwrap());
}
