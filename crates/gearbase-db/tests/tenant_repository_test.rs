//! Integration tests for the control-plane repositories.
//!
//! These need a Postgres server: set DATABASE_URL and run with `--ignored`.
//! `sqlx::test` creates a scratch database per test and applies the control-plane
//! migrations to it.

use gearbase_core::models::{
    ConnectionDescriptor, NewTenant, SubscriptionStatus, SubscriptionUpdate, TenantStatus,
};
use gearbase_core::{AppError, TenancyError};
use gearbase_db::{PlanRepository, TenantRepository};
use sqlx::PgPool;

fn new_tenant(key: &str) -> NewTenant {
    NewTenant::new(
        key,
        format!("{} Rentals", key),
        format!("owner@{}.example", key),
        ConnectionDescriptor::new(format!("postgres://localhost/tenant_{}", key)),
    )
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires Postgres via DATABASE_URL"]
async fn insert_and_find_by_key_is_case_insensitive(pool: PgPool) {
    let repo = TenantRepository::new(pool);

    let created = repo.insert_tenant(new_tenant("Acme")).await.unwrap();
    assert_eq!(created.key, "acme");
    assert_eq!(created.status, TenantStatus::Active);
    assert_eq!(created.version, 1);

    let found = repo.find_tenant_by_key("ACME").await.unwrap().unwrap();
    assert_eq!(found.id, created.id);
    assert!(repo.find_tenant_by_key("other").await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires Postgres via DATABASE_URL"]
async fn duplicate_key_is_rejected(pool: PgPool) {
    let repo = TenantRepository::new(pool);
    let first = repo.insert_tenant(new_tenant("acme")).await.unwrap();

    let mut again = new_tenant("acme");
    again.connection_descriptor = ConnectionDescriptor::new("postgres://localhost/elsewhere");
    let err = repo.insert_tenant(again).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Tenancy(TenancyError::DuplicateKey(ref key)) if key == "acme"
    ));

    let untouched = repo.find_tenant_by_id(first.id).await.unwrap().unwrap();
    assert_eq!(untouched.name, first.name);
    assert_eq!(untouched.connection_descriptor, first.connection_descriptor);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires Postgres via DATABASE_URL"]
async fn stale_status_write_is_rejected(pool: PgPool) {
    let repo = TenantRepository::new(pool);
    let tenant = repo.insert_tenant(new_tenant("acme")).await.unwrap();

    let updated = repo
        .update_tenant_status(tenant.id, TenantStatus::Inactive, tenant.version)
        .await
        .unwrap();
    assert_eq!(updated.status, TenantStatus::Inactive);
    assert_eq!(updated.version, tenant.version + 1);

    let err = repo
        .update_tenant_status(tenant.id, TenantStatus::Active, tenant.version)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Tenancy(TenancyError::StaleWrite(_))));

    let err = repo
        .update_tenant_status(uuid::Uuid::new_v4(), TenantStatus::Active, 1)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Tenancy(TenancyError::TenantNotFound(_))
    ));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires Postgres via DATABASE_URL"]
async fn subscription_update_is_partial(pool: PgPool) {
    let repo = TenantRepository::new(pool.clone());
    let plans = PlanRepository::new(pool);

    let starter = plans.find_plan_by_slug("starter").await.unwrap().unwrap();
    let tenant = repo.insert_tenant(new_tenant("acme")).await.unwrap();

    let trialing = repo
        .update_subscription_fields(
            tenant.id,
            SubscriptionUpdate {
                plan_id: Some(starter.id),
                subscription_status: Some(SubscriptionStatus::Trialing),
                cancel_reason: Some("too expensive".to_string()),
                ..Default::default()
            },
            tenant.version,
        )
        .await
        .unwrap();
    assert_eq!(trialing.plan_id, Some(starter.id));
    assert_eq!(
        trialing.subscription_status,
        Some(SubscriptionStatus::Trialing)
    );

    let reactivated = repo
        .update_subscription_fields(
            tenant.id,
            SubscriptionUpdate {
                subscription_status: Some(SubscriptionStatus::Active),
                clear_cancellation: true,
                ..Default::default()
            },
            trialing.version,
        )
        .await
        .unwrap();
    assert_eq!(reactivated.plan_id, Some(starter.id));
    assert_eq!(reactivated.cancel_reason, None);
    assert_eq!(
        plans.find_plan_by_id(starter.id).await.unwrap().unwrap().slug,
        "starter"
    );
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires Postgres via DATABASE_URL"]
async fn list_filters_by_status(pool: PgPool) {
    let repo = TenantRepository::new(pool);
    let acme = repo.insert_tenant(new_tenant("acme")).await.unwrap();
    repo.insert_tenant(new_tenant("beta")).await.unwrap();
    repo.update_tenant_status(acme.id, TenantStatus::Inactive, acme.version)
        .await
        .unwrap();

    let active = repo.list_tenants(Some(TenantStatus::Active)).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].key, "beta");
    assert_eq!(repo.list_tenants(None).await.unwrap().len(), 2);
}
