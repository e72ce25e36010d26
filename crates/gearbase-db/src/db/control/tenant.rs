use gearbase_core::models::{NewTenant, SubscriptionUpdate, Tenant, TenantStatus};
use gearbase_core::{normalize_tenant_key, validate_tenant_key, AppError, TenancyError};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

const TENANT_COLUMNS: &str = "id, key, name, contact_email, contact_phone, notes, \
    connection_descriptor, status, plan_id, subscription_status, current_period_start, \
    current_period_end, trial_start, trial_end, canceled_at, cancel_reason, version, \
    created_at, updated_at";

#[derive(Clone)]
pub struct TenantRepository {
    pool: PgPool,
}

impl TenantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get tenant by subdomain key. The lookup is case-insensitive.
    pub async fn find_tenant_by_key(&self, key: &str) -> Result<Option<Tenant>, AppError> {
        let key = normalize_tenant_key(key);
        let tenant = sqlx::query_as::<_, Tenant>(&format!(
            "SELECT {} FROM tenants WHERE key = $1",
            TENANT_COLUMNS
        ))
        .bind(&key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(tenant_key = %key, error = %e, "Failed to fetch tenant by key");
            AppError::Database(e)
        })?;

        Ok(tenant)
    }

    /// Get tenant by ID
    pub async fn find_tenant_by_id(&self, tenant_id: Uuid) -> Result<Option<Tenant>, AppError> {
        let tenant = sqlx::query_as::<_, Tenant>(&format!(
            "SELECT {} FROM tenants WHERE id = $1",
            TENANT_COLUMNS
        ))
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(%tenant_id, error = %e, "Failed to fetch tenant by ID");
            AppError::Database(e)
        })?;

        Ok(tenant)
    }

    /// List tenants, newest first, optionally filtered by status
    pub async fn list_tenants(
        &self,
        status: Option<TenantStatus>,
    ) -> Result<Vec<Tenant>, AppError> {
        let tenants = sqlx::query_as::<_, Tenant>(&format!(
            "SELECT {} FROM tenants \
             WHERE ($1::tenant_status IS NULL OR status = $1) \
             ORDER BY created_at DESC",
            TENANT_COLUMNS
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to list tenants");
            AppError::Database(e)
        })?;

        Ok(tenants)
    }

    /// Register a tenant whose isolated store already exists.
    ///
    /// Fails with `DuplicateKey` when the key, the id or the connection descriptor is
    /// already taken.
    pub async fn insert_tenant(&self, new_tenant: NewTenant) -> Result<Tenant, AppError> {
        new_tenant.validate()?;
        let key = validate_tenant_key(&new_tenant.key)?;

        let result = sqlx::query_as::<_, Tenant>(&format!(
            "INSERT INTO tenants \
                (id, key, name, contact_email, contact_phone, notes, connection_descriptor, status, plan_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'active', $8) \
             RETURNING {}",
            TENANT_COLUMNS
        ))
        .bind(new_tenant.id)
        .bind(&key)
        .bind(&new_tenant.name)
        .bind(&new_tenant.contact_email)
        .bind(&new_tenant.contact_phone)
        .bind(&new_tenant.notes)
        .bind(&new_tenant.connection_descriptor)
        .bind(new_tenant.plan_id)
        .fetch_one(&self.pool)
        .await;

        let tenant = match result {
            Ok(tenant) => tenant,
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                tracing::warn!(tenant_key = %key, "Tenant insert rejected: duplicate key");
                return Err(TenancyError::DuplicateKey(key).into());
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => {
                return Err(AppError::InvalidInput(format!(
                    "Unknown plan {:?} for tenant '{}'",
                    new_tenant.plan_id, key
                )));
            }
            Err(e) => {
                tracing::error!(tenant_key = %key, error = %e, "Failed to insert tenant");
                return Err(AppError::Database(e));
            }
        };

        tracing::info!(tenant_id = %tenant.id, tenant_key = %tenant.key, "Registered tenant");
        Ok(tenant)
    }

    /// Update tenant status if the row is still at `expected_version`
    pub async fn update_tenant_status(
        &self,
        tenant_id: Uuid,
        status: TenantStatus,
        expected_version: i64,
    ) -> Result<Tenant, AppError> {
        let tenant = sqlx::query_as::<_, Tenant>(&format!(
            "UPDATE tenants \
             SET status = $2, version = version + 1, updated_at = NOW() \
             WHERE id = $1 AND version = $3 \
             RETURNING {}",
            TENANT_COLUMNS
        ))
        .bind(tenant_id)
        .bind(status)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(%tenant_id, error = %e, "Failed to update tenant status");
            AppError::Database(e)
        })?;

        let tenant = match tenant {
            Some(tenant) => tenant,
            None => return Err(self.explain_missed_update(tenant_id).await),
        };

        tracing::info!(%tenant_id, %status, version = tenant.version, "Updated tenant status");
        Ok(tenant)
    }

    /// Apply a partial subscription update if the row is still at `expected_version`
    pub async fn update_subscription_fields(
        &self,
        tenant_id: Uuid,
        update: SubscriptionUpdate,
        expected_version: i64,
    ) -> Result<Tenant, AppError> {
        let result = sqlx::query_as::<_, Tenant>(&format!(
            "UPDATE tenants SET \
                plan_id = COALESCE($3, plan_id), \
                subscription_status = COALESCE($4, subscription_status), \
                current_period_start = COALESCE($5, current_period_start), \
                current_period_end = COALESCE($6, current_period_end), \
                trial_start = COALESCE($7, trial_start), \
                trial_end = COALESCE($8, trial_end), \
                canceled_at = CASE WHEN $11 THEN NULL ELSE COALESCE($9, canceled_at) END, \
                cancel_reason = CASE WHEN $11 THEN NULL ELSE COALESCE($10, cancel_reason) END, \
                version = version + 1, \
                updated_at = NOW() \
             WHERE id = $1 AND version = $2 \
             RETURNING {}",
            TENANT_COLUMNS
        ))
        .bind(tenant_id)
        .bind(expected_version)
        .bind(update.plan_id)
        .bind(update.subscription_status)
        .bind(update.current_period_start)
        .bind(update.current_period_end)
        .bind(update.trial_start)
        .bind(update.trial_end)
        .bind(update.canceled_at)
        .bind(&update.cancel_reason)
        .bind(update.clear_cancellation)
        .fetch_optional(&self.pool)
        .await;

        let tenant = match result {
            Ok(Some(tenant)) => tenant,
            Ok(None) => return Err(self.explain_missed_update(tenant_id).await),
            Err(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => {
                return Err(AppError::InvalidInput(format!(
                    "Unknown plan {:?}",
                    update.plan_id
                )));
            }
            Err(e) => {
                tracing::error!(%tenant_id, error = %e, "Failed to update subscription fields");
                return Err(AppError::Database(e));
            }
        };

        tracing::info!(
            %tenant_id,
            version = tenant.version,
            subscription_status = ?tenant.subscription_status,
            "Updated tenant subscription"
        );
        Ok(tenant)
    }

    /// A guarded update matched no row: either the tenant is gone or another writer
    /// bumped the version first.
    async fn explain_missed_update(&self, tenant_id: Uuid) -> AppError {
        let exists = sqlx::query_scalar::<_, i64>("SELECT version FROM tenants WHERE id = $1")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await;

        match exists {
            Ok(Some(current)) => {
                tracing::warn!(%tenant_id, current_version = current, "Rejected stale tenant write");
                TenancyError::StaleWrite(tenant_id.to_string()).into()
            }
            Ok(None) => TenancyError::TenantNotFound(tenant_id.to_string()).into(),
            Err(e) => AppError::Database(e),
        }
    }
}
