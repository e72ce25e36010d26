use gearbase_core::models::Plan;
use gearbase_core::AppError;
use sqlx::PgPool;
use uuid::Uuid;

const PLAN_COLUMNS: &str = "id, slug, name, description, monthly_price_cents, currency, \
    trial_days, max_products, max_rentals_per_month, max_staff_accounts, features, \
    is_active, sort_order, created_at, updated_at";

/// Read-only access to the plan catalog.
#[derive(Clone)]
pub struct PlanRepository {
    pool: PgPool,
}

impl PlanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_plan_by_id(&self, plan_id: Uuid) -> Result<Option<Plan>, AppError> {
        let plan = sqlx::query_as::<_, Plan>(&format!(
            "SELECT {} FROM plans WHERE id = $1",
            PLAN_COLUMNS
        ))
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(%plan_id, error = %e, "Failed to fetch plan");
            AppError::Database(e)
        })?;

        Ok(plan)
    }

    pub async fn find_plan_by_slug(&self, slug: &str) -> Result<Option<Plan>, AppError> {
        let plan = sqlx::query_as::<_, Plan>(&format!(
            "SELECT {} FROM plans WHERE slug = $1",
            PLAN_COLUMNS
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(plan_slug = %slug, error = %e, "Failed to fetch plan by slug");
            AppError::Database(e)
        })?;

        Ok(plan)
    }

    pub async fn list_active_plans(&self) -> Result<Vec<Plan>, AppError> {
        let plans = sqlx::query_as::<_, Plan>(&format!(
            "SELECT {} FROM plans WHERE is_active = TRUE ORDER BY sort_order, name",
            PLAN_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to list plans");
            AppError::Database(e)
        })?;

        Ok(plans)
    }
}
