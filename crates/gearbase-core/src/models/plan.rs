use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subscription plan: pricing and limits catalog row referenced by tenants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Plan {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub monthly_price_cents: i32,
    pub currency: String,
    pub trial_days: i32,
    pub max_products: i32,
    pub max_rentals_per_month: i32,
    pub max_staff_accounts: i32,
    pub features: serde_json::Value,
    pub is_active: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
