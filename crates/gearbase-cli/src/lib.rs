//! Shared helpers for the gearbase operator CLI.

use gearbase_core::models::{Plan, Tenant};
use gearbase_core::AppError;
use gearbase_infra::LogFormat;

/// Initialize tracing for the CLI.
pub fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    gearbase_infra::init_telemetry("gearbase-cli", format)
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))
}

/// Truncate a string to max_len characters, appending "..." if truncated.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Turn a missing lookup result into `AppError::NotFound` naming what was asked for.
pub fn require_found<T>(row: Option<T>, what: impl std::fmt::Display) -> Result<T, AppError> {
    row.ok_or_else(|| AppError::NotFound(format!("{} not found", what)))
}

pub const TENANT_TABLE_HEADER: &str = "KEY                  STATUS    VERSION  NAME";

/// One table line for a tenant.
pub fn tenant_row(tenant: &Tenant) -> String {
    format!(
        "{:<20} {:<9} {:>7}  {}",
        truncate_string(&tenant.key, 20),
        tenant.status.as_str(),
        tenant.version,
        truncate_string(&tenant.name, 40)
    )
}

/// One table line for a plan; prices are printed in major units.
pub fn plan_row(plan: &Plan) -> String {
    format!(
        "{:<12} {:<20} {:>6}.{:02} {}",
        plan.slug,
        truncate_string(&plan.name, 20),
        plan.monthly_price_cents / 100,
        plan.monthly_price_cents % 100,
        plan.currency.to_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gearbase_core::models::{ConnectionDescriptor, TenantStatus};
    use gearbase_core::ErrorMetadata;

    fn tenant(key: &str, name: &str) -> Tenant {
        Tenant {
            id: uuid::Uuid::new_v4(),
            key: key.to_string(),
            name: name.to_string(),
            contact_email: "owner@example.com".to_string(),
            contact_phone: None,
            notes: None,
            connection_descriptor: ConnectionDescriptor::new("postgres://u:p@localhost/t"),
            status: TenantStatus::Active,
            plan_id: None,
            subscription_status: None,
            current_period_start: None,
            current_period_end: None,
            trial_start: None,
            trial_end: None,
            canceled_at: None,
            cancel_reason: None,
            version: 3,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn truncate_string_short() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("", 5), "");
    }

    #[test]
    fn truncate_string_long() {
        assert_eq!(truncate_string("hello world", 8), "hello...");
        assert_eq!(truncate_string("abc", 2), "...");
    }

    #[test]
    fn require_found_passes_rows_through() {
        assert_eq!(require_found(Some(7), "Plan 'pro'").unwrap(), 7);
    }

    #[test]
    fn require_found_reports_missing_rows_as_not_found() {
        let err = require_found::<Plan>(None, "Plan 'gold'").unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref msg) if msg == "Plan 'gold' not found"));
        assert_eq!(err.http_status_code(), 404);
    }

    #[test]
    fn tenant_row_never_shows_the_descriptor() {
        let row = tenant_row(&tenant("acme", "Acme Rentals"));
        assert!(row.starts_with("acme"));
        assert!(row.contains("active"));
        assert!(row.contains("Acme Rentals"));
        assert!(!row.contains("postgres://"));
    }
}
