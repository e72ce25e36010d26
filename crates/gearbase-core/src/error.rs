//! Error types module
//!
//! This module provides the core error types used throughout Gearbase.
//! All errors are unified under the `AppError` enum, which wraps database, input and
//! tenancy failures. `ErrorMetadata` describes how each one is presented upstream.
//!
//! The `Database` variant and `From<sqlx::Error>` are gated behind the `sqlx` feature.

use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

use crate::tenancy_error::TenancyError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
/// This trait allows errors to self-describe their HTTP response characteristics
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "TENANT_NOT_FOUND")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden in production
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Tenancy(#[from] TenancyError),
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::InvalidInput(format!("Validation error: {}", err))
    }
}

type StaticMetadata = (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
);

/// Static metadata for each tenancy variant: (http_status, error_code, recoverable,
/// suggested_action, sensitive, log_level).
fn tenancy_static_metadata(err: &TenancyError) -> StaticMetadata {
    match err {
        TenancyError::InvalidKey { .. } => (
            400,
            "INVALID_TENANT_KEY",
            false,
            Some("Use 3-40 lowercase letters, digits or hyphens, starting with a letter"),
            false,
            LogLevel::Debug,
        ),
        TenancyError::DuplicateKey(_) => (
            409,
            "DUPLICATE_TENANT_KEY",
            false,
            Some("Choose a different tenant key"),
            false,
            LogLevel::Debug,
        ),
        TenancyError::StoreAlreadyExists { .. } => (
            409,
            "TENANT_STORE_EXISTS",
            false,
            Some("Choose a different key or clean up the orphaned store"),
            false,
            LogLevel::Warn,
        ),
        TenancyError::TenantNotFound(_) => (
            404,
            "TENANT_NOT_FOUND",
            false,
            Some("Check the tenant subdomain"),
            false,
            LogLevel::Debug,
        ),
        TenancyError::TenantInactive(_) => (
            403,
            "TENANT_INACTIVE",
            false,
            Some("Contact support to reactivate the account"),
            false,
            LogLevel::Debug,
        ),
        TenancyError::StoreUnreachable { .. } => (
            503,
            "TENANT_STORE_UNREACHABLE",
            true,
            Some("Retry with backoff"),
            true,
            LogLevel::Error,
        ),
        TenancyError::ProvisioningIncomplete { .. } => (
            500,
            "PROVISIONING_INCOMPLETE",
            false,
            Some("An operator must clean up before retrying"),
            true,
            LogLevel::Error,
        ),
        TenancyError::MissingTenantKey => (
            400,
            "MISSING_TENANT_KEY",
            false,
            Some("Send the tenant subdomain header"),
            false,
            LogLevel::Debug,
        ),
        TenancyError::StaleWrite(_) => (
            409,
            "STALE_WRITE",
            true,
            Some("Reload the tenant and retry"),
            false,
            LogLevel::Warn,
        ),
        TenancyError::ControlPlaneUnavailable(_) => (
            503,
            "CONTROL_PLANE_UNAVAILABLE",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        TenancyError::RouterShutDown => (
            503,
            "SHUTTING_DOWN",
            true,
            Some("Retry against another instance"),
            false,
            LogLevel::Warn,
        ),
    }
}

/// Static metadata for each variant. client_message stays per-variant for dynamic content.
fn app_error_static_metadata(err: &AppError) -> StaticMetadata {
    match err {
        AppError::Database(_) => (
            500,
            "DATABASE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::InvalidInput(_) => (
            400,
            "INVALID_INPUT",
            false,
            Some("Check request parameters and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::NotFound(_) => (
            404,
            "NOT_FOUND",
            false,
            Some("Verify the resource ID exists"),
            false,
            LogLevel::Debug,
        ),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::Tenancy(inner) => tenancy_static_metadata(inner),
    }
}

impl AppError {
    /// Get the error type name for detailed error responses
    pub fn error_type(&self) -> &str {
        match self {
            AppError::Database(_) => "Database",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::NotFound(_) => "NotFound",
            AppError::Internal(_) => "Internal",
            AppError::InternalWithSource { .. } => "Internal",
            AppError::Tenancy(_) => "Tenancy",
        }
    }

    /// The tenancy error behind this error, if any.
    pub fn as_tenancy(&self) -> Option<&TenancyError> {
        match self {
            AppError::Tenancy(inner) => Some(inner),
            _ => None,
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Database(_) => "Failed to access database".to_string(),
            AppError::InvalidInput(ref msg) => msg.clone(),
            AppError::NotFound(ref msg) => msg.clone(),
            AppError::Internal(_) => "Internal server error".to_string(),
            AppError::InternalWithSource { .. } => "Internal server error".to_string(),
            AppError::Tenancy(inner) => match inner {
                TenancyError::StoreUnreachable { key, .. } => {
                    format!("Data store for tenant '{}' is temporarily unavailable", key)
                }
                TenancyError::ProvisioningIncomplete { key, .. } => {
                    format!("Provisioning of tenant '{}' did not complete", key)
                }
                TenancyError::ControlPlaneUnavailable(_) => {
                    "Tenant directory is temporarily unavailable".to_string()
                }
                other => other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_metadata_database() {
        #[cfg(feature = "sqlx")]
        let err = AppError::from(sqlx::Error::PoolClosed);
        #[cfg(not(feature = "sqlx"))]
        let err = AppError::Database("pool closed".to_string());
        assert_eq!(err.http_status_code(), 500);
        assert_eq!(err.error_code(), "DATABASE_ERROR");
        assert!(err.is_recoverable());
        assert_eq!(err.client_message(), "Failed to access database");
        assert!(err.is_sensitive());
        assert_eq!(err.log_level(), LogLevel::Error);
    }

    #[test]
    fn test_not_found_and_inactive_map_to_distinct_statuses() {
        let missing = AppError::from(TenancyError::TenantNotFound("acme".to_string()));
        let inactive = AppError::from(TenancyError::TenantInactive("acme".to_string()));
        assert_eq!(missing.http_status_code(), 404);
        assert_eq!(missing.error_code(), "TENANT_NOT_FOUND");
        assert_eq!(inactive.http_status_code(), 403);
        assert_eq!(inactive.error_code(), "TENANT_INACTIVE");
    }

    #[test]
    fn test_store_unreachable_hides_reason() {
        let err = AppError::from(TenancyError::StoreUnreachable {
            key: "acme".to_string(),
            reason: "password authentication failed for user gear".to_string(),
        });
        assert_eq!(err.http_status_code(), 503);
        assert!(err.is_recoverable());
        assert!(err.is_sensitive());
        assert!(!err.client_message().contains("password"));
        assert!(err.client_message().contains("acme"));
    }

    #[test]
    fn test_missing_key_is_a_caller_error() {
        let err = AppError::from(TenancyError::MissingTenantKey);
        assert_eq!(err.http_status_code(), 400);
        assert_eq!(err.error_code(), "MISSING_TENANT_KEY");
        assert_eq!(err.log_level(), LogLevel::Debug);
    }

    #[test]
    fn test_error_metadata_suggested_actions() {
        let err1 = AppError::NotFound("test".to_string());
        assert_eq!(
            err1.suggested_action(),
            Some("Verify the resource ID exists")
        );

        let err2 = AppError::InvalidInput("test".to_string());
        assert_eq!(
            err2.suggested_action(),
            Some("Check request parameters and try again")
        );

        let err3 = AppError::from(TenancyError::StaleWrite("acme".to_string()));
        assert_eq!(err3.suggested_action(), Some("Reload the tenant and retry"));
    }
}
