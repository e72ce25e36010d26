//! Gearbase Core Library
//!
//! This crate provides the domain models, error types, configuration, and tenant key
//! validation shared by the control-plane store, the provisioner, the connection
//! router, and the request-side glue.

pub mod config;
pub mod error;
pub mod models;
pub mod tenancy_error;
pub mod validation;

// Re-export commonly used types
pub use config::{CleanupPolicy, TenancyConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use tenancy_error::{ProvisioningStep, TenancyError};
pub use validation::tenant_key::{normalize_tenant_key, store_name_for, validate_tenant_key};
