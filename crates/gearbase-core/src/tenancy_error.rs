//! Tenancy error types
//!
//! Errors raised by the tenant directory, the provisioner, and the connection router.
//! `TenancyError` is `Clone` because a single failed resolution is delivered to every
//! caller waiting on the same tenant key, so sources are kept as rendered strings.

use std::fmt;

/// Provisioning step that failed after the tenant store was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningStep {
    CreateStore,
    ApplySchema,
    RegisterTenant,
}

impl ProvisioningStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisioningStep::CreateStore => "create_store",
            ProvisioningStep::ApplySchema => "apply_schema",
            ProvisioningStep::RegisterTenant => "register_tenant",
        }
    }
}

impl fmt::Display for ProvisioningStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TenancyError {
    #[error("Invalid tenant key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Tenant key '{0}' is already registered")]
    DuplicateKey(String),

    #[error("Tenant store '{store}' already exists")]
    StoreAlreadyExists { store: String },

    #[error("Tenant '{0}' not found")]
    TenantNotFound(String),

    #[error("Tenant '{0}' is inactive")]
    TenantInactive(String),

    #[error("Tenant store for '{key}' is unreachable: {reason}")]
    StoreUnreachable { key: String, reason: String },

    #[error("Provisioning of tenant '{key}' stopped at step {step} (store '{store}'): {reason}")]
    ProvisioningIncomplete {
        key: String,
        step: ProvisioningStep,
        store: String,
        reason: String,
        cleaned_up: bool,
    },

    #[error("Request did not carry a tenant key")]
    MissingTenantKey,

    #[error("Tenant {0} was modified concurrently; reload and retry")]
    StaleWrite(String),

    #[error("Control-plane store unavailable: {0}")]
    ControlPlaneUnavailable(String),

    #[error("Tenant router has been shut down")]
    RouterShutDown,
}

impl TenancyError {
    /// Expected, user-facing outcomes as opposed to infrastructure faults.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            TenancyError::InvalidKey { .. }
                | TenancyError::DuplicateKey(_)
                | TenancyError::TenantNotFound(_)
                | TenancyError::TenantInactive(_)
                | TenancyError::MissingTenantKey
                | TenancyError::StaleWrite(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provisioning_incomplete_names_step_and_store() {
        let err = TenancyError::ProvisioningIncomplete {
            key: "acme".to_string(),
            step: ProvisioningStep::ApplySchema,
            store: "tenant_acme".to_string(),
            reason: "timed out".to_string(),
            cleaned_up: false,
        };
        let message = err.to_string();
        assert!(message.contains("acme"));
        assert!(message.contains("apply_schema"));
        assert!(message.contains("tenant_acme"));
    }

    #[test]
    fn infrastructure_faults_are_not_user_facing() {
        assert!(TenancyError::TenantInactive("acme".into()).is_user_facing());
        assert!(!TenancyError::StoreUnreachable {
            key: "acme".into(),
            reason: "connection refused".into(),
        }
        .is_user_facing());
        assert!(!TenancyError::ControlPlaneUnavailable("timeout".into()).is_user_facing());
    }
}
