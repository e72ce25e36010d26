//! Tenant key validation
//!
//! A tenant key is the merchant's subdomain and is embedded in the physical database
//! name of its isolated store, so it has to be safe as both a DNS label and a
//! Postgres identifier.
//!
//! Keys are compared case-insensitively: every write and every lookup goes through
//! [`normalize_tenant_key`] first.

use std::sync::LazyLock;

use regex::Regex;

use crate::tenancy_error::TenancyError;

pub const MIN_TENANT_KEY_LENGTH: usize = 3;
pub const MAX_TENANT_KEY_LENGTH: usize = 40;

static KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9]*(-[a-z0-9]+)*$").expect("tenant key pattern is valid")
});

/// Keys that collide with infrastructure hostnames or Postgres system databases.
const RESERVED_KEYS: &[&str] = &[
    "www",
    "api",
    "admin",
    "app",
    "mail",
    "static",
    "control",
    "postgres",
    "template0",
    "template1",
];

/// Trim and lowercase a raw key as received from a request or an operator.
pub fn normalize_tenant_key(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// Validate a candidate key and return its normalized form.
///
/// Rules:
/// - 3 to 40 characters after normalization
/// - lowercase letters, digits and single interior hyphens, starting with a letter
/// - not a reserved name
pub fn validate_tenant_key(raw: &str) -> Result<String, TenancyError> {
    let key = normalize_tenant_key(raw);
    let invalid = |reason: String| TenancyError::InvalidKey {
        key: key.clone(),
        reason,
    };

    if key.len() < MIN_TENANT_KEY_LENGTH || key.len() > MAX_TENANT_KEY_LENGTH {
        return Err(invalid(format!(
            "must be between {} and {} characters",
            MIN_TENANT_KEY_LENGTH, MAX_TENANT_KEY_LENGTH
        )));
    }

    if !KEY_PATTERN.is_match(&key) {
        return Err(invalid(
            "allowed: lowercase letters, digits and single hyphens, starting with a letter"
                .to_string(),
        ));
    }

    if RESERVED_KEYS.contains(&key.as_str()) {
        return Err(invalid("reserved name".to_string()));
    }

    Ok(key)
}

/// Physical database name for a validated key.
///
/// Hyphens are not allowed in unquoted Postgres identifiers, so they become
/// underscores. Keys never contain underscores, which keeps the mapping one-to-one.
pub fn store_name_for(prefix: &str, key: &str) -> String {
    format!("{}{}", prefix, key.replace('-', "_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_and_normalizes_valid_keys() {
        assert_eq!(validate_tenant_key("acme").unwrap(), "acme");
        assert_eq!(validate_tenant_key("  ACME-Rentals ").unwrap(), "acme-rentals");
        assert_eq!(validate_tenant_key("tools4you").unwrap(), "tools4you");
    }

    #[test]
    fn rejects_bad_characters() {
        for key in ["acme_co", "acme.co", "acme co", "acme--co", "-acme", "acme-", "4acme"] {
            let err = validate_tenant_key(key).unwrap_err();
            assert!(
                matches!(err, TenancyError::InvalidKey { .. }),
                "{} should be rejected",
                key
            );
        }
    }

    #[test]
    fn rejects_bad_lengths() {
        assert!(validate_tenant_key("ab").is_err());
        assert!(validate_tenant_key(&"a".repeat(41)).is_err());
        assert!(validate_tenant_key(&"a".repeat(40)).is_ok());
    }

    #[test]
    fn rejects_reserved_names() {
        assert!(validate_tenant_key("www").is_err());
        assert!(validate_tenant_key("Postgres").is_err());
        assert!(validate_tenant_key("template1").is_err());
    }

    #[test]
    fn store_names_are_identifier_safe() {
        assert_eq!(store_name_for("tenant_", "acme"), "tenant_acme");
        assert_eq!(store_name_for("tenant_", "acme-rentals"), "tenant_acme_rentals");
    }
}
