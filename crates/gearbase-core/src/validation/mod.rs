//! Validation modules

pub mod tenant_key;

pub use tenant_key::{
    normalize_tenant_key, store_name_for, validate_tenant_key, MAX_TENANT_KEY_LENGTH,
    MIN_TENANT_KEY_LENGTH,
};
