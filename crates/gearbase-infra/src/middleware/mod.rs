//! HTTP middleware

pub mod tenant;

#[cfg(test)]
mod tests;

pub use tenant::{
    tenant_connection_middleware, PgTenantContext, TenantContext, TenantKeySource,
    TenantResolverState,
};
