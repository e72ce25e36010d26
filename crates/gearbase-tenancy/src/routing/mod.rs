//! Per-tenant connection routing

pub mod connector;
pub mod router;


pub use connector::{PgTenantConnector, TenantConnector};
pub use router::{RouterOptions, TenantConnection, TenantRouter};

/// Router backed by one `PgPool` per tenant database.
pub type PgTenantRouter = TenantRouter<PgTenantConnector>;

/// A resolved tenant pool as handed to request handlers.
pub type TenantPool = std::sync::Arc<TenantConnection<sqlx::PgPool>>;
