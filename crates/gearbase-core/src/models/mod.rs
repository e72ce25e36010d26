pub mod plan;
pub mod tenant;

pub use plan::Plan;
pub use tenant::{
    ConnectionDescriptor, NewTenant, SubscriptionStatus, SubscriptionUpdate, Tenant, TenantStatus,
};
