pub mod plan;
pub mod tenant;

pub use plan::PlanRepository;
pub use tenant::TenantRepository;
