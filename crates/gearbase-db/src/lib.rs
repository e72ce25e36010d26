//! Gearbase control-plane store
//!
//! Typed access to the tenant directory and the plan catalog, plus bootstrap of the
//! control-plane connection pool.

pub mod db;
pub mod directory;
pub mod setup;

pub use db::{PlanRepository, TenantRepository};
pub use directory::TenantDirectory;
pub use setup::connect_control_plane;
