//! Test helpers for tenancy unit tests
//!
//! In-memory stand-ins for the tenant directory, the tenant connector and the store
//! administration seams, so routing and provisioning can be tested without Postgres.

pub mod fixtures;
pub mod mock_connector;
pub mod mock_directory;
pub mod mock_stores;

pub use fixtures::*;
pub use mock_connector::{MockConnector, MockHandle};
pub use mock_directory::MockDirectory;
pub use mock_stores::{MockSchemaApplier, MockStoreAdmin};
