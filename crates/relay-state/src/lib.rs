//! Config store abstraction for relay: the account registry, routing
//! configs, tier bindings, tenants, model limits, and usage/request log
//! sinks the router and dispatcher read and write against.

pub mod error;
pub mod memory;
pub mod migrations;
pub mod sqlite;
pub mod store;

pub use error::StateError;
pub use memory::InMemoryConfigStore;
pub use sqlite::SqliteConfigStore;
pub use store::ConfigStore;
