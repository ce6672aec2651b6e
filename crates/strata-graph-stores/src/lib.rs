//! strata-graph-stores - Graph backend implementations for strata.
//!
//! # Supported Backends
//!
//! - **In-memory** (always available) - re-exported from strata-core
//! - **SQLite** (feature: `sqlite`, default) - embedded, persistent

mod factory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use factory::GraphBackendFactory;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteGraphBackend;

// Re-export core types
pub use strata_core::backend::InMemoryGraphBackend;
pub use strata_core::traits::{GraphBackend, GraphBackendConfig, GraphBackendProvider};
