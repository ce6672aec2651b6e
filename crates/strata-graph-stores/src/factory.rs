//! Factory for creating graph backends.

use std::sync::Arc;

use strata_core::backend::InMemoryGraphBackend;
use strata_core::error::{StrataError, StrataResult};
use strata_core::traits::{GraphBackend, GraphBackendConfig, GraphBackendProvider};

/// Factory for creating graph backends.
pub struct GraphBackendFactory;

impl GraphBackendFactory {
    /// Create a graph backend from the given configuration.
    pub async fn create(config: &GraphBackendConfig) -> StrataResult<Arc<dyn GraphBackend>> {
        match config.provider {
            GraphBackendProvider::InMemory => Ok(Arc::new(InMemoryGraphBackend::new())),

            #[cfg(feature = "sqlite")]
            GraphBackendProvider::Sqlite => {
                let backend = crate::sqlite::SqliteGraphBackend::from_config(config)?;
                Ok(Arc::new(backend))
            }

            #[allow(unreachable_patterns)]
            other => Err(StrataError::Configuration(format!(
                "graph backend provider {:?} is not compiled in",
                other
            ))),
        }
    }

    /// Create a SQLite backend at `path` (`:memory:` for a private database).
    #[cfg(feature = "sqlite")]
    pub async fn sqlite(path: &str) -> StrataResult<Arc<dyn GraphBackend>> {
        let config = GraphBackendConfig {
            provider: GraphBackendProvider::Sqlite,
            url: path.to_string(),
        };
        Self::create(&config).await
    }
}
