//! Embedded graph backend on SQLite.
//!
//! Entity snapshots are stored as JSON next to the columns candidate scans
//! need. Promotions run inside a single SQLite transaction, so a failed
//! re-key leaves the original row in place.

pub mod schema;
pub mod sync;

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::Connection;

use strata_core::error::{StrataError, StrataResult};
use strata_core::traits::{
    GraphBackend, GraphBackendConfig, PromotionEnrichment, PropertyRow, ENTITY_ATTRIBUTES_QUERY,
    TERMINOLOGY_QUERY,
};
use strata_core::types::{GraphEntity, KnowledgeLayer};

use sync::db_error;

/// SQLite-backed [`GraphBackend`].
///
/// Thread-safe via a Mutex on the connection.
pub struct SqliteGraphBackend {
    conn: Mutex<Connection>,
}

impl SqliteGraphBackend {
    /// Open (or create) a database file.
    pub fn new(db_path: impl AsRef<Path>) -> StrataResult<Self> {
        let conn = Connection::open(db_path.as_ref()).map_err(db_error)?;
        schema::init_schema(&conn)?;
        tracing::debug!(path = %db_path.as_ref().display(), "opened sqlite graph backend");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database.
    pub fn in_memory() -> StrataResult<Self> {
        let conn = Connection::open_in_memory().map_err(db_error)?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create from a [`GraphBackendConfig`]; the url is the database path.
    pub fn from_config(config: &GraphBackendConfig) -> StrataResult<Self> {
        if config.url.is_empty() || config.url == ":memory:" {
            Self::in_memory()
        } else {
            Self::new(&config.url)
        }
    }

    fn conn(&self) -> StrataResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StrataError::Internal(e.to_string()))
    }

    /// Register a vocabulary row served by the `terminology` query.
    pub fn add_terminology(
        &self,
        name: &str,
        coding_system: &str,
        code: &str,
        display_name: &str,
    ) -> StrataResult<()> {
        let conn = self.conn()?;
        sync::save_terminology(&conn, name, coding_system, code, display_name)
    }

    pub fn len(&self) -> StrataResult<usize> {
        let conn = self.conn()?;
        sync::count_entities(&conn)
    }

    pub fn is_empty(&self) -> StrataResult<bool> {
        Ok(self.len()? == 0)
    }
}

fn param_str<'a>(params: &'a HashMap<String, serde_json::Value>, key: &str) -> StrataResult<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| StrataError::invalid_argument(format!("query parameter '{}' is required", key)))
}

#[async_trait]
impl GraphBackend for SqliteGraphBackend {
    async fn get_entity(&self, id: &str) -> StrataResult<Option<GraphEntity>> {
        let conn = self.conn()?;
        sync::load_entity(&conn, id)
    }

    async fn upsert_entity(&self, entity: GraphEntity) -> StrataResult<()> {
        let conn = self.conn()?;
        sync::save_entity(&conn, &entity)
    }

    async fn promote_entity(
        &self,
        id: &str,
        from: KnowledgeLayer,
        to: KnowledgeLayer,
        enrichment: &PromotionEnrichment,
    ) -> StrataResult<GraphEntity> {
        let mut conn = self.conn()?;
        let promoted = sync::promote_entity(&mut conn, id, from, to, enrichment)?;
        tracing::debug!(id, new_id = %promoted.id, from = %from, to = %to, "entity promoted");
        Ok(promoted)
    }

    async fn get_promotion_candidates(
        &self,
        layer: KnowledgeLayer,
        threshold: f64,
        limit: usize,
    ) -> StrataResult<Vec<GraphEntity>> {
        let conn = self.conn()?;
        sync::load_candidates(&conn, layer, threshold, limit)
    }

    async fn query(
        &self,
        name: &str,
        params: &HashMap<String, serde_json::Value>,
    ) -> StrataResult<Vec<PropertyRow>> {
        let conn = self.conn()?;
        match name {
            TERMINOLOGY_QUERY => sync::find_terminology(&conn, param_str(params, "name")?),
            ENTITY_ATTRIBUTES_QUERY => sync::entity_attributes(&conn, param_str(params, "entity_id")?),
            other => Err(StrataError::backend(format!("unsupported query '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::types::EntityCategory;

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");

        {
            let backend = SqliteGraphBackend::new(&path).unwrap();
            backend
                .upsert_entity(GraphEntity::new(
                    "e1",
                    "Asthma",
                    EntityCategory::Disease,
                    KnowledgeLayer::Perception,
                    0.9,
                ))
                .await
                .unwrap();
        }

        let reopened = SqliteGraphBackend::new(&path).unwrap();
        let entity = reopened.get_entity("e1").await.unwrap().unwrap();
        assert_eq!(entity.name, "Asthma");
        assert_eq!(reopened.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_promote_checks_source_layer() {
        let backend = SqliteGraphBackend::in_memory().unwrap();
        backend
            .upsert_entity(GraphEntity::new(
                "e1",
                "x",
                EntityCategory::Concept,
                KnowledgeLayer::Semantic,
                0.9,
            ))
            .await
            .unwrap();

        let err = backend
            .promote_entity(
                "e1",
                KnowledgeLayer::Perception,
                KnowledgeLayer::Semantic,
                &PromotionEnrichment::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StrataError::Backend { .. }));

        let missing = backend
            .promote_entity(
                "nope",
                KnowledgeLayer::Perception,
                KnowledgeLayer::Semantic,
                &PromotionEnrichment::default(),
            )
            .await
            .unwrap_err();
        assert!(missing.is_not_found());
    }

    #[tokio::test]
    async fn test_named_queries() {
        let backend = SqliteGraphBackend::in_memory().unwrap();
        backend
            .upsert_entity(
                GraphEntity::new("e1", "x", EntityCategory::Concept, KnowledgeLayer::Perception, 0.5)
                    .with_attribute("domain", serde_json::json!("general")),
            )
            .await
            .unwrap();
        backend
            .add_terminology("Aspirin", "SNOMED-CT", "387458008", "Aspirin")
            .unwrap();

        let rows = backend
            .query(
                TERMINOLOGY_QUERY,
                &HashMap::from([("name".to_string(), serde_json::json!("aspirin"))]),
            )
            .await
            .unwrap();
        assert_eq!(rows[0]["code"], serde_json::json!("387458008"));

        let attrs = backend
            .query(
                ENTITY_ATTRIBUTES_QUERY,
                &HashMap::from([("entity_id".to_string(), serde_json::json!("e1"))]),
            )
            .await
            .unwrap();
        assert_eq!(attrs[0]["domain"], serde_json::json!("general"));

        assert!(backend.query("bogus", &HashMap::new()).await.is_err());
        assert!(backend.query(ENTITY_ATTRIBUTES_QUERY, &HashMap::new()).await.is_err());
    }
}
