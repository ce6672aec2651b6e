//! Knowledge-graph backend trait and related types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::StrataResult;
use crate::types::{GraphEntity, KnowledgeLayer};

/// One row returned by [`GraphBackend::query`].
pub type PropertyRow = HashMap<String, serde_json::Value>;

/// Named query for terminology rows. Params: `name`, `category`.
pub const TERMINOLOGY_QUERY: &str = "terminology";

/// Named query for an entity's attribute map. Params: `entity_id`.
pub const ENTITY_ATTRIBUTES_QUERY: &str = "entity_attributes";

/// What the engine hands to the backend when promoting an entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromotionEnrichment {
    /// Properties merged into the entity's attributes.
    pub properties: HashMap<String, serde_json::Value>,
    /// When set, the entity is re-keyed under this versioned id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_entity_id: Option<String>,
}

impl PromotionEnrichment {
    pub fn new(properties: HashMap<String, serde_json::Value>) -> Self {
        Self {
            properties,
            new_entity_id: None,
        }
    }

    pub fn with_new_id(mut self, id: impl Into<String>) -> Self {
        self.new_entity_id = Some(id.into());
        self
    }
}

/// Knowledge-graph storage consumed by the engine.
///
/// The engine never owns a storage transaction. Implementations must cap the
/// size of candidate result sets at `limit`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GraphBackend: Send + Sync {
    /// Fetch an entity snapshot.
    async fn get_entity(&self, id: &str) -> StrataResult<Option<GraphEntity>>;

    /// Insert or replace an entity.
    async fn upsert_entity(&self, entity: GraphEntity) -> StrataResult<()>;

    /// Move an entity from `from` to `to`, merging the enrichment.
    ///
    /// Fails if the stored entity is not currently at `from`. Returns the
    /// promoted snapshot.
    async fn promote_entity(
        &self,
        id: &str,
        from: KnowledgeLayer,
        to: KnowledgeLayer,
        enrichment: &PromotionEnrichment,
    ) -> StrataResult<GraphEntity>;

    /// Entities at `layer` with confidence >= `threshold`, highest first, at most `limit`.
    async fn get_promotion_candidates(
        &self,
        layer: KnowledgeLayer,
        threshold: f64,
        limit: usize,
    ) -> StrataResult<Vec<GraphEntity>>;

    /// Generic named query returning property rows.
    async fn query(
        &self,
        name: &str,
        params: &HashMap<String, serde_json::Value>,
    ) -> StrataResult<Vec<PropertyRow>>;
}

/// Backend provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GraphBackendProvider {
    #[default]
    InMemory,
    Sqlite,
}

/// Backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphBackendConfig {
    /// Provider type.
    pub provider: GraphBackendProvider,
    /// Connection URL or database path. `:memory:` for an in-memory database.
    pub url: String,
}

impl Default for GraphBackendConfig {
    fn default() -> Self {
        Self {
            provider: GraphBackendProvider::InMemory,
            url: ":memory:".to_string(),
        }
    }
}
