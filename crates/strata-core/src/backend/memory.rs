//! In-process graph backend.
//!
//! Holds entity snapshots and terminology rows in maps. Useful for tests,
//! demos and single-process deployments without a graph database.

use async_trait::async_trait;
use ordered_float::OrderedFloat;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{StrataError, StrataResult};
use crate::traits::{
    GraphBackend, PromotionEnrichment, PropertyRow, ENTITY_ATTRIBUTES_QUERY, TERMINOLOGY_QUERY,
};
use crate::types::{GraphEntity, KnowledgeLayer};

/// Map-backed [`GraphBackend`].
#[derive(Default)]
pub struct InMemoryGraphBackend {
    entities: RwLock<HashMap<String, GraphEntity>>,
    terminology: RwLock<Vec<PropertyRow>>,
}

impl InMemoryGraphBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-loaded with entities.
    pub fn with_entities(entities: impl IntoIterator<Item = GraphEntity>) -> Self {
        let map = entities.into_iter().map(|e| (e.id.clone(), e)).collect();
        Self {
            entities: RwLock::new(map),
            terminology: RwLock::new(Vec::new()),
        }
    }

    /// Register a vocabulary row served by the `terminology` query.
    pub async fn add_terminology(
        &self,
        name: &str,
        coding_system: &str,
        code: &str,
        display_name: &str,
    ) {
        let row = HashMap::from([
            ("name".to_string(), serde_json::json!(name.to_lowercase())),
            ("coding_system".to_string(), serde_json::json!(coding_system)),
            ("code".to_string(), serde_json::json!(code)),
            ("display_name".to_string(), serde_json::json!(display_name)),
        ]);
        self.terminology.write().await.push(row);
    }

    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }

    async fn terminology_rows(&self, name: &str) -> Vec<PropertyRow> {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.terminology
            .read()
            .await
            .iter()
            .filter(|row| {
                row.get("name")
                    .and_then(|v| v.as_str())
                    .is_some_and(|n| n.contains(&needle) || needle.contains(n))
            })
            .cloned()
            .collect()
    }
}

fn param_str<'a>(params: &'a HashMap<String, serde_json::Value>, key: &str) -> StrataResult<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| StrataError::invalid_argument(format!("query parameter '{}' is required", key)))
}

#[async_trait]
impl GraphBackend for InMemoryGraphBackend {
    async fn get_entity(&self, id: &str) -> StrataResult<Option<GraphEntity>> {
        Ok(self.entities.read().await.get(id).cloned())
    }

    async fn upsert_entity(&self, entity: GraphEntity) -> StrataResult<()> {
        self.entities.write().await.insert(entity.id.clone(), entity);
        Ok(())
    }

    async fn promote_entity(
        &self,
        id: &str,
        from: KnowledgeLayer,
        to: KnowledgeLayer,
        enrichment: &PromotionEnrichment,
    ) -> StrataResult<GraphEntity> {
        let mut entities = self.entities.write().await;
        let current = entities.get(id).ok_or_else(|| StrataError::not_found(id))?;
        if current.layer != from {
            return Err(StrataError::backend(format!(
                "entity '{}' is at {}, expected {}",
                id, current.layer, from
            )));
        }
        if let Some(new_id) = &enrichment.new_entity_id {
            if entities.contains_key(new_id) {
                return Err(StrataError::backend(format!(
                    "versioned id '{}' already exists",
                    new_id
                )));
            }
        }

        let Some(mut entity) = entities.remove(id) else {
            return Err(StrataError::not_found(id));
        };
        entity.layer = to;
        entity
            .attributes
            .extend(enrichment.properties.iter().map(|(k, v)| (k.clone(), v.clone())));
        if let Some(new_id) = &enrichment.new_entity_id {
            entity
                .attributes
                .insert("previous_id".to_string(), serde_json::json!(id));
            entity.id = new_id.clone();
        }
        entities.insert(entity.id.clone(), entity.clone());
        Ok(entity)
    }

    async fn get_promotion_candidates(
        &self,
        layer: KnowledgeLayer,
        threshold: f64,
        limit: usize,
    ) -> StrataResult<Vec<GraphEntity>> {
        let entities = self.entities.read().await;
        let mut candidates: Vec<GraphEntity> = entities
            .values()
            .filter(|e| e.layer == layer && e.confidence >= threshold)
            .cloned()
            .collect();
        candidates.sort_by(|a, b| {
            OrderedFloat(b.confidence)
                .cmp(&OrderedFloat(a.confidence))
                .then_with(|| a.id.cmp(&b.id))
        });
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn query(
        &self,
        name: &str,
        params: &HashMap<String, serde_json::Value>,
    ) -> StrataResult<Vec<PropertyRow>> {
        match name {
            TERMINOLOGY_QUERY => Ok(self.terminology_rows(param_str(params, "name")?).await),
            ENTITY_ATTRIBUTES_QUERY => {
                let id = param_str(params, "entity_id")?;
                Ok(self
                    .entities
                    .read()
                    .await
                    .get(id)
                    .map(|e| vec![e.attributes.clone()])
                    .unwrap_or_default())
            }
            other => Err(StrataError::backend(format!("unsupported query '{}'", other))),
        }
    }
}
