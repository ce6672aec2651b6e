//! Engine events.
//!
//! Inbound events (`entity_created`, `entity_updated`, `query_executed`) drive
//! the automatic trigger; the remaining actions are promotion-lifecycle
//! notifications published by the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::types::KnowledgeLayer;

/// Discriminating action tag of an [`EngineEvent`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    EntityCreated,
    EntityUpdated,
    QueryExecuted,
    PromotionApproved,
    PromotionQueued,
    PromotionRejected,
    ReviewApproved,
    ReviewRejected,
    TransitionCompleted,
    TransitionRejected,
    TransitionFailed,
}

impl EventAction {
    /// Whether the automatic trigger reacts to this action.
    pub fn is_trigger_input(&self) -> bool {
        matches!(
            self,
            Self::EntityCreated | Self::EntityUpdated | Self::QueryExecuted
        )
    }
}

/// A typed event with an opaque payload.
///
/// The payload always carries `entity_id`; layer and confidence fields are
/// included where relevant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEvent {
    /// Unique event ID
    pub event_id: String,
    pub action: EventAction,
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
    /// Component or system that produced the event.
    pub origin: String,
    pub timestamp: DateTime<Utc>,
}

impl EngineEvent {
    pub fn new(action: EventAction, entity_id: impl Into<String>, origin: impl Into<String>) -> Self {
        let mut data = serde_json::Map::new();
        data.insert(
            "entity_id".to_string(),
            serde_json::Value::String(entity_id.into()),
        );
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            action,
            data,
            origin: origin.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn entity_created(entity_id: impl Into<String>, layer: KnowledgeLayer, confidence: f64) -> Self {
        Self::new(EventAction::EntityCreated, entity_id, "graph")
            .with_layer(layer)
            .with("confidence", serde_json::json!(confidence))
    }

    pub fn entity_updated(entity_id: impl Into<String>, layer: KnowledgeLayer, confidence: f64) -> Self {
        Self::new(EventAction::EntityUpdated, entity_id, "graph")
            .with_layer(layer)
            .with("confidence", serde_json::json!(confidence))
    }

    pub fn query_executed(entity_id: impl Into<String>, cache_hit: bool) -> Self {
        Self::new(EventAction::QueryExecuted, entity_id, "query")
            .with_layer(KnowledgeLayer::Reasoning)
            .with("cache_hit", serde_json::Value::Bool(cache_hit))
    }

    pub fn with(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn with_layer(self, layer: KnowledgeLayer) -> Self {
        let name: &'static str = layer.into();
        self.with("layer", serde_json::Value::String(name.to_string()))
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.data.get("entity_id").and_then(|v| v.as_str())
    }

    /// Layer named in the payload, if present and recognised.
    pub fn layer(&self) -> Option<KnowledgeLayer> {
        self.data
            .get("layer")
            .and_then(|v| v.as_str())
            .and_then(|s| KnowledgeLayer::from_str(s).ok())
    }

    pub fn confidence(&self) -> Option<f64> {
        self.data.get("confidence").and_then(|v| v.as_f64())
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        self.data.get(key).and_then(|v| v.as_bool())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_payload_accessors() {
        let event = EngineEvent::entity_created("e-1", KnowledgeLayer::Perception, 0.9);
        assert_eq!(event.action, EventAction::EntityCreated);
        assert_eq!(event.entity_id(), Some("e-1"));
        assert_eq!(event.layer(), Some(KnowledgeLayer::Perception));
        assert_eq!(event.confidence(), Some(0.9));
    }

    #[test]
    fn test_query_event_carries_cache_flag() {
        let event = EngineEvent::query_executed("e-2", true);
        assert_eq!(event.flag("cache_hit"), Some(true));
        assert_eq!(event.layer(), Some(KnowledgeLayer::Reasoning));
    }

    #[test]
    fn test_serialization_uses_snake_case_action() {
        let event = EngineEvent::new(EventAction::TransitionCompleted, "e-3", "orchestrator");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["action"], "transition_completed");
        assert_eq!(json["data"]["entity_id"], "e-3");

        let back: EngineEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.action, EventAction::TransitionCompleted);
    }

    #[test]
    fn test_trigger_inputs() {
        assert!(EventAction::QueryExecuted.is_trigger_input());
        assert!(!EventAction::PromotionQueued.is_trigger_input());
        assert_eq!(
            "entity_updated".parse::<EventAction>().unwrap(),
            EventAction::EntityUpdated
        );
    }
}
