//! Snapshot of a graph entity as seen by the promotion engine.
//!
//! The graph backend owns entities; the engine only reads snapshots and
//! hands enrichment back through [`crate::traits::GraphBackend::promote_entity`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{EntityCategory, KnowledgeLayer};

/// A coded vocabulary entry attached to an entity (e.g. SNOMED CT, ICD-10).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminologyCode {
    /// Coding system identifier, e.g. "SNOMED-CT".
    pub coding_system: String,
    /// Code within the system.
    pub code: String,
    /// Preferred display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl TerminologyCode {
    pub fn new(coding_system: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            coding_system: coding_system.into(),
            code: code.into(),
            display_name: None,
        }
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display_name = Some(display.into());
        self
    }
}

/// An entity snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEntity {
    /// Entity id (may be a versioned id after a promotion).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Entity category.
    pub category: EntityCategory,
    /// Current knowledge layer.
    pub layer: KnowledgeLayer,
    /// Confidence score in [0, 1].
    pub confidence: f64,
    /// Number of times the entity was observed.
    #[serde(default)]
    pub observation_count: u32,
    /// First observation time.
    pub first_observed: DateTime<Utc>,
    /// Most recent observation time.
    pub last_observed: DateTime<Utc>,
    /// Distinct sources that reported the entity.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Terminology codes already attached.
    #[serde(default)]
    pub terminology_codes: Vec<TerminologyCode>,
    /// Number of independent validations.
    #[serde(default)]
    pub validation_count: u32,
    /// Number of inbound references from other entities.
    #[serde(default)]
    pub reference_count: u32,
    /// Inference rules that fired with this entity as a premise.
    #[serde(default)]
    pub inference_rules_fired: Vec<String>,
    /// Recorded contradictions against this entity.
    #[serde(default)]
    pub contradictions: u32,
    /// Domain attributes and layer enrichment.
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl GraphEntity {
    /// Create a freshly observed entity.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: EntityCategory,
        layer: KnowledgeLayer,
        confidence: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            category,
            layer,
            confidence,
            observation_count: 1,
            first_observed: now,
            last_observed: now,
            sources: Vec::new(),
            terminology_codes: Vec::new(),
            validation_count: 0,
            reference_count: 0,
            inference_rules_fired: Vec::new(),
            contradictions: 0,
            attributes: HashMap::new(),
        }
    }

    pub fn with_observations(mut self, count: u32) -> Self {
        self.observation_count = count;
        self
    }

    pub fn with_observed_between(mut self, first: DateTime<Utc>, last: DateTime<Utc>) -> Self {
        self.first_observed = first;
        self.last_observed = last;
        self
    }

    pub fn with_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_code(mut self, code: TerminologyCode) -> Self {
        self.terminology_codes.push(code);
        self
    }

    pub fn with_validations(mut self, count: u32) -> Self {
        self.validation_count = count;
        self
    }

    pub fn with_references(mut self, count: u32) -> Self {
        self.reference_count = count;
        self
    }

    pub fn with_fired_rule(mut self, rule: impl Into<String>) -> Self {
        self.inference_rules_fired.push(rule.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Number of distinct sources.
    pub fn distinct_source_count(&self) -> usize {
        let mut seen: Vec<&str> = self.sources.iter().map(String::as_str).collect();
        seen.sort_unstable();
        seen.dedup();
        seen.len()
    }

    /// Hours between first and last observation.
    pub fn observed_span_hours(&self) -> f64 {
        let span = self.last_observed.signed_duration_since(self.first_observed);
        (span.num_seconds() as f64 / 3600.0).max(0.0)
    }

    /// Whether the entity has at least one terminology code.
    pub fn has_terminology_code(&self) -> bool {
        !self.terminology_codes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_distinct_sources_ignore_duplicates() {
        let entity = GraphEntity::new("e1", "aspirin", EntityCategory::Medication, KnowledgeLayer::Perception, 0.5)
            .with_sources(["ehr", "note", "ehr"]);
        assert_eq!(entity.distinct_source_count(), 2);
    }

    #[test]
    fn test_observed_span() {
        let now = Utc::now();
        let entity = GraphEntity::new("e1", "x", EntityCategory::Other, KnowledgeLayer::Perception, 0.5)
            .with_observed_between(now - Duration::hours(30), now);
        assert!((entity.observed_span_hours() - 30.0).abs() < 1e-6);
    }
}
