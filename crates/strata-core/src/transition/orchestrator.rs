//! Layer transition orchestrator.
//!
//! Executes promotions against the graph backend and keeps the audit trail.
//! Every request ends in exactly one terminal record: COMPLETED, REJECTED
//! (validation failed, nothing written) or FAILED (backend error or timeout).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::record::{
    PropertyDiff, TransitionRecord, TransitionStatistics, TransitionStatus, ValidationResult,
};
use crate::error::{StrataError, StrataResult};
use crate::events::{EngineEvent, EventAction, EventBus};
use crate::traits::{GraphBackend, PromotionEnrichment};
use crate::types::{EntityCategory, GraphEntity, KnowledgeLayer, TransitionStep};

pub const CHECK_ENTITY_EXISTS: &str = "entity_exists";
pub const CHECK_HIERARCHY: &str = "layer_hierarchy";
pub const CHECK_REQUIRED_PROPERTIES: &str = "required_properties";

/// Orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Mint a versioned entity id on every completed transition.
    pub create_versions: bool,
    /// Upper bound on any single backend call.
    pub backend_timeout_ms: u64,
    /// Approver recorded on auto-approved transitions.
    pub system_approver: String,
    /// Records kept in memory; oldest are dropped first.
    pub history_limit: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            create_versions: false,
            backend_timeout_ms: 5_000,
            system_approver: "system".to_string(),
            history_limit: 10_000,
        }
    }
}

impl OrchestratorConfig {
    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }

    pub fn validate(&self) -> StrataResult<()> {
        if self.backend_timeout_ms == 0 {
            return Err(StrataError::Configuration(
                "backend_timeout_ms must be positive".to_string(),
            ));
        }
        if self.history_limit == 0 {
            return Err(StrataError::Configuration(
                "history_limit must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// A request to move one entity up one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub entity_id: String,
    pub target_layer: KnowledgeLayer,
    pub reason: String,
    pub requested_by: String,
    /// Approve without a named approver; the system approver is recorded.
    pub auto_approve: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(default)]
    pub enrichment: HashMap<String, serde_json::Value>,
}

impl TransitionRequest {
    pub fn new(entity_id: impl Into<String>, target_layer: KnowledgeLayer) -> Self {
        Self {
            entity_id: entity_id.into(),
            target_layer,
            reason: "manual promotion".to_string(),
            requested_by: "api".to_string(),
            auto_approve: false,
            approved_by: None,
            enrichment: HashMap::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn requested_by(mut self, requester: impl Into<String>) -> Self {
        self.requested_by = requester.into();
        self
    }

    pub fn auto_approve(mut self) -> Self {
        self.auto_approve = true;
        self
    }

    pub fn approved_by(mut self, approver: impl Into<String>) -> Self {
        self.approved_by = Some(approver.into());
        self
    }

    pub fn with_enrichment(mut self, enrichment: HashMap<String, serde_json::Value>) -> Self {
        self.enrichment.extend(enrichment);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.enrichment.insert(key.into(), value);
        self
    }
}

/// Properties an entity must carry to live in `layer`.
pub fn required_properties(layer: KnowledgeLayer) -> &'static [&'static str] {
    match layer {
        KnowledgeLayer::Perception => &[],
        KnowledgeLayer::Semantic => &["domain", "validated", "validated_at"],
        KnowledgeLayer::Reasoning => &["reasoning_ready", "inference_rules", "reasoned_at"],
        KnowledgeLayer::Application => &["application_ready", "query_validated", "applied_at"],
    }
}

fn domain_for(category: EntityCategory) -> &'static str {
    match category {
        EntityCategory::Disease
        | EntityCategory::Symptom
        | EntityCategory::Medication
        | EntityCategory::Procedure
        | EntityCategory::LabResult
        | EntityCategory::VitalSign
        | EntityCategory::Allergy
        | EntityCategory::Anatomy => "clinical",
        EntityCategory::Gene => "genomic",
        EntityCategory::Person | EntityCategory::Organization => "administrative",
        EntityCategory::Event | EntityCategory::Concept | EntityCategory::Other => "general",
    }
}

/// Layer-specific properties for promoting `entity` into `target`.
///
/// Values the entity already carries are kept, so enriching twice yields the
/// same properties.
pub fn enrich_for_layer(
    entity: &GraphEntity,
    target: KnowledgeLayer,
    now: DateTime<Utc>,
) -> HashMap<String, serde_json::Value> {
    let stamp = json!(now.to_rfc3339());
    let defaults: Vec<(&str, serde_json::Value)> = match target {
        KnowledgeLayer::Perception => Vec::new(),
        KnowledgeLayer::Semantic => vec![
            ("domain", json!(domain_for(entity.category))),
            ("validated", json!(true)),
            ("validated_at", stamp),
        ],
        KnowledgeLayer::Reasoning => vec![
            ("reasoning_ready", json!(true)),
            ("inference_rules", json!(entity.inference_rules_fired)),
            ("reasoned_at", stamp),
        ],
        KnowledgeLayer::Application => vec![
            ("application_ready", json!(true)),
            ("query_validated", json!(true)),
            ("applied_at", stamp),
        ],
    };

    defaults
        .into_iter()
        .map(|(key, default)| {
            let value = entity
                .attributes
                .get(key)
                .filter(|v| !v.is_null())
                .cloned()
                .unwrap_or(default);
            (key.to_string(), value)
        })
        .collect()
}

#[derive(Default)]
struct OrchestratorState {
    records: Vec<TransitionRecord>,
    stats: TransitionStatistics,
}

/// Executes approved promotions and records their lineage.
pub struct TransitionOrchestrator {
    config: OrchestratorConfig,
    backend: Arc<dyn GraphBackend>,
    events: Option<EventBus>,
    state: RwLock<OrchestratorState>,
}

impl TransitionOrchestrator {
    pub fn new(config: OrchestratorConfig, backend: Arc<dyn GraphBackend>) -> Self {
        Self {
            config,
            backend,
            events: None,
            state: RwLock::new(OrchestratorState::default()),
        }
    }

    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run one transition to a terminal state.
    ///
    /// Never returns an error: failures are captured on the record.
    pub async fn execute_transition(&self, request: TransitionRequest) -> TransitionRecord {
        let mut record = TransitionRecord::new(
            &request.entity_id,
            request.target_layer,
            &request.reason,
            &request.requested_by,
        );
        record.lineage = self.prior_lineage(&request.entity_id).await;

        if let Err(e) = self.run(&mut record, &request).await {
            tracing::error!(
                entity_id = %record.entity_id,
                to = %record.to_layer,
                error = %e,
                "transition failed"
            );
            if !record.status.is_terminal() {
                let message = e.to_string();
                if let Err(inner) = record.fail(message) {
                    tracing::error!(error = %inner, "could not mark transition failed");
                }
            }
        }

        self.store(record.clone()).await;
        self.publish(&record);
        record
    }

    async fn run(&self, record: &mut TransitionRecord, request: &TransitionRequest) -> StrataResult<()> {
        let entity = match self
            .with_timeout("get_entity", self.backend.get_entity(&request.entity_id))
            .await?
        {
            Some(entity) => entity,
            None => {
                let message = format!("entity '{}' not found", request.entity_id);
                record
                    .validation_results
                    .push(ValidationResult::new(CHECK_ENTITY_EXISTS, false, &message));
                tracing::warn!(entity_id = %request.entity_id, "transition rejected: entity not found");
                return record.reject(message);
            }
        };
        record.entity_name = entity.name.clone();
        record.from_layer = Some(entity.layer);

        record.validation_results = self.validate(&entity, request);
        let failures: Vec<&str> = record
            .validation_results
            .iter()
            .filter(|v| !v.passed)
            .map(|v| v.message.as_str())
            .collect();
        if !failures.is_empty() {
            let message = failures.join("; ");
            tracing::warn!(
                entity_id = %entity.id,
                from = %entity.layer,
                to = %request.target_layer,
                reason = %message,
                "transition rejected"
            );
            return record.reject(message);
        }

        let approver = if request.auto_approve {
            self.config.system_approver.clone()
        } else {
            request
                .approved_by
                .clone()
                .unwrap_or_else(|| request.requested_by.clone())
        };
        record.approve(approver)?;

        let mut enrichment = PromotionEnrichment::new(request.enrichment.clone());
        enrichment
            .properties
            .insert("promoted_from".to_string(), json!(entity.layer));
        enrichment
            .properties
            .insert("transition_id".to_string(), json!(record.id));
        let versioned = self
            .config
            .create_versions
            .then(|| next_version_id(&entity.id, &record.lineage));
        if let Some(id) = &versioned {
            enrichment = enrichment.with_new_id(id.clone());
        }

        let promoted = self
            .with_timeout(
                "promote_entity",
                self.backend.promote_entity(
                    &entity.id,
                    entity.layer,
                    request.target_layer,
                    &enrichment,
                ),
            )
            .await?;

        // Only a successful write mints the versioned id
        record.new_entity_id = versioned;
        record.complete(PropertyDiff::between(&entity.attributes, &promoted.attributes))?;
        tracing::info!(
            entity_id = %entity.id,
            new_id = %record.resulting_id(),
            from = %entity.layer,
            to = %request.target_layer,
            duration_ms = record.duration_ms.unwrap_or(0),
            "transition completed"
        );
        Ok(())
    }

    fn validate(&self, entity: &GraphEntity, request: &TransitionRequest) -> Vec<ValidationResult> {
        let mut results = Vec::with_capacity(2);

        match TransitionStep::between(entity.layer, request.target_layer) {
            Some(step) => results.push(ValidationResult::new(
                CHECK_HIERARCHY,
                true,
                format!("{} is a legal step", step),
            )),
            None => results.push(ValidationResult::new(
                CHECK_HIERARCHY,
                false,
                StrataError::illegal_transition(entity.layer, request.target_layer).to_string(),
            )),
        }

        let missing: Vec<&str> = required_properties(request.target_layer)
            .iter()
            .copied()
            .filter(|key| {
                request
                    .enrichment
                    .get(*key)
                    .or_else(|| entity.attributes.get(*key))
                    .map_or(true, |v| v.is_null())
            })
            .collect();
        results.push(if missing.is_empty() {
            ValidationResult::new(CHECK_REQUIRED_PROPERTIES, true, "all required properties present")
        } else {
            ValidationResult::new(
                CHECK_REQUIRED_PROPERTIES,
                false,
                format!(
                    "missing required properties for {}: {}",
                    request.target_layer,
                    missing.join(", ")
                ),
            )
        });

        results
    }

    async fn with_timeout<T, F>(&self, operation: &str, fut: F) -> StrataResult<T>
    where
        F: Future<Output = StrataResult<T>>,
    {
        match tokio::time::timeout(self.config.backend_timeout(), fut).await {
            Ok(result) => result,
            Err(_) => Err(StrataError::timeout(operation, self.config.backend_timeout_ms)),
        }
    }

    /// Ids `entity_id` carried before, taken from the transition that minted it.
    async fn prior_lineage(&self, entity_id: &str) -> Vec<String> {
        let state = self.state.read().await;
        state
            .records
            .iter()
            .rev()
            .find(|r| {
                r.status == TransitionStatus::Completed
                    && r.new_entity_id.as_deref() == Some(entity_id)
            })
            .map(|r| {
                let mut lineage = r.lineage.clone();
                lineage.push(r.entity_id.clone());
                lineage
            })
            .unwrap_or_default()
    }

    async fn store(&self, record: TransitionRecord) {
        let mut state = self.state.write().await;
        state.stats.record(&record);
        state.records.push(record);
        let overflow = state.records.len().saturating_sub(self.config.history_limit);
        if overflow > 0 {
            state.records.drain(..overflow);
        }
    }

    fn publish(&self, record: &TransitionRecord) {
        let Some(bus) = &self.events else {
            return;
        };
        let action = match record.status {
            TransitionStatus::Completed => EventAction::TransitionCompleted,
            TransitionStatus::Rejected => EventAction::TransitionRejected,
            TransitionStatus::Failed => EventAction::TransitionFailed,
            TransitionStatus::Pending | TransitionStatus::Approved => return,
        };
        let mut event = EngineEvent::new(action, &record.entity_id, "orchestrator")
            .with_layer(record.to_layer)
            .with("transition_id", json!(record.id))
            .with("from_layer", json!(record.from_layer));
        if let Some(new_id) = &record.new_entity_id {
            event = event.with("new_entity_id", json!(new_id));
        }
        if let Some(message) = &record.error_message {
            event = event.with("error", json!(message));
        }
        bus.publish(event);
    }

    /// Full chronological history of an entity across re-versioning.
    pub async fn get_entity_lineage(&self, entity_id: &str) -> Vec<TransitionRecord> {
        let state = self.state.read().await;

        let mut ids: HashSet<&str> = HashSet::from([entity_id]);
        for record in state.records.iter().filter(|r| r.involves(entity_id)) {
            ids.insert(&record.entity_id);
            ids.extend(record.lineage.iter().map(String::as_str));
            if let Some(new_id) = &record.new_entity_id {
                ids.insert(new_id);
            }
        }

        let mut history: Vec<TransitionRecord> = state
            .records
            .iter()
            .filter(|r| ids.contains(r.entity_id.as_str()))
            .cloned()
            .collect();
        history.sort_by_key(|r| r.requested_at);
        history
    }

    pub async fn get_record(&self, record_id: &str) -> StrataResult<TransitionRecord> {
        self.state
            .read()
            .await
            .records
            .iter()
            .find(|r| r.id == record_id)
            .cloned()
            .ok_or_else(|| StrataError::record_not_found(record_id))
    }

    /// Most recent records first.
    pub async fn history(&self, limit: usize) -> Vec<TransitionRecord> {
        self.state
            .read()
            .await
            .records
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn statistics(&self) -> TransitionStatistics {
        self.state.read().await.stats.clone()
    }
}

fn next_version_id(entity_id: &str, lineage: &[String]) -> String {
    let root = lineage.first().map(String::as_str).unwrap_or(entity_id);
    format!("{}_v{}", root, lineage.len() + 2)
}
