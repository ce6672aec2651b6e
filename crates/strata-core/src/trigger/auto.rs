//! Automatic promotion trigger.
//!
//! Reacts to entity and query events with cheap eligibility checks, then
//! hands eligible entities to the gate and, when approved, the orchestrator.
//! `run_promotion_scan` is the catch-up path for missed events.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::tracker::QueryTracker;
use crate::error::{StrataError, StrataResult};
use crate::events::{EngineEvent, EventAction, EventBus, EventSubscriber};
use crate::promotion::{DecisionStatus, PromotionDecision, PromotionGate};
use crate::traits::GraphBackend;
use crate::transition::{
    enrich_for_layer, TransitionOrchestrator, TransitionRecord, TransitionRequest, TransitionStatus,
};
use crate::types::{GraphEntity, KnowledgeLayer};

/// Actions the trigger subscribes to.
pub const TRIGGER_ACTIONS: [EventAction; 3] = [
    EventAction::EntityCreated,
    EventAction::EntityUpdated,
    EventAction::QueryExecuted,
];

const REQUESTER: &str = "auto-trigger";

/// Trigger thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// When false every handler returns immediately with no side effect.
    pub enabled: bool,
    pub perception_confidence: f64,
    pub perception_validations: u32,
    pub semantic_confidence: f64,
    pub semantic_references: u32,
    pub reasoning_query_count: u32,
    pub reasoning_cache_hit_rate: f64,
    /// Rolling window for query trackers.
    pub query_window_hours: f64,
    /// Candidate confidence floor used by scans at REASONING.
    pub reasoning_scan_confidence: f64,
    /// Default candidate cap per layer for scans.
    pub scan_limit: usize,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            perception_confidence: 0.85,
            perception_validations: 3,
            semantic_confidence: 0.9,
            semantic_references: 5,
            reasoning_query_count: 10,
            reasoning_cache_hit_rate: 0.5,
            query_window_hours: 24.0,
            reasoning_scan_confidence: 0.8,
            scan_limit: 100,
        }
    }
}

impl TriggerConfig {
    pub fn query_window(&self) -> Duration {
        Duration::milliseconds((self.query_window_hours * 3_600_000.0) as i64)
    }

    /// Confidence floor a scan uses when asking for candidates at `layer`.
    pub fn scan_threshold(&self, layer: KnowledgeLayer) -> f64 {
        match layer {
            KnowledgeLayer::Perception => self.perception_confidence,
            KnowledgeLayer::Semantic => self.semantic_confidence,
            KnowledgeLayer::Reasoning | KnowledgeLayer::Application => {
                self.reasoning_scan_confidence
            }
        }
    }

    pub fn validate(&self) -> StrataResult<()> {
        for (name, value) in [
            ("perception_confidence", self.perception_confidence),
            ("semantic_confidence", self.semantic_confidence),
            ("reasoning_cache_hit_rate", self.reasoning_cache_hit_rate),
            ("reasoning_scan_confidence", self.reasoning_scan_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(StrataError::Configuration(format!(
                    "{} {} outside [0, 1]",
                    name, value
                )));
            }
        }
        if self.query_window_hours.is_nan() || self.query_window_hours <= 0.0 {
            return Err(StrataError::Configuration(
                "query_window_hours must be positive".to_string(),
            ));
        }
        if self.scan_limit == 0 {
            return Err(StrataError::Configuration(
                "scan_limit must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of a lightweight eligibility check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible(String),
    NotEligible(String),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible(_))
    }
}

/// What the trigger did with one event or candidate.
#[derive(Debug, Clone)]
pub enum TriggerOutcome {
    /// Trigger is switched off.
    Disabled,
    Ignored { reason: String },
    NotEligible { reason: String },
    Promoted(Box<TransitionRecord>),
    QueuedForReview(Box<PromotionDecision>),
    Rejected(Box<PromotionDecision>),
    Failed {
        message: String,
        record: Option<Box<TransitionRecord>>,
    },
}

impl TriggerOutcome {
    pub fn is_promoted(&self) -> bool {
        matches!(self, Self::Promoted(_))
    }

    fn from_record(record: TransitionRecord) -> Self {
        if record.status == TransitionStatus::Completed {
            Self::Promoted(Box::new(record))
        } else {
            Self::Failed {
                message: record
                    .error_message
                    .clone()
                    .unwrap_or_else(|| format!("transition ended {}", record.status)),
                record: Some(Box::new(record)),
            }
        }
    }
}

/// Per-layer scan tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerScan {
    pub candidates: usize,
    pub promoted: usize,
    pub queued: usize,
    pub rejected: usize,
    pub failed: usize,
}

impl LayerScan {
    fn tally(&mut self, outcome: &TriggerOutcome) {
        match outcome {
            TriggerOutcome::Promoted(_) => self.promoted += 1,
            TriggerOutcome::QueuedForReview(_) => self.queued += 1,
            TriggerOutcome::Rejected(_) => self.rejected += 1,
            TriggerOutcome::Failed { .. } => self.failed += 1,
            _ => {}
        }
    }
}

/// Summary of a promotion scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub disabled: bool,
    pub per_layer: BTreeMap<KnowledgeLayer, LayerScan>,
    /// Candidate queries that failed, by layer.
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ScanReport {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            disabled: false,
            per_layer: BTreeMap::new(),
            errors: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    fn total(&self, field: impl Fn(&LayerScan) -> usize) -> usize {
        self.per_layer.values().map(field).sum()
    }

    pub fn candidates(&self) -> usize {
        self.total(|l| l.candidates)
    }

    pub fn promoted(&self) -> usize {
        self.total(|l| l.promoted)
    }

    pub fn queued(&self) -> usize {
        self.total(|l| l.queued)
    }

    pub fn rejected(&self) -> usize {
        self.total(|l| l.rejected)
    }

    pub fn failed(&self) -> usize {
        self.total(|l| l.failed)
    }
}

/// Decides when to invoke the gate.
pub struct AutomaticPromotionTrigger {
    config: TriggerConfig,
    backend: Arc<dyn GraphBackend>,
    gate: Arc<PromotionGate>,
    orchestrator: Arc<TransitionOrchestrator>,
    events: Option<EventBus>,
    trackers: Mutex<HashMap<String, QueryTracker>>,
}

impl AutomaticPromotionTrigger {
    pub fn new(
        config: TriggerConfig,
        backend: Arc<dyn GraphBackend>,
        gate: Arc<PromotionGate>,
        orchestrator: Arc<TransitionOrchestrator>,
    ) -> Self {
        Self {
            config,
            backend,
            gate,
            orchestrator,
            events: None,
            trackers: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// PERCEPTION: any one of confidence, validations or an attached code.
    pub fn check_perception(&self, entity: &GraphEntity) -> Eligibility {
        if entity.confidence >= self.config.perception_confidence {
            Eligibility::Eligible(format!(
                "confidence {:.2} >= {:.2}",
                entity.confidence, self.config.perception_confidence
            ))
        } else if entity.validation_count >= self.config.perception_validations {
            Eligibility::Eligible(format!("{} validations", entity.validation_count))
        } else if entity.has_terminology_code() {
            Eligibility::Eligible("terminology code present".to_string())
        } else {
            Eligibility::NotEligible(format!(
                "confidence {:.2}, {} validations, no terminology code",
                entity.confidence, entity.validation_count
            ))
        }
    }

    /// SEMANTIC: any one of confidence, fired inference rules or references.
    pub fn check_semantic(&self, entity: &GraphEntity) -> Eligibility {
        if entity.confidence >= self.config.semantic_confidence {
            Eligibility::Eligible(format!(
                "confidence {:.2} >= {:.2}",
                entity.confidence, self.config.semantic_confidence
            ))
        } else if !entity.inference_rules_fired.is_empty() {
            Eligibility::Eligible(format!(
                "inference rules fired: {}",
                entity.inference_rules_fired.join(", ")
            ))
        } else if entity.reference_count >= self.config.semantic_references {
            Eligibility::Eligible(format!("{} references", entity.reference_count))
        } else {
            Eligibility::NotEligible(format!(
                "confidence {:.2}, no inference rules, {} references",
                entity.confidence, entity.reference_count
            ))
        }
    }

    /// REASONING: frequency AND cache hit rate, inside the rolling window.
    pub fn check_reasoning(&self, tracker: &QueryTracker, now: DateTime<Utc>) -> Eligibility {
        let rate = tracker.cache_hit_rate();
        if !tracker.in_window(now, self.config.query_window()) {
            return Eligibility::NotEligible("query window expired".to_string());
        }
        if tracker.query_count < self.config.reasoning_query_count {
            return Eligibility::NotEligible(format!(
                "{} queries, {} required",
                tracker.query_count, self.config.reasoning_query_count
            ));
        }
        if rate < self.config.reasoning_cache_hit_rate {
            return Eligibility::NotEligible(format!(
                "cache hit rate {:.2} below {:.2}",
                rate, self.config.reasoning_cache_hit_rate
            ));
        }
        Eligibility::Eligible(format!(
            "{} queries at cache hit rate {:.2}",
            tracker.query_count, rate
        ))
    }

    /// Handle one bus event.
    pub async fn handle_event(&self, event: &EngineEvent) -> TriggerOutcome {
        if !self.config.enabled {
            return TriggerOutcome::Disabled;
        }
        let Some(entity_id) = event.entity_id() else {
            return TriggerOutcome::Ignored {
                reason: format!("{} event without entity_id", event.action),
            };
        };
        match event.action {
            EventAction::EntityCreated | EventAction::EntityUpdated => {
                self.on_entity_event(event.action, entity_id).await
            }
            EventAction::QueryExecuted => {
                self.on_query(
                    entity_id,
                    event.flag("cache_hit").unwrap_or(false),
                    event.timestamp,
                    event.layer(),
                )
                .await
            }
            other => TriggerOutcome::Ignored {
                reason: format!("{} is not a trigger input", other),
            },
        }
    }

    async fn on_entity_event(&self, action: EventAction, entity_id: &str) -> TriggerOutcome {
        let entity = match self.fetch(entity_id).await {
            Ok(Some(entity)) => entity,
            Ok(None) => {
                return TriggerOutcome::NotEligible {
                    reason: format!("entity '{}' not found", entity_id),
                }
            }
            Err(e) => {
                tracing::warn!(entity_id, error = %e, "could not load entity for trigger");
                return TriggerOutcome::Failed {
                    message: e.to_string(),
                    record: None,
                };
            }
        };

        let eligibility = match (entity.layer, action) {
            (KnowledgeLayer::Perception, _) => self.check_perception(&entity),
            (KnowledgeLayer::Semantic, EventAction::EntityUpdated) => self.check_semantic(&entity),
            (layer, action) => {
                return TriggerOutcome::Ignored {
                    reason: format!("{} on {} entity", action, layer),
                }
            }
        };
        let Some(target) = entity.layer.next() else {
            return TriggerOutcome::Ignored {
                reason: format!("{} is the top layer", entity.layer),
            };
        };

        match eligibility {
            Eligibility::Eligible(reason) => self.promote(&entity, target, &reason).await,
            Eligibility::NotEligible(reason) => {
                tracing::debug!(entity_id, reason = %reason, "not eligible for promotion");
                TriggerOutcome::NotEligible { reason }
            }
        }
    }

    async fn on_query(
        &self,
        entity_id: &str,
        cache_hit: bool,
        at: DateTime<Utc>,
        layer: Option<KnowledgeLayer>,
    ) -> TriggerOutcome {
        if let Some(layer) = layer.filter(|l| *l != KnowledgeLayer::Reasoning) {
            return TriggerOutcome::Ignored {
                reason: format!("query on {} entity", layer),
            };
        }

        let window = self.config.query_window();
        let tracker = {
            let mut trackers = self.trackers.lock().await;
            // An expired window restarts on its next query anyway
            trackers.retain(|_, t| t.in_window(at, window));
            trackers
                .entry(entity_id.to_string())
                .and_modify(|t| t.record(cache_hit, at, window))
                .or_insert_with(|| QueryTracker::new(entity_id, cache_hit, at))
                .clone()
        };

        let reason = match self.check_reasoning(&tracker, at) {
            Eligibility::Eligible(reason) => reason,
            Eligibility::NotEligible(reason) => return TriggerOutcome::NotEligible { reason },
        };

        let entity = match self.fetch(entity_id).await {
            Ok(Some(entity)) if entity.layer == KnowledgeLayer::Reasoning => entity,
            Ok(Some(entity)) => {
                self.trackers.lock().await.remove(entity_id);
                return TriggerOutcome::Ignored {
                    reason: format!("entity is at {}", entity.layer),
                };
            }
            Ok(None) => {
                self.trackers.lock().await.remove(entity_id);
                return TriggerOutcome::NotEligible {
                    reason: format!("entity '{}' not found", entity_id),
                };
            }
            Err(e) => {
                return TriggerOutcome::Failed {
                    message: e.to_string(),
                    record: None,
                }
            }
        };

        let outcome = self
            .promote(&entity, KnowledgeLayer::Application, &reason)
            .await;
        if outcome.is_promoted() {
            self.trackers.lock().await.remove(entity_id);
        }
        outcome
    }

    /// Run the gate and, on approval, the orchestrator.
    ///
    /// Ignores the enabled flag; callers that must honour it check first.
    pub async fn promote(
        &self,
        entity: &GraphEntity,
        target: KnowledgeLayer,
        reason: &str,
    ) -> TriggerOutcome {
        let decision = self.gate.evaluate(&entity.id, Some(entity), target).await;
        self.publish_decision(&decision);

        match decision.status {
            DecisionStatus::PendingReview => TriggerOutcome::QueuedForReview(Box::new(decision)),
            DecisionStatus::Rejected => TriggerOutcome::Rejected(Box::new(decision)),
            DecisionStatus::Approved => {
                let request = TransitionRequest::new(&entity.id, target)
                    .with_reason(reason)
                    .requested_by(REQUESTER)
                    .auto_approve()
                    .with_enrichment(enrich_for_layer(entity, target, Utc::now()));
                let record = self.orchestrator.execute_transition(request).await;
                TriggerOutcome::from_record(record)
            }
        }
    }

    fn publish_decision(&self, decision: &PromotionDecision) {
        let Some(bus) = &self.events else {
            return;
        };
        let action = match decision.status {
            DecisionStatus::Approved => EventAction::PromotionApproved,
            DecisionStatus::PendingReview => EventAction::PromotionQueued,
            DecisionStatus::Rejected => EventAction::PromotionRejected,
        };
        bus.publish(
            EngineEvent::new(action, &decision.entity_id, "gate")
                .with_layer(decision.to_layer)
                .with("risk_level", json!(decision.risk_level))
                .with("reason", json!(decision.reason)),
        );
    }

    /// Ask the backend for candidates at each promotable layer and run them
    /// through the gate.
    pub async fn run_promotion_scan(&self, limit: Option<usize>) -> ScanReport {
        let mut report = ScanReport::new();
        if !self.config.enabled {
            report.disabled = true;
            return report;
        }
        let limit = limit.unwrap_or(self.config.scan_limit);

        for &layer in KnowledgeLayer::promotable() {
            let Some(target) = layer.next() else {
                continue;
            };
            let threshold = self.config.scan_threshold(layer);
            let mut candidates = match self
                .bounded(self.backend.get_promotion_candidates(layer, threshold, limit))
                .await
            {
                Ok(candidates) => candidates,
                Err(e) => {
                    tracing::warn!(layer = %layer, error = %e, "candidate query failed");
                    report.errors.push(format!("{}: {}", layer, e));
                    continue;
                }
            };
            candidates.truncate(limit);

            let mut scan = LayerScan {
                candidates: candidates.len(),
                ..LayerScan::default()
            };
            for entity in &candidates {
                let outcome = self.promote(entity, target, "promotion scan").await;
                scan.tally(&outcome);
            }
            report.per_layer.insert(layer, scan);
        }

        report.finished_at = Utc::now();
        tracing::info!(
            candidates = report.candidates(),
            promoted = report.promoted(),
            queued = report.queued(),
            rejected = report.rejected(),
            failed = report.failed(),
            "promotion scan finished"
        );
        report
    }

    /// Consume events until the bus closes. Returns the number handled.
    pub async fn listen(&self, mut subscriber: EventSubscriber) -> usize {
        let mut handled = 0;
        while let Some(event) = subscriber.recv().await {
            if !event.action.is_trigger_input() {
                continue;
            }
            let outcome = self.handle_event(&event).await;
            tracing::debug!(event_id = %event.event_id, action = %event.action, ?outcome, "trigger handled event");
            handled += 1;
        }
        handled
    }

    /// Snapshot of an entity's query tracker.
    pub async fn query_tracker(&self, entity_id: &str) -> Option<QueryTracker> {
        self.trackers.lock().await.get(entity_id).cloned()
    }

    async fn fetch(&self, entity_id: &str) -> StrataResult<Option<GraphEntity>> {
        self.bounded(self.backend.get_entity(entity_id)).await
    }

    async fn bounded<T, F>(&self, fut: F) -> StrataResult<T>
    where
        F: Future<Output = StrataResult<T>>,
    {
        let config = self.orchestrator.config();
        match tokio::time::timeout(config.backend_timeout(), fut).await {
            Ok(result) => result,
            Err(_) => Err(StrataError::timeout("trigger backend call", config.backend_timeout_ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryGraphBackend;
    use crate::promotion::{GateConfig, StaticTerminology};
    use crate::transition::OrchestratorConfig;
    use crate::types::{EntityCategory, TerminologyCode};

    fn trigger_with(config: TriggerConfig, entities: Vec<GraphEntity>) -> AutomaticPromotionTrigger {
        let backend: Arc<dyn GraphBackend> = Arc::new(InMemoryGraphBackend::with_entities(entities));
        let gate = Arc::new(PromotionGate::new(
            GateConfig::default(),
            Arc::new(StaticTerminology::new()),
        ));
        let orchestrator = Arc::new(TransitionOrchestrator::new(
            OrchestratorConfig::default(),
            backend.clone(),
        ));
        AutomaticPromotionTrigger::new(config, backend, gate, orchestrator)
    }

    fn trigger(entities: Vec<GraphEntity>) -> AutomaticPromotionTrigger {
        trigger_with(TriggerConfig::default(), entities)
    }

    fn tracker(count: u32, hits: u32, misses: u32, first: DateTime<Utc>) -> QueryTracker {
        QueryTracker {
            entity_id: "r".to_string(),
            query_count: count,
            first_query_at: first,
            last_query_at: first,
            cache_hits: hits,
            cache_misses: misses,
        }
    }

    #[test]
    fn test_perception_branches_are_or() {
        let t = trigger(vec![]);
        let base = GraphEntity::new("p", "x", EntityCategory::Concept, KnowledgeLayer::Perception, 0.4);
        assert!(!t.check_perception(&base).is_eligible());
        assert!(t.check_perception(&GraphEntity { confidence: 0.9, ..base.clone() }).is_eligible());
        assert!(t.check_perception(&base.clone().with_validations(3)).is_eligible());
        assert!(t
            .check_perception(&base.with_code(TerminologyCode::new("SNOMED-CT", "1")))
            .is_eligible());
    }

    #[test]
    fn test_semantic_reference_branch() {
        let t = trigger(vec![]);
        let entity = GraphEntity::new("s", "x", EntityCategory::Concept, KnowledgeLayer::Semantic, 0.7)
            .with_references(10);
        assert_eq!(
            t.check_semantic(&entity),
            Eligibility::Eligible("10 references".to_string())
        );
        let quiet = GraphEntity::new("s", "x", EntityCategory::Concept, KnowledgeLayer::Semantic, 0.7);
        assert!(!t.check_semantic(&quiet).is_eligible());
        assert!(t.check_semantic(&quiet.with_fired_rule("transitivity")).is_eligible());
    }

    #[test]
    fn test_reasoning_requires_frequency_and_hit_rate() {
        let t = trigger(vec![]);
        let now = Utc::now();
        let first = now - Duration::hours(2);
        assert!(t.check_reasoning(&tracker(15, 10, 5, first), now).is_eligible());
        assert!(!t.check_reasoning(&tracker(15, 3, 12, first), now).is_eligible());
        assert!(!t.check_reasoning(&tracker(5, 5, 0, first), now).is_eligible());
        assert!(!t
            .check_reasoning(&tracker(15, 10, 5, now - Duration::hours(30)), now)
            .is_eligible());
    }

    #[tokio::test]
    async fn test_disabled_trigger_has_no_side_effects() {
        let config = TriggerConfig {
            enabled: false,
            ..TriggerConfig::default()
        };
        let t = trigger_with(config, vec![]);
        let outcome = t.handle_event(&EngineEvent::query_executed("r", true)).await;
        assert!(matches!(outcome, TriggerOutcome::Disabled));
        assert!(t.query_tracker("r").await.is_none());

        let report = t.run_promotion_scan(None).await;
        assert!(report.disabled);
        assert_eq!(report.candidates(), 0);
    }

    #[tokio::test]
    async fn test_perception_event_promotes() {
        let entity = GraphEntity::new("p", "fever", EntityCategory::Symptom, KnowledgeLayer::Perception, 0.9);
        let t = trigger(vec![entity]);
        let outcome = t
            .handle_event(&EngineEvent::entity_created("p", KnowledgeLayer::Perception, 0.9))
            .await;
        let TriggerOutcome::Promoted(record) = outcome else {
            panic!("expected promotion, got {:?}", outcome);
        };
        assert_eq!(record.to_layer, KnowledgeLayer::Semantic);
        assert_eq!(record.requested_by, REQUESTER);
    }

    #[tokio::test]
    async fn test_semantic_create_is_ignored() {
        let entity = GraphEntity::new("s", "x", EntityCategory::Concept, KnowledgeLayer::Semantic, 0.99);
        let t = trigger(vec![entity]);
        let outcome = t
            .handle_event(&EngineEvent::entity_created("s", KnowledgeLayer::Semantic, 0.99))
            .await;
        assert!(matches!(outcome, TriggerOutcome::Ignored { .. }));
    }

    #[tokio::test]
    async fn test_query_events_build_tracker() {
        let t = trigger(vec![]);
        for hit in [true, false, true] {
            let outcome = t.handle_event(&EngineEvent::query_executed("r", hit)).await;
            assert!(matches!(outcome, TriggerOutcome::NotEligible { .. }));
        }
        let snapshot = t.query_tracker("r").await.unwrap();
        assert_eq!(snapshot.query_count, 3);
        assert_eq!(snapshot.cache_hits, 2);
    }

    #[tokio::test]
    async fn test_stale_tracker_resets_on_next_query() {
        let t = trigger(vec![]);
        let long_ago = Utc::now() - Duration::hours(48);
        for _ in 0..12 {
            t.handle_event(&EngineEvent::query_executed("r", true).at(long_ago))
                .await;
        }
        assert_eq!(t.query_tracker("r").await.unwrap().query_count, 12);

        t.handle_event(&EngineEvent::query_executed("r", true)).await;
        assert_eq!(t.query_tracker("r").await.unwrap().query_count, 1);
    }

    async fn push_queries(t: &AutomaticPromotionTrigger, entity_id: &str, count: usize) -> TriggerOutcome {
        let mut last = TriggerOutcome::Disabled;
        for _ in 0..count {
            last = t
                .handle_event(&EngineEvent::query_executed(entity_id, true))
                .await;
        }
        last
    }

    #[tokio::test]
    async fn test_tracker_dropped_for_unknown_entity() {
        let t = trigger(vec![]);
        let outcome = push_queries(&t, "ghost", 10).await;
        assert!(matches!(outcome, TriggerOutcome::NotEligible { .. }));
        assert!(t.query_tracker("ghost").await.is_none());
    }

    #[tokio::test]
    async fn test_tracker_dropped_when_entity_not_at_reasoning() {
        let entity = GraphEntity::new("s", "x", EntityCategory::Concept, KnowledgeLayer::Semantic, 0.5);
        let t = trigger(vec![entity]);
        let outcome = push_queries(&t, "s", 10).await;
        assert!(matches!(outcome, TriggerOutcome::Ignored { .. }));
        assert!(t.query_tracker("s").await.is_none());
    }

    #[tokio::test]
    async fn test_expired_trackers_pruned_on_next_query() {
        let t = trigger(vec![]);
        let long_ago = Utc::now() - Duration::hours(48);
        for i in 0..5 {
            t.handle_event(&EngineEvent::query_executed(format!("cold-{}", i), false).at(long_ago))
                .await;
        }
        assert!(t.query_tracker("cold-0").await.is_some());

        t.handle_event(&EngineEvent::query_executed("r", true)).await;
        for i in 0..5 {
            assert!(t.query_tracker(&format!("cold-{}", i)).await.is_none());
        }
        assert_eq!(t.query_tracker("r").await.unwrap().query_count, 1);
    }

    #[tokio::test]
    async fn test_non_trigger_action_ignored() {
        let t = trigger(vec![]);
        let event = EngineEvent::new(EventAction::TransitionCompleted, "x", "orchestrator");
        assert!(matches!(
            t.handle_event(&event).await,
            TriggerOutcome::Ignored { .. }
        ));
    }

    #[tokio::test]
    async fn test_scan_respects_limit() {
        let entities = (0..5)
            .map(|i| {
                GraphEntity::new(
                    format!("p{}", i),
                    "fever",
                    EntityCategory::Symptom,
                    KnowledgeLayer::Perception,
                    0.9,
                )
            })
            .collect();
        let t = trigger(entities);
        let report = t.run_promotion_scan(Some(2)).await;
        let perception = report.per_layer[&KnowledgeLayer::Perception];
        assert_eq!(perception.candidates, 2);
        assert_eq!(perception.promoted, 2);
        assert!(report.errors.is_empty());
    }
}
