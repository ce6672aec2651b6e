//! Promotion engine: the composition root.
//!
//! Owns every mutable registry (learned alphas, review queue, query trackers,
//! statistics) and wires gate -> orchestrator -> trigger around one injected
//! backend, terminology service and event bus.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::confidence::{AdaptiveAlpha, CrossLayerPropagator};
use crate::error::{StrataError, StrataResult};
use crate::events::{EngineEvent, EventAction, EventBus, EventSubscriber};
use crate::promotion::{PromotionDecision, PromotionGate, StaticTerminology};
use crate::temporal::{TemporalParser, TemporalScore, TemporalScorer};
use crate::traits::{GraphBackend, TerminologyLookup};
use crate::transition::{
    enrich_for_layer, TransitionOrchestrator, TransitionRecord, TransitionRequest,
};
use crate::trigger::{AutomaticPromotionTrigger, TriggerOutcome, TRIGGER_ACTIONS};
use crate::types::{GraphEntity, KnowledgeLayer};

/// Entity lifecycle engine.
pub struct PromotionEngine {
    config: EngineConfig,
    backend: Arc<dyn GraphBackend>,
    events: EventBus,
    alpha: AdaptiveAlpha,
    propagator: CrossLayerPropagator,
    scorer: TemporalScorer,
    parser: TemporalParser,
    gate: Arc<PromotionGate>,
    orchestrator: Arc<TransitionOrchestrator>,
    trigger: Arc<AutomaticPromotionTrigger>,
}

impl PromotionEngine {
    /// Build an engine. Fails if the configuration does not validate.
    pub fn new(
        config: EngineConfig,
        backend: Arc<dyn GraphBackend>,
        terminology: Arc<dyn TerminologyLookup>,
        events: EventBus,
    ) -> StrataResult<Self> {
        config.validate()?;

        let gate = Arc::new(PromotionGate::new(config.gate.clone(), terminology));
        let orchestrator = Arc::new(
            TransitionOrchestrator::new(config.orchestrator.clone(), backend.clone())
                .with_events(events.clone()),
        );
        let trigger = Arc::new(
            AutomaticPromotionTrigger::new(
                config.trigger.clone(),
                backend.clone(),
                gate.clone(),
                orchestrator.clone(),
            )
            .with_events(events.clone()),
        );

        tracing::debug!(
            trigger_enabled = config.trigger.enabled,
            create_versions = config.orchestrator.create_versions,
            "promotion engine ready"
        );

        Ok(Self {
            alpha: AdaptiveAlpha::new(config.alpha.clone()),
            propagator: CrossLayerPropagator::new(config.propagation.clone()),
            scorer: TemporalScorer::new(config.temporal.clone()),
            parser: TemporalParser::new(config.temporal.default_window),
            config,
            backend,
            events,
            gate,
            orchestrator,
            trigger,
        })
    }

    /// Default configuration, the built-in vocabulary and a fresh bus.
    pub fn with_backend(backend: Arc<dyn GraphBackend>) -> StrataResult<Self> {
        Self::new(
            EngineConfig::default(),
            backend,
            Arc::new(StaticTerminology::new()),
            EventBus::new(),
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn GraphBackend> {
        &self.backend
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn alpha(&self) -> &AdaptiveAlpha {
        &self.alpha
    }

    pub fn propagator(&self) -> &CrossLayerPropagator {
        &self.propagator
    }

    pub fn scorer(&self) -> &TemporalScorer {
        &self.scorer
    }

    pub fn parser(&self) -> &TemporalParser {
        &self.parser
    }

    pub fn gate(&self) -> &Arc<PromotionGate> {
        &self.gate
    }

    pub fn orchestrator(&self) -> &Arc<TransitionOrchestrator> {
        &self.orchestrator
    }

    pub fn trigger(&self) -> &Arc<AutomaticPromotionTrigger> {
        &self.trigger
    }

    /// Subscriber carrying the events the trigger reacts to.
    ///
    /// Pass it to [`AutomaticPromotionTrigger::listen`] on a task you own.
    pub fn trigger_subscriber(&self) -> EventSubscriber {
        self.events.subscribe_to(&TRIGGER_ACTIONS)
    }

    /// Publish an event on the engine bus.
    pub fn publish(&self, event: EngineEvent) {
        self.events.publish(event);
    }

    /// Handle one event synchronously, bypassing the bus.
    pub async fn handle_event(&self, event: &EngineEvent) -> TriggerOutcome {
        self.trigger.handle_event(event).await
    }

    async fn load(&self, entity_id: &str) -> StrataResult<Option<GraphEntity>> {
        let timeout = self.config.orchestrator.backend_timeout();
        match tokio::time::timeout(timeout, self.backend.get_entity(entity_id)).await {
            Ok(result) => result,
            Err(_) => Err(StrataError::timeout(
                "get_entity",
                self.config.orchestrator.backend_timeout_ms,
            )),
        }
    }

    /// Evaluate an entity for `target` and execute the promotion if approved.
    ///
    /// Runs regardless of the trigger's enabled flag.
    pub async fn evaluate_and_promote(
        &self,
        entity_id: &str,
        target: KnowledgeLayer,
    ) -> StrataResult<TriggerOutcome> {
        match self.load(entity_id).await? {
            Some(entity) => Ok(self
                .trigger
                .promote(&entity, target, "requested evaluation")
                .await),
            None => {
                let decision = self.gate.evaluate(entity_id, None, target).await;
                Ok(TriggerOutcome::Rejected(Box::new(decision)))
            }
        }
    }

    /// Approve a queued review and run the transition it was waiting for.
    pub async fn approve_review(
        &self,
        entity_id: &str,
        reviewer: &str,
        notes: Option<String>,
    ) -> StrataResult<TransitionRecord> {
        let decision = self.gate.approve_review(entity_id, reviewer, notes).await?;
        self.publish_review(EventAction::ReviewApproved, &decision, reviewer);

        let enrichment = decision
            .entity_snapshot
            .as_ref()
            .map(|e| enrich_for_layer(e, decision.to_layer, Utc::now()))
            .unwrap_or_default();
        let request = TransitionRequest::new(entity_id, decision.to_layer)
            .with_reason(format!("human review approved by {}", reviewer))
            .requested_by(reviewer)
            .approved_by(reviewer)
            .with_enrichment(enrichment);
        Ok(self.orchestrator.execute_transition(request).await)
    }

    /// Reject a queued review.
    pub async fn reject_review(
        &self,
        entity_id: &str,
        reviewer: &str,
        notes: Option<String>,
    ) -> StrataResult<PromotionDecision> {
        let decision = self.gate.reject_review(entity_id, reviewer, notes).await?;
        self.publish_review(EventAction::ReviewRejected, &decision, reviewer);
        Ok(decision)
    }

    fn publish_review(&self, action: EventAction, decision: &PromotionDecision, reviewer: &str) {
        self.events.publish(
            EngineEvent::new(action, &decision.entity_id, "review")
                .with_layer(decision.to_layer)
                .with("reviewer", json!(reviewer)),
        );
    }

    /// Current temporal relevance of a stored entity.
    pub async fn relevance(
        &self,
        entity_id: &str,
        now: DateTime<Utc>,
    ) -> StrataResult<TemporalScore> {
        let entity = self
            .load(entity_id)
            .await?
            .ok_or_else(|| StrataError::not_found(entity_id))?;
        Ok(self.scorer.score_entity(&entity, now))
    }
}
