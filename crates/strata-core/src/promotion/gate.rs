//! Promotion gate: multi-criteria eligibility, risk classification and the
//! human review queue.

use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::criteria::{GateConfig, PromotionCriteria};
use super::decision::{
    CriterionResult, DecisionStatus, GateStatistics, PendingReview, PromotionDecision,
    ReviewAction, ReviewPriority, ReviewVerdict,
};
use crate::error::{StrataError, StrataResult};
use crate::traits::{TerminologyLookup, TerminologyMatch};
use crate::types::{GraphEntity, KnowledgeLayer, RiskLevel, TransitionStep};

pub const CRITERION_ENTITY_EXISTS: &str = "entity_exists";
pub const CRITERION_LAYER_TRANSITION: &str = "layer_transition";
pub const CRITERION_CONFIDENCE: &str = "confidence";
pub const CRITERION_OBSERVATIONS: &str = "observations";
pub const CRITERION_STABILITY: &str = "temporal_stability";
pub const CRITERION_MULTI_SOURCE: &str = "multi_source";
pub const CRITERION_ONTOLOGY: &str = "ontology_match";

#[derive(Default)]
struct GateState {
    queue: HashMap<String, PendingReview>,
    history: Vec<ReviewAction>,
    stats: GateStatistics,
}

/// Status implied by criteria results and the risk policy.
pub fn decide_status(
    criteria: &[CriterionResult],
    risk: RiskLevel,
    step: TransitionStep,
    policy: &PromotionCriteria,
    exempt_first_promotion: bool,
) -> DecisionStatus {
    if criteria.iter().any(|c| !c.passed) {
        return DecisionStatus::Rejected;
    }
    let first_promotion = step == TransitionStep::PerceptionToSemantic;
    let review_required = risk == RiskLevel::High
        && policy.high_risk_requires_review
        && !(first_promotion && exempt_first_promotion);
    if review_required {
        DecisionStatus::PendingReview
    } else {
        DecisionStatus::Approved
    }
}

/// Evaluates promotion eligibility and owns the review queue.
pub struct PromotionGate {
    config: GateConfig,
    terminology: Arc<dyn TerminologyLookup>,
    state: Mutex<GateState>,
}

impl PromotionGate {
    pub fn new(config: GateConfig, terminology: Arc<dyn TerminologyLookup>) -> Self {
        Self {
            config,
            terminology,
            state: Mutex::new(GateState::default()),
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Evaluate whether `entity` may move to `target`.
    ///
    /// Never fails: missing entities, illegal moves and unmet criteria all
    /// produce a rejected decision. Pending decisions are enqueued.
    pub async fn evaluate(
        &self,
        entity_id: &str,
        entity: Option<&GraphEntity>,
        target: KnowledgeLayer,
    ) -> PromotionDecision {
        let decision = match entity {
            None => self.reject_missing(entity_id, target),
            Some(entity) => self.evaluate_snapshot(entity, target).await,
        };

        let mut state = self.state.lock().await;
        state.stats.record(decision.step(), decision.status);
        if decision.is_pending() {
            let confidence = decision
                .entity_snapshot
                .as_ref()
                .map_or(0.0, |e| e.confidence);
            // Re-delivered events must not create a second queue entry
            if !state.queue.contains_key(&decision.entity_id) {
                state.queue.insert(
                    decision.entity_id.clone(),
                    PendingReview {
                        decision: decision.clone(),
                        priority: ReviewPriority::derive(decision.risk_level, confidence),
                        submitted_at: decision.evaluated_at,
                    },
                );
            }
            state.stats.queue_depth = state.queue.len();
        }
        drop(state);

        match decision.status {
            DecisionStatus::Approved => tracing::info!(
                entity_id = %decision.entity_id,
                to = %decision.to_layer,
                "promotion approved"
            ),
            DecisionStatus::PendingReview => tracing::info!(
                entity_id = %decision.entity_id,
                to = %decision.to_layer,
                risk = %decision.risk_level,
                "promotion queued for review"
            ),
            DecisionStatus::Rejected => tracing::debug!(
                entity_id = %decision.entity_id,
                reason = %decision.reason,
                "promotion rejected"
            ),
        }
        decision
    }

    fn reject_missing(&self, entity_id: &str, target: KnowledgeLayer) -> PromotionDecision {
        let criteria = vec![CriterionResult::new(
            CRITERION_ENTITY_EXISTS,
            false,
            json!(false),
            json!(true),
            format!("entity '{}' not found", entity_id),
        )];
        PromotionDecision {
            entity_id: entity_id.to_string(),
            entity_name: String::new(),
            category: None,
            from_layer: None,
            to_layer: target,
            status: DecisionStatus::Rejected,
            risk_level: RiskLevel::Low,
            reason: format!("entity '{}' not found", entity_id),
            criteria,
            entity_snapshot: None,
            terminology: None,
            evaluated_at: Utc::now(),
            reviewed_by: None,
            reviewed_at: None,
            review_notes: None,
        }
    }

    async fn evaluate_snapshot(&self, entity: &GraphEntity, target: KnowledgeLayer) -> PromotionDecision {
        let risk = entity.category.risk_level();
        let mut decision = PromotionDecision {
            entity_id: entity.id.clone(),
            entity_name: entity.name.clone(),
            category: Some(entity.category),
            from_layer: Some(entity.layer),
            to_layer: target,
            status: DecisionStatus::Rejected,
            risk_level: risk,
            criteria: Vec::new(),
            reason: String::new(),
            entity_snapshot: Some(entity.clone()),
            terminology: None,
            evaluated_at: Utc::now(),
            reviewed_by: None,
            reviewed_at: None,
            review_notes: None,
        };

        let Some(step) = TransitionStep::between(entity.layer, target) else {
            let err = StrataError::illegal_transition(entity.layer, target);
            decision.criteria.push(CriterionResult::new(
                CRITERION_LAYER_TRANSITION,
                false,
                json!(entity.layer),
                json!(entity.layer.next()),
                err.to_string(),
            ));
            decision.reason = err.to_string();
            return decision;
        };

        let policy = *self.config.criteria_for(step);
        let mut criteria = self.check_criteria(entity, &policy);

        if policy.require_ontology_match {
            let (result, matched) = self.check_ontology(entity).await;
            criteria.push(result);
            decision.terminology = matched;
        } else {
            criteria.push(CriterionResult::new(
                CRITERION_ONTOLOGY,
                true,
                json!(null),
                json!(false),
                "not required",
            ));
        }

        decision.status = decide_status(
            &criteria,
            risk,
            step,
            &policy,
            self.config.exempt_first_promotion_from_review,
        );
        decision.criteria = criteria;
        decision.reason = match decision.status {
            DecisionStatus::Approved => format!("all {} criteria met", step),
            DecisionStatus::PendingReview => {
                format!("all {} criteria met; {} risk requires human review", step, risk)
            }
            DecisionStatus::Rejected => {
                format!("failed criteria: {}", decision.failed_criteria().join(", "))
            }
        };
        decision
    }

    fn check_criteria(&self, entity: &GraphEntity, policy: &PromotionCriteria) -> Vec<CriterionResult> {
        let mut results = Vec::with_capacity(5);

        let passed = entity.confidence >= policy.min_confidence;
        results.push(CriterionResult::new(
            CRITERION_CONFIDENCE,
            passed,
            json!(entity.confidence),
            json!(policy.min_confidence),
            format!(
                "confidence {:.2} {} minimum {:.2}",
                entity.confidence,
                if passed { "meets" } else { "below" },
                policy.min_confidence
            ),
        ));

        let passed = entity.observation_count >= policy.min_observations;
        results.push(CriterionResult::new(
            CRITERION_OBSERVATIONS,
            passed,
            json!(entity.observation_count),
            json!(policy.min_observations),
            format!(
                "{} observations, {} required",
                entity.observation_count, policy.min_observations
            ),
        ));

        let span = entity.observed_span_hours();
        let stable = span >= policy.min_stability_hours && entity.contradictions == 0;
        let message = if entity.contradictions > 0 {
            format!("{} recorded contradictions", entity.contradictions)
        } else {
            format!(
                "observed over {:.1}h, {:.1}h required",
                span, policy.min_stability_hours
            )
        };
        results.push(CriterionResult::new(
            CRITERION_STABILITY,
            stable,
            json!({ "span_hours": span, "contradictions": entity.contradictions }),
            json!({ "span_hours": policy.min_stability_hours, "contradictions": 0 }),
            message,
        ));

        let sources = entity.distinct_source_count();
        let (passed, message) = if policy.require_multi_source {
            (
                sources >= self.config.min_sources,
                format!("{} distinct sources, {} required", sources, self.config.min_sources),
            )
        } else {
            (true, "not required".to_string())
        };
        results.push(CriterionResult::new(
            CRITERION_MULTI_SOURCE,
            passed,
            json!(sources),
            json!(if policy.require_multi_source { self.config.min_sources } else { 0 }),
            message,
        ));

        results
    }

    async fn check_ontology(&self, entity: &GraphEntity) -> (CriterionResult, Option<TerminologyMatch>) {
        let required = json!(self.config.min_terminology_confidence);
        if let Some(code) = entity.terminology_codes.first() {
            let matched = TerminologyMatch::from_code(code);
            let result = CriterionResult::new(
                CRITERION_ONTOLOGY,
                true,
                json!(format!("{}:{}", code.coding_system, code.code)),
                required,
                "entity already carries a terminology code",
            );
            return (result, Some(matched));
        }

        match self.terminology.lookup(&entity.name, entity.category).await {
            Ok(matched) => {
                let passed =
                    matched.matched && matched.confidence >= self.config.min_terminology_confidence;
                let message = match (&matched.match_type, &matched.code) {
                    (Some(kind), Some(code)) if passed => format!(
                        "{:?} match {}:{}",
                        kind,
                        matched.coding_system.as_deref().unwrap_or("?"),
                        code
                    ),
                    _ => format!("no terminology match for '{}'", entity.name),
                };
                let result = CriterionResult::new(
                    CRITERION_ONTOLOGY,
                    passed,
                    json!(matched.confidence),
                    required,
                    message,
                );
                (result, Some(matched))
            }
            Err(e) => {
                tracing::warn!(entity_id = %entity.id, error = %e, "terminology lookup failed");
                let result = CriterionResult::new(
                    CRITERION_ONTOLOGY,
                    false,
                    json!(null),
                    required,
                    format!("terminology lookup failed: {}", e),
                );
                (result, Some(TerminologyMatch::none()))
            }
        }
    }

    /// Approve a queued review. Dequeue, audit and statistics happen together.
    pub async fn approve_review(
        &self,
        entity_id: &str,
        reviewer: &str,
        notes: Option<String>,
    ) -> StrataResult<PromotionDecision> {
        self.complete_review(entity_id, reviewer, notes, ReviewVerdict::Approved)
            .await
    }

    /// Reject a queued review.
    pub async fn reject_review(
        &self,
        entity_id: &str,
        reviewer: &str,
        notes: Option<String>,
    ) -> StrataResult<PromotionDecision> {
        self.complete_review(entity_id, reviewer, notes, ReviewVerdict::Rejected)
            .await
    }

    async fn complete_review(
        &self,
        entity_id: &str,
        reviewer: &str,
        notes: Option<String>,
        verdict: ReviewVerdict,
    ) -> StrataResult<PromotionDecision> {
        let mut state = self.state.lock().await;
        let pending = state
            .queue
            .remove(entity_id)
            .ok_or_else(|| StrataError::review_not_found(entity_id))?;

        let now = Utc::now();
        let mut decision = pending.decision;
        decision.status = match verdict {
            ReviewVerdict::Approved => DecisionStatus::Approved,
            ReviewVerdict::Rejected => DecisionStatus::Rejected,
        };
        decision.reviewed_by = Some(reviewer.to_string());
        decision.reviewed_at = Some(now);
        decision.review_notes = notes.clone();

        state.history.push(ReviewAction {
            entity_id: entity_id.to_string(),
            from_layer: decision.from_layer,
            to_layer: decision.to_layer,
            verdict,
            reviewer: reviewer.to_string(),
            notes,
            waited_ms: (now - pending.submitted_at).num_milliseconds(),
            timestamp: now,
        });
        match verdict {
            ReviewVerdict::Approved => state.stats.reviews_approved += 1,
            ReviewVerdict::Rejected => state.stats.reviews_rejected += 1,
        }
        state.stats.queue_depth = state.queue.len();
        drop(state);

        tracing::info!(entity_id, reviewer, verdict = %verdict, "review completed");
        Ok(decision)
    }

    /// Queued reviews, most urgent first, then oldest first.
    pub async fn pending_reviews(&self) -> Vec<PendingReview> {
        let state = self.state.lock().await;
        let mut reviews: Vec<_> = state.queue.values().cloned().collect();
        reviews.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.submitted_at.cmp(&b.submitted_at))
                .then_with(|| a.decision.entity_id.cmp(&b.decision.entity_id))
        });
        reviews
    }

    pub async fn pending_review(&self, entity_id: &str) -> Option<PendingReview> {
        self.state.lock().await.queue.get(entity_id).cloned()
    }

    pub async fn is_pending(&self, entity_id: &str) -> bool {
        self.state.lock().await.queue.contains_key(entity_id)
    }

    pub async fn review_history(&self) -> Vec<ReviewAction> {
        self.state.lock().await.history.clone()
    }

    pub async fn statistics(&self) -> GateStatistics {
        self.state.lock().await.stats.clone()
    }
}
