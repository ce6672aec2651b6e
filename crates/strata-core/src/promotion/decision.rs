//! Promotion decisions, pending reviews and review audit entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::{Display, EnumString};

use crate::traits::TerminologyMatch;
use crate::types::{EntityCategory, GraphEntity, KnowledgeLayer, RiskLevel, TransitionStep};

/// Outcome of a gate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Approved,
    Rejected,
    PendingReview,
}

/// Result of one criterion check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionResult {
    pub name: String,
    pub passed: bool,
    pub actual: serde_json::Value,
    pub required: serde_json::Value,
    pub message: String,
}

impl CriterionResult {
    pub fn new(
        name: impl Into<String>,
        passed: bool,
        actual: serde_json::Value,
        required: serde_json::Value,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            passed,
            actual,
            required,
            message: message.into(),
        }
    }
}

/// A gate decision.
///
/// Only the status and reviewer fields change after the decision is made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionDecision {
    pub entity_id: String,
    pub entity_name: String,
    /// `None` when the entity could not be found.
    pub category: Option<EntityCategory>,
    pub from_layer: Option<KnowledgeLayer>,
    pub to_layer: KnowledgeLayer,
    pub status: DecisionStatus,
    pub risk_level: RiskLevel,
    pub criteria: Vec<CriterionResult>,
    /// Human-readable summary of the outcome.
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_snapshot: Option<GraphEntity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminology: Option<TerminologyMatch>,
    pub evaluated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_notes: Option<String>,
}

impl PromotionDecision {
    pub fn is_approved(&self) -> bool {
        self.status == DecisionStatus::Approved
    }

    pub fn is_pending(&self) -> bool {
        self.status == DecisionStatus::PendingReview
    }

    pub fn step(&self) -> Option<TransitionStep> {
        self.from_layer
            .and_then(|from| TransitionStep::between(from, self.to_layer))
    }

    /// Names of the criteria that failed.
    pub fn failed_criteria(&self) -> Vec<&str> {
        self.criteria
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn criterion(&self, name: &str) -> Option<&CriterionResult> {
        self.criteria.iter().find(|c| c.name == name)
    }
}

/// Review urgency. Sorts most urgent first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReviewPriority {
    Urgent,
    High,
    Normal,
    Low,
}

impl ReviewPriority {
    /// Risky entities with shaky confidence are reviewed first.
    pub fn derive(risk: RiskLevel, confidence: f64) -> Self {
        match risk {
            RiskLevel::High if confidence < 0.8 => Self::Urgent,
            RiskLevel::High => Self::High,
            RiskLevel::Medium => Self::Normal,
            RiskLevel::Low => Self::Low,
        }
    }
}

/// A decision waiting for a human reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingReview {
    pub decision: PromotionDecision,
    pub priority: ReviewPriority,
    pub submitted_at: DateTime<Utc>,
}

/// Reviewer verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    Approved,
    Rejected,
}

/// Append-only audit entry for a completed review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewAction {
    pub entity_id: String,
    pub from_layer: Option<KnowledgeLayer>,
    pub to_layer: KnowledgeLayer,
    pub verdict: ReviewVerdict,
    pub reviewer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Time the entity spent in the queue.
    pub waited_ms: i64,
    pub timestamp: DateTime<Utc>,
}

/// Decision counters for one transition step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCounts {
    pub approved: u64,
    pub rejected: u64,
    pub pending_review: u64,
}

/// Running gate statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateStatistics {
    pub evaluations: u64,
    pub approved: u64,
    pub rejected: u64,
    pub pending_review: u64,
    pub reviews_approved: u64,
    pub reviews_rejected: u64,
    /// Entries currently in the review queue.
    pub queue_depth: usize,
    pub per_step: HashMap<TransitionStep, StepCounts>,
}

impl GateStatistics {
    pub(crate) fn record(&mut self, step: Option<TransitionStep>, status: DecisionStatus) {
        self.evaluations += 1;
        let counts = step.map(|s| self.per_step.entry(s).or_default());
        match status {
            DecisionStatus::Approved => {
                self.approved += 1;
                if let Some(c) = counts {
                    c.approved += 1;
                }
            }
            DecisionStatus::Rejected => {
                self.rejected += 1;
                if let Some(c) = counts {
                    c.rejected += 1;
                }
            }
            DecisionStatus::PendingReview => {
                self.pending_review += 1;
                if let Some(c) = counts {
                    c.pending_review += 1;
                }
            }
        }
    }

    /// Share of evaluations approved outright.
    pub fn approval_rate(&self) -> f64 {
        if self.evaluations == 0 {
            0.0
        } else {
            self.approved as f64 / self.evaluations as f64
        }
    }
}
