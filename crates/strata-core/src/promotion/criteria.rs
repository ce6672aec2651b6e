//! Per-step promotion criteria and gate configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{StrataError, StrataResult};
use crate::types::TransitionStep;

/// Eligibility thresholds for one transition step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PromotionCriteria {
    pub min_confidence: f64,
    pub min_observations: u32,
    /// Minimum span between first and last observation, in hours.
    pub min_stability_hours: f64,
    pub require_multi_source: bool,
    pub require_ontology_match: bool,
    pub high_risk_requires_review: bool,
}

impl PromotionCriteria {
    pub const PERCEPTION_TO_SEMANTIC: Self = Self {
        min_confidence: 0.5,
        min_observations: 1,
        min_stability_hours: 0.0,
        require_multi_source: false,
        require_ontology_match: true,
        high_risk_requires_review: true,
    };

    pub const SEMANTIC_TO_REASONING: Self = Self {
        min_confidence: 0.7,
        min_observations: 3,
        min_stability_hours: 24.0,
        require_multi_source: true,
        require_ontology_match: true,
        high_risk_requires_review: true,
    };

    pub const REASONING_TO_APPLICATION: Self = Self {
        min_confidence: 0.8,
        min_observations: 5,
        min_stability_hours: 72.0,
        require_multi_source: true,
        require_ontology_match: true,
        high_risk_requires_review: true,
    };

    fn validate(&self, label: &str) -> StrataResult<()> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(StrataError::Configuration(format!(
                "{} min_confidence {} outside [0, 1]",
                label, self.min_confidence
            )));
        }
        if !self.min_stability_hours.is_finite() || self.min_stability_hours < 0.0 {
            return Err(StrataError::Configuration(format!(
                "{} min_stability_hours must be a non-negative number",
                label
            )));
        }
        Ok(())
    }
}

/// Promotion gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Criteria keyed by transition step.
    pub criteria: HashMap<TransitionStep, PromotionCriteria>,
    /// Used for any step missing from `criteria`.
    pub fallback_criteria: PromotionCriteria,
    /// Distinct sources needed when a step requires multi-source evidence.
    pub min_sources: usize,
    /// Let high-risk entities leave PERCEPTION without human review.
    pub exempt_first_promotion_from_review: bool,
    /// Terminology matches below this confidence do not satisfy the ontology criterion.
    pub min_terminology_confidence: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        let criteria = HashMap::from([
            (
                TransitionStep::PerceptionToSemantic,
                PromotionCriteria::PERCEPTION_TO_SEMANTIC,
            ),
            (
                TransitionStep::SemanticToReasoning,
                PromotionCriteria::SEMANTIC_TO_REASONING,
            ),
            (
                TransitionStep::ReasoningToApplication,
                PromotionCriteria::REASONING_TO_APPLICATION,
            ),
        ]);
        Self {
            criteria,
            fallback_criteria: PromotionCriteria::REASONING_TO_APPLICATION,
            min_sources: 3,
            exempt_first_promotion_from_review: true,
            min_terminology_confidence: 0.3,
        }
    }
}

impl GateConfig {
    /// Criteria for a step, falling back to `fallback_criteria`.
    pub fn criteria_for(&self, step: TransitionStep) -> &PromotionCriteria {
        self.criteria.get(&step).unwrap_or(&self.fallback_criteria)
    }

    pub fn with_criteria(mut self, step: TransitionStep, criteria: PromotionCriteria) -> Self {
        self.criteria.insert(step, criteria);
        self
    }

    pub fn validate(&self) -> StrataResult<()> {
        for (step, criteria) in &self.criteria {
            criteria.validate(&step.to_string())?;
        }
        self.fallback_criteria.validate("fallback")?;
        if self.min_sources == 0 {
            return Err(StrataError::Configuration(
                "min_sources must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_terminology_confidence) {
            return Err(StrataError::Configuration(format!(
                "min_terminology_confidence {} outside [0, 1]",
                self.min_terminology_confidence
            )));
        }
        Ok(())
    }
}
