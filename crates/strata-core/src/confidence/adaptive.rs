//! Per-operation neural/symbolic blending weights learned from feedback.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::Confidence;
use crate::error::{StrataError, StrataResult};

/// Configuration for alpha learning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlphaConfig {
    /// Alpha used before any feedback arrives (default: 0.5).
    pub default_alpha: f64,
    /// Maximum change applied per update (default: 0.05).
    pub learning_rate: f64,
    /// Samples required before alpha moves at all (default: 10).
    pub min_samples: usize,
    /// Most recent samples considered per update (default: 20).
    pub evaluation_window: usize,
    /// Samples retained per operation type (default: 100).
    pub history_limit: usize,
    /// Lower bound for alpha (default: 0.05).
    pub min_alpha: f64,
    /// Upper bound for alpha (default: 0.95).
    pub max_alpha: f64,
}

impl Default for AlphaConfig {
    fn default() -> Self {
        Self {
            default_alpha: 0.5,
            learning_rate: 0.05,
            min_samples: 10,
            evaluation_window: 20,
            history_limit: 100,
            min_alpha: 0.05,
            max_alpha: 0.95,
        }
    }
}

impl AlphaConfig {
    pub fn validate(&self) -> StrataResult<()> {
        let bounded = 0.0 <= self.min_alpha
            && self.min_alpha <= self.max_alpha
            && self.max_alpha <= 1.0;
        if !bounded {
            return Err(StrataError::Configuration(format!(
                "alpha bounds [{}, {}] must lie within [0, 1]",
                self.min_alpha, self.max_alpha
            )));
        }
        if !(self.min_alpha..=self.max_alpha).contains(&self.default_alpha) {
            return Err(StrataError::Configuration(format!(
                "default_alpha {} outside [{}, {}]",
                self.default_alpha, self.min_alpha, self.max_alpha
            )));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(StrataError::Configuration(format!(
                "learning_rate {} must be in (0, 1]",
                self.learning_rate
            )));
        }
        if self.evaluation_window == 0 || self.history_limit < self.evaluation_window {
            return Err(StrataError::Configuration(
                "history_limit must cover a non-empty evaluation_window".to_string(),
            ));
        }
        Ok(())
    }
}

/// One observed outcome of a blended decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackSample {
    pub neural_score: f64,
    pub symbolic_score: f64,
    pub combined_score: f64,
    pub alpha: f64,
    pub success: bool,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct AlphaState {
    alphas: HashMap<String, f64>,
    history: HashMap<String, VecDeque<FeedbackSample>>,
}

/// Registry of learned alphas, keyed by operation type.
///
/// Owned by the engine and shared by reference; there is no global instance.
#[derive(Debug)]
pub struct AdaptiveAlpha {
    config: AlphaConfig,
    state: Mutex<AlphaState>,
}

impl AdaptiveAlpha {
    pub fn new(config: AlphaConfig) -> Self {
        Self {
            config,
            state: Mutex::new(AlphaState::default()),
        }
    }

    pub fn config(&self) -> &AlphaConfig {
        &self.config
    }

    fn lock(&self) -> StrataResult<std::sync::MutexGuard<'_, AlphaState>> {
        self.state
            .lock()
            .map_err(|e| StrataError::Internal(e.to_string()))
    }

    /// Current alpha for an operation type.
    pub fn alpha_for(&self, operation: &str) -> StrataResult<f64> {
        let state = self.lock()?;
        Ok(state
            .alphas
            .get(operation)
            .copied()
            .unwrap_or(self.config.default_alpha))
    }

    /// Number of feedback samples retained for an operation type.
    pub fn history_len(&self, operation: &str) -> StrataResult<usize> {
        let state = self.lock()?;
        Ok(state.history.get(operation).map_or(0, VecDeque::len))
    }

    /// Blend using the learned alpha for `operation`.
    pub fn combine_with_rule_adaptive(
        &self,
        operation: &str,
        neural: &Confidence,
        symbolic: &Confidence,
    ) -> StrataResult<Confidence> {
        let alpha = self.alpha_for(operation)?;
        Ok(Confidence::combine_with_rule(neural, symbolic, alpha)?
            .with_property("operation", serde_json::json!(operation)))
    }

    /// Record whether a blended decision turned out right, and update alpha.
    ///
    /// Returns the alpha in effect after the update.
    pub fn record_feedback(
        &self,
        operation: &str,
        neural_score: f64,
        symbolic_score: f64,
        success: bool,
    ) -> StrataResult<f64> {
        for (name, value) in [("neural_score", neural_score), ("symbolic_score", symbolic_score)] {
            if value.is_nan() || !(0.0..=1.0).contains(&value) {
                return Err(StrataError::out_of_range(name, value, "[0, 1]"));
            }
        }

        let mut state = self.lock()?;
        let alpha = state
            .alphas
            .get(operation)
            .copied()
            .unwrap_or(self.config.default_alpha);

        let history = state.history.entry(operation.to_string()).or_default();
        history.push_back(FeedbackSample {
            neural_score,
            symbolic_score,
            combined_score: alpha * neural_score + (1.0 - alpha) * symbolic_score,
            alpha,
            success,
            recorded_at: Utc::now(),
        });
        while history.len() > self.config.history_limit {
            history.pop_front();
        }

        if history.len() < self.config.min_samples {
            return Ok(alpha);
        }

        let window: Vec<&FeedbackSample> = history
            .iter()
            .rev()
            .take(self.config.evaluation_window.max(1))
            .collect();
        let step = self.direction(&window) * self.config.learning_rate;
        let updated = (alpha + step).clamp(self.config.min_alpha, self.config.max_alpha);

        if (updated - alpha).abs() > f64::EPSILON {
            tracing::debug!(operation, from = alpha, to = updated, "alpha updated");
        }
        state.alphas.insert(operation.to_string(), updated);
        Ok(updated)
    }

    /// +1 to lean on the neural side, -1 for the symbolic side, 0 to hold.
    fn direction(&self, window: &[&FeedbackSample]) -> f64 {
        let (successes, failures): (Vec<&FeedbackSample>, Vec<&FeedbackSample>) =
            window.iter().partition(|s| s.success);

        if failures.is_empty() {
            return 1.0;
        }
        if successes.is_empty() {
            return -1.0;
        }

        let mean = |samples: &[&FeedbackSample]| {
            samples.iter().map(|s| s.combined_score).sum::<f64>() / samples.len() as f64
        };
        let success_mean = mean(&successes);
        let failure_mean = mean(&failures);

        if success_mean > failure_mean {
            1.0
        } else if success_mean < failure_mean {
            -1.0
        } else {
            0.0
        }
    }

    /// Forget learned alpha and history for one operation type.
    pub fn reset(&self, operation: &str) -> StrataResult<()> {
        let mut state = self.lock()?;
        state.alphas.remove(operation);
        state.history.remove(operation);
        Ok(())
    }
}

impl Default for AdaptiveAlpha {
    fn default() -> Self {
        Self::new(AlphaConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::ConfidenceSource;

    #[test]
    fn test_alpha_holds_until_min_samples() {
        let registry = AdaptiveAlpha::default();
        for _ in 0..9 {
            let alpha = registry.record_feedback("diagnosis", 0.9, 0.4, true).unwrap();
            assert!((alpha - 0.5).abs() < 1e-12);
        }
        let alpha = registry.record_feedback("diagnosis", 0.9, 0.4, true).unwrap();
        assert!((alpha - 0.55).abs() < 1e-12);
    }

    #[test]
    fn test_all_failures_move_alpha_down() {
        let registry = AdaptiveAlpha::default();
        for _ in 0..10 {
            registry.record_feedback("link", 0.8, 0.3, false).unwrap();
        }
        assert!((registry.alpha_for("link").unwrap() - 0.45).abs() < 1e-12);
    }

    #[test]
    fn test_steps_are_bounded_and_clamped() {
        let registry = AdaptiveAlpha::default();
        let mut previous = registry.alpha_for("op").unwrap();
        for _ in 0..200 {
            let alpha = registry.record_feedback("op", 0.7, 0.6, true).unwrap();
            assert!(alpha - previous <= 0.05 + 1e-12);
            assert!(alpha <= 0.95);
            previous = alpha;
        }
        assert!((previous - 0.95).abs() < 1e-12);
        assert_eq!(registry.history_len("op").unwrap(), 100);
    }

    #[test]
    fn test_mixed_results_follow_higher_confidence_class() {
        let registry = AdaptiveAlpha::default();
        // Confident blends succeed, weak ones fail.
        for i in 0..12 {
            let success = i % 2 == 0;
            let score = if success { 0.9 } else { 0.2 };
            registry.record_feedback("mixed", score, score, success).unwrap();
        }
        assert!(registry.alpha_for("mixed").unwrap() > 0.5);

        let inverted = AdaptiveAlpha::default();
        for i in 0..12 {
            let success = i % 2 == 0;
            let score = if success { 0.2 } else { 0.9 };
            inverted.record_feedback("mixed", score, score, success).unwrap();
        }
        assert!(inverted.alpha_for("mixed").unwrap() < 0.5);
    }

    #[test]
    fn test_operation_types_are_independent() {
        let registry = AdaptiveAlpha::default();
        for _ in 0..10 {
            registry.record_feedback("a", 0.9, 0.1, true).unwrap();
        }
        assert!(registry.alpha_for("a").unwrap() > 0.5);
        assert!((registry.alpha_for("b").unwrap() - 0.5).abs() < 1e-12);

        registry.reset("a").unwrap();
        assert!((registry.alpha_for("a").unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_adaptive_blend_uses_learned_alpha() {
        let registry = AdaptiveAlpha::default();
        let neural = Confidence::new(1.0, ConfidenceSource::NeuralModel).unwrap();
        let symbolic = Confidence::new(0.0, ConfidenceSource::SymbolicRule).unwrap();
        let blended = registry
            .combine_with_rule_adaptive("fresh", &neural, &symbolic)
            .unwrap();
        assert!((blended.score() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_feedback_rejects_out_of_range_scores() {
        let registry = AdaptiveAlpha::default();
        assert!(registry.record_feedback("op", 1.5, 0.5, true).is_err());
    }
}
