//! Layer-aware confidence weighting, cross-layer aggregation and conflict resolution.
//!
//! Higher layers are trusted more because their content has been validated by
//! rules or by queries. Moving data *down* the hierarchy costs more confidence
//! than moving it up.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::{CombinationStrategy, Confidence};
use crate::error::{StrataError, StrataResult};
use crate::types::KnowledgeLayer;

/// Decay factors by number of layers crossed in one direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionalDecay {
    pub one_step: f64,
    pub two_steps: f64,
    pub three_steps: f64,
}

impl DirectionalDecay {
    fn factor(&self, steps: u8) -> f64 {
        match steps {
            0 => 1.0,
            1 => self.one_step,
            2 => self.two_steps,
            _ => self.three_steps,
        }
    }

    fn values(&self) -> [f64; 3] {
        [self.one_step, self.two_steps, self.three_steps]
    }
}

/// Configuration for the cross-layer propagator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationConfig {
    /// Trust weight per layer. Layers missing from the table use `default_layer_weight`.
    pub layer_weights: HashMap<KnowledgeLayer, f64>,
    /// Fallback trust weight (default: 0.6).
    pub default_layer_weight: f64,
    /// Floor applied by `adjust_for_layer` (default: 0.1).
    pub min_adjusted_confidence: f64,
    /// Raw score gap above which evidence beats layer precedence (default: 0.3).
    pub conflict_threshold: f64,
    /// Max-min spread that flags review (default: 0.5).
    pub review_gap_threshold: f64,
    /// Lower-over-higher excess that flags review (default: 0.2).
    pub inversion_threshold: f64,
    /// Decay when data moves to a higher layer.
    pub upward_decay: DirectionalDecay,
    /// Decay when a higher layer consumes lower-layer data.
    pub downward_decay: DirectionalDecay,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        let layer_weights = HashMap::from([
            (KnowledgeLayer::Application, 1.0),
            (KnowledgeLayer::Reasoning, 0.9),
            (KnowledgeLayer::Semantic, 0.8),
            (KnowledgeLayer::Perception, 0.6),
        ]);
        Self {
            layer_weights,
            default_layer_weight: 0.6,
            min_adjusted_confidence: 0.1,
            conflict_threshold: 0.3,
            review_gap_threshold: 0.5,
            inversion_threshold: 0.2,
            upward_decay: DirectionalDecay {
                one_step: 0.98,
                two_steps: 0.95,
                three_steps: 0.92,
            },
            downward_decay: DirectionalDecay {
                one_step: 0.95,
                two_steps: 0.90,
                three_steps: 0.85,
            },
        }
    }
}

impl PropagationConfig {
    /// Check that every weight, threshold and decay factor is usable.
    pub fn validate(&self) -> StrataResult<()> {
        for (layer, weight) in &self.layer_weights {
            if !(0.0..=1.0).contains(weight) {
                return Err(StrataError::Configuration(format!(
                    "layer weight for {} must be in [0, 1], got {}",
                    layer, weight
                )));
            }
        }
        for (name, value) in [
            ("default_layer_weight", self.default_layer_weight),
            ("min_adjusted_confidence", self.min_adjusted_confidence),
            ("conflict_threshold", self.conflict_threshold),
            ("review_gap_threshold", self.review_gap_threshold),
            ("inversion_threshold", self.inversion_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(StrataError::Configuration(format!(
                    "{} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }
        for factor in self
            .upward_decay
            .values()
            .into_iter()
            .chain(self.downward_decay.values())
        {
            if factor <= 0.0 || factor > 1.0 {
                return Err(StrataError::Configuration(format!(
                    "cross-layer decay factors must be in (0, 1], got {}",
                    factor
                )));
            }
        }
        Ok(())
    }
}

/// Which rule decided a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionRule {
    /// Raw scores differed by more than the conflict threshold.
    EvidenceGap,
    /// Scores were close; the structurally higher layer won.
    LayerPrecedence,
}

/// Outcome of [`CrossLayerPropagator::resolve_conflict`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub winner_layer: KnowledgeLayer,
    pub loser_layer: KnowledgeLayer,
    /// Winning confidence; its evidence trail records the losing value.
    pub confidence: Confidence,
    pub adjusted_winner: f64,
    pub adjusted_loser: f64,
    /// Absolute difference of the raw scores.
    pub gap: f64,
    pub rule: ResolutionRule,
}

/// Result of the review heuristic with the reasons that triggered it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewAdvice {
    pub flagged: bool,
    pub reasons: Vec<String>,
}

/// Applies layer trust weights and cross-layer decay.
#[derive(Debug, Clone, Default)]
pub struct CrossLayerPropagator {
    config: PropagationConfig,
}

impl CrossLayerPropagator {
    pub fn new(config: PropagationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PropagationConfig {
        &self.config
    }

    /// Trust weight for a layer.
    pub fn layer_weight(&self, layer: KnowledgeLayer) -> f64 {
        self.config
            .layer_weights
            .get(&layer)
            .copied()
            .unwrap_or(self.config.default_layer_weight)
    }

    fn adjusted_score(&self, layer: KnowledgeLayer, score: f64) -> f64 {
        (score * self.layer_weight(layer))
            .max(self.config.min_adjusted_confidence)
            .min(1.0)
    }

    /// Scale a confidence by its layer's trust weight, floored at the configured minimum.
    pub fn adjust_for_layer(&self, confidence: &Confidence, layer: KnowledgeLayer) -> Confidence {
        let score = self.adjusted_score(layer, confidence.score());
        confidence
            .rescored(score, "adjust_for_layer")
            .with_evidence(format!(
                "{} trust weight {:.2}",
                layer,
                self.layer_weight(layer)
            ))
    }

    /// Aggregate per-layer confidences into one system-level value.
    ///
    /// With `WeightedAverage` each layer contributes in proportion to its trust weight.
    pub fn propagate_cross_layer(
        &self,
        per_layer: &BTreeMap<KnowledgeLayer, Confidence>,
        strategy: CombinationStrategy,
    ) -> StrataResult<Confidence> {
        let values: Vec<Confidence> = per_layer.values().cloned().collect();
        let weights: Option<Vec<f64>> = (strategy == CombinationStrategy::WeightedAverage)
            .then(|| per_layer.keys().map(|l| self.layer_weight(*l)).collect());

        Confidence::combine(&values, strategy, weights.as_deref())
            .map(|c| c.generated_by(format!("cross_layer:{}", strategy)))
    }

    /// Decay factor for moving a value from one layer to another.
    pub fn traversal_factor(&self, from: KnowledgeLayer, to: KnowledgeLayer) -> f64 {
        let distance = from.distance_to(to);
        let steps = distance.unsigned_abs();
        if distance >= 0 {
            self.config.upward_decay.factor(steps)
        } else {
            self.config.downward_decay.factor(steps)
        }
    }

    /// Carry a confidence from one layer to another, applying directional decay.
    pub fn propagate_through_layers(
        &self,
        confidence: &Confidence,
        from: KnowledgeLayer,
        to: KnowledgeLayer,
    ) -> StrataResult<Confidence> {
        let factor = self.traversal_factor(from, to);
        Ok(confidence
            .decay(factor)?
            .with_evidence(format!("traversed {} -> {}", from, to)))
    }

    /// Decide between two conflicting values from different layers.
    ///
    /// A raw gap above `conflict_threshold` means the evidence is decisive and
    /// the higher raw score wins whatever its layer. Otherwise the higher layer
    /// wins (ties on layer go to the higher score). The loser is kept in the
    /// winner's evidence trail.
    pub fn resolve_conflict(
        &self,
        layer_a: KnowledgeLayer,
        conf_a: &Confidence,
        layer_b: KnowledgeLayer,
        conf_b: &Confidence,
    ) -> ConflictResolution {
        let adjusted_a = self.adjusted_score(layer_a, conf_a.score());
        let adjusted_b = self.adjusted_score(layer_b, conf_b.score());
        let gap = (conf_a.score() - conf_b.score()).abs();

        let (rule, a_wins) = if gap > self.config.conflict_threshold {
            (ResolutionRule::EvidenceGap, conf_a.score() >= conf_b.score())
        } else if layer_a != layer_b {
            (ResolutionRule::LayerPrecedence, layer_a > layer_b)
        } else {
            (ResolutionRule::LayerPrecedence, adjusted_a >= adjusted_b)
        };

        let ((winner_layer, winner, adjusted_winner), (loser_layer, loser, adjusted_loser)) =
            if a_wins {
                ((layer_a, conf_a, adjusted_a), (layer_b, conf_b, adjusted_b))
            } else {
                ((layer_b, conf_b, adjusted_b), (layer_a, conf_a, adjusted_a))
            };

        let confidence = winner
            .clone()
            .with_evidence(format!(
                "conflict with {} value {:.3} resolved by {:?}",
                loser_layer,
                loser.score(),
                rule
            ))
            .with_property(
                "overridden",
                serde_json::json!({
                    "layer": loser_layer,
                    "score": loser.score(),
                    "evidence": loser.evidence(),
                }),
            );

        tracing::debug!(
            winner = %winner_layer,
            loser = %loser_layer,
            gap,
            ?rule,
            "cross-layer conflict resolved"
        );

        ConflictResolution {
            winner_layer,
            loser_layer,
            confidence,
            adjusted_winner,
            adjusted_loser,
            gap,
            rule,
        }
    }

    /// Advisory check for inconsistent per-layer values.
    pub fn review_advice(&self, per_layer: &BTreeMap<KnowledgeLayer, Confidence>) -> ReviewAdvice {
        let mut advice = ReviewAdvice::default();
        if per_layer.len() < 2 {
            return advice;
        }

        let scores: Vec<(KnowledgeLayer, f64)> =
            per_layer.iter().map(|(l, c)| (*l, c.score())).collect();
        let max = scores.iter().map(|(_, s)| *s).fold(f64::NEG_INFINITY, f64::max);
        let min = scores.iter().map(|(_, s)| *s).fold(f64::INFINITY, f64::min);

        if max - min > self.config.review_gap_threshold {
            advice.reasons.push(format!(
                "confidence spread {:.3} exceeds {:.3}",
                max - min,
                self.config.review_gap_threshold
            ));
        }

        for (i, (lower, lower_score)) in scores.iter().enumerate() {
            for (higher, higher_score) in &scores[i + 1..] {
                if lower_score - higher_score > self.config.inversion_threshold {
                    advice.reasons.push(format!(
                        "{} ({:.3}) exceeds {} ({:.3})",
                        lower, lower_score, higher, higher_score
                    ));
                }
            }
        }

        advice.flagged = !advice.reasons.is_empty();
        advice
    }

    /// Whether per-layer values disagree enough to warrant a human look.
    pub fn needs_human_review(&self, per_layer: &BTreeMap<KnowledgeLayer, Confidence>) -> bool {
        self.review_advice(per_layer).flagged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::ConfidenceSource;
    use KnowledgeLayer::*;

    fn conf(score: f64) -> Confidence {
        Confidence::new(score, ConfidenceSource::Validation).unwrap()
    }

    #[test]
    fn test_adjust_for_layer_applies_weight_and_floor() {
        let propagator = CrossLayerPropagator::default();
        let adjusted = propagator.adjust_for_layer(&conf(0.5), Perception);
        assert!((adjusted.score() - 0.3).abs() < 1e-12);

        let floored = propagator.adjust_for_layer(&conf(0.05), Perception);
        assert!((floored.score() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_cross_layer_weighted_average_uses_trust() {
        let propagator = CrossLayerPropagator::default();
        let map = BTreeMap::from([(Perception, conf(1.0)), (Application, conf(0.0))]);
        let combined = propagator
            .propagate_cross_layer(&map, CombinationStrategy::WeightedAverage)
            .unwrap();
        // 0.6 / (0.6 + 1.0)
        assert!((combined.score() - 0.375).abs() < 1e-12);

        let empty = BTreeMap::new();
        assert!(propagator
            .propagate_cross_layer(&empty, CombinationStrategy::Max)
            .is_err());
    }

    #[test]
    fn test_downward_traversal_costs_more_than_upward() {
        let propagator = CrossLayerPropagator::default();
        for (low, high) in [(Perception, Semantic), (Perception, Application), (Semantic, Application)] {
            let up = propagator.traversal_factor(low, high);
            let down = propagator.traversal_factor(high, low);
            assert!(down < up, "{} <-> {}", low, high);
        }
        assert_eq!(propagator.traversal_factor(Reasoning, Reasoning), 1.0);

        let moved = propagator
            .propagate_through_layers(&conf(1.0), Semantic, Reasoning)
            .unwrap();
        assert!((moved.score() - 0.98).abs() < 1e-12);
    }

    #[test]
    fn test_large_gap_lets_raw_evidence_win() {
        let propagator = CrossLayerPropagator::default();
        let resolution =
            propagator.resolve_conflict(Perception, &conf(0.95), Application, &conf(0.40));

        assert_eq!(resolution.rule, ResolutionRule::EvidenceGap);
        assert_eq!(resolution.winner_layer, Perception);
        assert!((resolution.confidence.score() - 0.95).abs() < 1e-12);
        assert!((resolution.gap - 0.55).abs() < 1e-9);
        assert!(resolution.confidence.properties().contains_key("overridden"));
        assert!(resolution
            .confidence
            .evidence()
            .iter()
            .any(|e| e.contains("APPLICATION")));

        let map = BTreeMap::from([(Perception, conf(0.95)), (Application, conf(0.40))]);
        assert!(propagator.needs_human_review(&map));
    }

    #[test]
    fn test_small_gap_prefers_higher_layer() {
        let propagator = CrossLayerPropagator::default();
        let resolution =
            propagator.resolve_conflict(Perception, &conf(0.80), Reasoning, &conf(0.65));
        assert_eq!(resolution.rule, ResolutionRule::LayerPrecedence);
        assert_eq!(resolution.winner_layer, Reasoning);
        assert_eq!(resolution.loser_layer, Perception);
    }

    #[test]
    fn test_review_heuristic() {
        let propagator = CrossLayerPropagator::default();

        let consistent = BTreeMap::from([(Perception, conf(0.6)), (Semantic, conf(0.7))]);
        assert!(!propagator.needs_human_review(&consistent));

        let inverted = BTreeMap::from([(Semantic, conf(0.9)), (Reasoning, conf(0.65))]);
        let advice = propagator.review_advice(&inverted);
        assert!(advice.flagged);
        assert_eq!(advice.reasons.len(), 1);

        let single = BTreeMap::from([(Perception, conf(0.1))]);
        assert!(!propagator.needs_human_review(&single));
    }

    #[test]
    fn test_config_validation() {
        assert!(PropagationConfig::default().validate().is_ok());
        let mut bad = PropagationConfig::default();
        bad.downward_decay.one_step = 0.0;
        assert!(bad.validate().is_err());
    }
}
