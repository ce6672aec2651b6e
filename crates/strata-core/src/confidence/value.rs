//! Immutable confidence values and the operations that derive new ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{StrataError, StrataResult};

/// Where a confidence value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceSource {
    SymbolicRule,
    NeuralModel,
    Hybrid,
    UserInput,
    Validation,
    Heuristic,
}

/// Kind of uncertainty the score expresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UncertaintyType {
    /// Lack of knowledge; reducible with more evidence.
    Epistemic,
    /// Inherent randomness; not reducible.
    Aleatoric,
    Mixed,
}

/// Aggregation strategy for [`Confidence::combine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CombinationStrategy {
    /// Weakest input wins.
    Min,
    /// Strongest input wins.
    Max,
    Average,
    /// Weights are normalised to sum 1; omitted weights mean equal weights.
    #[default]
    WeightedAverage,
    /// Assumes independent inputs.
    Product,
    /// 1 - prod(1 - p): any single cause is enough to trigger the effect.
    NoisyOr,
}

impl fmt::Display for CombinationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Min => "min",
            Self::Max => "max",
            Self::Average => "average",
            Self::WeightedAverage => "weighted_average",
            Self::Product => "product",
            Self::NoisyOr => "noisy_or",
        };
        write!(f, "{}", s)
    }
}

/// Who produced a confidence value and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub generator: String,
    pub timestamp: DateTime<Utc>,
}

impl Provenance {
    pub fn new(generator: impl Into<String>) -> Self {
        Self {
            generator: generator.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A belief score in [0, 1] with its source, uncertainty type and evidence.
///
/// Values are immutable: every operation returns a new instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    #[serde(deserialize_with = "deserialize_score")]
    score: f64,
    source: ConfidenceSource,
    uncertainty: UncertaintyType,
    provenance: Provenance,
    #[serde(default)]
    evidence: Vec<String>,
    #[serde(default)]
    properties: HashMap<String, serde_json::Value>,
}

fn deserialize_score<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let score = f64::deserialize(deserializer)?;
    if !(0.0..=1.0).contains(&score) {
        return Err(serde::de::Error::custom(format!(
            "confidence score {} is outside [0, 1]",
            score
        )));
    }
    Ok(score)
}

fn check_unit(name: &str, value: f64) -> StrataResult<f64> {
    if value.is_nan() || !(0.0..=1.0).contains(&value) {
        return Err(StrataError::out_of_range(name, value, "[0, 1]"));
    }
    Ok(value)
}

impl Confidence {
    /// Create a confidence value. Fails if `score` is outside [0, 1].
    pub fn new(score: f64, source: ConfidenceSource) -> StrataResult<Self> {
        Ok(Self {
            score: check_unit("score", score)?,
            source,
            uncertainty: UncertaintyType::Epistemic,
            provenance: Provenance::new(source_generator(source)),
            evidence: Vec::new(),
            properties: HashMap::new(),
        })
    }

    /// Builder: set uncertainty type.
    pub fn with_uncertainty(mut self, uncertainty: UncertaintyType) -> Self {
        self.uncertainty = uncertainty;
        self
    }

    /// Builder: append an evidence entry.
    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence.push(evidence.into());
        self
    }

    /// Builder: set a free-form property.
    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Builder: record which component generated the value.
    pub fn generated_by(mut self, generator: impl Into<String>) -> Self {
        self.provenance = Provenance::new(generator);
        self
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn source(&self) -> ConfidenceSource {
        self.source
    }

    pub fn uncertainty(&self) -> UncertaintyType {
        self.uncertainty
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn evidence(&self) -> &[String] {
        &self.evidence
    }

    pub fn properties(&self) -> &HashMap<String, serde_json::Value> {
        &self.properties
    }

    /// Score at or above 0.8.
    pub fn is_high(&self) -> bool {
        self.score >= 0.8
    }

    /// Score below 0.4.
    pub fn is_low(&self) -> bool {
        self.score < 0.4
    }

    /// Copy of `self` with a different score (clamped to [0, 1]).
    pub(crate) fn rescored(&self, score: f64, generator: &str) -> Self {
        let mut next = self.clone();
        next.score = score.clamp(0.0, 1.0);
        next.provenance = Provenance::new(generator);
        next
    }

    /// Multiply the score by `factor`, which must be in (0, 1].
    pub fn decay(&self, factor: f64) -> StrataResult<Self> {
        if factor.is_nan() || factor <= 0.0 || factor > 1.0 {
            return Err(StrataError::out_of_range("decay factor", factor, "(0, 1]"));
        }
        Ok(self
            .rescored(self.score * factor, "decay")
            .with_evidence(format!("decayed by {:.3}", factor)))
    }

    /// Aggregate several values into one.
    ///
    /// Weights only matter for [`CombinationStrategy::WeightedAverage`], but are
    /// validated whenever they are passed: one finite, non-negative weight per
    /// input with a positive sum.
    pub fn combine(
        values: &[Confidence],
        strategy: CombinationStrategy,
        weights: Option<&[f64]>,
    ) -> StrataResult<Self> {
        if values.is_empty() {
            return Err(StrataError::empty_input("confidence list"));
        }

        let normalized = match weights {
            Some(w) => Some(normalize_weights(w, values.len())?),
            None => None,
        };

        let scores: Vec<f64> = values.iter().map(|c| c.score).collect();
        let n = scores.len() as f64;

        let score = match strategy {
            CombinationStrategy::Min => scores.iter().copied().fold(f64::INFINITY, f64::min),
            CombinationStrategy::Max => scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            CombinationStrategy::Average => scores.iter().sum::<f64>() / n,
            CombinationStrategy::WeightedAverage => match &normalized {
                Some(w) => scores.iter().zip(w).map(|(s, w)| s * w).sum(),
                None => scores.iter().sum::<f64>() / n,
            },
            CombinationStrategy::Product => scores.iter().product(),
            CombinationStrategy::NoisyOr => 1.0 - scores.iter().map(|p| 1.0 - p).product::<f64>(),
        };

        let source = uniform(values.iter().map(|c| c.source)).unwrap_or(ConfidenceSource::Hybrid);
        let uncertainty =
            uniform(values.iter().map(|c| c.uncertainty)).unwrap_or(UncertaintyType::Mixed);

        let mut evidence: Vec<String> = Vec::new();
        for value in values {
            for item in &value.evidence {
                if !evidence.contains(item) {
                    evidence.push(item.clone());
                }
            }
        }
        evidence.push(format!("combined {} values ({})", values.len(), strategy));

        Ok(Self {
            score: score.clamp(0.0, 1.0),
            source,
            uncertainty,
            provenance: Provenance::new(format!("combine:{}", strategy)),
            evidence,
            properties: HashMap::new(),
        })
    }

    /// Blend a neural and a symbolic estimate: `alpha * neural + (1 - alpha) * symbolic`.
    pub fn combine_with_rule(
        neural: &Confidence,
        symbolic: &Confidence,
        alpha: f64,
    ) -> StrataResult<Self> {
        let alpha = check_unit("alpha", alpha)?;
        let score = alpha * neural.score + (1.0 - alpha) * symbolic.score;

        let mut evidence = neural.evidence.clone();
        for item in &symbolic.evidence {
            if !evidence.contains(item) {
                evidence.push(item.clone());
            }
        }
        evidence.push(format!("neural-symbolic blend alpha={:.3}", alpha));

        Ok(Self {
            score: score.clamp(0.0, 1.0),
            source: ConfidenceSource::Hybrid,
            uncertainty: if neural.uncertainty == symbolic.uncertainty {
                neural.uncertainty
            } else {
                UncertaintyType::Mixed
            },
            provenance: Provenance::new("combine_with_rule"),
            evidence,
            properties: HashMap::new(),
        }
        .with_property("alpha", serde_json::json!(alpha)))
    }

    /// Confidence after a reasoning chain of `steps` hops.
    ///
    /// Computes `initial * decay_factor^steps`, floored at `min_threshold` so a
    /// finite chain never reports zero confidence.
    pub fn propagate(
        initial: &Confidence,
        steps: u32,
        decay_factor: f64,
        min_threshold: f64,
    ) -> StrataResult<Self> {
        if decay_factor.is_nan() || decay_factor <= 0.0 || decay_factor > 1.0 {
            return Err(StrataError::out_of_range("decay factor", decay_factor, "(0, 1]"));
        }
        let floor = check_unit("min_threshold", min_threshold)?;
        let exponent = i32::try_from(steps).unwrap_or(i32::MAX);
        let score = (initial.score * decay_factor.powi(exponent)).max(floor);

        Ok(initial
            .rescored(score, "propagate")
            .with_evidence(format!("propagated over {} steps", steps)))
    }
}

fn source_generator(source: ConfidenceSource) -> &'static str {
    match source {
        ConfidenceSource::SymbolicRule => "symbolic_rule",
        ConfidenceSource::NeuralModel => "neural_model",
        ConfidenceSource::Hybrid => "hybrid",
        ConfidenceSource::UserInput => "user_input",
        ConfidenceSource::Validation => "validation",
        ConfidenceSource::Heuristic => "heuristic",
    }
}

fn uniform<T: PartialEq + Copy>(mut items: impl Iterator<Item = T>) -> Option<T> {
    let first = items.next()?;
    items.all(|x| x == first).then_some(first)
}

fn normalize_weights(weights: &[f64], expected: usize) -> StrataResult<Vec<f64>> {
    if weights.len() != expected {
        return Err(StrataError::weight_mismatch(format!(
            "expected {} weights, got {}",
            expected,
            weights.len()
        )));
    }
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(StrataError::weight_mismatch(
            "weights must be finite and non-negative",
        ));
    }
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Err(StrataError::weight_mismatch("weights must not sum to zero"));
    }
    Ok(weights.iter().map(|w| w / total).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    const ALL: [CombinationStrategy; 6] = [
        CombinationStrategy::Min,
        CombinationStrategy::Max,
        CombinationStrategy::Average,
        CombinationStrategy::WeightedAverage,
        CombinationStrategy::Product,
        CombinationStrategy::NoisyOr,
    ];

    fn conf(score: f64) -> Confidence {
        Confidence::new(score, ConfidenceSource::NeuralModel).unwrap()
    }

    #[test]
    fn test_new_rejects_out_of_range() {
        assert!(Confidence::new(1.2, ConfidenceSource::Heuristic).is_err());
        assert!(Confidence::new(-0.1, ConfidenceSource::Heuristic).is_err());
        assert!(Confidence::new(f64::NAN, ConfidenceSource::Heuristic).is_err());
    }

    #[test]
    fn test_decay() {
        let decayed = conf(0.8).decay(0.5).unwrap();
        assert!((decayed.score() - 0.4).abs() < 1e-12);
        assert!(conf(0.8).decay(0.0).is_err());
        assert!(conf(0.8).decay(1.5).is_err());
    }

    #[test]
    fn test_combine_empty_fails_for_every_strategy() {
        for strategy in ALL {
            let err = Confidence::combine(&[], strategy, None).unwrap_err();
            assert_eq!(err.code(), crate::error::ErrorCode::ValEmptyInput);
        }
    }

    #[test]
    fn test_strategies() {
        let values = [conf(0.2), conf(0.5), conf(0.8)];
        let get = |s| Confidence::combine(&values, s, None).unwrap().score();

        assert!((get(CombinationStrategy::Min) - 0.2).abs() < 1e-12);
        assert!((get(CombinationStrategy::Max) - 0.8).abs() < 1e-12);
        assert!((get(CombinationStrategy::Average) - 0.5).abs() < 1e-12);
        assert!((get(CombinationStrategy::Product) - 0.08).abs() < 1e-12);
        // 1 - 0.8 * 0.5 * 0.2
        assert!((get(CombinationStrategy::NoisyOr) - 0.92).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_average_without_weights_equals_average() {
        let values = [conf(0.1), conf(0.7), conf(0.4), conf(0.95)];
        let weighted =
            Confidence::combine(&values, CombinationStrategy::WeightedAverage, None).unwrap();
        let average = Confidence::combine(&values, CombinationStrategy::Average, None).unwrap();
        assert!((weighted.score() - average.score()).abs() < 1e-12);
    }

    #[test]
    fn test_weights_are_normalized() {
        let values = [conf(1.0), conf(0.0)];
        let combined =
            Confidence::combine(&values, CombinationStrategy::WeightedAverage, Some(&[3.0, 1.0]))
                .unwrap();
        assert!((combined.score() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_mismatched_weights_fail() {
        let values = [conf(0.5), conf(0.6)];
        assert!(
            Confidence::combine(&values, CombinationStrategy::WeightedAverage, Some(&[1.0]))
                .is_err()
        );
        assert!(Confidence::combine(
            &values,
            CombinationStrategy::WeightedAverage,
            Some(&[1.0, -1.0])
        )
        .is_err());
        assert!(Confidence::combine(
            &values,
            CombinationStrategy::WeightedAverage,
            Some(&[0.0, 0.0])
        )
        .is_err());
    }

    #[test]
    fn test_mixed_sources_become_hybrid() {
        let values = [
            conf(0.5),
            Confidence::new(0.5, ConfidenceSource::SymbolicRule).unwrap(),
        ];
        let combined = Confidence::combine(&values, CombinationStrategy::Average, None).unwrap();
        assert_eq!(combined.source(), ConfidenceSource::Hybrid);
    }

    #[test]
    fn test_combine_with_rule() {
        let neural = conf(0.9);
        let symbolic = Confidence::new(0.5, ConfidenceSource::SymbolicRule).unwrap();
        let blended = Confidence::combine_with_rule(&neural, &symbolic, 0.25).unwrap();
        assert!((blended.score() - 0.6).abs() < 1e-12);
        assert_eq!(blended.source(), ConfidenceSource::Hybrid);
        assert!(Confidence::combine_with_rule(&neural, &symbolic, 1.5).is_err());
    }

    #[test]
    fn test_propagate_is_non_increasing_and_floored() {
        let initial = conf(0.9);
        let mut previous = f64::INFINITY;
        for steps in 0..60 {
            let p = Confidence::propagate(&initial, steps, 0.8, 0.1).unwrap();
            assert!(p.score() <= previous);
            assert!(p.score() >= 0.1);
            previous = p.score();
        }
        let far = Confidence::propagate(&initial, 1000, 0.5, 0.05).unwrap();
        assert!((far.score() - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_random_inputs_stay_in_unit_interval() {
        let mut rng = rand::thread_rng();
        for _ in 0..500 {
            let len = rng.gen_range(1..8);
            let values: Vec<Confidence> = (0..len).map(|_| conf(rng.gen_range(0.0..=1.0))).collect();
            let weights: Vec<f64> = (0..len).map(|_| rng.gen_range(0.01..10.0)).collect();

            for strategy in ALL {
                let c = Confidence::combine(&values, strategy, Some(&weights)).unwrap();
                assert!((0.0..=1.0).contains(&c.score()), "{} -> {}", strategy, c.score());
            }

            let d = values[0].decay(rng.gen_range(0.001..=1.0)).unwrap();
            assert!((0.0..=1.0).contains(&d.score()));

            let p = Confidence::propagate(
                &values[0],
                rng.gen_range(0..100),
                rng.gen_range(0.001..=1.0),
                rng.gen_range(0.0..=1.0),
            )
            .unwrap();
            assert!((0.0..=1.0).contains(&p.score()));
        }
    }

    #[test]
    fn test_deserialize_rejects_out_of_range_score() {
        let mut json = serde_json::to_value(conf(0.5)).unwrap();
        json["score"] = serde_json::json!(1.5);
        assert!(serde_json::from_value::<Confidence>(json).is_err());
    }
}
