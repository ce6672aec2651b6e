//! Exponential relevance decay with a per-category floor and a frequency boost.
//!
//! ```text
//! lambda     = ln(2) / half_life_hours
//! base       = max(min_score, e^(-lambda * hours))
//! freq_boost = min(frequency_weight * ln(count + 1), max_boost - 1)
//! final      = min(1, base * (1 + freq_boost))
//! ```

use chrono::{DateTime, Duration, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::TemporalWindow;
use crate::error::{StrataError, StrataResult};
use crate::types::{EntityCategory, GraphEntity};

/// Decay parameters for one entity category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecayProfile {
    /// Hours until un-floored relevance halves.
    pub half_life_hours: f64,
    /// Relevance never decays below this.
    pub min_score: f64,
    /// Weight of the logarithmic observation-count boost.
    pub frequency_weight: f64,
    /// Upper bound of the boost multiplier (1 + boost <= max_boost).
    pub max_boost: f64,
}

impl DecayProfile {
    pub const fn new(half_life_hours: f64, min_score: f64) -> Self {
        Self {
            half_life_hours,
            min_score,
            frequency_weight: 0.1,
            max_boost: 1.5,
        }
    }

    /// Decay constant per hour.
    pub fn lambda(&self) -> f64 {
        std::f64::consts::LN_2 / self.half_life_hours
    }

    /// Floored relevance after `hours` without observation.
    pub fn base_score(&self, hours: f64) -> f64 {
        (-self.lambda() * hours.max(0.0)).exp().max(self.min_score)
    }

    /// Multiplicative boost for repeated observations.
    pub fn frequency_boost(&self, count: u32) -> f64 {
        (self.frequency_weight * (f64::from(count) + 1.0).ln()).min(self.max_boost - 1.0)
    }

    /// Hours after the last observation at which un-floored relevance reaches `threshold`.
    ///
    /// `None` when the floor keeps relevance at or above `threshold` forever.
    pub fn hours_until(&self, threshold: f64) -> Option<f64> {
        if threshold <= self.min_score || threshold <= 0.0 {
            return None;
        }
        if threshold >= 1.0 {
            return Some(0.0);
        }
        Some(-threshold.ln() / self.lambda())
    }

    fn validate(&self, label: &str) -> StrataResult<()> {
        if !(self.half_life_hours > 0.0 && self.half_life_hours.is_finite()) {
            return Err(StrataError::Configuration(format!(
                "{}: half_life_hours must be positive, got {}",
                label, self.half_life_hours
            )));
        }
        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(StrataError::Configuration(format!(
                "{}: min_score must be in [0, 1], got {}",
                label, self.min_score
            )));
        }
        if self.frequency_weight < 0.0 || self.max_boost < 1.0 {
            return Err(StrataError::Configuration(format!(
                "{}: frequency_weight must be >= 0 and max_boost >= 1",
                label
            )));
        }
        Ok(())
    }
}

/// Configuration for temporal relevance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalConfig {
    /// Decay profile per category.
    pub profiles: HashMap<EntityCategory, DecayProfile>,
    /// Profile for categories missing from `profiles` (30-day half-life, 0.1 floor).
    pub default_profile: DecayProfile,
    /// Batch scoring drops entities below this final score (default: 0.1).
    pub relevance_threshold: f64,
    /// Window assumed when a query carries no temporal cue (default: medium term).
    pub default_window: TemporalWindow,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        use EntityCategory::*;
        let profiles = HashMap::from([
            // Near-permanent facts.
            (Anatomy, DecayProfile::new(87_600.0, 0.8)),
            (Gene, DecayProfile::new(43_800.0, 0.7)),
            (Allergy, DecayProfile::new(17_520.0, 0.5)),
            (Disease, DecayProfile::new(8_760.0, 0.3)),
            (Person, DecayProfile::new(4_380.0, 0.3)),
            (Organization, DecayProfile::new(4_380.0, 0.3)),
            (Concept, DecayProfile::new(2_160.0, 0.2)),
            (Procedure, DecayProfile::new(2_160.0, 0.1)),
            (Medication, DecayProfile::new(720.0, 0.1)),
            (LabResult, DecayProfile::new(336.0, 0.05)),
            (Symptom, DecayProfile::new(168.0, 0.05)),
            // Transient facts.
            (Event, DecayProfile::new(72.0, 0.0)),
            (VitalSign, DecayProfile::new(24.0, 0.01)),
        ]);
        Self {
            profiles,
            default_profile: DecayProfile::new(720.0, 0.1),
            relevance_threshold: 0.1,
            default_window: TemporalWindow::MediumTerm,
        }
    }
}

impl TemporalConfig {
    pub fn validate(&self) -> StrataResult<()> {
        self.default_profile.validate("default_profile")?;
        for (category, profile) in &self.profiles {
            profile.validate(category.as_str())?;
        }
        if !(0.0..=1.0).contains(&self.relevance_threshold) {
            return Err(StrataError::Configuration(format!(
                "relevance_threshold must be in [0, 1], got {}",
                self.relevance_threshold
            )));
        }
        Ok(())
    }
}

/// Relevance of one entity at query time. Recomputed per query, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalScore {
    pub entity_id: String,
    pub base_score: f64,
    pub frequency_boost: f64,
    pub final_score: f64,
    pub hours_since_observation: f64,
    pub profile: DecayProfile,
}

/// Computes temporal relevance scores.
#[derive(Debug, Clone, Default)]
pub struct TemporalScorer {
    config: TemporalConfig,
}

impl TemporalScorer {
    pub fn new(config: TemporalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TemporalConfig {
        &self.config
    }

    /// Decay profile for a category, falling back to the default profile.
    pub fn profile(&self, category: EntityCategory) -> &DecayProfile {
        self.config
            .profiles
            .get(&category)
            .unwrap_or(&self.config.default_profile)
    }

    /// Score a single observation record.
    pub fn score(
        &self,
        entity_id: &str,
        category: EntityCategory,
        last_observed: DateTime<Utc>,
        observation_count: u32,
        now: DateTime<Utc>,
    ) -> TemporalScore {
        let profile = *self.profile(category);
        let elapsed = now.signed_duration_since(last_observed);
        let hours = (elapsed.num_milliseconds() as f64 / 3_600_000.0).max(0.0);

        let base = profile.base_score(hours);
        let boost = profile.frequency_boost(observation_count);

        TemporalScore {
            entity_id: entity_id.to_string(),
            base_score: base,
            frequency_boost: boost,
            final_score: (base * (1.0 + boost)).min(1.0),
            hours_since_observation: hours,
            profile,
        }
    }

    /// Score an entity snapshot.
    pub fn score_entity(&self, entity: &GraphEntity, now: DateTime<Utc>) -> TemporalScore {
        self.score(
            &entity.id,
            entity.category,
            entity.last_observed,
            entity.observation_count,
            now,
        )
    }

    /// Score many entities, drop those below the relevance threshold and sort
    /// descending. Ties keep their input order.
    pub fn score_batch(&self, entities: &[GraphEntity], now: DateTime<Utc>) -> Vec<TemporalScore> {
        let mut scores: Vec<TemporalScore> = entities
            .iter()
            .map(|e| self.score_entity(e, now))
            .filter(|s| s.final_score >= self.config.relevance_threshold)
            .collect();
        scores.sort_by(|a, b| OrderedFloat(b.final_score).cmp(&OrderedFloat(a.final_score)));
        scores
    }

    /// Hours of relevance left before the un-floored score drops to `threshold`.
    ///
    /// `None` means the category floor keeps it relevant indefinitely.
    pub fn remaining_relevance_hours(
        &self,
        category: EntityCategory,
        hours_since_observation: f64,
        threshold: f64,
    ) -> Option<f64> {
        self.profile(category)
            .hours_until(threshold)
            .map(|total| (total - hours_since_observation.max(0.0)).max(0.0))
    }

    /// When an entity should be re-observed to stay above `threshold`.
    pub fn refresh_at(
        &self,
        category: EntityCategory,
        last_observed: DateTime<Utc>,
        threshold: f64,
    ) -> Option<DateTime<Utc>> {
        self.profile(category)
            .hours_until(threshold)
            .map(|hours| {
                Duration::try_milliseconds((hours * 3_600_000.0) as i64)
                    .and_then(|ahead| last_observed.checked_add_signed(ahead))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KnowledgeLayer;

    fn no_boost_scorer() -> TemporalScorer {
        let mut config = TemporalConfig::default();
        config.default_profile.frequency_weight = 0.0;
        config.profiles.clear();
        TemporalScorer::new(config)
    }

    #[test]
    fn test_score_at_zero_and_half_life() {
        let scorer = no_boost_scorer();
        let now = Utc::now();

        let fresh = scorer.score("e", EntityCategory::Other, now, 1, now);
        assert!((fresh.final_score - 1.0).abs() < 1e-9);

        let half = scorer.score("e", EntityCategory::Other, now - Duration::hours(720), 1, now);
        assert!((half.base_score - 0.5).abs() < 1e-6);
        assert!((half.final_score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_half_life_with_zero_count_has_no_boost() {
        let scorer = TemporalScorer::default();
        let now = Utc::now();
        let s = scorer.score("e", EntityCategory::Medication, now - Duration::hours(720), 0, now);
        assert_eq!(s.frequency_boost, 0.0);
        assert!((s.final_score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_floor_holds_for_permanent_facts() {
        let scorer = TemporalScorer::default();
        let now = Utc::now();
        let old = scorer.score("e", EntityCategory::Anatomy, now - Duration::days(365 * 50), 0, now);
        assert!((old.base_score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_future_observation_counts_as_now() {
        let scorer = no_boost_scorer();
        let now = Utc::now();
        let s = scorer.score("e", EntityCategory::Other, now + Duration::hours(5), 0, now);
        assert_eq!(s.hours_since_observation, 0.0);
        assert!((s.final_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_frequency_boost_is_capped() {
        let scorer = TemporalScorer::default();
        let profile = scorer.profile(EntityCategory::Other);
        assert!((profile.frequency_boost(u32::MAX) - 0.5).abs() < 1e-12);
        let now = Utc::now();
        let s = scorer.score("e", EntityCategory::Other, now, 1_000_000, now);
        assert_eq!(s.final_score, 1.0);
    }

    #[test]
    fn test_batch_filters_and_sorts_stably() {
        let scorer = no_boost_scorer();
        let now = Utc::now();
        let make = |id: &str, hours: i64| {
            GraphEntity::new(id, id, EntityCategory::Other, KnowledgeLayer::Perception, 0.5)
                .with_observations(0)
                .with_observed_between(now - Duration::hours(hours), now - Duration::hours(hours))
        };
        let entities = vec![
            make("old", 720 * 3),   // 0.125
            make("tie-a", 24),
            make("stale", 720 * 10), // floored at 0.1 -> kept at threshold
            make("tie-b", 24),
            make("fresh", 0),
        ];

        let scores = scorer.score_batch(&entities, now);
        let ids: Vec<&str> = scores.iter().map(|s| s.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["fresh", "tie-a", "tie-b", "old", "stale"]);

        let mut strict = TemporalConfig::default();
        strict.relevance_threshold = 0.2;
        let scores = TemporalScorer::new(strict).score_batch(&entities, now);
        assert!(scores.iter().all(|s| s.final_score >= 0.2));
    }

    #[test]
    fn test_inverse_decay_helpers() {
        let scorer = TemporalScorer::default();
        // Medication: 720h half-life, 0.1 floor.
        let total = scorer
            .remaining_relevance_hours(EntityCategory::Medication, 0.0, 0.5)
            .unwrap();
        assert!((total - 720.0).abs() < 1e-6);

        let left = scorer
            .remaining_relevance_hours(EntityCategory::Medication, 700.0, 0.5)
            .unwrap();
        assert!((left - 20.0).abs() < 1e-6);

        assert_eq!(
            scorer.remaining_relevance_hours(EntityCategory::Medication, 5000.0, 0.5),
            Some(0.0)
        );
        assert!(scorer
            .remaining_relevance_hours(EntityCategory::Anatomy, 0.0, 0.5)
            .is_none());

        let last = Utc::now();
        let refresh = scorer.refresh_at(EntityCategory::Medication, last, 0.25).unwrap();
        let hours = (refresh - last).num_minutes() as f64 / 60.0;
        assert!((hours - 1440.0).abs() < 0.1);
    }

    #[test]
    fn test_refresh_saturates_for_glacial_decay() {
        let mut config = TemporalConfig::default();
        config.profiles.clear();
        config.default_profile = DecayProfile::new(1.0e15, 0.0);
        let scorer = TemporalScorer::new(config);

        let refresh = scorer.refresh_at(EntityCategory::Other, Utc::now(), 0.5);
        assert_eq!(refresh, Some(DateTime::<Utc>::MAX_UTC));
    }

    #[test]
    fn test_config_validation() {
        assert!(TemporalConfig::default().validate().is_ok());
        let mut bad = TemporalConfig::default();
        bad.default_profile.half_life_hours = 0.0;
        assert!(bad.validate().is_err());
    }
}
