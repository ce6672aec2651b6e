//! Configuration system for strata.
//!
//! [`EngineConfig`] aggregates the per-component configs. Every section has
//! defaults, so a config file only needs the values it changes.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::confidence::{AlphaConfig, PropagationConfig};
use crate::error::{StrataError, StrataResult};
use crate::promotion::GateConfig;
use crate::temporal::TemporalConfig;
use crate::traits::GraphBackendConfig;
use crate::transition::OrchestratorConfig;
use crate::trigger::TriggerConfig;

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub alpha: AlphaConfig,
    pub propagation: PropagationConfig,
    pub temporal: TemporalConfig,
    pub gate: GateConfig,
    pub orchestrator: OrchestratorConfig,
    pub trigger: TriggerConfig,
    pub backend: GraphBackendConfig,
}

impl EngineConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<Path>) -> StrataResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        let config: Self = match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| StrataError::Configuration(e.to_string()))?
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| StrataError::Configuration(e.to_string()))?,
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| StrataError::Configuration(e.to_string()))?,
            _ => {
                return Err(StrataError::Configuration(
                    "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
                ))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Defaults with `STRATA_*` environment overrides applied.
    ///
    /// Reads:
    /// - `STRATA_PROMOTION_DISABLED` (default: false)
    /// - `STRATA_CONFLICT_THRESHOLD` (default: 0.3)
    /// - `STRATA_REVIEW_GAP_THRESHOLD` (default: 0.5)
    /// - `STRATA_SCAN_LIMIT` (default: 100)
    /// - `STRATA_QUERY_WINDOW_HOURS` (default: 24)
    /// - `STRATA_CREATE_VERSIONS` (default: false)
    /// - `STRATA_EXEMPT_FIRST_PROMOTION` (default: true)
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `STRATA_*` environment overrides on top of this config.
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok());
        self
    }

    /// Apply overrides from any key lookup. Unparseable values are skipped.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(disabled) = lookup("STRATA_PROMOTION_DISABLED").and_then(|v| parse_bool(&v)) {
            self.trigger.enabled = !disabled;
        }
        if let Some(v) = lookup("STRATA_CONFLICT_THRESHOLD").and_then(|v| v.parse().ok()) {
            self.propagation.conflict_threshold = v;
        }
        if let Some(v) = lookup("STRATA_REVIEW_GAP_THRESHOLD").and_then(|v| v.parse().ok()) {
            self.propagation.review_gap_threshold = v;
        }
        if let Some(v) = lookup("STRATA_SCAN_LIMIT").and_then(|v| v.parse().ok()) {
            self.trigger.scan_limit = v;
        }
        if let Some(v) = lookup("STRATA_QUERY_WINDOW_HOURS").and_then(|v| v.parse().ok()) {
            self.trigger.query_window_hours = v;
        }
        if let Some(v) = lookup("STRATA_CREATE_VERSIONS").and_then(|v| parse_bool(&v)) {
            self.orchestrator.create_versions = v;
        }
        if let Some(v) = lookup("STRATA_EXEMPT_FIRST_PROMOTION").and_then(|v| parse_bool(&v)) {
            self.gate.exempt_first_promotion_from_review = v;
        }
    }

    /// Check every section.
    pub fn validate(&self) -> StrataResult<()> {
        self.alpha.validate()?;
        self.propagation.validate()?;
        self.temporal.validate()?;
        self.gate.validate()?;
        self.orchestrator.validate()?;
        self.trigger.validate()?;
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransitionStep;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_validate() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let mut config = EngineConfig::default();
        config.apply_overrides(lookup(&[
            ("STRATA_PROMOTION_DISABLED", "true"),
            ("STRATA_CONFLICT_THRESHOLD", "0.25"),
            ("STRATA_SCAN_LIMIT", "7"),
            ("STRATA_CREATE_VERSIONS", "yes"),
            ("STRATA_EXEMPT_FIRST_PROMOTION", "0"),
            ("STRATA_QUERY_WINDOW_HOURS", "not-a-number"),
        ]));
        assert!(!config.trigger.enabled);
        assert_eq!(config.propagation.conflict_threshold, 0.25);
        assert_eq!(config.trigger.scan_limit, 7);
        assert!(config.orchestrator.create_versions);
        assert!(!config.gate.exempt_first_promotion_from_review);
        assert_eq!(config.trigger.query_window_hours, 24.0);
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[trigger]
enabled = false
scan_limit = 25

[gate]
exempt_first_promotion_from_review = false

[gate.criteria.semantic_to_reasoning]
min_confidence = 0.75
min_observations = 4
min_stability_hours = 12.0
require_multi_source = true
require_ontology_match = true
high_risk_requires_review = true
"#
        )
        .unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert!(!config.trigger.enabled);
        assert_eq!(config.trigger.scan_limit, 25);
        assert_eq!(config.trigger.perception_confidence, 0.85);
        assert!(!config.gate.exempt_first_promotion_from_review);
        let criteria = config.gate.criteria_for(TransitionStep::SemanticToReasoning);
        assert_eq!(criteria.min_observations, 4);
    }

    #[test]
    fn test_from_json_and_yaml_files() {
        let mut json = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(json, r#"{{"orchestrator": {{"create_versions": true}}}}"#).unwrap();
        assert!(EngineConfig::from_file(json.path()).unwrap().orchestrator.create_versions);

        let mut yaml = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(yaml, "propagation:\n  conflict_threshold: 0.4\n").unwrap();
        let config = EngineConfig::from_file(yaml.path()).unwrap();
        assert_eq!(config.propagation.conflict_threshold, 0.4);
        assert_eq!(config.propagation.review_gap_threshold, 0.5);
    }

    #[test]
    fn test_invalid_file_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[trigger]\nperception_confidence = 3.0").unwrap();
        assert!(matches!(
            EngineConfig::from_file(file.path()),
            Err(StrataError::Configuration(_))
        ));

        let other = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(EngineConfig::from_file(other.path()).is_err());
    }
}
