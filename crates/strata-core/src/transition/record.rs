//! Transition audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::{Display, EnumString};

use crate::error::{StrataError, StrataResult};
use crate::types::KnowledgeLayer;

/// Lifecycle state of a transition.
///
/// `Pending -> Approved -> {Completed, Rejected, Failed}`. Validation
/// failures reject straight from `Pending`. Terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransitionStatus {
    Pending,
    Approved,
    Completed,
    Rejected,
    Failed,
}

impl TransitionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected | Self::Failed)
    }

    pub fn can_advance_to(&self, next: TransitionStatus) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Approved | Self::Rejected | Self::Failed),
            Self::Approved => matches!(next, Self::Completed | Self::Rejected | Self::Failed),
            _ => false,
        }
    }
}

/// One validation check run by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub check: String,
    pub passed: bool,
    pub message: String,
}

impl ValidationResult {
    pub fn new(check: impl Into<String>, passed: bool, message: impl Into<String>) -> Self {
        Self {
            check: check.into(),
            passed,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedProperty {
    pub before: serde_json::Value,
    pub after: serde_json::Value,
}

/// Attribute changes caused by a transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyDiff {
    pub added: HashMap<String, serde_json::Value>,
    pub changed: HashMap<String, ChangedProperty>,
    pub removed: Vec<String>,
}

impl PropertyDiff {
    pub fn between(
        before: &HashMap<String, serde_json::Value>,
        after: &HashMap<String, serde_json::Value>,
    ) -> Self {
        let mut diff = Self::default();
        for (key, value) in after {
            match before.get(key) {
                None => {
                    diff.added.insert(key.clone(), value.clone());
                }
                Some(old) if old != value => {
                    diff.changed.insert(
                        key.clone(),
                        ChangedProperty {
                            before: old.clone(),
                            after: value.clone(),
                        },
                    );
                }
                Some(_) => {}
            }
        }
        diff.removed = before
            .keys()
            .filter(|k| !after.contains_key(*k))
            .cloned()
            .collect();
        diff.removed.sort();
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

/// Audit record for one requested layer transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub id: String,
    pub entity_id: String,
    pub entity_name: String,
    /// Versioned id minted for the promoted entity, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_entity_id: Option<String>,
    pub from_layer: Option<KnowledgeLayer>,
    pub to_layer: KnowledgeLayer,
    pub reason: String,
    pub requested_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    pub status: TransitionStatus,
    pub requested_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    /// Ids this entity carried before `entity_id`, oldest first.
    #[serde(default)]
    pub lineage: Vec<String>,
    #[serde(default)]
    pub validation_results: Vec<ValidationResult>,
    #[serde(default)]
    pub property_diff: PropertyDiff,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl TransitionRecord {
    pub fn new(
        entity_id: impl Into<String>,
        to_layer: KnowledgeLayer,
        reason: impl Into<String>,
        requested_by: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entity_id: entity_id.into(),
            entity_name: String::new(),
            new_entity_id: None,
            from_layer: None,
            to_layer,
            reason: reason.into(),
            requested_by: requested_by.into(),
            approved_by: None,
            status: TransitionStatus::Pending,
            requested_at: Utc::now(),
            approved_at: None,
            completed_at: None,
            duration_ms: None,
            lineage: Vec::new(),
            validation_results: Vec::new(),
            property_diff: PropertyDiff::default(),
            error_message: None,
        }
    }

    fn advance(&mut self, next: TransitionStatus) -> StrataResult<()> {
        if !self.status.can_advance_to(next) {
            return Err(StrataError::Internal(format!(
                "transition record {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    fn finish(&mut self, next: TransitionStatus) -> StrataResult<()> {
        self.advance(next)?;
        let now = Utc::now();
        self.completed_at = Some(now);
        self.duration_ms = Some((now - self.requested_at).num_milliseconds());
        Ok(())
    }

    pub fn approve(&mut self, approver: impl Into<String>) -> StrataResult<()> {
        self.advance(TransitionStatus::Approved)?;
        self.approved_by = Some(approver.into());
        self.approved_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(&mut self, diff: PropertyDiff) -> StrataResult<()> {
        self.finish(TransitionStatus::Completed)?;
        self.property_diff = diff;
        Ok(())
    }

    pub fn reject(&mut self, message: impl Into<String>) -> StrataResult<()> {
        self.finish(TransitionStatus::Rejected)?;
        self.error_message = Some(message.into());
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> StrataResult<()> {
        self.finish(TransitionStatus::Failed)?;
        self.error_message = Some(message.into());
        Ok(())
    }

    /// Id the entity carries after this transition.
    pub fn resulting_id(&self) -> &str {
        self.new_entity_id.as_deref().unwrap_or(&self.entity_id)
    }

    /// Whether this record belongs to the history of `id`.
    pub fn involves(&self, id: &str) -> bool {
        self.entity_id == id
            || self.new_entity_id.as_deref() == Some(id)
            || self.lineage.iter().any(|l| l == id)
    }
}

/// Running orchestrator statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionStatistics {
    pub total: u64,
    pub completed: u64,
    pub rejected: u64,
    pub failed: u64,
    /// Mean duration of completed transitions.
    pub average_duration_ms: f64,
    /// Completed transitions per target layer.
    pub per_target_layer: HashMap<KnowledgeLayer, u64>,
}

impl TransitionStatistics {
    pub(crate) fn record(&mut self, record: &TransitionRecord) {
        self.total += 1;
        match record.status {
            TransitionStatus::Completed => {
                let duration = record.duration_ms.unwrap_or(0) as f64;
                self.average_duration_ms = (self.average_duration_ms * self.completed as f64
                    + duration)
                    / (self.completed + 1) as f64;
                self.completed += 1;
                *self.per_target_layer.entry(record.to_layer).or_default() += 1;
            }
            TransitionStatus::Rejected => self.rejected += 1,
            TransitionStatus::Failed => self.failed += 1,
            TransitionStatus::Pending | TransitionStatus::Approved => {}
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_never_regresses() {
        let mut record = TransitionRecord::new("e", KnowledgeLayer::Semantic, "test", "tester");
        record.approve("system").unwrap();
        record.complete(PropertyDiff::default()).unwrap();
        assert_eq!(record.status, TransitionStatus::Completed);
        assert!(record.duration_ms.is_some());

        assert!(record.approve("system").is_err());
        assert!(record.fail("late").is_err());
        assert_eq!(record.status, TransitionStatus::Completed);
    }

    #[test]
    fn test_reject_from_pending() {
        let mut record = TransitionRecord::new("e", KnowledgeLayer::Semantic, "test", "tester");
        record.reject("missing properties").unwrap();
        assert_eq!(record.status, TransitionStatus::Rejected);
        assert_eq!(record.error_message.as_deref(), Some("missing properties"));
        assert!(record.complete(PropertyDiff::default()).is_err());
    }

    #[test]
    fn test_pending_cannot_complete_directly() {
        let mut record = TransitionRecord::new("e", KnowledgeLayer::Semantic, "test", "tester");
        assert!(record.complete(PropertyDiff::default()).is_err());
        assert_eq!(record.status, TransitionStatus::Pending);
    }

    #[test]
    fn test_property_diff() {
        let before = HashMap::from([
            ("a".to_string(), json!(1)),
            ("b".to_string(), json!("x")),
            ("gone".to_string(), json!(true)),
        ]);
        let after = HashMap::from([
            ("a".to_string(), json!(1)),
            ("b".to_string(), json!("y")),
            ("c".to_string(), json!([1, 2])),
        ]);
        let diff = PropertyDiff::between(&before, &after);
        assert_eq!(diff.added.keys().collect::<Vec<_>>(), vec!["c"]);
        assert_eq!(diff.changed["b"].before, json!("x"));
        assert_eq!(diff.changed["b"].after, json!("y"));
        assert_eq!(diff.removed, vec!["gone".to_string()]);
        assert!(PropertyDiff::between(&before, &before).is_empty());
    }

    #[test]
    fn test_involves_checks_lineage() {
        let mut record = TransitionRecord::new("e_v2", KnowledgeLayer::Reasoning, "test", "tester");
        record.lineage = vec!["e".to_string()];
        record.new_entity_id = Some("e_v3".to_string());
        assert!(record.involves("e"));
        assert!(record.involves("e_v2"));
        assert!(record.involves("e_v3"));
        assert!(!record.involves("other"));
        assert_eq!(record.resulting_id(), "e_v3");
    }

    #[test]
    fn test_statistics_average_duration() {
        let mut stats = TransitionStatistics::default();
        for ms in [10, 30] {
            let mut record = TransitionRecord::new("e", KnowledgeLayer::Semantic, "t", "t");
            record.status = TransitionStatus::Completed;
            record.duration_ms = Some(ms);
            stats.record(&record);
        }
        let mut failed = TransitionRecord::new("e", KnowledgeLayer::Semantic, "t", "t");
        failed.status = TransitionStatus::Failed;
        stats.record(&failed);

        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.failed, 1);
        assert!((stats.average_duration_ms - 20.0).abs() < 1e-9);
        assert_eq!(stats.per_target_layer[&KnowledgeLayer::Semantic], 2);
    }
}
