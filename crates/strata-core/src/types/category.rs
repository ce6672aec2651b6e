//! Entity categories and the risk levels attached to them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category of a graph entity.
///
/// The category selects the temporal decay profile and the promotion risk
/// level. `Other` is the fallback for anything the extractor could not place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    Disease,
    Symptom,
    Medication,
    Procedure,
    LabResult,
    VitalSign,
    Allergy,
    Gene,
    Anatomy,
    Person,
    Organization,
    Event,
    Concept,
    #[serde(other)]
    Other,
}

impl EntityCategory {
    /// Parse a category with flexible matching.
    ///
    /// Handles the spellings extractors and ontologies tend to emit
    /// ("DIAGNOSIS", "drug", "lab_test", ...). Unknown labels map to `Other`.
    pub fn from_str_flexible(s: &str) -> Self {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");

        match normalized.as_str() {
            "disease" | "diagnosis" | "condition" | "disorder" | "illness" => Self::Disease,
            "symptom" | "sign" | "finding" | "complaint" => Self::Symptom,
            "medication" | "drug" | "medicine" | "prescription" | "substance" => {
                Self::Medication
            }
            "procedure" | "surgery" | "treatment" | "intervention" | "operation" => {
                Self::Procedure
            }
            "lab_result" | "labresult" | "lab" | "lab_test" | "test_result" | "observation" => {
                Self::LabResult
            }
            "vital_sign" | "vitalsign" | "vital" | "vitals" | "measurement" => Self::VitalSign,
            "allergy" | "allergen" | "intolerance" | "adverse_reaction" => Self::Allergy,
            "gene" | "variant" | "mutation" | "genotype" => Self::Gene,
            "anatomy" | "body_part" | "organ" | "body_structure" => Self::Anatomy,
            "person" | "patient" | "individual" | "practitioner" => Self::Person,
            "organization" | "organisation" | "org" | "hospital" | "institution" => {
                Self::Organization
            }
            "event" | "encounter" | "visit" | "episode" => Self::Event,
            "concept" | "topic" | "idea" => Self::Concept,
            _ => Self::Other,
        }
    }

    /// Convert to string for storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disease => "disease",
            Self::Symptom => "symptom",
            Self::Medication => "medication",
            Self::Procedure => "procedure",
            Self::LabResult => "lab_result",
            Self::VitalSign => "vital_sign",
            Self::Allergy => "allergy",
            Self::Gene => "gene",
            Self::Anatomy => "anatomy",
            Self::Person => "person",
            Self::Organization => "organization",
            Self::Event => "event",
            Self::Concept => "concept",
            Self::Other => "other",
        }
    }

    /// Get all category variants.
    pub fn all() -> &'static [EntityCategory] {
        &[
            Self::Disease,
            Self::Symptom,
            Self::Medication,
            Self::Procedure,
            Self::LabResult,
            Self::VitalSign,
            Self::Allergy,
            Self::Gene,
            Self::Anatomy,
            Self::Person,
            Self::Organization,
            Self::Event,
            Self::Concept,
            Self::Other,
        ]
    }

    /// Fixed risk classification used by the promotion gate.
    ///
    /// Categories that drive clinical decisions are high risk.
    pub fn risk_level(&self) -> RiskLevel {
        match self {
            Self::Disease | Self::Medication | Self::Procedure | Self::Allergy => RiskLevel::High,
            Self::Symptom | Self::LabResult | Self::VitalSign | Self::Gene => RiskLevel::Medium,
            Self::Anatomy
            | Self::Person
            | Self::Organization
            | Self::Event
            | Self::Concept
            | Self::Other => RiskLevel::Low,
        }
    }
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityCategory {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_str_flexible(s))
    }
}

/// How consequential an incorrect promotion would be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flexible_parsing() {
        assert_eq!(EntityCategory::from_str_flexible("DIAGNOSIS"), EntityCategory::Disease);
        assert_eq!(EntityCategory::from_str_flexible("lab test"), EntityCategory::LabResult);
        assert_eq!(EntityCategory::from_str_flexible("Drug"), EntityCategory::Medication);
        assert_eq!(EntityCategory::from_str_flexible("spaceship"), EntityCategory::Other);
    }

    #[test]
    fn test_as_str_round_trips_through_flexible_parse() {
        for category in EntityCategory::all() {
            assert_eq!(EntityCategory::from_str_flexible(category.as_str()), *category);
        }
    }

    #[test]
    fn test_risk_table() {
        assert_eq!(EntityCategory::Medication.risk_level(), RiskLevel::High);
        assert_eq!(EntityCategory::Symptom.risk_level(), RiskLevel::Medium);
        assert_eq!(EntityCategory::Other.risk_level(), RiskLevel::Low);
        assert!(RiskLevel::High > RiskLevel::Low);
    }

    #[test]
    fn test_unknown_category_deserializes_to_other() {
        let parsed: EntityCategory = serde_json::from_str("\"starship\"").unwrap();
        assert_eq!(parsed, EntityCategory::Other);
    }
}
