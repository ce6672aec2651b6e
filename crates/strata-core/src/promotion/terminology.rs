//! Terminology services: a fixed vocabulary table and a backend-query adapter.
//!
//! Both resolve names in three passes: exact, partial, then a
//! category-generic concept. The generic pass always succeeds, so an
//! incomplete vocabulary never hard-blocks a promotion out of PERCEPTION.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::StrataResult;
use crate::traits::{
    GraphBackend, MatchType, PropertyRow, TerminologyLookup, TerminologyMatch, TERMINOLOGY_QUERY,
};
use crate::types::EntityCategory;

const SNOMED: &str = "SNOMED-CT";

/// Confidence of a partial (substring) match.
pub const PARTIAL_MATCH_CONFIDENCE: f64 = 0.75;

/// Confidence of the category-generic fallback.
pub const GENERIC_MATCH_CONFIDENCE: f64 = 0.5;

/// Shortest name considered for partial matching.
const MIN_PARTIAL_LEN: usize = 4;

#[derive(Debug, Clone)]
struct VocabularyEntry {
    coding_system: String,
    code: String,
    display_name: String,
}

/// Category-generic concept used as the last-resort match.
pub fn generic_concept(category: EntityCategory) -> TerminologyMatch {
    let (system, code, display) = match category {
        EntityCategory::Disease => (SNOMED, "64572001", "Disease"),
        EntityCategory::Symptom => (SNOMED, "404684003", "Clinical finding"),
        EntityCategory::Medication => (SNOMED, "410942007", "Drug or medicament"),
        EntityCategory::Procedure => (SNOMED, "71388002", "Procedure"),
        EntityCategory::LabResult => (SNOMED, "15220000", "Laboratory test"),
        EntityCategory::VitalSign => (SNOMED, "46680005", "Vital signs"),
        EntityCategory::Allergy => (SNOMED, "609328004", "Allergic disposition"),
        EntityCategory::Gene => ("HGNC", "gene", "Gene"),
        EntityCategory::Anatomy => (SNOMED, "123037004", "Body structure"),
        EntityCategory::Person => (SNOMED, "125676002", "Person"),
        EntityCategory::Event => (SNOMED, "272379006", "Event"),
        EntityCategory::Organization | EntityCategory::Concept | EntityCategory::Other => {
            (SNOMED, "138875005", "SNOMED CT Concept")
        }
    };
    TerminologyMatch::found(system, code, display, GENERIC_MATCH_CONFIDENCE, MatchType::Semantic)
}

fn normalize(name: &str) -> String {
    name.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fixed-table terminology lookup.
#[derive(Debug, Clone)]
pub struct StaticTerminology {
    entries: HashMap<String, VocabularyEntry>,
}

impl StaticTerminology {
    /// Empty table; every lookup falls through to the generic concept.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Table seeded with a small clinical vocabulary.
    pub fn new() -> Self {
        [
            ("diabetes mellitus", "73211009", "Diabetes mellitus"),
            ("hypertension", "38341003", "Hypertensive disorder"),
            ("asthma", "195967001", "Asthma"),
            ("pneumonia", "233604007", "Pneumonia"),
            ("myocardial infarction", "22298006", "Myocardial infarction"),
            ("fever", "386661006", "Fever"),
            ("headache", "25064002", "Headache"),
            ("aspirin", "387458008", "Aspirin"),
            ("metformin", "372567009", "Metformin"),
            ("appendectomy", "80146002", "Appendectomy"),
            ("penicillin allergy", "91936005", "Allergy to penicillin"),
            ("heart", "80891009", "Heart structure"),
        ]
        .into_iter()
        .fold(Self::empty(), |table, (name, code, display)| {
            table.with_entry(name, SNOMED, code, display)
        })
    }

    pub fn with_entry(
        mut self,
        name: &str,
        coding_system: impl Into<String>,
        code: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        self.entries.insert(
            normalize(name),
            VocabularyEntry {
                coding_system: coding_system.into(),
                code: code.into(),
                display_name: display_name.into(),
            },
        );
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn resolve(&self, name: &str, category: EntityCategory) -> TerminologyMatch {
        let key = normalize(name);
        if let Some(entry) = self.entries.get(&key) {
            return TerminologyMatch::found(
                &entry.coding_system,
                &entry.code,
                &entry.display_name,
                1.0,
                MatchType::Exact,
            );
        }

        if key.len() >= MIN_PARTIAL_LEN {
            // Longest key first so "penicillin allergy" beats "allergy"-style overlaps
            let mut partials: Vec<_> = self
                .entries
                .iter()
                .filter(|(k, _)| k.contains(&key) || key.contains(k.as_str()))
                .collect();
            partials.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));
            if let Some((_, entry)) = partials.first() {
                return TerminologyMatch::found(
                    &entry.coding_system,
                    &entry.code,
                    &entry.display_name,
                    PARTIAL_MATCH_CONFIDENCE,
                    MatchType::Partial,
                );
            }
        }

        generic_concept(category)
    }
}

impl Default for StaticTerminology {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TerminologyLookup for StaticTerminology {
    async fn lookup(&self, name: &str, category: EntityCategory) -> StrataResult<TerminologyMatch> {
        Ok(self.resolve(name, category))
    }
}

/// Terminology lookup over the backend's `terminology` named query.
///
/// Rows are expected to carry `coding_system`, `code` and `display_name`.
pub struct BackendTerminology {
    backend: Arc<dyn GraphBackend>,
}

impl BackendTerminology {
    pub fn new(backend: Arc<dyn GraphBackend>) -> Self {
        Self { backend }
    }

    fn row_match(row: &PropertyRow, name: &str) -> Option<TerminologyMatch> {
        let field = |key: &str| row.get(key).and_then(|v| v.as_str());
        let system = field("coding_system")?;
        let code = field("code")?;
        let display = field("display_name").unwrap_or(code);
        let (confidence, match_type) = if normalize(display) == normalize(name) {
            (1.0, MatchType::Exact)
        } else {
            (PARTIAL_MATCH_CONFIDENCE, MatchType::Partial)
        };
        Some(TerminologyMatch::found(system, code, display, confidence, match_type))
    }
}

#[async_trait]
impl TerminologyLookup for BackendTerminology {
    async fn lookup(&self, name: &str, category: EntityCategory) -> StrataResult<TerminologyMatch> {
        let params = HashMap::from([
            ("name".to_string(), serde_json::json!(name)),
            ("category".to_string(), serde_json::json!(category.as_str())),
        ]);
        let rows = self.backend.query(TERMINOLOGY_QUERY, &params).await?;

        let best = rows
            .iter()
            .filter_map(|row| Self::row_match(row, name))
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence));

        Ok(best.unwrap_or_else(|| {
            tracing::debug!(name, category = %category, "no terminology rows, using generic concept");
            generic_concept(category)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StrataError;
    use crate::traits::MockGraphBackend;

    #[tokio::test]
    async fn test_exact_match_ignores_case_and_spacing() {
        let terms = StaticTerminology::new();
        let m = terms
            .lookup("  Diabetes   MELLITUS ", EntityCategory::Disease)
            .await
            .unwrap();
        assert!(m.matched);
        assert_eq!(m.match_type, Some(MatchType::Exact));
        assert_eq!(m.code.as_deref(), Some("73211009"));
        assert_eq!(m.confidence, 1.0);
    }

    #[tokio::test]
    async fn test_partial_match_has_reduced_confidence() {
        let terms = StaticTerminology::new();
        let m = terms
            .lookup("acute myocardial infarction", EntityCategory::Disease)
            .await
            .unwrap();
        assert_eq!(m.match_type, Some(MatchType::Partial));
        assert_eq!(m.code.as_deref(), Some("22298006"));
        assert!(m.confidence < 1.0);
    }

    #[tokio::test]
    async fn test_unknown_name_falls_back_to_category_concept() {
        let terms = StaticTerminology::empty();
        let m = terms
            .lookup("zorblax syndrome", EntityCategory::Disease)
            .await
            .unwrap();
        assert!(m.matched);
        assert_eq!(m.match_type, Some(MatchType::Semantic));
        assert_eq!(m.code.as_deref(), Some("64572001"));
        assert_eq!(m.confidence, GENERIC_MATCH_CONFIDENCE);
    }

    #[tokio::test]
    async fn test_short_names_skip_partial_matching() {
        let terms = StaticTerminology::new();
        let m = terms.lookup("art", EntityCategory::Anatomy).await.unwrap();
        assert_eq!(m.match_type, Some(MatchType::Semantic));
    }

    #[tokio::test]
    async fn test_backend_terminology_prefers_exact_row() {
        let mut backend = MockGraphBackend::new();
        backend
            .expect_query()
            .withf(|name, params| name == TERMINOLOGY_QUERY && params["name"] == "Asthma")
            .returning(|_, _| {
                Ok(vec![
                    HashMap::from([
                        ("coding_system".to_string(), serde_json::json!("SNOMED-CT")),
                        ("code".to_string(), serde_json::json!("233678006")),
                        ("display_name".to_string(), serde_json::json!("Childhood asthma")),
                    ]),
                    HashMap::from([
                        ("coding_system".to_string(), serde_json::json!("SNOMED-CT")),
                        ("code".to_string(), serde_json::json!("195967001")),
                        ("display_name".to_string(), serde_json::json!("asthma")),
                    ]),
                ])
            });

        let terms = BackendTerminology::new(Arc::new(backend));
        let m = terms.lookup("Asthma", EntityCategory::Disease).await.unwrap();
        assert_eq!(m.code.as_deref(), Some("195967001"));
        assert_eq!(m.match_type, Some(MatchType::Exact));
    }

    #[tokio::test]
    async fn test_backend_terminology_empty_rows_fall_back() {
        let mut backend = MockGraphBackend::new();
        backend.expect_query().returning(|_, _| Ok(Vec::new()));

        let terms = BackendTerminology::new(Arc::new(backend));
        let m = terms.lookup("aspirin", EntityCategory::Medication).await.unwrap();
        assert_eq!(m.match_type, Some(MatchType::Semantic));
        assert_eq!(m.code.as_deref(), Some("410942007"));
    }

    #[tokio::test]
    async fn test_backend_terminology_propagates_failure() {
        let mut backend = MockGraphBackend::new();
        backend
            .expect_query()
            .returning(|_, _| Err(StrataError::backend("connection reset")));

        let terms = BackendTerminology::new(Arc::new(backend));
        let err = terms.lookup("aspirin", EntityCategory::Medication).await.unwrap_err();
        assert!(matches!(err, StrataError::Backend { .. }));
    }
}
