//! Terminology lookup capability.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StrataResult;
use crate::types::{EntityCategory, TerminologyCode};

/// How a name matched a vocabulary entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Partial,
    /// Category-generic concept used when nothing more specific matched.
    Semantic,
}

/// Result of a terminology lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminologyMatch {
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coding_system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_type: Option<MatchType>,
}

impl TerminologyMatch {
    pub fn found(
        coding_system: impl Into<String>,
        code: impl Into<String>,
        display_name: impl Into<String>,
        confidence: f64,
        match_type: MatchType,
    ) -> Self {
        Self {
            matched: true,
            coding_system: Some(coding_system.into()),
            code: Some(code.into()),
            display_name: Some(display_name.into()),
            confidence,
            match_type: Some(match_type),
        }
    }

    /// Explicit non-match, recorded when the lookup itself failed.
    pub fn none() -> Self {
        Self {
            matched: false,
            coding_system: None,
            code: None,
            display_name: None,
            confidence: 0.0,
            match_type: None,
        }
    }

    /// Match built from a code the entity already carries.
    pub fn from_code(code: &TerminologyCode) -> Self {
        Self {
            matched: true,
            coding_system: Some(code.coding_system.clone()),
            code: Some(code.code.clone()),
            display_name: code.display_name.clone(),
            confidence: 1.0,
            match_type: Some(MatchType::Exact),
        }
    }
}

/// Maps entity names to coded vocabulary entries.
///
/// Implementations try an exact match, then a partial match, then fall back
/// to a category-generic concept.
#[async_trait]
pub trait TerminologyLookup: Send + Sync {
    async fn lookup(&self, name: &str, category: EntityCategory) -> StrataResult<TerminologyMatch>;
}
