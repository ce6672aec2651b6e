//! The four-tier knowledge maturity hierarchy.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Knowledge layer of an entity.
///
/// Layers are totally ordered; an entity only ever moves one step up.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KnowledgeLayer {
    /// Raw observations, as extracted.
    Perception,
    /// Normalised facts tied to a domain vocabulary.
    Semantic,
    /// Facts that participate in inference.
    Reasoning,
    /// Query-validated knowledge used to answer questions.
    Application,
}

impl KnowledgeLayer {
    /// Zero-based position in the hierarchy.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Perception => 0,
            Self::Semantic => 1,
            Self::Reasoning => 2,
            Self::Application => 3,
        }
    }

    /// The layer directly above, if any.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Perception => Some(Self::Semantic),
            Self::Semantic => Some(Self::Reasoning),
            Self::Reasoning => Some(Self::Application),
            Self::Application => None,
        }
    }

    /// The layer directly below, if any.
    pub fn previous(&self) -> Option<Self> {
        match self {
            Self::Perception => None,
            Self::Semantic => Some(Self::Perception),
            Self::Reasoning => Some(Self::Semantic),
            Self::Application => Some(Self::Reasoning),
        }
    }

    /// Layers that can be promoted out of.
    pub fn promotable() -> &'static [KnowledgeLayer] {
        &[Self::Perception, Self::Semantic, Self::Reasoning]
    }

    /// Signed number of steps from `self` to `target` (positive = upward).
    pub fn distance_to(&self, target: KnowledgeLayer) -> i8 {
        target.rank() as i8 - self.rank() as i8
    }
}

/// One of the three canonical forward promotion steps.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransitionStep {
    PerceptionToSemantic,
    SemanticToReasoning,
    ReasoningToApplication,
}

impl TransitionStep {
    /// Resolve a (from, to) pair, returning `None` for regressions, skips and no-ops.
    pub fn between(from: KnowledgeLayer, to: KnowledgeLayer) -> Option<Self> {
        match (from, to) {
            (KnowledgeLayer::Perception, KnowledgeLayer::Semantic) => {
                Some(Self::PerceptionToSemantic)
            }
            (KnowledgeLayer::Semantic, KnowledgeLayer::Reasoning) => {
                Some(Self::SemanticToReasoning)
            }
            (KnowledgeLayer::Reasoning, KnowledgeLayer::Application) => {
                Some(Self::ReasoningToApplication)
            }
            _ => None,
        }
    }

    /// Source layer of this step.
    pub fn from_layer(&self) -> KnowledgeLayer {
        match self {
            Self::PerceptionToSemantic => KnowledgeLayer::Perception,
            Self::SemanticToReasoning => KnowledgeLayer::Semantic,
            Self::ReasoningToApplication => KnowledgeLayer::Reasoning,
        }
    }

    /// Target layer of this step.
    pub fn to_layer(&self) -> KnowledgeLayer {
        match self {
            Self::PerceptionToSemantic => KnowledgeLayer::Semantic,
            Self::SemanticToReasoning => KnowledgeLayer::Reasoning,
            Self::ReasoningToApplication => KnowledgeLayer::Application,
        }
    }
}
