//! Core types shared by every strata component.

mod category;
mod entity;
mod layer;

pub use category::{EntityCategory, RiskLevel};
pub use entity::{GraphEntity, TerminologyCode};
pub use layer::{KnowledgeLayer, TransitionStep};
