//! Promotion gate
//!
//! Decides whether an entity may climb one layer:
//! - per-step criteria tables ([`GateConfig`])
//! - decisions, review queue entries and statistics
//! - terminology services used by the ontology criterion

mod criteria;
mod decision;
mod gate;
mod terminology;

pub use criteria::{GateConfig, PromotionCriteria};
pub use decision::{
    CriterionResult, DecisionStatus, GateStatistics, PendingReview, PromotionDecision,
    ReviewAction, ReviewPriority, ReviewVerdict, StepCounts,
};
pub use gate::{
    decide_status, PromotionGate, CRITERION_CONFIDENCE, CRITERION_ENTITY_EXISTS,
    CRITERION_LAYER_TRANSITION, CRITERION_MULTI_SOURCE, CRITERION_OBSERVATIONS,
    CRITERION_ONTOLOGY, CRITERION_STABILITY,
};
pub use terminology::{
    generic_concept, BackendTerminology, StaticTerminology, GENERIC_MATCH_CONFIDENCE,
    PARTIAL_MATCH_CONFIDENCE,
};
