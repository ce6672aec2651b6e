//! Layer transitions: execution, versioning, lineage and audit.

mod orchestrator;
mod record;

pub use orchestrator::{
    enrich_for_layer, required_properties, OrchestratorConfig, TransitionOrchestrator,
    TransitionRequest, CHECK_ENTITY_EXISTS, CHECK_HIERARCHY, CHECK_REQUIRED_PROPERTIES,
};
pub use record::{
    ChangedProperty, PropertyDiff, TransitionRecord, TransitionStatistics, TransitionStatus,
    ValidationResult,
};
