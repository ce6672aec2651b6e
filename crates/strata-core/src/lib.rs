//! strata-core - Entity lifecycle engine for layered knowledge graphs.
//!
//! Entities live in one of four knowledge layers (PERCEPTION, SEMANTIC,
//! REASONING, APPLICATION). This crate decides when an entity has earned a
//! move to the next layer, carries the move out against a pluggable graph
//! backend, and keeps the audit trail.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use strata_core::{InMemoryGraphBackend, KnowledgeLayer, PromotionEngine};
//!
//! let backend = Arc::new(InMemoryGraphBackend::new());
//! let engine = PromotionEngine::with_backend(backend)?;
//!
//! // Gate + orchestrator in one call
//! let outcome = engine
//!     .evaluate_and_promote("entity-1", KnowledgeLayer::Semantic)
//!     .await?;
//!
//! // React to graph events on a task you own
//! let trigger = engine.trigger().clone();
//! let subscriber = engine.trigger_subscriber();
//! tokio::spawn(async move { trigger.listen(subscriber).await });
//! ```

pub mod backend;
pub mod confidence;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod promotion;
pub mod temporal;
pub mod traits;
pub mod transition;
pub mod trigger;
pub mod types;

// Re-export commonly used types
pub use backend::InMemoryGraphBackend;
pub use confidence::{
    AdaptiveAlpha, CombinationStrategy, Confidence, ConfidenceSource, CrossLayerPropagator,
    UncertaintyType,
};
pub use config::EngineConfig;
pub use engine::PromotionEngine;
pub use error::{ErrorCode, StrataError, StrataResult};
pub use events::{EngineEvent, EventAction, EventBus, EventSubscriber};
pub use promotion::{
    DecisionStatus, GateConfig, PromotionCriteria, PromotionDecision, PromotionGate,
    StaticTerminology,
};
pub use temporal::{TemporalParser, TemporalScorer, TemporalWindow};
pub use traits::{
    GraphBackend, GraphBackendConfig, GraphBackendProvider, PromotionEnrichment,
    TerminologyLookup, TerminologyMatch,
};
pub use transition::{
    TransitionOrchestrator, TransitionRecord, TransitionRequest, TransitionStatus,
};
pub use trigger::{AutomaticPromotionTrigger, TriggerConfig, TriggerOutcome};
pub use types::{EntityCategory, GraphEntity, KnowledgeLayer, RiskLevel, TransitionStep};
