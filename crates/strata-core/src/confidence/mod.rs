//! Confidence algebra.
//!
//! - [`Confidence`]: immutable score with decay, combination and chain propagation
//! - [`AdaptiveAlpha`]: neural/symbolic blend weights learned from feedback
//! - [`CrossLayerPropagator`]: layer trust weighting and conflict resolution

mod adaptive;
mod propagator;
mod value;

pub use adaptive::{AdaptiveAlpha, AlphaConfig, FeedbackSample};
pub use propagator::{
    ConflictResolution, CrossLayerPropagator, DirectionalDecay, PropagationConfig, ResolutionRule,
    ReviewAdvice,
};
pub use value::{CombinationStrategy, Confidence, ConfidenceSource, Provenance, UncertaintyType};
