//! Temporal relevance: per-category decay scoring and temporal cue parsing.

mod parser;
mod scorer;

pub use parser::{ParseKind, TemporalParser, TemporalQuery, TemporalWindow};
pub use scorer::{DecayProfile, TemporalConfig, TemporalScore, TemporalScorer};
