//! Collaborator traits the engine consumes.

mod backend;
mod terminology;

pub use backend::*;
pub use terminology::*;
