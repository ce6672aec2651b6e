//! Event system
//!
//! Typed engine events and an in-process broadcast bus. The automatic
//! trigger consumes entity and query events; the gate, orchestrator and
//! engine publish promotion-lifecycle notifications.

mod bus;
mod event;

pub use bus::{EventBus, EventSubscriber};
pub use event::{EngineEvent, EventAction};
