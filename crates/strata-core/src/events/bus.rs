//! Event bus using tokio broadcast channel
//!
//! Publishing never blocks. Slow subscribers miss events rather than
//! holding up publishers.

use std::collections::HashSet;
use tokio::sync::broadcast;

use crate::events::{EngineEvent, EventAction};

/// Default channel capacity
const DEFAULT_CAPACITY: usize = 1024;

/// Event bus for engine events.
///
/// Events are fire-and-forget; with no subscribers they are dropped.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to every event published after this call.
    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
            actions: None,
        }
    }

    /// Subscribe to a subset of actions.
    pub fn subscribe_to(&self, actions: &[EventAction]) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
            actions: Some(actions.iter().copied().collect()),
        }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: EngineEvent) {
        tracing::trace!(action = %event.action, event_id = %event.event_id, "publishing event");
        // Err only means there are no receivers
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscriber to the event bus, optionally filtered by action.
pub struct EventSubscriber {
    receiver: broadcast::Receiver<EngineEvent>,
    actions: Option<HashSet<EventAction>>,
}

impl EventSubscriber {
    fn accepts(&self, event: &EngineEvent) -> bool {
        self.actions
            .as_ref()
            .map_or(true, |actions| actions.contains(&event.action))
    }

    /// Receive the next matching event.
    ///
    /// Returns None once every bus handle has been dropped. Lag is logged and skipped.
    pub async fn recv(&mut self) -> Option<EngineEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Event subscriber lagged by {} events", n);
                    continue;
                }
            }
        }
    }

    /// Receive a matching event without waiting.
    pub fn try_recv(&mut self) -> Option<EngineEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!("Event subscriber lagged by {} events", n);
                    continue;
                }
                Err(_) => return None,
            }
        }
    }
}
