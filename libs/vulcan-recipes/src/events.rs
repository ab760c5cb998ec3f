//! Real-time push of lifecycle transitions
//!
//! Fire-and-forget: a broadcast with no subscribers is dropped silently and
//! never fails the transition that raised it.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

pub const RECIPE_CREATED: &str = "recipe-created";
pub const RECIPE_UPDATED: &str = "recipe-updated";
pub const RECIPE_DELETED: &str = "recipe-deleted";
pub const RECIPE_ACTIVATED: &str = "recipe-activated";
pub const RECIPE_ACTIVATION_FAILED: &str = "recipe-activation-failed";
pub const RECIPE_ACTIVATION_ABANDONED: &str = "recipe-activation-abandoned";

pub trait EventSink: Send + Sync + 'static {
    fn broadcast(&self, event: &str, payload: Value);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushEvent {
    pub name: String,
    pub payload: Value,
}

/// Fan-out hub backed by a tokio broadcast channel
#[derive(Debug, Clone)]
pub struct EventHub {
    tx: broadcast::Sender<PushEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PushEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventSink for EventHub {
    fn broadcast(&self, event: &str, payload: Value) {
        let delivered = self
            .tx
            .send(PushEvent {
                name: event.to_string(),
                payload,
            })
            .unwrap_or(0);
        trace!("Event {} pushed to {} subscriber(s)", event, delivered);
    }
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEvents;

impl EventSink for NoopEvents {
    fn broadcast(&self, _event: &str, _payload: Value) {}
}
