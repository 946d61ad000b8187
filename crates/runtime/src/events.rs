//! Topic-based event bus for scheduler notifications.
//!
//! Consumers subscribe to the topics they care about; publishing is
//! best-effort and never blocks the worker.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Topics for event routing.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Topic {
    /// Ability lifecycle (cast attempts, confirmations, expiry).
    Ability,
    /// Effect lifecycle (delayed start, expiry, cancellation).
    Effect,
    /// Scheduler lifecycle (request expiry, pause/resume, shutdown).
    Scheduler,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AbilityEvent {
    Cast { ability: String },
    CastConfirmed { ability: String },
    CastRevoked { ability: String },
    DurationExpired { ability: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EffectEvent {
    Started { effect: String },
    Expired { effect: String },
    Cancelled { effect: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SchedulerEvent {
    RequestExpired { description: String },
    Paused,
    Resumed,
    Stopped { reason: String },
}

/// Event wrapper carrying the topic and typed payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    Ability(AbilityEvent),
    Effect(EffectEvent),
    Scheduler(SchedulerEvent),
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Event::Ability(_) => Topic::Ability,
            Event::Effect(_) => Topic::Effect,
            Event::Scheduler(_) => Topic::Scheduler,
        }
    }
}

/// Topic-based broadcast bus. Cheap to clone; all clones share channels.
#[derive(Clone)]
pub struct EventBus {
    channels: Arc<HashMap<Topic, broadcast::Sender<Event>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut channels = HashMap::new();
        for topic in [Topic::Ability, Topic::Effect, Topic::Scheduler] {
            channels.insert(topic, broadcast::channel(capacity).0);
        }
        Self {
            channels: Arc::new(channels),
        }
    }

    /// Publish an event to its topic. Lagging or absent subscribers are not
    /// an error.
    pub fn publish(&self, event: Event) {
        let topic = event.topic();
        if let Some(tx) = self.channels.get(&topic)
            && tx.send(event).is_err()
        {
            tracing::trace!(?topic, "no subscribers for topic");
        }
    }

    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        self.channels[&topic].subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
