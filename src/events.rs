//! Typed event channel, replacing the teacher's boxed-closure event
//! handlers (`client::Client::event_handlers`) with the `tokio::sync::
//! broadcast` channel the spec's design note calls for (§9: "Event
//! emitter").

use tokio::sync::broadcast;

use crate::creds::Credentials;
use crate::types::Jid;

pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum CoreEvent {
    CredsUpdate(Box<Credentials>),
    SessionStored { jid: Jid, device: u32 },
    IdentityChanged { jid: Jid },
    PreKeysLow { count: u32 },
}

/// One sender per instance; cloned into every component that needs to
/// publish. Orchestrator and WebSocket fan-out are external subscribers
/// (spec.md §6).
#[derive(Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventEmitter {
    pub fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Broadcast sends fail only when there are no subscribers; that is a
    /// normal, not exceptional, condition here.
    pub fn emit(&self, event: CoreEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
