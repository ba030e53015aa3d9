//! Normalized event stream
//!
//! The coordinator republishes engine notifications under a fixed vocabulary
//! of event names. Subscribers either take a broadcast receiver (and may lag)
//! or register a [`BridgeEventHandler`], which gets its own ordered queue and
//! task so a slow or failing handler cannot hold up the others.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::call::state::CallState;

/// Fixed event vocabulary published to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventName {
    ConnectionRequested,
    CallRequested,
    CallRinging,
    CallConnected,
    CallStreamsRunning,
    CallPaused,
    CallPausedByRemote,
    CallUpdating,
    CallUpdatedByRemote,
    CallReleased,
    CallError,
    AudioDevicesChanged,
}

impl EventName {
    /// Event published when the tracked call enters `state`
    ///
    /// `Idle` is never published; the session is cleared on `Released`.
    pub fn for_call_state(state: CallState) -> Option<Self> {
        let name = match state {
            CallState::Idle => return None,
            CallState::IncomingReceived => EventName::CallRinging,
            CallState::OutgoingInit => EventName::ConnectionRequested,
            CallState::OutgoingProgress => EventName::CallRequested,
            CallState::OutgoingRinging => EventName::CallRinging,
            CallState::Connected => EventName::CallConnected,
            CallState::StreamsRunning => EventName::CallStreamsRunning,
            CallState::Paused => EventName::CallPaused,
            CallState::PausedByRemote => EventName::CallPausedByRemote,
            CallState::Updating => EventName::CallUpdating,
            CallState::UpdatedByRemote => EventName::CallUpdatedByRemote,
            CallState::Released => EventName::CallReleased,
            CallState::Error => EventName::CallError,
        };
        Some(name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::ConnectionRequested => "ConnectionRequested",
            EventName::CallRequested => "CallRequested",
            EventName::CallRinging => "CallRinging",
            EventName::CallConnected => "CallConnected",
            EventName::CallStreamsRunning => "CallStreamsRunning",
            EventName::CallPaused => "CallPaused",
            EventName::CallPausedByRemote => "CallPausedByRemote",
            EventName::CallUpdating => "CallUpdating",
            EventName::CallUpdatedByRemote => "CallUpdatedByRemote",
            EventName::CallReleased => "CallReleased",
            EventName::CallError => "CallError",
            EventName::AudioDevicesChanged => "AudioDevicesChanged",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One published event: a name and an optional message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeEvent {
    #[serde(rename = "event")]
    pub name: EventName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl BridgeEvent {
    pub fn new(name: EventName) -> Self {
        Self {
            name,
            message: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach the engine's message; empty messages are dropped
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.message = (!message.is_empty()).then_some(message);
        self
    }
}

/// Application callback for published events
#[async_trait]
pub trait BridgeEventHandler: Send + Sync {
    async fn on_event(&self, event: BridgeEvent);
}

/// Identifier returned when registering a handler
pub type HandlerId = Uuid;

#[derive(Debug)]
struct HandlerQueue {
    id: HandlerId,
    tx: mpsc::UnboundedSender<BridgeEvent>,
}

/// Fan-out of published events to broadcast receivers and handlers
#[derive(Debug, Clone)]
pub struct EventBus {
    broadcast_tx: broadcast::Sender<BridgeEvent>,
    handlers: Arc<Mutex<Vec<HandlerQueue>>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            broadcast_tx,
            handlers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.broadcast_tx.subscribe()
    }

    /// Register a handler; must be called within a tokio runtime
    pub fn add_handler(&self, handler: Arc<dyn BridgeEventHandler>) -> HandlerId {
        let id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel::<BridgeEvent>();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let name = event.name;
                let delivery = AssertUnwindSafe(handler.on_event(event)).catch_unwind();
                if delivery.await.is_err() {
                    error!(handler_id = %id, event = %name, "Event handler panicked");
                }
            }
            debug!(handler_id = %id, "Event handler queue closed");
        });

        self.handlers.lock().push(HandlerQueue { id, tx });
        id
    }

    /// Remove a handler; its queue drains and the task ends
    pub fn remove_handler(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|h| h.id != id);
        handlers.len() != before
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Publish to every receiver and handler, in call order
    pub fn publish(&self, event: BridgeEvent) {
        debug!(event = %event.name, message = ?event.message, "Publishing event");

        // No receivers is not an error
        let _ = self.broadcast_tx.send(event.clone());

        self.handlers.lock().retain(|h| {
            let delivered = h.tx.send(event.clone()).is_ok();
            if !delivered {
                warn!(handler_id = %h.id, "Dropping handler whose task has ended");
            }
            delivered
        });
    }

    /// Drop all handler queues so their tasks finish
    pub fn close(&self) {
        self.handlers.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Recorder {
        tx: mpsc::UnboundedSender<EventName>,
    }

    #[async_trait]
    impl BridgeEventHandler for Recorder {
        async fn on_event(&self, event: BridgeEvent) {
            let _ = self.tx.send(event.name);
        }
    }

    struct Panicker;

    #[async_trait]
    impl BridgeEventHandler for Panicker {
        async fn on_event(&self, _event: BridgeEvent) {
            panic!("handler failure");
        }
    }

    #[test]
    fn test_call_state_event_names() {
        assert_eq!(EventName::for_call_state(CallState::IncomingReceived), Some(EventName::CallRinging));
        assert_eq!(EventName::for_call_state(CallState::OutgoingInit), Some(EventName::ConnectionRequested));
        assert_eq!(EventName::for_call_state(CallState::OutgoingProgress), Some(EventName::CallRequested));
        assert_eq!(EventName::for_call_state(CallState::StreamsRunning), Some(EventName::CallStreamsRunning));
        assert_eq!(EventName::for_call_state(CallState::Released), Some(EventName::CallReleased));
        assert_eq!(EventName::for_call_state(CallState::Idle), None);
    }

    #[test]
    fn test_event_json_uses_exact_names() {
        let event = BridgeEvent::new(EventName::CallPausedByRemote).with_message("held");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "CallPausedByRemote");
        assert_eq!(json["message"], "held");

        let bare = serde_json::to_value(BridgeEvent::new(EventName::AudioDevicesChanged).with_message("")).unwrap();
        assert!(bare.get("message").is_none());
    }

    #[tokio::test]
    async fn test_broadcast_subscribers_receive_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(BridgeEvent::new(EventName::ConnectionRequested));
        bus.publish(BridgeEvent::new(EventName::CallConnected));

        assert_eq!(rx.recv().await.unwrap().name, EventName::ConnectionRequested);
        assert_eq!(rx.recv().await.unwrap().name, EventName::CallConnected);
    }

    #[tokio::test]
    async fn test_panicking_handler_does_not_stall_others() {
        let bus = EventBus::new(8);
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.add_handler(Arc::new(Panicker));
        let recorder = bus.add_handler(Arc::new(Recorder { tx }));
        assert_eq!(bus.handler_count(), 2);

        bus.publish(BridgeEvent::new(EventName::CallRinging));
        bus.publish(BridgeEvent::new(EventName::CallReleased));

        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        let second = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(first, Some(EventName::CallRinging));
        assert_eq!(second, Some(EventName::CallReleased));

        assert!(bus.remove_handler(recorder));
        assert!(!bus.remove_handler(recorder));
    }
}
