//! Monitor event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`MonitorBus`] is the side error-reporting channel for the detached
//! recording and detection work: pipeline failures land here instead of on
//! the HTTP caller, and flag-creation notices let dashboards follow detector
//! output live. Share it via `Clone` (the underlying sender is cheap).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use vigil_core::types::DbId;

// ---------------------------------------------------------------------------
// MonitorEvent
// ---------------------------------------------------------------------------

/// What a monitor event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorEventKind {
    /// An activity record could not be persisted.
    RecordWriteFailed,
    /// One detector check failed; sibling checks were unaffected.
    DetectorCheckFailed,
    /// A detector finding could not be persisted as a flag.
    FlagWriteFailed,
    /// The recording queue was full and a job was dropped.
    QueueOverflow,
    /// A detector finding was persisted as a new flag.
    FlagCreated,
}

/// One event on the monitor bus.
///
/// Constructed via [`MonitorEvent::new`] and enriched with
/// [`with_actor`](MonitorEvent::with_actor) and
/// [`with_context`](MonitorEvent::with_context).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorEvent {
    pub kind: MonitorEventKind,

    /// Human-readable summary of what happened.
    pub message: String,

    /// The actor whose request the pipeline was processing, when known.
    pub actor_id: Option<DbId>,

    /// Free-form JSON payload carrying event-specific data.
    pub context: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl MonitorEvent {
    /// Create a new event with only the required kind and message.
    pub fn new(kind: MonitorEventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            actor_id: None,
            context: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// Attach the acting user to the event.
    pub fn with_actor(mut self, actor_id: DbId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    /// Set the JSON context payload for the event.
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }
}

// ---------------------------------------------------------------------------
// MonitorBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out bus for [`MonitorEvent`]s.
///
/// Any number of subscribers independently receive every published event.
/// With no subscribers events are dropped; the pipeline also logs every
/// failure through `tracing`, so the bus is observability, not the system
/// of record.
#[derive(Clone)]
pub struct MonitorBus {
    sender: broadcast::Sender<MonitorEvent>,
}

impl MonitorBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest un-consumed events are dropped and
    /// slow receivers observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: MonitorEvent) {
        // Ignore the SendError -- it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.sender.subscribe()
    }
}

impl Default for MonitorBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = MonitorBus::default();
        let mut rx = bus.subscribe();

        let event = MonitorEvent::new(MonitorEventKind::RecordWriteFailed, "store went away")
            .with_actor(7)
            .with_context(serde_json::json!({"action_type": "flag_triage"}));

        bus.publish(event);

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.kind, MonitorEventKind::RecordWriteFailed);
        assert_eq!(received.actor_id, Some(7));
        assert_eq!(received.context["action_type"], "flag_triage");
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = MonitorBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(MonitorEvent::new(MonitorEventKind::QueueOverflow, "queue full"));

        let e1 = rx1.recv().await.expect("subscriber 1 should receive");
        let e2 = rx2.recv().await.expect("subscriber 2 should receive");
        assert_eq!(e1.kind, MonitorEventKind::QueueOverflow);
        assert_eq!(e2.kind, MonitorEventKind::QueueOverflow);
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = MonitorBus::default();
        bus.publish(MonitorEvent::new(MonitorEventKind::FlagCreated, "orphan event"));
    }

    #[test]
    fn bare_event_has_empty_optional_fields() {
        let event = MonitorEvent::new(MonitorEventKind::DetectorCheckFailed, "check died");
        assert!(event.actor_id.is_none());
        assert!(event.context.is_object());
    }
}
