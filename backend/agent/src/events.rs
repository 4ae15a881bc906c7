//! Non-blocking fan-out of session events to an optional observer.

use forgeloop_core::{EventKind, SessionEvent};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Default capacity for [`EventSink::channel`].
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Events are dropped rather than awaited when the observer falls behind;
/// the loop never blocks on a slow consumer.
#[derive(Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<SessionEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<SessionEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    /// A sink plus the receiving end, bounded to `capacity`.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    pub fn emit(&self, session_id: Uuid, kind: EventKind, payload: Value) {
        let Some(tx) = &self.tx else { return };
        let event = SessionEvent::new(session_id, kind, payload);
        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(session_id = %session_id, kind = %event.kind, "Event buffer full; dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(session_id = %session_id, "Event receiver closed");
            }
        }
    }
}
