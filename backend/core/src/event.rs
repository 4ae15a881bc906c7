use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An immutable record of something that happened in a session.
/// Observers (UI, audit log) consume these; the loop never reads them back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub id: Uuid,
    pub session_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub payload: serde_json::Value,
}

/// Categories of events emitted by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A session started or resumed
    SessionStarted,
    /// The state machine moved to a new phase
    PhaseChanged,
    /// A request was sent to the model backend
    ModelRequested,
    /// The model backend answered
    ModelResponded,
    /// Tool calls were handed to the registry
    ToolCallsDispatched,
    /// All tool calls of a turn were resolved and appended
    ToolCallsResolved,
    /// The loop is waiting on the user
    UserInputRequested,
    /// History was compacted
    CompactionApplied,
    /// The session reached its terminal state
    SessionTerminated,
}

impl SessionEvent {
    pub fn new(session_id: Uuid, kind: EventKind, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            timestamp: Utc::now(),
            kind,
            payload,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| format!("{:?}", self));
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let session_id = Uuid::new_v4();
        let event = SessionEvent::new(
            session_id,
            EventKind::SessionStarted,
            serde_json::json!({"resumed": false}),
        );
        assert_eq!(event.session_id, session_id);
        assert_eq!(event.kind, EventKind::SessionStarted);
    }

    #[test]
    fn test_event_serialization() {
        let event = SessionEvent::new(
            Uuid::new_v4(),
            EventKind::ToolCallsResolved,
            serde_json::json!({"count": 2}),
        );
        let json = serde_json::to_string(&event).unwrap();
        let deserialized: SessionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.kind, EventKind::ToolCallsResolved);
    }

    #[test]
    fn test_event_kind_display() {
        assert_eq!(EventKind::SessionStarted.to_string(), "session_started");
        assert_eq!(EventKind::UserInputRequested.to_string(), "user_input_requested");
    }
}
