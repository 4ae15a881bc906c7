//! Agent event logger.
//!
//! Turns session events into structured `tool_call`, `tool_result`,
//! `message`, `error` and `termination` records, redacts them and writes them
//! through `tracing` under the `agent_events` target.

use chrono::{DateTime, Utc};
use forgeloop_core::{EventKind, SessionEvent};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::redact::{redact_sensitive_data, redact_value};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    ToolCall {
        call_id: String,
        tool_name: String,
        arguments: Value,
    },
    ToolResult {
        call_id: String,
        status: String,
    },
    Message {
        role: String,
        content: String,
    },
    Error {
        error_msg: String,
    },
    Termination {
        reason: String,
        detail: Option<String>,
    },
}

impl AgentEvent {
    fn redacted(self) -> Self {
        match self {
            AgentEvent::ToolCall { call_id, tool_name, arguments } => AgentEvent::ToolCall {
                call_id,
                tool_name,
                arguments: redact_value(&arguments),
            },
            AgentEvent::Message { role, content } => AgentEvent::Message {
                role,
                content: redact_sensitive_data(&content),
            },
            AgentEvent::Error { error_msg } => AgentEvent::Error {
                error_msg: redact_sensitive_data(&error_msg),
            },
            AgentEvent::Termination { reason, detail } => AgentEvent::Termination {
                reason,
                detail: detail.map(|d| redact_sensitive_data(&d)),
            },
            other => other,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventLogEntry {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: AgentEvent,
}

pub struct EventLogger;

impl EventLogger {
    /// Redact and log one event.
    pub fn log_event(session_id: &str, event: AgentEvent) {
        let entry = EventLogEntry {
            session_id: session_id.into(),
            timestamp: Utc::now(),
            event: event.redacted(),
        };
        let json = serde_json::to_string(&entry).unwrap_or_default();
        info!(target: "agent_events", session_id = %entry.session_id, event = %json, "Agent event");
    }

    /// The loggable records carried by a session event. Lifecycle events
    /// without content map to nothing.
    pub fn records(event: &SessionEvent) -> Vec<AgentEvent> {
        let p = &event.payload;
        match event.kind {
            EventKind::ToolCallsDispatched => items(p, "calls")
                .map(|call| AgentEvent::ToolCall {
                    call_id: str_field(call, "id"),
                    tool_name: str_field(call, "tool"),
                    arguments: call.get("arguments").cloned().unwrap_or(Value::Null),
                })
                .collect(),
            EventKind::ToolCallsResolved => items(p, "results")
                .map(|r| AgentEvent::ToolResult {
                    call_id: str_field(r, "id"),
                    status: str_field(r, "status"),
                })
                .collect(),
            EventKind::ModelResponded => {
                let text = str_field(p, "text");
                if text.is_empty() {
                    Vec::new()
                } else {
                    vec![AgentEvent::Message { role: "assistant".into(), content: text }]
                }
            }
            EventKind::SessionTerminated => {
                let reason = str_field(p, "reason");
                let detail = p.get("detail").and_then(Value::as_str).map(String::from);
                let mut out = Vec::new();
                if reason == "fatal_error" {
                    out.push(AgentEvent::Error {
                        error_msg: detail.clone().unwrap_or_default(),
                    });
                }
                out.push(AgentEvent::Termination { reason, detail });
                out
            }
            _ => Vec::new(),
        }
    }

    pub fn log_session_event(event: &SessionEvent) {
        let records = Self::records(event);
        if records.is_empty() {
            debug!(target: "agent_events", session_id = %event.session_id, kind = %event.kind, "Session event");
        }
        let session_id = event.session_id.to_string();
        for record in records {
            Self::log_event(&session_id, record);
        }
    }

    /// Log every event from an orchestrator's channel until it closes.
    pub async fn forward(mut rx: mpsc::Receiver<SessionEvent>) -> usize {
        let mut seen = 0;
        while let Some(event) = rx.recv().await {
            Self::log_session_event(&event);
            seen += 1;
        }
        seen
    }
}

fn items<'a>(payload: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> + 'a {
    payload
        .get(key)
        .and_then(Value::as_array)
        .map(|a| a.iter())
        .into_iter()
        .flatten()
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_dispatch_event_becomes_tool_calls() {
        let event = SessionEvent::new(
            Uuid::new_v4(),
            EventKind::ToolCallsDispatched,
            json!({"calls": [
                {"id": "c1", "tool": "bash", "arguments": {"cmd": "ls", "token": "abc"}},
                {"id": "c2", "tool": "read", "arguments": {"path": "a.rs"}}
            ]}),
        );
        let records = EventLogger::records(&event);
        assert_eq!(records.len(), 2);
        let AgentEvent::ToolCall { call_id, arguments, .. } = records[0].clone().redacted() else {
            panic!("expected tool call");
        };
        assert_eq!(call_id, "c1");
        assert_eq!(arguments["token"], "[REDACTED]");
        assert_eq!(arguments["cmd"], "ls");
    }

    #[test]
    fn test_fatal_termination_logs_error() {
        let event = SessionEvent::new(
            Uuid::new_v4(),
            EventKind::SessionTerminated,
            json!({"reason": "fatal_error", "detail": "model backend failure"}),
        );
        let records = EventLogger::records(&event);
        assert!(matches!(records[0], AgentEvent::Error { .. }));
        assert_eq!(
            records[1],
            AgentEvent::Termination {
                reason: "fatal_error".into(),
                detail: Some("model backend failure".into())
            }
        );
    }

    #[test]
    fn test_lifecycle_events_have_no_records() {
        let event = SessionEvent::new(Uuid::new_v4(), EventKind::PhaseChanged, json!({}));
        assert!(EventLogger::records(&event).is_empty());
        let silent = SessionEvent::new(Uuid::new_v4(), EventKind::ModelResponded, json!({"text": ""}));
        assert!(EventLogger::records(&silent).is_empty());
    }

    #[tokio::test]
    async fn test_forward_drains_channel() {
        let (tx, rx) = mpsc::channel(4);
        let id = Uuid::new_v4();
        tx.send(SessionEvent::new(id, EventKind::SessionStarted, json!({}))).await.unwrap();
        tx.send(SessionEvent::new(id, EventKind::ModelResponded, json!({"text": "hi"})))
            .await
            .unwrap();
        drop(tx);
        assert_eq!(EventLogger::forward(rx).await, 2);
    }
}
