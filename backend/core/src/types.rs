use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fixed per-turn overhead added to every token estimate (role markers, framing).
const TURN_OVERHEAD_TOKENS: u64 = 4;

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Tool,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
            Role::System => "system",
        };
        write!(f, "{}", s)
    }
}

/// A structured request from the model to invoke a named tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique within the owning assistant turn.
    pub id: String,
    pub name: String,
    pub arguments: Value,
    /// Sequence number of the assistant turn that issued the call.
    /// Stamped by the conversation store at append time.
    #[serde(default)]
    pub turn_seq: u64,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            turn_seq: 0,
        }
    }
}

/// Outcome classification for a single tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Ok,
    ToolError,
    ValidationError,
    Cancelled,
    Timeout,
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ToolStatus::Ok => "ok",
            ToolStatus::ToolError => "tool_error",
            ToolStatus::ValidationError => "validation_error",
            ToolStatus::Cancelled => "cancelled",
            ToolStatus::Timeout => "timeout",
        };
        write!(f, "{}", s)
    }
}

/// The resolution of one `ToolCallRequest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub id: String,
    pub status: ToolStatus,
    pub payload: Value,
    pub duration: Duration,
}

impl ToolCallResult {
    pub fn ok(id: impl Into<String>, payload: Value, duration: Duration) -> Self {
        Self {
            id: id.into(),
            status: ToolStatus::Ok,
            payload,
            duration,
        }
    }

    /// A non-ok result whose payload carries the failure detail.
    pub fn failed(
        id: impl Into<String>,
        status: ToolStatus,
        message: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            status,
            payload: serde_json::json!({ "error": message.into() }),
            duration,
        }
    }

    pub fn cancelled(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::failed(id, ToolStatus::Cancelled, reason, Duration::ZERO)
    }

    pub fn is_ok(&self) -> bool {
        self.status == ToolStatus::Ok
    }
}

/// Half-open range of sequence numbers `[start, end)` superseded by a summary turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeqRange {
    pub start: u64,
    pub end: u64,
}

/// One entry in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Assigned by the conversation store.
    pub seq: u64,
    pub role: Role,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolCallResult>,
    pub token_estimate: u64,
    /// Set on synthesized summary turns produced by compaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_of: Option<SeqRange>,
}

impl Turn {
    fn build(
        role: Role,
        text: String,
        tool_calls: Vec<ToolCallRequest>,
        tool_results: Vec<ToolCallResult>,
    ) -> Self {
        let mut turn = Self {
            seq: 0,
            role,
            text,
            tool_calls,
            tool_results,
            token_estimate: 0,
            summary_of: None,
        };
        turn.token_estimate = turn.estimate();
        turn
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::build(Role::User, text.into(), Vec::new(), Vec::new())
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::build(Role::System, text.into(), Vec::new(), Vec::new())
    }

    pub fn assistant(text: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self::build(Role::Assistant, text.into(), tool_calls, Vec::new())
    }

    pub fn tool_results(results: Vec<ToolCallResult>) -> Self {
        Self::build(Role::Tool, String::new(), Vec::new(), results)
    }

    /// A synthesized turn standing in for the superseded range.
    pub fn summary(range: SeqRange, text: impl Into<String>) -> Self {
        let mut turn = Self::build(Role::User, text.into(), Vec::new(), Vec::new());
        turn.seq = range.start;
        turn.summary_of = Some(range);
        turn
    }

    pub fn is_summary(&self) -> bool {
        self.summary_of.is_some()
    }

    fn estimate(&self) -> u64 {
        let calls: u64 = self
            .tool_calls
            .iter()
            .map(|c| estimate_tokens(&c.name) + estimate_value_tokens(&c.arguments))
            .sum();
        let results: u64 = self
            .tool_results
            .iter()
            .map(|r| estimate_value_tokens(&r.payload))
            .sum();
        TURN_OVERHEAD_TOKENS + estimate_tokens(&self.text) + calls + results
    }
}

/// Rough token estimate: one token per four characters.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

pub fn estimate_value_tokens(value: &Value) -> u64 {
    match value {
        Value::Null => 0,
        Value::String(s) => estimate_tokens(s),
        other => estimate_tokens(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_estimate_counts_text_and_calls() {
        let plain = Turn::user("abcdefgh");
        assert_eq!(plain.token_estimate, TURN_OVERHEAD_TOKENS + 2);

        let call = ToolCallRequest::new("c1", "read", serde_json::json!({"path": "src/lib.rs"}));
        let with_call = Turn::assistant("abcdefgh", vec![call]);
        assert!(with_call.token_estimate > plain.token_estimate);
    }

    #[test]
    fn test_failed_result_carries_detail() {
        let r = ToolCallResult::failed("c1", ToolStatus::ToolError, "disk full", Duration::from_millis(5));
        assert_eq!(r.payload["error"], "disk full");
        assert!(!r.is_ok());
    }

    #[test]
    fn test_summary_turn_keeps_range_start() {
        let t = Turn::summary(SeqRange { start: 3, end: 9 }, "[Compacted 6 turns]");
        assert_eq!(t.seq, 3);
        assert!(t.is_summary());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&ToolStatus::ValidationError).unwrap();
        assert_eq!(json, "\"validation_error\"");
        assert_eq!(ToolStatus::Timeout.to_string(), "timeout");
    }
}
