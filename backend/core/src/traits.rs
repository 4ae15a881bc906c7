use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::BackendError;
use crate::session::SessionSnapshot;
use crate::types::{ToolCallRequest, Turn};

/// Tool description handed to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's arguments.
    pub parameters: Value,
}

/// Everything the model backend needs for one request.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub session_id: Uuid,
    pub turns: Vec<Turn>,
    pub tools: Vec<ToolSchema>,
}

/// Token usage reported by the backend for one response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A complete (already streamed and assembled) model response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub text: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default)]
    pub usage: Usage,
    /// Cost reported by the provider, when it knows it.
    #[serde(default)]
    pub cost: Option<f64>,
    /// The assistant signals the overall task is finished.
    #[serde(default)]
    pub completed: bool,
}

impl ModelResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_tool_call(mut self, call: ToolCallRequest) -> Self {
        self.tool_calls.push(call);
        self
    }

    pub fn with_usage(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.usage = Usage {
            input_tokens,
            output_tokens,
        };
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn completed(mut self) -> Self {
        self.completed = true;
        self
    }
}

/// Produces responses for a conversation. Owns its own retry policy; the
/// orchestrator treats each `send` as one atomic outcome.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Backend name for logs (e.g., "scripted", "openrouter").
    fn name(&self) -> &str;

    async fn send(&self, request: &ModelRequest) -> Result<ModelResponse, BackendError>;
}

/// Runs one tool. Must honor `cancel` on a best-effort basis.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, arguments: Value, cancel: CancellationToken) -> Result<Value>;
}

/// What the user decided about a confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    Approved,
    Denied,
    Cancelled,
}

/// How confirmation-required tool calls are decided.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// Ask the user through the interaction channel.
    #[default]
    ApprovalRequired,
    /// Approve without asking.
    AutoApprove,
    /// Deny without asking; only calls that need no confirmation run.
    Plan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationPrompt {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Value,
    /// One-line description for display.
    pub summary: String,
}

/// A clarifying question from the model to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub call_id: String,
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Answer {
    Text(String),
    Cancelled,
}

/// The only legitimate source of user decisions while the loop is suspended.
#[async_trait]
pub trait InteractionChannel: Send + Sync {
    async fn request_confirmation(&self, prompt: &ConfirmationPrompt) -> ConfirmationOutcome;

    async fn deliver_answer(&self, question: &Question) -> Answer;
}

/// Storage for session snapshots; the medium is up to the implementation.
#[async_trait]
pub trait SessionPersistence: Send + Sync {
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<()>;

    async fn load(&self, session_id: Uuid) -> Result<Option<SessionSnapshot>>;
}
