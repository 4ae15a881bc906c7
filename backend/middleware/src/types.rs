/// Middleware phases, decisions and the inputs each phase sees.
use forgeloop_core::{TerminationReason, Usage};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

/// Where in the loop a middleware runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MiddlewarePhase {
    /// Before each model request.
    Pre,
    /// After a response and its tool results have been appended.
    Post,
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// What a middleware wants the loop to do next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Continue,
    Terminate {
        reason: TerminationReason,
        detail: String,
    },
}

impl Decision {
    pub fn terminate(reason: TerminationReason, detail: impl Into<String>) -> Self {
        Self::Terminate {
            reason,
            detail: detail.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminate { .. })
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Facts about the request about to be sent, beyond the conversation itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Tokens the next request adds on top of the history: system prompt,
    /// tool schemas and the reserved output window.
    pub next_request_estimate: u64,
}

/// Per-million-token prices used when the backend reports no cost.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    #[serde(default)]
    pub input_per_million: f64,
    #[serde(default)]
    pub output_per_million: f64,
}

impl ModelPricing {
    pub fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    pub fn cost(&self, usage: &Usage) -> f64 {
        usage.input_tokens as f64 * self.input_per_million / 1_000_000.0
            + usage.output_tokens as f64 * self.output_per_million / 1_000_000.0
    }
}
