use std::time::Duration;

use thiserror::Error;

use crate::session::TerminationReason;
use crate::types::{Role, ToolStatus};

/// A breach of the conversation store's ordering invariants.
///
/// Always fatal for the session: it means the model and the loop disagree
/// about which tool calls are outstanding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderViolation {
    #[error("tool results {got:?} do not match pending requests {expected:?}")]
    ResultMismatch {
        expected: Vec<String>,
        got: Vec<String>,
    },

    #[error("tool results appended with no pending requests")]
    NothingPending,

    #[error("{role} turn appended while tool calls {pending:?} are unresolved")]
    UnresolvedRequests { role: Role, pending: Vec<String> },

    #[error("duplicate tool call id '{0}' in assistant turn")]
    DuplicateCallId(String),

    #[error("{role} turn cannot carry tool calls or tool results")]
    MisplacedToolContent { role: Role },

    #[error("sequence number {found} does not follow {previous}")]
    NonMonotonicSequence { previous: u64, found: u64 },
}

/// Failure reported by a model backend after its own retry policy ran.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("transport error: {message}")]
    Transport { message: String, retryable: bool },

    #[error("model error ({status}): {message}")]
    Model { status: u16, message: String },

    #[error("malformed model response: {0}")]
    Malformed(String),

    #[error("retry budget exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl BackendError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Rate limits, server errors and flagged transport errors are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { retryable, .. } => *retryable,
            Self::Model { status, .. } => *status == 429 || *status >= 500,
            Self::Malformed(_) | Self::RetriesExhausted { .. } => false,
        }
    }
}

/// Top-level error taxonomy for the agent engine.
///
/// Tool-level variants are absorbed into `ToolCallResult`s; the rest end the
/// session with a specific termination reason.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid arguments for tool '{tool}': {message}")]
    Validation { tool: String, message: String },

    #[error("tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("tool '{tool}' timed out after {timeout:?}")]
    ToolTimeout { tool: String, timeout: Duration },

    #[error(transparent)]
    OrderViolation(#[from] OrderViolation),

    #[error("model backend failure: {0}")]
    Backend(#[from] BackendError),

    #[error("budget exceeded: {0}")]
    BudgetExceeded(TerminationReason),
}

impl AgentError {
    /// The result status a recoverable tool-level error maps to.
    pub fn tool_status(&self) -> Option<ToolStatus> {
        match self {
            Self::Validation { .. } => Some(ToolStatus::ValidationError),
            Self::ToolExecution { .. } => Some(ToolStatus::ToolError),
            Self::ToolTimeout { .. } => Some(ToolStatus::Timeout),
            _ => None,
        }
    }

    /// How a session-level error ends the session.
    pub fn termination_reason(&self) -> TerminationReason {
        match self {
            Self::BudgetExceeded(reason) => *reason,
            _ => TerminationReason::FatalError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_retryable_classification() {
        assert!(BackendError::transient("reset").is_retryable());
        assert!(BackendError::Model { status: 503, message: "busy".into() }.is_retryable());
        assert!(BackendError::Model { status: 429, message: "slow down".into() }.is_retryable());
        assert!(!BackendError::Model { status: 400, message: "bad".into() }.is_retryable());
        assert!(!BackendError::Malformed("eof".into()).is_retryable());
    }

    #[test]
    fn test_agent_error_mapping() {
        let err = AgentError::Validation { tool: "read".into(), message: "missing path".into() };
        assert_eq!(err.tool_status(), Some(ToolStatus::ValidationError));

        let err = AgentError::from(OrderViolation::NothingPending);
        assert_eq!(err.tool_status(), None);
        assert_eq!(err.termination_reason(), TerminationReason::FatalError);

        let err = AgentError::BudgetExceeded(TerminationReason::PriceLimit);
        assert_eq!(err.termination_reason(), TerminationReason::PriceLimit);
        assert_eq!(err.to_string(), "budget exceeded: price_limit");
        assert_eq!(err.tool_status(), None);
    }
}
