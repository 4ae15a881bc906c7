//! Orchestrator phases, published through a watch channel.

use std::fmt;

use forgeloop_core::TerminationReason;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "reason", rename_all = "snake_case")]
pub enum Phase {
    Idle,
    AwaitingModel,
    ParsingResponse,
    ExecutingTools,
    AwaitingUserInput,
    /// Absorbing.
    Terminated(TerminationReason),
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Terminated(_))
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => f.write_str("idle"),
            Phase::AwaitingModel => f.write_str("awaiting_model"),
            Phase::ParsingResponse => f.write_str("parsing_response"),
            Phase::ExecutingTools => f.write_str("executing_tools"),
            Phase::AwaitingUserInput => f.write_str("awaiting_user_input"),
            Phase::Terminated(reason) => write!(f, "terminated({reason})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_serializes_with_reason() {
        let json = serde_json::to_value(Phase::Terminated(TerminationReason::TurnLimit)).unwrap();
        assert_eq!(json["phase"], "terminated");
        assert_eq!(json["reason"], "turn_limit");
        assert_eq!(serde_json::to_value(Phase::Idle).unwrap()["phase"], "idle");
        assert!(Phase::Terminated(TerminationReason::Completed).is_terminal());
        assert!(!Phase::ExecutingTools.is_terminal());
    }
}
