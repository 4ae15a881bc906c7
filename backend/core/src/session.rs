//! Session state: the conversation plus running counters and lifecycle status.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::compaction::{CompactionPolicy, CompactionRecord, Summarizer};
use crate::conversation::{ConversationSnapshot, ConversationStore};
use crate::error::OrderViolation;
use crate::types::Turn;

/// Coarse lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Running,
    AwaitingUser,
    Terminated,
}

/// Why a session reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    #[default]
    None,
    Completed,
    TurnLimit,
    PriceLimit,
    UserAbort,
    FatalError,
}

impl TerminationReason {
    /// User-facing description the presentation layer can render as-is.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::None => "running",
            Self::Completed => "completed",
            Self::TurnLimit => "stopped: turn limit reached",
            Self::PriceLimit => "stopped: price limit reached",
            Self::UserAbort => "stopped: cancelled by user",
            Self::FatalError => "stopped: error",
        }
    }

    /// Budget stops are expected outcomes, not errors.
    pub fn is_budget_stop(&self) -> bool {
        matches!(self, Self::TurnLimit | Self::PriceLimit)
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Completed => "completed",
            Self::TurnLimit => "turn_limit",
            Self::PriceLimit => "price_limit",
            Self::UserAbort => "user_abort",
            Self::FatalError => "fatal_error",
        };
        write!(f, "{}", s)
    }
}

/// Running budget counters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionCounters {
    pub turns_used: u32,
    pub tokens_used_estimate: u64,
    pub cost_accrued: f64,
}

/// Everything needed to persist and later resume a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub conversation: ConversationSnapshot,
    pub counters: SessionCounters,
    pub status: SessionStatus,
    pub termination_reason: TerminationReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_detail: Option<String>,
}

/// One agent session. Owned by a single orchestrator; never shared globally.
#[derive(Debug, Clone)]
pub struct SessionState {
    id: Uuid,
    conversation: ConversationStore,
    counters: SessionCounters,
    status: SessionStatus,
    termination_reason: TerminationReason,
    termination_detail: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    pub fn with_id(id: Uuid) -> Self {
        Self {
            id,
            conversation: ConversationStore::new(),
            counters: SessionCounters::default(),
            status: SessionStatus::Running,
            termination_reason: TerminationReason::None,
            termination_detail: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn conversation(&self) -> &ConversationStore {
        &self.conversation
    }

    pub fn counters(&self) -> SessionCounters {
        self.counters
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn termination_reason(&self) -> TerminationReason {
        self.termination_reason
    }

    pub fn termination_detail(&self) -> Option<&str> {
        self.termination_detail.as_deref()
    }

    pub fn is_terminated(&self) -> bool {
        self.status == SessionStatus::Terminated
    }

    /// Append a turn and account for its tokens.
    pub fn append(&mut self, turn: Turn) -> Result<u64, OrderViolation> {
        let tokens = turn.token_estimate;
        let seq = self.conversation.append(turn)?;
        self.counters.tokens_used_estimate += tokens;
        Ok(seq)
    }

    /// Compact the conversation; the token estimate follows the live history.
    pub fn compact(
        &mut self,
        policy: &CompactionPolicy,
        summarizer: &dyn Summarizer,
    ) -> Option<CompactionRecord> {
        let record = self.conversation.compact_with(policy, summarizer)?;
        self.counters.tokens_used_estimate = self.conversation.total_tokens();
        Some(record)
    }

    /// Count one completed model request/response cycle.
    pub fn record_turn(&mut self) {
        self.counters.turns_used += 1;
    }

    pub fn accrue_cost(&mut self, cost: f64) {
        if cost.is_finite() && cost > 0.0 {
            self.counters.cost_accrued += cost;
        }
    }

    /// Toggle the interactive wait flag. Ignored once terminated.
    pub fn set_awaiting_user(&mut self, awaiting: bool) {
        if self.is_terminated() {
            return;
        }
        self.status = if awaiting {
            SessionStatus::AwaitingUser
        } else {
            SessionStatus::Running
        };
    }

    /// Move to `Terminated`. The first reason wins; later calls are ignored.
    pub fn terminate(&mut self, reason: TerminationReason, detail: Option<String>) -> bool {
        if self.is_terminated() {
            warn!(
                session_id = %self.id,
                existing = %self.termination_reason,
                ignored = %reason,
                "Session already terminated"
            );
            return false;
        }
        info!(session_id = %self.id, reason = %reason, "Session terminated");
        self.status = SessionStatus::Terminated;
        self.termination_reason = reason;
        self.termination_detail = detail;
        true
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            conversation: self.conversation.snapshot(),
            counters: self.counters,
            status: self.status,
            termination_reason: self.termination_reason,
            termination_detail: self.termination_detail.clone(),
        }
    }

    /// Restore a session. A snapshot taken mid-wait resumes as running.
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Result<Self, OrderViolation> {
        let conversation = ConversationStore::from_snapshot(snapshot.conversation)?;
        let status = match snapshot.status {
            SessionStatus::AwaitingUser => SessionStatus::Running,
            other => other,
        };
        Ok(Self {
            id: snapshot.session_id,
            conversation,
            counters: snapshot.counters,
            status,
            termination_reason: snapshot.termination_reason,
            termination_detail: snapshot.termination_detail,
        })
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
