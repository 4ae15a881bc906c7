//! Append-only conversation log with auditable compaction.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::compaction::{self, CompactionPolicy, CompactionRecord, ExtractiveSummarizer, Summarizer};
use crate::error::OrderViolation;
use crate::types::{Role, SeqRange, Turn};

/// Ordered history of turns plus the set of tool calls awaiting results.
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    turns: Vec<Turn>,
    next_seq: u64,
    /// Ids issued by the latest assistant turn, in emission order.
    pending: Vec<String>,
    compactions: Vec<CompactionRecord>,
}

/// Serializable view of a store, used for persistence and resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    pub turns: Vec<Turn>,
    pub next_seq: u64,
    #[serde(default)]
    pub pending: Vec<String>,
    #[serde(default)]
    pub compactions: Vec<CompactionRecord>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn, assigning the next sequence number.
    ///
    /// A tool turn must resolve exactly the pending requests, in order; no
    /// other turn may be appended while requests are pending.
    pub fn append(&mut self, mut turn: Turn) -> Result<u64, OrderViolation> {
        let seq = self.next_seq;
        match turn.role {
            Role::Tool => {
                if !turn.tool_calls.is_empty() {
                    return Err(OrderViolation::MisplacedToolContent { role: Role::Tool });
                }
                if self.pending.is_empty() {
                    return Err(OrderViolation::NothingPending);
                }
                let got: Vec<String> = turn.tool_results.iter().map(|r| r.id.clone()).collect();
                if got != self.pending {
                    return Err(OrderViolation::ResultMismatch {
                        expected: self.pending.clone(),
                        got,
                    });
                }
                self.pending.clear();
            }
            role => {
                if !self.pending.is_empty() {
                    return Err(OrderViolation::UnresolvedRequests {
                        role,
                        pending: self.pending.clone(),
                    });
                }
                if !turn.tool_results.is_empty()
                    || (role != Role::Assistant && !turn.tool_calls.is_empty())
                {
                    return Err(OrderViolation::MisplacedToolContent { role });
                }
                let mut ids: Vec<String> = Vec::with_capacity(turn.tool_calls.len());
                for call in &mut turn.tool_calls {
                    if ids.contains(&call.id) {
                        return Err(OrderViolation::DuplicateCallId(call.id.clone()));
                    }
                    ids.push(call.id.clone());
                    call.turn_seq = seq;
                }
                self.pending = ids;
            }
        }

        turn.seq = seq;
        turn.summary_of = None;
        debug!(seq, role = %turn.role, tokens = turn.token_estimate, "Turn appended");
        self.turns.push(turn);
        self.next_seq += 1;
        Ok(seq)
    }

    /// Compact with the default extractive summarizer.
    pub fn compact(&mut self, policy: &CompactionPolicy) -> Option<CompactionRecord> {
        self.compact_with(policy, &ExtractiveSummarizer)
    }

    /// Supersede the oldest eligible span with a single summary turn when the
    /// history is over budget. Returns `None` when nothing changed.
    pub fn compact_with(
        &mut self,
        policy: &CompactionPolicy,
        summarizer: &dyn Summarizer,
    ) -> Option<CompactionRecord> {
        if self.total_tokens() <= policy.token_budget {
            return None;
        }
        let span = compaction::select_span(&self.turns, &self.pending, policy.keep_recent)?;

        let superseded = &self.turns[span.clone()];
        let range = SeqRange {
            start: superseded[0].seq,
            end: superseded[superseded.len() - 1].seq + 1,
        };
        let tokens_before: u64 = superseded.iter().map(|t| t.token_estimate).sum();
        let summary = Turn::summary(range, summarizer.summarize(superseded));
        if summary.token_estimate >= tokens_before {
            debug!(
                start = range.start,
                end = range.end,
                tokens_before,
                tokens_after = summary.token_estimate,
                "Summary would not shrink the span, skipping compaction"
            );
            return None;
        }

        let record = CompactionRecord {
            superseded: range,
            turn_count: span.len(),
            tokens_before,
            tokens_after: summary.token_estimate,
            compacted_at: Utc::now(),
        };
        self.turns.splice(span, std::iter::once(summary));
        info!(
            start = range.start,
            end = range.end,
            turns = record.turn_count,
            tokens_saved = record.tokens_saved(),
            "Conversation compacted"
        );
        self.compactions.push(record.clone());
        Some(record)
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn total_tokens(&self) -> u64 {
        self.turns.iter().map(|t| t.token_estimate).sum()
    }

    pub fn compactions(&self) -> &[CompactionRecord] {
        &self.compactions
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            turns: self.turns.clone(),
            next_seq: self.next_seq,
            pending: self.pending.clone(),
            compactions: self.compactions.clone(),
        }
    }

    /// Rebuild a store from a snapshot, re-checking sequence ordering.
    pub fn from_snapshot(snapshot: ConversationSnapshot) -> Result<Self, OrderViolation> {
        let mut previous: Option<u64> = None;
        for turn in &snapshot.turns {
            if let Some(prev) = previous {
                if turn.seq <= prev {
                    return Err(OrderViolation::NonMonotonicSequence {
                        previous: prev,
                        found: turn.seq,
                    });
                }
            }
            previous = Some(turn.seq);
        }
        if let Some(last) = previous {
            if snapshot.next_seq <= last {
                return Err(OrderViolation::NonMonotonicSequence {
                    previous: last,
                    found: snapshot.next_seq,
                });
            }
        }
        Ok(Self {
            turns: snapshot.turns,
            next_seq: snapshot.next_seq,
            pending: snapshot.pending,
            compactions: snapshot.compactions,
        })
    }
}
