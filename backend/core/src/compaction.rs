//! Context compaction: replaces old conversation history with a summary turn
//! to stay within a token budget.

use std::ops::Range;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Role, SeqRange, Turn};

/// Default number of most recent turns compaction never touches.
pub const DEFAULT_KEEP_RECENT: usize = 4;

/// How aggressively a compaction pass may rewrite history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionPolicy {
    /// Compaction runs only when the history exceeds this many tokens.
    pub token_budget: u64,
    /// Trailing turns that are always preserved.
    pub keep_recent: usize,
}

impl CompactionPolicy {
    pub fn new(token_budget: u64) -> Self {
        Self {
            token_budget,
            keep_recent: DEFAULT_KEEP_RECENT,
        }
    }

    pub fn keep_recent(mut self, keep_recent: usize) -> Self {
        self.keep_recent = keep_recent;
        self
    }
}

/// Audit record of one `supersede [start, end) with summary` operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactionRecord {
    pub superseded: SeqRange,
    pub turn_count: usize,
    pub tokens_before: u64,
    pub tokens_after: u64,
    pub compacted_at: DateTime<Utc>,
}

impl CompactionRecord {
    pub fn tokens_saved(&self) -> u64 {
        self.tokens_before.saturating_sub(self.tokens_after)
    }
}

/// Produces the text of a summary turn for a span of superseded turns.
pub trait Summarizer: Send + Sync {
    fn summarize(&self, turns: &[Turn]) -> String;
}

/// Deterministic summary: the first sentence of each superseded turn.
/// Nested summaries are flattened rather than summarized again.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractiveSummarizer;

impl Summarizer for ExtractiveSummarizer {
    fn summarize(&self, turns: &[Turn]) -> String {
        let mut lines = Vec::new();
        for turn in turns {
            if turn.is_summary() {
                lines.extend(turn.text.lines().skip(1).map(String::from));
            } else {
                lines.push(format!("[{}] {}", turn.role, first_sentence(turn)));
            }
        }
        format!("[Compacted {} turns]\n{}", turns.len(), lines.join("\n"))
    }
}

fn first_sentence(turn: &Turn) -> String {
    let text = turn
        .text
        .split(['.', '!', '?', '\n'])
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or_default();
    if !text.is_empty() {
        return text.to_string();
    }
    if !turn.tool_calls.is_empty() {
        let names: Vec<&str> = turn.tool_calls.iter().map(|c| c.name.as_str()).collect();
        return format!("called {}", names.join(", "));
    }
    if !turn.tool_results.is_empty() {
        let outcomes: Vec<String> = turn
            .tool_results
            .iter()
            .map(|r| format!("{} {}", r.id, r.status))
            .collect();
        return format!("results: {}", outcomes.join(", "));
    }
    String::new()
}

/// Pick the oldest contiguous span of turns that compaction may supersede.
///
/// Protected: the last `keep_recent` turns, the last request/response
/// exchange, system turns, and assistant turns with unresolved calls. The span
/// never ends on an assistant turn whose results sit outside it, and a span
/// made only of summaries is not worth rewriting.
pub(crate) fn select_span(
    turns: &[Turn],
    pending: &[String],
    keep_recent: usize,
) -> Option<Range<usize>> {
    let mut protected_from = turns.len().saturating_sub(keep_recent);
    if let Some(last_reply) = turns
        .iter()
        .rposition(|t| t.role == Role::Assistant && !t.is_summary())
    {
        protected_from = protected_from.min(last_reply.saturating_sub(1));
    }

    let eligible = |t: &Turn| {
        t.role != Role::System && !t.tool_calls.iter().any(|c| pending.contains(&c.id))
    };

    let mut start = (0..protected_from).find(|&i| eligible(&turns[i]))?;
    let mut end = start;
    while end < protected_from && eligible(&turns[end]) {
        end += 1;
    }

    while end > start
        && turns[end - 1].role == Role::Assistant
        && !turns[end - 1].tool_calls.is_empty()
    {
        end -= 1;
    }
    while start < end && turns[start].role == Role::Tool {
        start += 1;
    }

    if start == end || turns[start..end].iter().all(Turn::is_summary) {
        return None;
    }
    Some(start..end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ToolCallRequest, ToolCallResult};
    use std::time::Duration;

    fn numbered(turns: Vec<Turn>) -> Vec<Turn> {
        turns
            .into_iter()
            .enumerate()
            .map(|(i, mut t)| {
                t.seq = i as u64;
                t
            })
            .collect()
    }

    #[test]
    fn test_extractive_summary_first_sentences() {
        let turns = vec![
            Turn::user("Fix the parser. It crashes on empty input."),
            Turn::assistant("Looking at it now! One moment.", vec![]),
        ];
        let summary = ExtractiveSummarizer.summarize(&turns);
        assert!(summary.starts_with("[Compacted 2 turns]"));
        assert!(summary.contains("[user] Fix the parser"));
        assert!(summary.contains("[assistant] Looking at it now"));
        assert!(!summary.contains("crashes"));
    }

    #[test]
    fn test_summary_flattens_nested_summary() {
        let nested = Turn::summary(SeqRange { start: 0, end: 4 }, "[Compacted 4 turns]\n[user] a\n[assistant] b");
        let turns = vec![nested, Turn::user("next question")];
        let summary = ExtractiveSummarizer.summarize(&turns);
        assert_eq!(summary, "[Compacted 2 turns]\n[user] a\n[assistant] b\n[user] next question");
    }

    #[test]
    fn test_span_skips_system_and_protects_last_exchange() {
        let turns = numbered(vec![
            Turn::system("You are a coding agent."),
            Turn::user("one"),
            Turn::assistant("two", vec![]),
            Turn::user("three"),
            Turn::assistant("four", vec![]),
            Turn::user("five"),
            Turn::assistant("six", vec![]),
        ]);
        let span = select_span(&turns, &[], 0).unwrap();
        assert_eq!(span, 1..5);
    }

    #[test]
    fn test_span_does_not_split_call_from_results() {
        let call = ToolCallRequest::new("c1", "read", serde_json::json!({}));
        let turns = numbered(vec![
            Turn::user("start"),
            Turn::assistant("", vec![call]),
            Turn::tool_results(vec![ToolCallResult::ok("c1", serde_json::json!("x"), Duration::ZERO)]),
            Turn::assistant("done", vec![]),
            Turn::user("more"),
            Turn::assistant("ok", vec![]),
        ]);
        // keep_recent 4 protects from index 2 onward, which would orphan c1's results.
        let span = select_span(&turns, &[], 4).unwrap();
        assert_eq!(span, 0..1);
    }

    #[test]
    fn test_span_of_only_summaries_is_rejected() {
        let turns = vec![
            Turn::summary(SeqRange { start: 0, end: 5 }, "[Compacted 5 turns]"),
            Turn::user("q"),
            Turn::assistant("a", vec![]),
        ];
        assert!(select_span(&turns, &[], 0).is_none());
    }
}
