/// Built-in middleware.
///
/// These bundle the budgets every session carries. `standard_chain` wires
/// them in their canonical order: usage, turn limit, price limit, compaction.
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use forgeloop_core::{
    CompactionPolicy, ModelResponse, SessionState, Summarizer, TerminationReason,
    DEFAULT_KEEP_RECENT,
};
use tracing::{debug, info};

use crate::chain::{Middleware, MiddlewareChain};
use crate::types::{Decision, ModelPricing, RequestContext};

/// Extra compaction passes allowed before giving up on fitting the budget.
const MAX_COMPACTION_PASSES: usize = 3;

// ---------------------------------------------------------------------------
// Usage accounting: turn count and cost
// ---------------------------------------------------------------------------

pub struct UsageAccounting {
    pub pricing: ModelPricing,
}

impl UsageAccounting {
    pub fn new(pricing: ModelPricing) -> Self {
        Self { pricing }
    }
}

#[async_trait]
impl Middleware for UsageAccounting {
    fn name(&self) -> &str {
        "usage_accounting"
    }

    async fn after_response(
        &self,
        session: &mut SessionState,
        response: &ModelResponse,
    ) -> Result<Decision> {
        let cost = response
            .cost
            .unwrap_or_else(|| self.pricing.cost(&response.usage));
        session.record_turn();
        session.accrue_cost(cost);
        let counters = session.counters();
        debug!(
            session_id = %session.id(),
            turns_used = counters.turns_used,
            cost_accrued = counters.cost_accrued,
            "Usage recorded"
        );
        Ok(Decision::Continue)
    }
}

// ---------------------------------------------------------------------------
// Turn limit
// ---------------------------------------------------------------------------

pub struct TurnLimit {
    pub max_turns: u32,
}

impl TurnLimit {
    pub fn new(max_turns: u32) -> Self {
        Self { max_turns }
    }
}

#[async_trait]
impl Middleware for TurnLimit {
    fn name(&self) -> &str {
        "turn_limit"
    }

    async fn before_request(
        &self,
        session: &mut SessionState,
        _context: &RequestContext,
    ) -> Result<Decision> {
        let used = session.counters().turns_used;
        if used >= self.max_turns {
            return Ok(Decision::terminate(
                TerminationReason::TurnLimit,
                format!("{used} of {} turns used", self.max_turns),
            ));
        }
        Ok(Decision::Continue)
    }
}

// ---------------------------------------------------------------------------
// Price limit: checked before requests and after the turn is recorded
// ---------------------------------------------------------------------------

pub struct PriceLimit {
    pub max_cost: f64,
}

impl PriceLimit {
    pub fn new(max_cost: f64) -> Self {
        Self { max_cost }
    }

    fn check(&self, session: &SessionState) -> Decision {
        let spent = session.counters().cost_accrued;
        if spent >= self.max_cost {
            Decision::terminate(
                TerminationReason::PriceLimit,
                format!("${spent:.4} spent of ${:.4} limit", self.max_cost),
            )
        } else {
            Decision::Continue
        }
    }
}

#[async_trait]
impl Middleware for PriceLimit {
    fn name(&self) -> &str {
        "price_limit"
    }

    async fn before_request(
        &self,
        session: &mut SessionState,
        _context: &RequestContext,
    ) -> Result<Decision> {
        Ok(self.check(session))
    }

    async fn after_response(
        &self,
        session: &mut SessionState,
        _response: &ModelResponse,
    ) -> Result<Decision> {
        Ok(self.check(session))
    }
}

// ---------------------------------------------------------------------------
// Context compaction
// ---------------------------------------------------------------------------

pub struct ContextCompaction {
    pub context_budget: u64,
    pub keep_recent: usize,
    summarizer: Arc<dyn Summarizer>,
}

impl ContextCompaction {
    pub fn new(context_budget: u64, summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            context_budget,
            keep_recent: DEFAULT_KEEP_RECENT,
            summarizer,
        }
    }

    pub fn keep_recent(mut self, keep_recent: usize) -> Self {
        self.keep_recent = keep_recent;
        self
    }

    fn fits(&self, session: &SessionState, context: &RequestContext) -> bool {
        session.counters().tokens_used_estimate + context.next_request_estimate
            <= self.context_budget
    }
}

#[async_trait]
impl Middleware for ContextCompaction {
    fn name(&self) -> &str {
        "context_compaction"
    }

    async fn before_request(
        &self,
        session: &mut SessionState,
        context: &RequestContext,
    ) -> Result<Decision> {
        if self.fits(session, context) {
            return Ok(Decision::Continue);
        }

        let history_budget = self
            .context_budget
            .saturating_sub(context.next_request_estimate);
        let policy = CompactionPolicy::new(history_budget).keep_recent(self.keep_recent);

        for _ in 0..MAX_COMPACTION_PASSES {
            let Some(record) = session.compact(&policy, self.summarizer.as_ref()) else {
                break;
            };
            info!(
                session_id = %session.id(),
                turns = record.turn_count,
                tokens_saved = record.tokens_saved(),
                "Compacted history before request"
            );
            if self.fits(session, context) {
                return Ok(Decision::Continue);
            }
        }

        if self.fits(session, context) {
            return Ok(Decision::Continue);
        }
        Ok(Decision::terminate(
            TerminationReason::FatalError,
            format!(
                "context still over budget after compaction: {} history + {} request > {}",
                session.counters().tokens_used_estimate,
                context.next_request_estimate,
                self.context_budget
            ),
        ))
    }
}

// ---------------------------------------------------------------------------
// Standard chain
// ---------------------------------------------------------------------------

/// Inputs for [`standard_chain`]. `None` limits are not enforced.
#[derive(Debug, Clone, Copy, Default)]
pub struct BudgetSettings {
    pub pricing: ModelPricing,
    pub max_turns: Option<u32>,
    pub max_cost: Option<f64>,
    /// `None` disables compaction.
    pub context_budget: Option<u64>,
    pub keep_recent: usize,
}

/// Usage accounting, turn limit, price limit, then compaction.
pub fn standard_chain(settings: BudgetSettings, summarizer: Arc<dyn Summarizer>) -> MiddlewareChain {
    let mut chain = MiddlewareChain::new().with(Arc::new(UsageAccounting::new(settings.pricing)));
    if let Some(max_turns) = settings.max_turns {
        chain.push(Arc::new(TurnLimit::new(max_turns)));
    }
    if let Some(max_cost) = settings.max_cost {
        chain.push(Arc::new(PriceLimit::new(max_cost)));
    }
    if let Some(budget) = settings.context_budget {
        chain.push(Arc::new(
            ContextCompaction::new(budget, summarizer).keep_recent(settings.keep_recent),
        ));
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeloop_core::{ExtractiveSummarizer, ToolCallRequest, ToolCallResult, Turn};
    use serde_json::json;
    use std::time::Duration;

    fn long_text(words: usize) -> String {
        vec!["lorem ipsum."; words].join(" ")
    }

    #[tokio::test]
    async fn test_price_limit_exceeded_stops_before_request() {
        let mut session = SessionState::new();
        session.accrue_cost(1.25);

        let chain = standard_chain(
            BudgetSettings {
                max_cost: Some(1.0),
                ..Default::default()
            },
            Arc::new(ExtractiveSummarizer),
        );
        let decision = chain.run_pre(&mut session, &RequestContext::default()).await;

        match decision {
            Decision::Terminate { reason, .. } => assert_eq!(reason, TerminationReason::PriceLimit),
            other => panic!("expected price_limit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_usage_prefers_reported_cost() {
        let usage = UsageAccounting::new(ModelPricing::new(1_000_000.0, 0.0));
        let mut session = SessionState::new();

        let reported = ModelResponse::text("a").with_usage(10, 0).with_cost(0.5);
        usage.after_response(&mut session, &reported).await.unwrap();
        assert!((session.counters().cost_accrued - 0.5).abs() < 1e-9);

        let priced = ModelResponse::text("b").with_usage(2, 0);
        usage.after_response(&mut session, &priced).await.unwrap();
        assert!((session.counters().cost_accrued - 2.5).abs() < 1e-9);
        assert_eq!(session.counters().turns_used, 2);
    }

    #[tokio::test]
    async fn test_turn_limit_at_equality() {
        let limit = TurnLimit::new(1);
        let mut session = SessionState::new();
        let ctx = RequestContext::default();

        assert_eq!(limit.before_request(&mut session, &ctx).await.unwrap(), Decision::Continue);
        session.record_turn();
        let decision = limit.before_request(&mut session, &ctx).await.unwrap();
        assert!(matches!(
            decision,
            Decision::Terminate { reason: TerminationReason::TurnLimit, .. }
        ));
    }

    #[tokio::test]
    async fn test_price_limit_post_keeps_recorded_turn() {
        let chain = standard_chain(
            BudgetSettings {
                max_cost: Some(1.0),
                ..Default::default()
            },
            Arc::new(ExtractiveSummarizer),
        );
        let mut session = SessionState::new();
        let response = ModelResponse::text("pricey").with_cost(1.5);

        let decision = chain.run_post(&mut session, &response).await;
        assert!(matches!(
            decision,
            Decision::Terminate { reason: TerminationReason::PriceLimit, .. }
        ));
        assert_eq!(session.counters().turns_used, 1);
    }

    #[tokio::test]
    async fn test_compaction_brings_history_under_budget() {
        let mut session = SessionState::new();
        for i in 0..8 {
            session.append(Turn::user(format!("question {i}. {}", long_text(40)))).unwrap();
            session.append(Turn::assistant(format!("answer {i}. {}", long_text(40)), vec![])).unwrap();
        }
        let before = session.counters().tokens_used_estimate;
        let budget = before / 2;

        let compaction = ContextCompaction::new(budget, Arc::new(ExtractiveSummarizer)).keep_recent(2);
        let ctx = RequestContext { next_request_estimate: 10 };
        let decision = compaction.before_request(&mut session, &ctx).await.unwrap();

        assert_eq!(decision, Decision::Continue);
        assert!(session.counters().tokens_used_estimate + 10 <= budget);
        assert_eq!(session.conversation().compactions().len(), 1);

        // Same budget again: nothing left to do.
        let decision = compaction.before_request(&mut session, &ctx).await.unwrap();
        assert_eq!(decision, Decision::Continue);
        assert_eq!(session.conversation().compactions().len(), 1);
    }

    #[tokio::test]
    async fn test_compaction_that_cannot_fit_is_fatal() {
        let mut session = SessionState::new();
        session.append(Turn::user(long_text(200))).unwrap();

        let compaction = ContextCompaction::new(50, Arc::new(ExtractiveSummarizer));
        let decision = compaction
            .before_request(&mut session, &RequestContext { next_request_estimate: 10 })
            .await
            .unwrap();
        assert!(matches!(
            decision,
            Decision::Terminate { reason: TerminationReason::FatalError, .. }
        ));
    }

    #[tokio::test]
    async fn test_compaction_leaves_pending_calls_alone() {
        let mut session = SessionState::new();
        for i in 0..4 {
            session.append(Turn::user(format!("q{i}. {}", long_text(40)))).unwrap();
            session.append(Turn::assistant(format!("a{i}. {}", long_text(40)), vec![])).unwrap();
        }
        let call = ToolCallRequest::new("c1", "read_file", json!({"path": "x"}));
        session.append(Turn::assistant("reading", vec![call])).unwrap();

        let compaction = ContextCompaction::new(60, Arc::new(ExtractiveSummarizer)).keep_recent(1);
        let _ = compaction
            .before_request(&mut session, &RequestContext::default())
            .await
            .unwrap();

        assert_eq!(session.conversation().pending(), ["c1".to_string()]);
        let results = vec![ToolCallResult::ok("c1", json!("data"), Duration::ZERO)];
        assert!(session.append(Turn::tool_results(results)).is_ok());
    }

    #[test]
    fn test_standard_chain_order() {
        let chain = standard_chain(
            BudgetSettings {
                max_turns: Some(5),
                max_cost: Some(2.0),
                context_budget: Some(1000),
                keep_recent: 4,
                ..Default::default()
            },
            Arc::new(ExtractiveSummarizer),
        );
        assert_eq!(
            chain.names(),
            vec!["usage_accounting", "turn_limit", "price_limit", "context_compaction"]
        );
    }
}
