/// Middleware trait and the ordered chain that runs it.
///
/// Middleware run sequentially in registration order around each model
/// request. The first one to return a terminal decision halts the chain for
/// that phase. A middleware that errors is logged and skipped.
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use forgeloop_core::{ModelResponse, SessionState};
use tracing::{debug, info, warn};

use crate::types::{Decision, MiddlewarePhase, RequestContext};

// ---------------------------------------------------------------------------
// Middleware trait
// ---------------------------------------------------------------------------

/// A budget or bookkeeping step wrapped around model requests. Both phases
/// default to `Continue`, so implementors override only what they need.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    async fn before_request(
        &self,
        _session: &mut SessionState,
        _context: &RequestContext,
    ) -> Result<Decision> {
        Ok(Decision::Continue)
    }

    async fn after_response(
        &self,
        _session: &mut SessionState,
        _response: &ModelResponse,
    ) -> Result<Decision> {
        Ok(Decision::Continue)
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

#[derive(Default, Clone)]
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    pub fn with(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.push(middleware);
        self
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.middlewares.iter().map(|m| m.name()).collect()
    }

    pub async fn run_pre(&self, session: &mut SessionState, context: &RequestContext) -> Decision {
        for middleware in &self.middlewares {
            debug!(middleware = middleware.name(), phase = ?MiddlewarePhase::Pre, "Running middleware");
            match middleware.before_request(session, context).await {
                Ok(Decision::Continue) => {}
                Ok(decision) => {
                    info!(middleware = middleware.name(), phase = ?MiddlewarePhase::Pre, ?decision, "Chain halted");
                    return decision;
                }
                Err(e) => {
                    warn!(middleware = middleware.name(), error = %e, "Middleware failed; skipping");
                }
            }
        }
        Decision::Continue
    }

    pub async fn run_post(&self, session: &mut SessionState, response: &ModelResponse) -> Decision {
        for middleware in &self.middlewares {
            debug!(middleware = middleware.name(), phase = ?MiddlewarePhase::Post, "Running middleware");
            match middleware.after_response(session, response).await {
                Ok(Decision::Continue) => {}
                Ok(decision) => {
                    info!(middleware = middleware.name(), phase = ?MiddlewarePhase::Post, ?decision, "Chain halted");
                    return decision;
                }
                Err(e) => {
                    warn!(middleware = middleware.name(), error = %e, "Middleware failed; skipping");
                }
            }
        }
        Decision::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeloop_core::TerminationReason;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        decision: Decision,
        fail: bool,
    }

    #[async_trait]
    impl Middleware for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        async fn before_request(&self, _: &mut SessionState, _: &RequestContext) -> Result<Decision> {
            self.log.lock().unwrap().push(self.name);
            if self.fail {
                anyhow::bail!("broken");
            }
            Ok(self.decision.clone())
        }
    }

    fn recorder(
        name: &'static str,
        log: &Arc<Mutex<Vec<&'static str>>>,
        decision: Decision,
        fail: bool,
    ) -> Arc<dyn Middleware> {
        Arc::new(Recorder { name, log: Arc::clone(log), decision, fail })
    }

    #[tokio::test]
    async fn test_runs_in_order_and_short_circuits() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = MiddlewareChain::new()
            .with(recorder("first", &log, Decision::Continue, false))
            .with(recorder("stop", &log, Decision::terminate(TerminationReason::TurnLimit, "done"), false))
            .with(recorder("never", &log, Decision::Continue, false));

        let mut session = SessionState::new();
        let decision = chain.run_pre(&mut session, &RequestContext::default()).await;

        assert_eq!(decision, Decision::terminate(TerminationReason::TurnLimit, "done"));
        assert_eq!(*log.lock().unwrap(), vec!["first", "stop"]);
    }

    #[tokio::test]
    async fn test_errors_are_not_fatal() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = MiddlewareChain::new()
            .with(recorder("broken", &log, Decision::Continue, true))
            .with(recorder("after", &log, Decision::Continue, false));

        let mut session = SessionState::new();
        let decision = chain.run_pre(&mut session, &RequestContext::default()).await;

        assert_eq!(decision, Decision::Continue);
        assert_eq!(*log.lock().unwrap(), vec!["broken", "after"]);
    }

    #[tokio::test]
    async fn test_default_post_continues() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = MiddlewareChain::new().with(recorder("pre_only", &log, Decision::Continue, false));
        let mut session = SessionState::new();
        let decision = chain.run_post(&mut session, &ModelResponse::text("hi")).await;
        assert_eq!(decision, Decision::Continue);
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(chain.names(), vec!["pre_only"]);
    }
}
