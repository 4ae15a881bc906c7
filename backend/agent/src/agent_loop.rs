//! Core agent execution loop.
//!
//! One [`Orchestrator`] drives one session: it builds the request, runs the
//! middleware chain around each model call, dispatches tool calls through the
//! registry and appends everything to the conversation in order. The loop
//! runs until the model yields a plain reply or the session terminates.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use forgeloop_core::{
    AgentError, ApprovalMode, CancellationToken, EventKind, InteractionChannel, ModelBackend,
    ModelResponse, Role, SessionPersistence, SessionState, TerminationReason, ToolCallRequest,
    Turn,
};
use forgeloop_middleware::{Decision, MiddlewareChain, RequestContext};
use forgeloop_tools::ToolRegistry;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::context_window::ContextWindow;
use crate::events::EventSink;
use crate::gate::InteractiveGate;
use crate::phase::Phase;

/// How a call into the loop ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The model replied without tool calls; the loop waits for the next
    /// user message.
    Yielded { reply: String },
    Terminated {
        reason: TerminationReason,
        detail: Option<String>,
    },
}

impl RunOutcome {
    pub fn is_terminated(&self) -> bool {
        matches!(self, RunOutcome::Terminated { .. })
    }

    pub fn termination_reason(&self) -> Option<TerminationReason> {
        match self {
            RunOutcome::Terminated { reason, .. } => Some(*reason),
            RunOutcome::Yielded { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct OrchestratorBuilder {
    backend: Arc<dyn ModelBackend>,
    registry: Arc<ToolRegistry>,
    chain: MiddlewareChain,
    context: ContextWindow,
    approval: ApprovalMode,
    channel: Option<Arc<dyn InteractionChannel>>,
    persistence: Option<Arc<dyn SessionPersistence>>,
    events: EventSink,
    complete_on_final_text: bool,
    autosave: bool,
    session: Option<SessionState>,
}

impl OrchestratorBuilder {
    pub fn new(backend: Arc<dyn ModelBackend>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            backend,
            registry,
            chain: MiddlewareChain::new(),
            context: ContextWindow::new(""),
            approval: ApprovalMode::default(),
            channel: None,
            persistence: None,
            events: EventSink::disabled(),
            complete_on_final_text: false,
            autosave: true,
            session: None,
        }
    }

    pub fn middleware(mut self, chain: MiddlewareChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn context_window(mut self, context: ContextWindow) -> Self {
        self.context = context;
        self
    }

    pub fn approval_mode(mut self, mode: ApprovalMode) -> Self {
        self.approval = mode;
        self
    }

    pub fn channel(mut self, channel: Arc<dyn InteractionChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn persistence(mut self, persistence: Arc<dyn SessionPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn events(mut self, tx: mpsc::Sender<forgeloop_core::SessionEvent>) -> Self {
        self.events = EventSink::new(tx);
        self
    }

    pub fn complete_on_final_text(mut self, enabled: bool) -> Self {
        self.complete_on_final_text = enabled;
        self
    }

    /// Save a snapshot after every step (needs a persistence backend).
    pub fn autosave(mut self, enabled: bool) -> Self {
        self.autosave = enabled;
        self
    }

    /// Continue an existing session instead of starting a fresh one.
    pub fn session(mut self, session: SessionState) -> Self {
        self.session = Some(session);
        self
    }

    pub fn build(self) -> Orchestrator {
        let session = self.session.unwrap_or_default();
        let (phase_tx, _) = watch::channel(Phase::Idle);
        if session.is_terminated() {
            phase_tx.send_replace(Phase::Terminated(session.termination_reason()));
        }
        Orchestrator {
            session,
            backend: self.backend,
            registry: self.registry,
            chain: self.chain,
            context: self.context,
            approval: self.approval,
            channel: self.channel,
            persistence: self.persistence,
            events: self.events,
            phase: Arc::new(phase_tx),
            cancel: CancellationToken::new(),
            complete_on_final_text: self.complete_on_final_text,
            autosave: self.autosave,
        }
    }

    /// Load `session_id` from the persistence backend and build around it.
    pub async fn build_resumed(mut self, session_id: Uuid) -> anyhow::Result<Orchestrator> {
        let store = self
            .persistence
            .clone()
            .ok_or_else(|| anyhow!("resuming a session needs a persistence backend"))?;
        let snapshot = store
            .load(session_id)
            .await?
            .ok_or_else(|| anyhow!("no saved session {session_id}"))?;
        let session = SessionState::from_snapshot(snapshot)
            .with_context(|| format!("saved session {session_id} is inconsistent"))?;
        self.session = Some(session);
        Ok(self.build())
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    session: SessionState,
    backend: Arc<dyn ModelBackend>,
    registry: Arc<ToolRegistry>,
    chain: MiddlewareChain,
    context: ContextWindow,
    approval: ApprovalMode,
    channel: Option<Arc<dyn InteractionChannel>>,
    persistence: Option<Arc<dyn SessionPersistence>>,
    events: EventSink,
    phase: Arc<watch::Sender<Phase>>,
    cancel: CancellationToken,
    complete_on_final_text: bool,
    autosave: bool,
}

impl Orchestrator {
    pub fn builder(backend: Arc<dyn ModelBackend>, registry: Arc<ToolRegistry>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(backend, registry)
    }

    pub fn id(&self) -> Uuid {
        self.session.id()
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Observe phase changes.
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Token that aborts the session from any suspension point.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Begin the session with the user's task.
    #[instrument(skip_all, fields(session_id = %self.session.id()))]
    pub async fn start(&mut self, task: impl Into<String>) -> RunOutcome {
        self.emit(EventKind::SessionStarted, json!({ "resumed": false }));
        info!(backend = self.backend.name(), tools = self.registry.len(), "Starting session");
        self.push_user(task.into()).await
    }

    /// Continue a yielded session with another user message.
    #[instrument(skip_all, fields(session_id = %self.session.id()))]
    pub async fn send_user_message(&mut self, text: impl Into<String>) -> RunOutcome {
        self.push_user(text.into()).await
    }

    /// Pick a restored session up where it stopped. Calls left unresolved by
    /// the previous process are dispatched again before the next request.
    #[instrument(skip_all, fields(session_id = %self.session.id()))]
    pub async fn resume(&mut self) -> RunOutcome {
        if self.session.is_terminated() {
            return self.terminated_outcome();
        }
        self.emit(EventKind::SessionStarted, json!({ "resumed": true }));

        if !self.session.conversation().pending().is_empty() {
            let calls = self.last_turn_calls();
            info!(calls = calls.len(), "Re-dispatching unresolved tool calls");
            if let Some(outcome) = self.execute_tools(&calls).await {
                return outcome;
            }
            // The original response is gone; the turn is still counted.
            let decision = self.chain.run_post(&mut self.session, &ModelResponse::default()).await;
            self.save().await;
            if let Decision::Terminate { reason, detail } = decision {
                return self.stop(reason, detail).await;
            }
            return self.run().await;
        }

        let last = self
            .session
            .conversation()
            .last()
            .map(|turn| (turn.role, turn.text.clone()));
        match last {
            Some((Role::Assistant, reply)) => {
                self.set_phase(Phase::AwaitingModel);
                RunOutcome::Yielded { reply }
            }
            Some(_) => self.run().await,
            None => RunOutcome::Yielded { reply: String::new() },
        }
    }

    async fn push_user(&mut self, text: String) -> RunOutcome {
        if self.session.is_terminated() {
            warn!(reason = %self.session.termination_reason(), "Message sent to a terminated session");
            return self.terminated_outcome();
        }
        if let Err(violation) = self.session.append(Turn::user(text)) {
            return self.fail(violation.into()).await;
        }
        self.run().await
    }

    /// Drive the loop until the model yields or the session terminates.
    pub async fn run(&mut self) -> RunOutcome {
        loop {
            if self.session.is_terminated() {
                return self.terminated_outcome();
            }
            if self.cancel.is_cancelled() {
                return self
                    .finish(TerminationReason::UserAbort, Some("cancelled".into()))
                    .await;
            }

            let tools = self.registry.schemas();
            let context = RequestContext {
                next_request_estimate: self.context.request_overhead(&tools),
            };
            let compactions_before = self.session.conversation().compactions().len();
            let decision = self.chain.run_pre(&mut self.session, &context).await;
            self.report_compactions(compactions_before);
            if let Decision::Terminate { reason, detail } = decision {
                return self.stop(reason, detail).await;
            }

            self.set_phase(Phase::AwaitingModel);
            let request = self.context.build_request(&self.session, tools);
            self.emit(
                EventKind::ModelRequested,
                json!({ "turns": request.turns.len(), "tools": request.tools.len() }),
            );
            debug!(turns = request.turns.len(), backend = self.backend.name(), "Sending model request");

            let sent = tokio::select! {
                sent = self.backend.send(&request) => Some(sent),
                _ = self.cancel.cancelled() => None,
            };
            let response = match sent {
                None => {
                    return self
                        .finish(TerminationReason::UserAbort, Some("cancelled while awaiting the model".into()))
                        .await;
                }
                Some(Err(e)) => return self.fail(AgentError::Backend(e)).await,
                Some(Ok(response)) => response,
            };

            self.set_phase(Phase::ParsingResponse);
            self.emit(
                EventKind::ModelResponded,
                json!({
                    "text": response.text,
                    "tool_calls": response.tool_calls.len(),
                    "input_tokens": response.usage.input_tokens,
                    "output_tokens": response.usage.output_tokens,
                    "completed": response.completed,
                }),
            );
            let turn = Turn::assistant(response.text.clone(), response.tool_calls.clone());
            if let Err(violation) = self.session.append(turn) {
                return self.fail(violation.into()).await;
            }
            // The stored copies carry the issuing turn's sequence number.
            let calls = self.last_turn_calls();

            if calls.is_empty() {
                let decision = self.chain.run_post(&mut self.session, &response).await;
                if response.completed || self.complete_on_final_text {
                    return self.finish(TerminationReason::Completed, None).await;
                }
                if let Decision::Terminate { reason, detail } = decision {
                    return self.stop(reason, detail).await;
                }
                self.set_phase(Phase::AwaitingModel);
                self.save().await;
                return RunOutcome::Yielded { reply: response.text };
            }

            if let Some(outcome) = self.execute_tools(&calls).await {
                return outcome;
            }
            let decision = self.chain.run_post(&mut self.session, &response).await;
            if let Decision::Terminate { reason, detail } = decision {
                return self.stop(reason, detail).await;
            }
            if response.completed {
                return self.finish(TerminationReason::Completed, None).await;
            }
            self.save().await;
        }
    }

    /// Dispatch one turn's calls and append their results. Returns an outcome
    /// only when the session terminated along the way.
    async fn execute_tools(&mut self, calls: &[ToolCallRequest]) -> Option<RunOutcome> {
        self.set_phase(Phase::ExecutingTools);
        self.emit(
            EventKind::ToolCallsDispatched,
            json!({
                "calls": calls
                    .iter()
                    .map(|c| {
                        json!({"id": c.id, "tool": c.name, "arguments": c.arguments, "turn_seq": c.turn_seq})
                    })
                    .collect::<Vec<_>>(),
            }),
        );

        let (wait_tx, mut waits) = mpsc::unbounded_channel();
        let gate = InteractiveGate::new(
            self.session.id(),
            self.approval,
            self.channel.clone(),
            self.cancel.clone(),
            Arc::clone(&self.phase),
        )
        .with_events(self.events.clone())
        .with_wait_signal(wait_tx);

        // The session is marked awaiting only while a prompt is open.
        let report = {
            let dispatch = self.registry.dispatch(calls, &gate, &self.cancel);
            tokio::pin!(dispatch);
            loop {
                tokio::select! {
                    biased;
                    Some(waiting) = waits.recv() => {
                        self.session.set_awaiting_user(waiting);
                        if waiting {
                            self.save().await;
                        }
                    }
                    report = &mut dispatch => break report,
                }
            }
        };
        self.session.set_awaiting_user(false);

        let statuses: Vec<_> = report
            .results
            .iter()
            .map(|r| json!({"id": r.id, "status": r.status}))
            .collect();
        if let Err(violation) = self.session.append(Turn::tool_results(report.results)) {
            return Some(self.fail(violation.into()).await);
        }
        self.emit(EventKind::ToolCallsResolved, json!({ "results": statuses }));

        if report.user_aborted {
            return Some(
                self.finish(TerminationReason::UserAbort, Some("cancelled by user".into()))
                    .await,
            );
        }
        None
    }

    fn last_turn_calls(&self) -> Vec<ToolCallRequest> {
        self.session
            .conversation()
            .last()
            .map(|turn| turn.tool_calls.clone())
            .unwrap_or_default()
    }

    fn report_compactions(&self, before: usize) {
        for record in &self.session.conversation().compactions()[before..] {
            self.emit(
                EventKind::CompactionApplied,
                json!({
                    "start": record.superseded.start,
                    "end": record.superseded.end,
                    "turns": record.turn_count,
                    "tokens_saved": record.tokens_saved(),
                }),
            );
        }
    }

    /// Apply a terminal middleware decision.
    async fn stop(&mut self, reason: TerminationReason, detail: String) -> RunOutcome {
        if !reason.is_budget_stop() {
            return self.finish(reason, Some(detail)).await;
        }
        let err = AgentError::BudgetExceeded(reason);
        info!(session_id = %self.session.id(), error = %err, detail = %detail, "Budget exhausted");
        self.finish(err.termination_reason(), Some(detail)).await
    }

    async fn fail(&mut self, err: AgentError) -> RunOutcome {
        error!(session_id = %self.session.id(), error = %err, "Session failed");
        let reason = err.termination_reason();
        self.finish(reason, Some(err.to_string())).await
    }

    async fn finish(&mut self, reason: TerminationReason, detail: Option<String>) -> RunOutcome {
        if self.session.terminate(reason, detail) {
            let counters = self.session.counters();
            self.emit(
                EventKind::SessionTerminated,
                json!({
                    "reason": reason,
                    "detail": self.session.termination_detail(),
                    "turns_used": counters.turns_used,
                    "cost_accrued": counters.cost_accrued,
                }),
            );
        }
        self.set_phase(Phase::Terminated(self.session.termination_reason()));
        self.save().await;
        self.terminated_outcome()
    }

    fn terminated_outcome(&self) -> RunOutcome {
        RunOutcome::Terminated {
            reason: self.session.termination_reason(),
            detail: self.session.termination_detail().map(String::from),
        }
    }

    fn set_phase(&self, phase: Phase) {
        let previous = self.phase.send_replace(phase);
        if previous != phase {
            debug!(session_id = %self.session.id(), from = %previous, to = %phase, "Phase changed");
            self.emit(EventKind::PhaseChanged, json!({ "from": previous, "to": phase }));
        }
    }

    fn emit(&self, kind: EventKind, payload: serde_json::Value) {
        self.events.emit(self.session.id(), kind, payload);
    }

    async fn save(&self) {
        if !self.autosave {
            return;
        }
        let Some(store) = &self.persistence else { return };
        if let Err(e) = store.save(&self.session.snapshot()).await {
            warn!(session_id = %self.session.id(), error = %e, "Failed to save session");
        }
    }
}
