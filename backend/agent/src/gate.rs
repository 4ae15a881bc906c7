//! Approval gate backed by the session's interaction channel.
//!
//! Applies the approval mode, publishes `AwaitingUserInput` while a prompt is
//! open and turns session cancellation into a cancelled outcome.

use std::sync::Arc;

use async_trait::async_trait;
use forgeloop_core::{
    Answer, ApprovalMode, CancellationToken, ConfirmationOutcome, ConfirmationPrompt, EventKind,
    InteractionChannel, Question, ToolCallRequest,
};
use forgeloop_tools::{ApprovalGate, ToolDefinition};
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use uuid::Uuid;

use crate::events::EventSink;
use crate::phase::Phase;

pub struct InteractiveGate {
    session_id: Uuid,
    mode: ApprovalMode,
    channel: Option<Arc<dyn InteractionChannel>>,
    cancel: CancellationToken,
    phase: Arc<watch::Sender<Phase>>,
    events: EventSink,
    waits: Option<mpsc::UnboundedSender<bool>>,
}

impl InteractiveGate {
    pub fn new(
        session_id: Uuid,
        mode: ApprovalMode,
        channel: Option<Arc<dyn InteractionChannel>>,
        cancel: CancellationToken,
        phase: Arc<watch::Sender<Phase>>,
    ) -> Self {
        Self {
            session_id,
            mode,
            channel,
            cancel,
            phase,
            events: EventSink::disabled(),
            waits: None,
        }
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Report `true` when a prompt opens and `false` when it closes.
    pub fn with_wait_signal(mut self, waits: mpsc::UnboundedSender<bool>) -> Self {
        self.waits = Some(waits);
        self
    }

    fn signal_wait(&self, waiting: bool) {
        if let Some(waits) = &self.waits {
            let _ = waits.send(waiting);
        }
    }

    fn enter_wait(&self, kind: &str, call_id: &str) {
        self.phase.send_replace(Phase::AwaitingUserInput);
        self.signal_wait(true);
        self.events.emit(
            self.session_id,
            EventKind::UserInputRequested,
            json!({ "kind": kind, "call_id": call_id }),
        );
    }

    fn leave_wait(&self) {
        self.signal_wait(false);
        self.phase.send_replace(Phase::ExecutingTools);
    }
}

#[async_trait]
impl ApprovalGate for InteractiveGate {
    async fn confirm(
        &self,
        request: &ToolCallRequest,
        definition: &ToolDefinition,
    ) -> ConfirmationOutcome {
        match self.mode {
            ApprovalMode::AutoApprove => {
                info!(session_id = %self.session_id, tool = %request.name, "Auto-approved tool call");
                return ConfirmationOutcome::Approved;
            }
            ApprovalMode::Plan => {
                info!(session_id = %self.session_id, tool = %request.name, "Plan mode: tool call refused");
                return ConfirmationOutcome::Denied;
            }
            ApprovalMode::ApprovalRequired => {}
        }
        let Some(channel) = &self.channel else {
            warn!(
                session_id = %self.session_id,
                tool = %request.name,
                "No interaction channel to confirm tool call; denying"
            );
            return ConfirmationOutcome::Denied;
        };

        let prompt = ConfirmationPrompt {
            call_id: request.id.clone(),
            tool_name: request.name.clone(),
            arguments: request.arguments.clone(),
            summary: definition.summary(request),
        };
        self.enter_wait("confirmation", &request.id);
        let outcome = tokio::select! {
            outcome = channel.request_confirmation(&prompt) => outcome,
            _ = self.cancel.cancelled() => ConfirmationOutcome::Cancelled,
        };
        self.leave_wait();
        outcome
    }

    async fn clarify(&self, question: &Question) -> Answer {
        let Some(channel) = &self.channel else {
            return Answer::Cancelled;
        };
        self.enter_wait("clarification", &question.call_id);
        let answer = tokio::select! {
            answer = channel.deliver_answer(question) => answer,
            _ = self.cancel.cancelled() => Answer::Cancelled,
        };
        self.leave_wait();
        answer
    }

    fn interactive(&self) -> bool {
        self.channel.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedChannel;
    use serde_json::json;

    fn gate(mode: ApprovalMode, channel: Option<Arc<dyn InteractionChannel>>) -> InteractiveGate {
        let (tx, _rx) = watch::channel(Phase::ExecutingTools);
        InteractiveGate::new(Uuid::new_v4(), mode, channel, CancellationToken::new(), Arc::new(tx))
    }

    fn write_tool() -> ToolDefinition {
        ToolDefinition::new("write_file", "write", json!({"type": "object"})).requires_confirmation()
    }

    fn call() -> ToolCallRequest {
        ToolCallRequest::new("c1", "write_file", json!({"path": "a.rs"}))
    }

    #[tokio::test]
    async fn test_modes_without_prompting() {
        let channel = Arc::new(ScriptedChannel::new().confirm(ConfirmationOutcome::Denied));
        let dyn_channel: Arc<dyn InteractionChannel> = channel.clone();
        let auto = gate(ApprovalMode::AutoApprove, Some(dyn_channel.clone()));
        assert_eq!(auto.confirm(&call(), &write_tool()).await, ConfirmationOutcome::Approved);
        let plan = gate(ApprovalMode::Plan, Some(dyn_channel));
        assert_eq!(plan.confirm(&call(), &write_tool()).await, ConfirmationOutcome::Denied);
        assert_eq!(channel.prompts().len(), 0);
    }

    #[tokio::test]
    async fn test_no_channel_denies() {
        let gate = gate(ApprovalMode::ApprovalRequired, None);
        assert_eq!(gate.confirm(&call(), &write_tool()).await, ConfirmationOutcome::Denied);
        assert!(!gate.interactive());
    }

    #[tokio::test]
    async fn test_prompt_carries_summary() {
        let channel = Arc::new(ScriptedChannel::new().confirm(ConfirmationOutcome::Approved));
        let (waits_tx, mut waits) = mpsc::unbounded_channel();
        let gate = gate(ApprovalMode::ApprovalRequired, Some(channel.clone() as Arc<dyn InteractionChannel>))
            .with_wait_signal(waits_tx);
        assert_eq!(gate.confirm(&call(), &write_tool()).await, ConfirmationOutcome::Approved);
        assert!(waits.try_recv().unwrap());
        assert!(!waits.try_recv().unwrap());
        let prompts = channel.prompts();
        assert_eq!(prompts[0].call_id, "c1");
        assert_eq!(prompts[0].summary, "write_file");
    }

    #[tokio::test]
    async fn test_cancel_while_waiting() {
        let channel: Arc<dyn InteractionChannel> = Arc::new(ScriptedChannel::new().hang());
        let (tx, rx) = watch::channel(Phase::ExecutingTools);
        let cancel = CancellationToken::new();
        let gate = InteractiveGate::new(
            Uuid::new_v4(),
            ApprovalMode::ApprovalRequired,
            Some(channel),
            cancel.clone(),
            Arc::new(tx),
        );
        let waiter = async {
            let mut rx = rx;
            rx.wait_for(|p| *p == Phase::AwaitingUserInput).await.unwrap();
            cancel.cancel();
        };
        let (c, t) = (call(), write_tool());
        let (outcome, ()) = tokio::join!(gate.confirm(&c, &t), waiter);
        assert_eq!(outcome, ConfirmationOutcome::Cancelled);
    }
}
