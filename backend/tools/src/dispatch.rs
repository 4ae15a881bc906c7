//! Validated, order-preserving execution of one assistant turn's tool calls.
//!
//! Calls are partitioned in request order. A maximal run of consecutive
//! concurrency-safe calls forms one batch that runs concurrently (bounded by
//! the registry's limit); every other call runs alone, after everything
//! before it has resolved. Confirmation and clarification calls go through
//! the [`ApprovalGate`] one at a time. Results always come back in request
//! order, one per request.

use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use forgeloop_core::{
    AgentError, Answer, CancellationToken, ConfirmationOutcome, Question, ToolCallRequest,
    ToolCallResult, ToolStatus,
};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::registry::{ToolDefinition, ToolKind, ToolRegistry};

/// Where user decisions come from while tools are being dispatched.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn confirm(
        &self,
        request: &ToolCallRequest,
        definition: &ToolDefinition,
    ) -> ConfirmationOutcome;

    async fn clarify(&self, question: &Question) -> Answer;

    /// Whether a user is present to answer questions. Clarification tools run
    /// without an answer when this is false.
    fn interactive(&self) -> bool {
        true
    }
}

/// Gate for headless runs: approves every call, asks nobody.
pub struct AutoApprove;

#[async_trait]
impl ApprovalGate for AutoApprove {
    async fn confirm(&self, _: &ToolCallRequest, _: &ToolDefinition) -> ConfirmationOutcome {
        ConfirmationOutcome::Approved
    }

    async fn clarify(&self, _: &Question) -> Answer {
        Answer::Cancelled
    }

    fn interactive(&self) -> bool {
        false
    }
}

/// Outcome of dispatching one turn's calls.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    /// One result per request, in request order.
    pub results: Vec<ToolCallResult>,
    /// The user cancelled a prompt or the session was cancelled mid-dispatch.
    pub user_aborted: bool,
}

enum Segment {
    Batch(Vec<usize>),
    Serial(usize),
    Confirm(usize),
    Clarify(usize),
}

impl Segment {
    fn indices(&self) -> Vec<usize> {
        match self {
            Segment::Batch(idx) => idx.clone(),
            Segment::Serial(i) | Segment::Confirm(i) | Segment::Clarify(i) => vec![*i],
        }
    }
}

/// Build a `Question` from an `ask_user`-style argument object.
pub fn question_from(request: &ToolCallRequest) -> Question {
    let options = request
        .arguments
        .get("options")
        .and_then(Value::as_array)
        .map(|opts| opts.iter().filter_map(Value::as_str).map(String::from).collect())
        .unwrap_or_default();
    Question {
        call_id: request.id.clone(),
        question: request
            .arguments
            .get("question")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        options,
    }
}

fn error_result(request: &ToolCallRequest, err: &AgentError, duration: Duration) -> ToolCallResult {
    ToolCallResult::failed(
        &request.id,
        err.tool_status().unwrap_or(ToolStatus::ToolError),
        err.to_string(),
        duration,
    )
}

impl ToolRegistry {
    /// Resolve every request of one assistant turn.
    #[instrument(skip_all, fields(calls = requests.len()))]
    pub async fn dispatch(
        &self,
        requests: &[ToolCallRequest],
        gate: &dyn ApprovalGate,
        cancel: &CancellationToken,
    ) -> DispatchReport {
        let mut slots: Vec<Option<ToolCallResult>> = vec![None; requests.len()];
        let mut segments = Vec::new();
        let mut batch = Vec::new();

        for (i, request) in requests.iter().enumerate() {
            let tool = match self.validate(request) {
                Ok(tool) => tool,
                Err(err) => {
                    warn!(tool = %request.name, call_id = %request.id, error = %err, "Rejected tool call");
                    slots[i] = Some(error_result(request, &err, Duration::ZERO));
                    continue;
                }
            };
            let def = &tool.definition;
            let segment = if def.kind == ToolKind::Clarification {
                Segment::Clarify(i)
            } else if def.requires_confirmation {
                Segment::Confirm(i)
            } else if def.concurrency_safe {
                batch.push(i);
                continue;
            } else {
                Segment::Serial(i)
            };
            if !batch.is_empty() {
                segments.push(Segment::Batch(mem::take(&mut batch)));
            }
            segments.push(segment);
        }
        if !batch.is_empty() {
            segments.push(Segment::Batch(batch));
        }

        let mut aborted = false;
        let mut denied = false;

        for segment in segments {
            if aborted || cancel.is_cancelled() {
                aborted = true;
                for i in segment.indices() {
                    slots[i] = Some(ToolCallResult::cancelled(&requests[i].id, "cancelled before start"));
                }
                continue;
            }

            match segment {
                Segment::Batch(indices) => {
                    debug!(size = indices.len(), "Running concurrent batch");
                    let results: Vec<(usize, ToolCallResult)> = stream::iter(indices)
                        .map(|i| async move {
                            (i, self.run_call(&requests[i], &requests[i].arguments, Some(cancel)).await)
                        })
                        .buffer_unordered(self.max_concurrency)
                        .collect()
                        .await;
                    for (i, result) in results {
                        slots[i] = Some(result);
                    }
                }
                Segment::Serial(i) => {
                    slots[i] = Some(self.run_call(&requests[i], &requests[i].arguments, None).await);
                }
                Segment::Confirm(i) => {
                    let request = &requests[i];
                    if denied {
                        slots[i] = Some(ToolCallResult::cancelled(
                            &request.id,
                            "skipped after an earlier call was denied",
                        ));
                        continue;
                    }
                    let Some(def) = self.definition(&request.name) else {
                        continue;
                    };
                    let outcome = gate.confirm(request, def).await;
                    info!(tool = %request.name, call_id = %request.id, ?outcome, "Confirmation resolved");
                    slots[i] = Some(match outcome {
                        ConfirmationOutcome::Approved => {
                            self.run_call(request, &request.arguments, None).await
                        }
                        ConfirmationOutcome::Denied => {
                            denied = true;
                            ToolCallResult::cancelled(&request.id, "denied by user")
                        }
                        ConfirmationOutcome::Cancelled => {
                            aborted = true;
                            ToolCallResult::cancelled(&request.id, "cancelled by user")
                        }
                    });
                }
                Segment::Clarify(i) => {
                    let request = &requests[i];
                    if !gate.interactive() {
                        slots[i] = Some(self.run_call(request, &request.arguments, None).await);
                        continue;
                    }
                    match gate.clarify(&question_from(request)).await {
                        Answer::Text(answer) => {
                            let mut arguments = request.arguments.clone();
                            if let Some(map) = arguments.as_object_mut() {
                                map.insert("user_response".to_string(), Value::String(answer));
                            }
                            slots[i] = Some(self.run_call(request, &arguments, None).await);
                        }
                        Answer::Cancelled => {
                            aborted = true;
                            slots[i] = Some(ToolCallResult::cancelled(&request.id, "cancelled by user"));
                        }
                    }
                }
            }
        }

        if cancel.is_cancelled() {
            aborted = true;
        }

        let results = slots
            .into_iter()
            .zip(requests)
            .map(|(slot, request)| {
                slot.unwrap_or_else(|| ToolCallResult::cancelled(&request.id, "not executed"))
            })
            .collect();

        DispatchReport {
            results,
            user_aborted: aborted,
        }
    }

    /// Run one validated call under its timeout. `cancel` is only passed for
    /// concurrency-safe calls, which may be abandoned mid-flight.
    async fn run_call(
        &self,
        request: &ToolCallRequest,
        arguments: &Value,
        cancel: Option<&CancellationToken>,
    ) -> ToolCallResult {
        let Some(tool) = self.get(&request.name) else {
            let err = AgentError::Validation {
                tool: request.name.clone(),
                message: "unknown tool".to_string(),
            };
            return error_result(request, &err, Duration::ZERO);
        };
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return ToolCallResult::cancelled(&request.id, "cancelled before start");
        }

        let timeout = tool.definition.timeout.unwrap_or(self.default_timeout);
        let token = cancel.map(CancellationToken::child_token).unwrap_or_default();
        let executor = Arc::clone(&tool.executor);
        let args = arguments.clone();
        let exec_token = token.clone();
        let started = Instant::now();

        // A spawned task turns executor panics into join errors.
        let mut handle = tokio::spawn(async move { executor.execute(args, exec_token).await });
        let run = tokio::time::timeout(timeout, &mut handle);
        let outcome = match cancel {
            Some(parent) => tokio::select! {
                joined = run => Some(joined),
                _ = parent.cancelled() => None,
            },
            None => Some(run.await),
        };
        let elapsed = started.elapsed();

        match outcome {
            None => {
                token.cancel();
                warn!(tool = %request.name, call_id = %request.id, "Tool call cancelled while running");
                ToolCallResult::failed(&request.id, ToolStatus::Cancelled, "cancelled while running", elapsed)
            }
            Some(Err(_)) => {
                token.cancel();
                let err = AgentError::ToolTimeout {
                    tool: request.name.clone(),
                    timeout,
                };
                warn!(tool = %request.name, call_id = %request.id, ?timeout, "Tool call timed out");
                error_result(request, &err, elapsed)
            }
            Some(Ok(Ok(Ok(payload)))) => {
                debug!(tool = %request.name, call_id = %request.id, ?elapsed, "Tool call succeeded");
                ToolCallResult::ok(&request.id, payload, elapsed)
            }
            Some(Ok(Ok(Err(e)))) => {
                let err = AgentError::ToolExecution {
                    tool: request.name.clone(),
                    message: format!("{e:#}"),
                };
                warn!(tool = %request.name, call_id = %request.id, error = %err, "Tool call failed");
                error_result(request, &err, elapsed)
            }
            Some(Ok(Err(join_err))) => {
                let err = AgentError::ToolExecution {
                    tool: request.name.clone(),
                    message: if join_err.is_panic() {
                        "executor panicked".to_string()
                    } else {
                        join_err.to_string()
                    },
                };
                warn!(tool = %request.name, call_id = %request.id, error = %err, "Tool task aborted");
                error_result(request, &err, elapsed)
            }
        }
    }
}
