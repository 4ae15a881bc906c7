//! `ask_user`: the model asks the user a clarifying question.
//!
//! The dispatcher routes calls through the approval gate, which suspends the
//! loop until the user answers, then hands the answer to this executor as
//! `user_response`. Without an interactive user the call still resolves,
//! echoing the question so the model can proceed on its own judgement.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use forgeloop_core::{CancellationToken, ToolExecutor};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::registry::{RegistryError, ToolDefinition, ToolRegistry};

pub const ASK_USER_TOOL: &str = "ask_user";

#[derive(Debug, Deserialize)]
struct AskUserArgs {
    question: String,
    #[serde(default)]
    options: Option<Vec<String>>,
    #[serde(default)]
    user_response: Option<String>,
}

#[derive(Debug, Serialize)]
struct AskUserOutput {
    question: String,
    options: Option<Vec<String>>,
    user_response: Option<String>,
    message: String,
}

pub struct AskUserTool;

impl AskUserTool {
    pub fn definition() -> ToolDefinition {
        ToolDefinition::new(
            ASK_USER_TOOL,
            "Ask the user a clarifying question when requirements are ambiguous, \
             a choice between approaches is needed, or a preference matters. \
             Offer 2-4 short options when the answer is a choice.",
            json!({
                "type": "object",
                "properties": {
                    "question": {
                        "type": "string",
                        "minLength": 1,
                        "description": "The question to ask. Be specific."
                    },
                    "options": {
                        "type": "array",
                        "items": { "type": "string" },
                        "minItems": 2,
                        "maxItems": 4,
                        "description": "Optional answers the user can pick from."
                    }
                },
                "required": ["question"],
                "additionalProperties": false
            }),
        )
        .clarification()
        .with_status_label("Asking user")
    }

    pub fn register(registry: &mut ToolRegistry) -> Result<(), RegistryError> {
        registry.register(Self::definition(), Arc::new(Self))
    }
}

#[async_trait]
impl ToolExecutor for AskUserTool {
    async fn execute(&self, arguments: Value, _cancel: CancellationToken) -> anyhow::Result<Value> {
        let args: AskUserArgs =
            serde_json::from_value(arguments).context("invalid ask_user arguments")?;

        let message = match &args.user_response {
            Some(answer) => format!("User answered: {answer}"),
            None => match &args.options {
                Some(options) if !options.is_empty() => {
                    format!("Question: {}\nOptions: {}", args.question, options.join(", "))
                }
                _ => format!("Question: {}", args.question),
            },
        };

        Ok(serde_json::to_value(AskUserOutput {
            question: args.question,
            options: args.options,
            user_response: args.user_response,
            message,
        })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{AutoApprove, ApprovalGate};
    use forgeloop_core::{
        Answer, ConfirmationOutcome, Question, ToolCallRequest, ToolStatus,
    };

    #[tokio::test]
    async fn test_answer_is_reported() {
        let out = AskUserTool
            .execute(
                json!({"question": "Which database?", "options": ["sqlite", "postgres"], "user_response": "sqlite"}),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(out["user_response"], "sqlite");
        assert_eq!(out["message"], "User answered: sqlite");
    }

    #[tokio::test]
    async fn test_without_user_echoes_question() {
        let out = AskUserTool
            .execute(
                json!({"question": "Which database?", "options": ["sqlite", "postgres"]}),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(out["user_response"].is_null());
        assert_eq!(out["message"], "Question: Which database?\nOptions: sqlite, postgres");
    }

    struct Answering;

    #[async_trait]
    impl ApprovalGate for Answering {
        async fn confirm(&self, _: &ToolCallRequest, _: &ToolDefinition) -> ConfirmationOutcome {
            ConfirmationOutcome::Approved
        }

        async fn clarify(&self, question: &Question) -> Answer {
            Answer::Text(question.options.last().cloned().unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn test_dispatch_through_gate() {
        let mut registry = ToolRegistry::new();
        AskUserTool::register(&mut registry).unwrap();

        let requests = vec![ToolCallRequest::new(
            "q1",
            ASK_USER_TOOL,
            json!({"question": "Tabs or spaces?", "options": ["tabs", "spaces"]}),
        )];
        let report = registry.dispatch(&requests, &Answering, &CancellationToken::new()).await;
        assert_eq!(report.results[0].payload["message"], "User answered: spaces");

        let report = registry.dispatch(&requests, &AutoApprove, &CancellationToken::new()).await;
        assert!(report.results[0].payload["user_response"].is_null());
    }

    #[tokio::test]
    async fn test_option_count_is_validated() {
        let mut registry = ToolRegistry::new();
        AskUserTool::register(&mut registry).unwrap();

        let requests = vec![ToolCallRequest::new(
            "q1",
            ASK_USER_TOOL,
            json!({"question": "Pick", "options": ["only one"]}),
        )];
        let report = registry.dispatch(&requests, &AutoApprove, &CancellationToken::new()).await;
        assert_eq!(report.results[0].status, ToolStatus::ValidationError);
    }
}
