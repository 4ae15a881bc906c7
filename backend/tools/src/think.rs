//! `think`: hand a hard reasoning problem to a (possibly stronger) model.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use forgeloop_core::{CancellationToken, ModelBackend, ModelRequest, ToolExecutor, Turn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::registry::{RegistryError, ToolDefinition, ToolRegistry};

pub const THINK_TOOL: &str = "think";
pub const THINK_TIMEOUT: Duration = Duration::from_secs(120);

const REASONING_PROMPT: &str = "You are a careful reasoning assistant. Analyze the problem \
you are given in depth before answering.\n\n\
Work through it in steps:\n\
1. Split the problem into parts\n\
2. Weigh more than one approach\n\
3. Compare their trade-offs\n\
4. Finish with a clear recommendation in its own final paragraph\n\n\
Stay concrete and keep the answer actionable.";

#[derive(Debug, Deserialize)]
struct ThinkArgs {
    task: String,
    #[serde(default)]
    context: Option<String>,
}

#[derive(Debug, Serialize)]
struct ThinkOutput {
    task: String,
    reasoning: String,
    conclusion: String,
}

pub struct ThinkTool {
    backend: Arc<dyn ModelBackend>,
}

impl ThinkTool {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self { backend }
    }

    pub fn definition() -> ToolDefinition {
        ToolDefinition::new(
            THINK_TOOL,
            "Delegate a complex reasoning task to a more capable model. \
             Use it for architectural decisions, deep analysis or multi-step planning.",
            json!({
                "type": "object",
                "properties": {
                    "task": {
                        "type": "string",
                        "minLength": 1,
                        "description": "The task or question that needs deep reasoning"
                    },
                    "context": {
                        "type": "string",
                        "description": "Extra material for the reasoning (code, requirements)"
                    }
                },
                "required": ["task"],
                "additionalProperties": false
            }),
        )
        .concurrency_safe()
        .with_timeout(THINK_TIMEOUT)
        .with_status_label("Deep thinking")
    }

    pub fn register(
        registry: &mut ToolRegistry,
        backend: Arc<dyn ModelBackend>,
    ) -> Result<(), RegistryError> {
        registry.register(Self::definition(), Arc::new(Self::new(backend)))
    }
}

/// Split a free-form answer into (reasoning, conclusion): the last paragraph
/// is the conclusion, everything before it the reasoning.
pub fn split_reasoning(text: &str) -> (String, String) {
    let paragraphs: Vec<&str> = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    match paragraphs.split_last() {
        Some((last, rest)) if !rest.is_empty() => (rest.join("\n\n"), (*last).to_string()),
        _ => (String::new(), text.to_string()),
    }
}

#[async_trait]
impl ToolExecutor for ThinkTool {
    async fn execute(&self, arguments: Value, cancel: CancellationToken) -> anyhow::Result<Value> {
        let args: ThinkArgs = serde_json::from_value(arguments).context("invalid think arguments")?;

        let mut content = format!("Task: {}", args.task);
        if let Some(context) = args.context.as_deref().filter(|c| !c.is_empty()) {
            content.push_str("\n\nContext:\n");
            content.push_str(context);
        }

        let request = ModelRequest {
            session_id: Uuid::new_v4(),
            turns: vec![Turn::system(REASONING_PROMPT), Turn::user(content)],
            tools: Vec::new(),
        };

        debug!(backend = self.backend.name(), "Delegating reasoning task");
        let response = tokio::select! {
            response = self.backend.send(&request) => response?,
            _ = cancel.cancelled() => bail!("thinking was cancelled"),
        };

        let (reasoning, conclusion) = split_reasoning(&response.text);
        Ok(serde_json::to_value(ThinkOutput {
            task: args.task,
            reasoning,
            conclusion,
        })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeloop_core::{BackendError, ModelResponse, Role};
    use std::sync::Mutex;

    struct Canned {
        text: String,
        seen: Mutex<Vec<ModelRequest>>,
    }

    #[async_trait]
    impl ModelBackend for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn send(&self, request: &ModelRequest) -> Result<ModelResponse, BackendError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(ModelResponse::text(self.text.clone()))
        }
    }

    #[test]
    fn test_split_reasoning() {
        let (reasoning, conclusion) = split_reasoning("First.\n\n  Second.  \n\n\nUse B.");
        assert_eq!(reasoning, "First.\n\nSecond.");
        assert_eq!(conclusion, "Use B.");

        let (reasoning, conclusion) = split_reasoning("Just do it.");
        assert_eq!(reasoning, "");
        assert_eq!(conclusion, "Just do it.");
    }

    #[tokio::test]
    async fn test_think_builds_request_and_parses() {
        let backend = Arc::new(Canned {
            text: "Option A is simple.\n\nOption B scales.\n\nGo with B.".into(),
            seen: Mutex::new(Vec::new()),
        });
        let tool = ThinkTool::new(backend.clone());
        let out = tool
            .execute(
                json!({"task": "Pick a queue", "context": "10k msgs/s"}),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(out["task"], "Pick a queue");
        assert_eq!(out["conclusion"], "Go with B.");
        assert_eq!(out["reasoning"], "Option A is simple.\n\nOption B scales.");

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].turns[0].role, Role::System);
        assert_eq!(seen[0].turns[1].text, "Task: Pick a queue\n\nContext:\n10k msgs/s");
        assert!(seen[0].tools.is_empty());
    }

    #[tokio::test]
    async fn test_think_honours_cancellation() {
        struct Hanging;

        #[async_trait]
        impl ModelBackend for Hanging {
            fn name(&self) -> &str {
                "hanging"
            }

            async fn send(&self, _: &ModelRequest) -> Result<ModelResponse, BackendError> {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(ModelResponse::default())
            }
        }

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = ThinkTool::new(Arc::new(Hanging))
            .execute(json!({"task": "x"}), cancel)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cancelled"));
    }

    #[test]
    fn test_definition_flags() {
        let def = ThinkTool::definition();
        assert!(def.concurrency_safe);
        assert!(!def.requires_confirmation);
        assert_eq!(def.timeout, Some(THINK_TIMEOUT));
    }
}
