//! Tool definitions and the registry that owns them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use forgeloop_core::{AgentError, ToolCallRequest, ToolExecutor, ToolSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::schema::{self, SchemaError};

pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

/// Length of the argument preview shown next to a tool's status label.
const SUMMARY_PREVIEW_CHARS: usize = 100;

/// How the dispatcher routes a call to this tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    #[default]
    Standard,
    /// Suspends the loop and asks the user a question before executing.
    Clarification,
}

/// Static description of a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    /// Read-only with respect to shared state, so it may run beside other safe calls.
    pub concurrency_safe: bool,
    pub requires_confirmation: bool,
    /// Overrides the registry default when set.
    pub timeout: Option<Duration>,
    pub kind: ToolKind,
    /// Label shown while the tool runs, e.g. "Deep thinking".
    pub status_label: Option<String>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            concurrency_safe: false,
            requires_confirmation: false,
            timeout: None,
            kind: ToolKind::Standard,
            status_label: None,
        }
    }

    pub fn concurrency_safe(mut self) -> Self {
        self.concurrency_safe = true;
        self
    }

    pub fn requires_confirmation(mut self) -> Self {
        self.requires_confirmation = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn clarification(mut self) -> Self {
        self.kind = ToolKind::Clarification;
        self
    }

    pub fn with_status_label(mut self, label: impl Into<String>) -> Self {
        self.status_label = Some(label.into());
        self
    }

    /// The description the model sees.
    pub fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }

    /// One-line description of a pending call, used for confirmation prompts
    /// and progress display.
    pub fn summary(&self, request: &ToolCallRequest) -> String {
        let Some(label) = &self.status_label else {
            return self.name.clone();
        };
        // Preview the first required string argument.
        let preview = self
            .parameters
            .get("required")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .find_map(|key| request.arguments.get(key).and_then(Value::as_str))
            .map(|text| truncate(text, SUMMARY_PREVIEW_CHARS));
        match preview {
            Some(preview) if self.kind == ToolKind::Standard => format!("{label}: {preview}"),
            _ => label.clone(),
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("tool name cannot be empty")]
    EmptyName,
    #[error("tool '{0}' is already registered")]
    Duplicate(String),
    #[error("invalid parameter schema for tool '{tool}': {source}")]
    InvalidSchema {
        tool: String,
        #[source]
        source: SchemaError,
    },
}

/// A definition paired with the executor that runs it.
#[derive(Clone)]
pub struct RegisteredTool {
    pub definition: ToolDefinition,
    pub executor: Arc<dyn ToolExecutor>,
}

/// Owns tool definitions and executors and dispatches validated calls.
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
    order: Vec<String>,
    pub(crate) max_concurrency: usize,
    pub(crate) default_timeout: Duration,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            default_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    /// Upper bound on concurrency-safe calls running at once (at least 1).
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn register(
        &mut self,
        definition: ToolDefinition,
        executor: Arc<dyn ToolExecutor>,
    ) -> Result<(), RegistryError> {
        if definition.name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.tools.contains_key(&definition.name) {
            return Err(RegistryError::Duplicate(definition.name));
        }
        schema::check_schema(&definition.parameters).map_err(|source| {
            RegistryError::InvalidSchema {
                tool: definition.name.clone(),
                source,
            }
        })?;

        debug!(
            tool = %definition.name,
            concurrency_safe = definition.concurrency_safe,
            requires_confirmation = definition.requires_confirmation,
            "Registered tool"
        );
        self.order.push(definition.name.clone());
        self.tools.insert(
            definition.name.clone(),
            RegisteredTool {
                definition,
                executor,
            },
        );
        Ok(())
    }

    /// Apply a per-tool timeout override after registration.
    pub fn set_timeout(&mut self, name: &str, timeout: Duration) -> bool {
        match self.tools.get_mut(name) {
            Some(tool) => {
                tool.definition.timeout = Some(timeout);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    pub fn definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name).map(|t| &t.definition)
    }

    /// Tool names in registration order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Schemas for the model, in registration order.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| t.definition.schema())
            .collect()
    }

    /// Resolve a request to its tool and check its arguments.
    pub fn validate(&self, request: &ToolCallRequest) -> Result<&RegisteredTool, AgentError> {
        let tool = self.tools.get(&request.name).ok_or_else(|| AgentError::Validation {
            tool: request.name.clone(),
            message: "unknown tool".to_string(),
        })?;
        schema::validate(&tool.definition.parameters, &request.arguments).map_err(|err| {
            AgentError::Validation {
                tool: request.name.clone(),
                message: err.to_string(),
            }
        })?;
        Ok(tool)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
