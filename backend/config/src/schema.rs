//! ForgeLoop runtime configuration schema.
//!
//! Every field is optional so partial YAML files deserialize cleanly;
//! `defaults::apply_all_defaults` fills the gaps after env substitution.

use forgeloop_core::ApprovalMode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for one agent session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Model identity, context budget and pricing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelConfig>,

    /// Turn and cost budgets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<LimitsConfig>,

    /// Tool dispatch settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsConfig>,

    /// History compaction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compaction: Option<CompactionConfig>,

    /// How confirmation-required tools are approved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval: Option<ApprovalConfig>,

    /// Session lifecycle and persistence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionConfig>,

    /// Backend retry policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,

    /// Assistant persona used in the system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityConfig>,

    /// Logging configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Total tokens the model accepts per request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u64>,

    /// Tokens held back for the model's reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserve_output_tokens: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<PricingConfig>,

    /// Backend alias for the `think` tool; the main model when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub think_model: Option<String>,
}

/// USD per million tokens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_per_million: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_per_million: Option<f64>,
}

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Unset limits are not enforced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cost_usd: Option<f64>,
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsConfig {
    /// Concurrency-safe calls allowed to run at once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_timeout_secs: Option<u64>,

    /// Per-tool settings keyed by tool name.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub overrides: HashMap<String, ToolOverride>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// Compaction, approval, session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Most recent turns compaction never rewrites.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_recent: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ApprovalMode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Treat a reply without tool calls as the end of the task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete_on_final_text: Option<bool>,

    /// Save a snapshot after every step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autosave: Option<bool>,

    /// Directory for session snapshots; `<config dir>/sessions` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistence_dir: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_backoff_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_backoff_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /// trace | debug | info | warn | error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Directory for rolling JSON log files; `<config dir>/logs` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,

    /// Mask secrets in logged tool arguments and results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redact_sensitive: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_yaml() {
        let yaml = r#"
model:
  name: devstral
  contextWindow: 64000
  pricing:
    inputPerMillion: 0.4
limits:
  maxTurns: 20
approval:
  mode: plan
tools:
  overrides:
    bash:
      timeoutSecs: 30
"#;
        let cfg: AgentConfig = serde_yaml::from_str(yaml).unwrap();
        let model = cfg.model.unwrap();
        assert_eq!(model.name.as_deref(), Some("devstral"));
        assert_eq!(model.context_window, Some(64_000));
        assert_eq!(model.pricing.unwrap().input_per_million, Some(0.4));
        assert_eq!(cfg.limits.unwrap().max_turns, Some(20));
        assert_eq!(cfg.approval.unwrap().mode, Some(ApprovalMode::Plan));
        assert_eq!(cfg.tools.unwrap().overrides["bash"].timeout_secs, Some(30));
        assert!(cfg.session.is_none());
    }

    #[test]
    fn empty_document_is_default() {
        let cfg: AgentConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg, AgentConfig::default());
    }
}
