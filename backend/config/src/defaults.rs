//! Config defaults: fills every unset field the agent needs.

use forgeloop_core::ApprovalMode;

use crate::schema::{
    AgentConfig, ApprovalConfig, CompactionConfig, IdentityConfig, LoggingConfig, ModelConfig,
    PricingConfig, RetryConfig, SessionConfig, ToolsConfig,
};

pub const DEFAULT_MODEL_NAME: &str = "default";

/// Default context window size (tokens).
pub const DEFAULT_CONTEXT_TOKENS: u64 = 200_000;

/// Tokens held back for the model's reply.
pub const DEFAULT_RESERVE_OUTPUT_TOKENS: u64 = 8192;

pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 120;

pub const DEFAULT_KEEP_RECENT: usize = 4;

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_INITIAL_BACKOFF_MS: u64 = 500;
pub const DEFAULT_RETRY_MAX_BACKOFF_MS: u64 = 30_000;

pub const DEFAULT_ASSISTANT_NAME: &str = "ForgeLoop";

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Apply all defaults to a freshly loaded config.
pub fn apply_all_defaults(config: AgentConfig) -> AgentConfig {
    let config = apply_model_defaults(config);
    let config = apply_tool_defaults(config);
    let config = apply_compaction_defaults(config);
    let config = apply_session_defaults(config);
    let config = apply_retry_defaults(config);
    let config = apply_identity_defaults(config);
    apply_logging_defaults(config)
}

fn apply_model_defaults(mut config: AgentConfig) -> AgentConfig {
    let model = config.model.get_or_insert_with(ModelConfig::default);
    model.name.get_or_insert_with(|| DEFAULT_MODEL_NAME.to_string());
    model.context_window.get_or_insert(DEFAULT_CONTEXT_TOKENS);
    model.reserve_output_tokens.get_or_insert(DEFAULT_RESERVE_OUTPUT_TOKENS);
    let pricing = model.pricing.get_or_insert_with(PricingConfig::default);
    pricing.input_per_million.get_or_insert(0.0);
    pricing.output_per_million.get_or_insert(0.0);
    config
}

fn apply_tool_defaults(mut config: AgentConfig) -> AgentConfig {
    let tools = config.tools.get_or_insert_with(ToolsConfig::default);
    tools.max_concurrency.get_or_insert(DEFAULT_MAX_CONCURRENCY);
    tools.default_timeout_secs.get_or_insert(DEFAULT_TOOL_TIMEOUT_SECS);
    config
}

fn apply_compaction_defaults(mut config: AgentConfig) -> AgentConfig {
    let compaction = config.compaction.get_or_insert_with(CompactionConfig::default);
    compaction.enabled.get_or_insert(true);
    compaction.keep_recent.get_or_insert(DEFAULT_KEEP_RECENT);
    config
}

fn apply_session_defaults(mut config: AgentConfig) -> AgentConfig {
    let session = config.session.get_or_insert_with(SessionConfig::default);
    session.complete_on_final_text.get_or_insert(false);
    session.autosave.get_or_insert(true);
    let approval = config.approval.get_or_insert_with(ApprovalConfig::default);
    approval.mode.get_or_insert(ApprovalMode::ApprovalRequired);
    config
}

fn apply_retry_defaults(mut config: AgentConfig) -> AgentConfig {
    let retry = config.retry.get_or_insert_with(RetryConfig::default);
    retry.max_attempts.get_or_insert(DEFAULT_RETRY_ATTEMPTS);
    retry.initial_backoff_ms.get_or_insert(DEFAULT_RETRY_INITIAL_BACKOFF_MS);
    retry.max_backoff_ms.get_or_insert(DEFAULT_RETRY_MAX_BACKOFF_MS);
    config
}

fn apply_identity_defaults(mut config: AgentConfig) -> AgentConfig {
    let identity = config.identity.get_or_insert_with(IdentityConfig::default);
    identity.name.get_or_insert_with(|| DEFAULT_ASSISTANT_NAME.to_string());
    config
}

fn apply_logging_defaults(mut config: AgentConfig) -> AgentConfig {
    let logging = config.logging.get_or_insert_with(LoggingConfig::default);
    logging.level.get_or_insert_with(|| DEFAULT_LOG_LEVEL.to_string());
    logging.redact_sensitive.get_or_insert(true);
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::LimitsConfig;

    #[test]
    fn fills_model_and_tool_defaults() {
        let cfg = apply_all_defaults(AgentConfig::default());
        let model = cfg.model.unwrap();
        assert_eq!(model.context_window, Some(DEFAULT_CONTEXT_TOKENS));
        assert_eq!(model.reserve_output_tokens, Some(DEFAULT_RESERVE_OUTPUT_TOKENS));
        let tools = cfg.tools.unwrap();
        assert_eq!(tools.max_concurrency, Some(DEFAULT_MAX_CONCURRENCY));
        assert_eq!(tools.default_timeout_secs, Some(DEFAULT_TOOL_TIMEOUT_SECS));
        assert_eq!(cfg.approval.unwrap().mode, Some(ApprovalMode::ApprovalRequired));
    }

    #[test]
    fn limits_stay_unset() {
        let cfg = apply_all_defaults(AgentConfig::default());
        assert!(cfg.limits.is_none());
    }

    #[test]
    fn does_not_override_user_values() {
        let cfg = AgentConfig {
            tools: Some(ToolsConfig {
                max_concurrency: Some(2),
                ..Default::default()
            }),
            limits: Some(LimitsConfig {
                max_turns: Some(7),
                max_cost_usd: None,
            }),
            ..Default::default()
        };
        let cfg = apply_all_defaults(cfg);
        assert_eq!(cfg.tools.unwrap().max_concurrency, Some(2));
        assert_eq!(cfg.limits.unwrap().max_turns, Some(7));
    }
}
