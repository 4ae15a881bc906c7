//! Wiring an orchestrator from a prepared [`AgentConfig`].

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use forgeloop_backends::{BackendRegistry, RetryPolicy, RetryingBackend};
use forgeloop_config::{defaults, sessions_dir, AgentConfig};
use forgeloop_core::{ExtractiveSummarizer, InteractionChannel, ModelBackend};
use forgeloop_middleware::{standard_chain, BudgetSettings, ModelPricing};
use forgeloop_tools::{AskUserTool, ThinkTool, ToolRegistry, ASK_USER_TOOL, THINK_TOOL};
use tracing::{info, warn};

use crate::agent_loop::{Orchestrator, OrchestratorBuilder};
use crate::assistant_identity::AssistantIdentity;
use crate::context_window::ContextWindow;
use crate::persistence::JsonFileStore;
use crate::system_prompt::PromptBuilder;

/// Build an orchestrator for `config`.
///
/// `tools` holds the caller's own tools; the builtin `ask_user` and `think`
/// tools are added unless already registered, then per-tool overrides apply.
pub fn builder_from_config(
    config: &AgentConfig,
    backends: &BackendRegistry,
    mut tools: ToolRegistry,
    channel: Option<Arc<dyn InteractionChannel>>,
    config_dir: &Path,
) -> Result<OrchestratorBuilder> {
    let model = config.model.clone().unwrap_or_default();
    let model_name = model.name.as_deref();
    let raw_backend = backends
        .resolve(model_name)
        .ok_or_else(|| anyhow!("no model backend registered (wanted {model_name:?})"))?;
    let backend: Arc<dyn ModelBackend> =
        Arc::new(RetryingBackend::new(raw_backend.clone(), retry_policy(config)));

    let tool_config = config.tools.clone().unwrap_or_default();
    tools = tools
        .with_max_concurrency(tool_config.max_concurrency.unwrap_or(defaults::DEFAULT_MAX_CONCURRENCY))
        .with_default_timeout(Duration::from_secs(
            tool_config
                .default_timeout_secs
                .unwrap_or(defaults::DEFAULT_TOOL_TIMEOUT_SECS),
        ));
    if tools.get(ASK_USER_TOOL).is_none() {
        AskUserTool::register(&mut tools).context("Failed to register ask_user")?;
    }
    if tools.get(THINK_TOOL).is_none() {
        let think_backend = match model.think_model.as_deref() {
            Some(alias) => backends.get(alias).unwrap_or_else(|| {
                warn!(alias, "Think model not registered; using the main model");
                raw_backend.clone()
            }),
            None => raw_backend.clone(),
        };
        ThinkTool::register(&mut tools, think_backend).context("Failed to register think")?;
    }
    for (name, over) in &tool_config.overrides {
        if let Some(secs) = over.timeout_secs {
            if !tools.set_timeout(name, Duration::from_secs(secs)) {
                warn!(tool = %name, "Timeout override for unknown tool");
            }
        }
    }

    let pricing = model.pricing.clone().unwrap_or_default();
    let limits = config.limits.clone().unwrap_or_default();
    let compaction = config.compaction.clone().unwrap_or_default();
    let settings = BudgetSettings {
        pricing: ModelPricing::new(
            pricing.input_per_million.unwrap_or(0.0),
            pricing.output_per_million.unwrap_or(0.0),
        ),
        max_turns: limits.max_turns,
        max_cost: limits.max_cost_usd,
        context_budget: compaction
            .enabled
            .unwrap_or(true)
            .then(|| model.context_window.unwrap_or(defaults::DEFAULT_CONTEXT_TOKENS)),
        keep_recent: compaction.keep_recent.unwrap_or(defaults::DEFAULT_KEEP_RECENT),
    };
    let chain = standard_chain(settings, Arc::new(ExtractiveSummarizer));

    let approval = config
        .approval
        .as_ref()
        .and_then(|a| a.mode)
        .unwrap_or_default();
    let identity = identity_from(config);
    let prompt = PromptBuilder::new(identity)
        .with_mode(approval)
        .build(&tools.schemas());
    let context = ContextWindow::new(prompt).with_reserve_output(
        model
            .reserve_output_tokens
            .unwrap_or(defaults::DEFAULT_RESERVE_OUTPUT_TOKENS),
    );

    let session = config.session.clone().unwrap_or_default();
    let store = JsonFileStore::new(sessions_dir(config, config_dir));
    info!(
        backend = backend.name(),
        tools = tools.len(),
        middleware = ?chain.names(),
        sessions = %store.dir().display(),
        "Orchestrator configured"
    );

    let mut builder = Orchestrator::builder(backend, Arc::new(tools))
        .middleware(chain)
        .context_window(context)
        .approval_mode(approval)
        .complete_on_final_text(session.complete_on_final_text.unwrap_or(false))
        .autosave(session.autosave.unwrap_or(true))
        .persistence(Arc::new(store));
    if let Some(channel) = channel {
        builder = builder.channel(channel);
    }
    Ok(builder)
}

fn retry_policy(config: &AgentConfig) -> RetryPolicy {
    let retry = config.retry.clone().unwrap_or_default();
    let base = RetryPolicy::default();
    RetryPolicy {
        max_attempts: retry.max_attempts.unwrap_or(base.max_attempts),
        initial_backoff: retry
            .initial_backoff_ms
            .map(Duration::from_millis)
            .unwrap_or(base.initial_backoff),
        max_backoff: retry
            .max_backoff_ms
            .map(Duration::from_millis)
            .unwrap_or(base.max_backoff),
        ..base
    }
}

fn identity_from(config: &AgentConfig) -> AssistantIdentity {
    let base = AssistantIdentity::default();
    let Some(identity) = &config.identity else {
        return base;
    };
    AssistantIdentity {
        name: identity.name.clone().unwrap_or(base.name),
        persona: identity.persona.clone().unwrap_or(base.persona),
        style_overrides: base.style_overrides,
    }
}
