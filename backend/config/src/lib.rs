//! `forgeloop-config`: runtime configuration for ForgeLoop sessions.
//!
//! Provides:
//! - Typed config schema (model, limits, tools, compaction, approval, session)
//! - YAML loading from the config directory
//! - `${ENV_VAR}` substitution
//! - Default value application
//! - Validation with per-field reports

pub mod defaults;
pub mod env;
pub mod io;
pub mod schema;
pub mod validation;

pub use defaults::apply_all_defaults;
pub use env::{
    collect_referenced_vars, contains_env_var_reference, resolve_env_vars, resolve_env_vars_with,
    MissingEnvVarError,
};
pub use io::{config_dir, config_file_path, load_config, logs_dir, sessions_dir};
pub use schema::{
    AgentConfig, ApprovalConfig, CompactionConfig, IdentityConfig, LimitsConfig, LoggingConfig,
    ModelConfig, PricingConfig, RetryConfig, SessionConfig, ToolOverride, ToolsConfig,
};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::Path;

/// Load a config file, substitute env vars, apply defaults and validate.
///
/// Warnings are logged; any validation error fails the load.
pub async fn load_and_prepare(path: &Path) -> Result<AgentConfig> {
    let raw = load_config(path).await?;
    let env: HashMap<String, String> = std::env::vars().collect();
    prepare(raw, &env)
}

/// The load pipeline minus file I/O, with an explicit environment.
pub fn prepare(raw: AgentConfig, env: &HashMap<String, String>) -> Result<AgentConfig> {
    let value = serde_json::to_value(&raw).context("Failed to serialize config for processing")?;
    let value = resolve_env_vars_with(&value, env).context("Failed to resolve env vars in config")?;
    let config: AgentConfig =
        serde_json::from_value(value).context("Failed to deserialize config after processing")?;
    let config = apply_all_defaults(config);

    let report = validate(&config);
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    for error in &report.errors {
        tracing::error!(path = %error.path, message = %error.message, "Config error");
    }
    if let Some(first) = report.errors.first() {
        bail!("{} config error(s); first: {first}", report.errors.len());
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_substitutes_and_defaults() {
        let raw: AgentConfig = serde_yaml::from_str(
            "model:\n  name: ${MODEL_NAME}\nsession:\n  persistenceDir: ${STATE}/sessions\n",
        )
        .unwrap();
        let env = HashMap::from([
            ("MODEL_NAME".to_string(), "devstral".to_string()),
            ("STATE".to_string(), "/var/lib/fl".to_string()),
        ]);
        let cfg = prepare(raw, &env).unwrap();
        let model = cfg.model.unwrap();
        assert_eq!(model.name.as_deref(), Some("devstral"));
        assert_eq!(model.context_window, Some(defaults::DEFAULT_CONTEXT_TOKENS));
        assert_eq!(
            cfg.session.unwrap().persistence_dir.as_deref(),
            Some("/var/lib/fl/sessions")
        );
    }

    #[test]
    fn test_prepare_rejects_invalid() {
        let raw: AgentConfig = serde_yaml::from_str("tools:\n  maxConcurrency: 0\n").unwrap();
        let err = prepare(raw, &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("tools.maxConcurrency"));
    }

    #[test]
    fn test_prepare_missing_env_fails() {
        let raw: AgentConfig = serde_yaml::from_str("model:\n  name: ${NOPE_UNSET}\n").unwrap();
        assert!(prepare(raw, &HashMap::new()).is_err());
    }

    #[tokio::test]
    async fn test_load_and_prepare_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forgeloop.yaml");
        tokio::fs::write(&path, "limits:\n  maxTurns: 12\napproval:\n  mode: auto_approve\n")
            .await
            .unwrap();
        let cfg = load_and_prepare(&path).await.unwrap();
        assert_eq!(cfg.limits.unwrap().max_turns, Some(12));
        assert_eq!(
            cfg.approval.unwrap().mode,
            Some(forgeloop_core::ApprovalMode::AutoApprove)
        );
    }
}
