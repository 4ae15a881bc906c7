//! Config validation: field-level checks with user-friendly messages.

use crate::schema::AgentConfig;
use thiserror::Error;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A config validation error with field path and message.
#[derive(Debug, Error)]
#[error("Config validation error at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

/// Everything found in one validation pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate the config and return a report of all errors and warnings.
pub fn validate(config: &AgentConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_model(config, &mut report);
    validate_limits(config, &mut report);
    validate_tools(config, &mut report);
    validate_compaction(config, &mut report);
    validate_retry(config, &mut report);
    validate_logging(config, &mut report);
    report
}

fn validate_model(config: &AgentConfig, report: &mut ValidationReport) {
    let Some(model) = &config.model else { return };
    if model.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        report.error("model.name", "Model name cannot be empty");
    }
    if model.context_window == Some(0) {
        report.error("model.contextWindow", "Context window must be greater than 0");
    }
    if let (Some(window), Some(reserve)) = (model.context_window, model.reserve_output_tokens) {
        if window > 0 && reserve >= window {
            report.error(
                "model.reserveOutputTokens",
                format!("Output reserve ({reserve}) must be smaller than the context window ({window})"),
            );
        }
    }
    if let Some(pricing) = &model.pricing {
        for (field, rate) in [
            ("inputPerMillion", pricing.input_per_million),
            ("outputPerMillion", pricing.output_per_million),
        ] {
            if rate.is_some_and(|r| !r.is_finite() || r < 0.0) {
                report.error(format!("model.pricing.{field}"), "Price must be a non-negative number");
            }
        }
    }
}

fn validate_limits(config: &AgentConfig, report: &mut ValidationReport) {
    let Some(limits) = &config.limits else { return };
    if limits.max_turns == Some(0) {
        report.error("limits.maxTurns", "maxTurns must be at least 1");
    }
    if let Some(cost) = limits.max_cost_usd {
        if !cost.is_finite() || cost <= 0.0 {
            report.error("limits.maxCostUsd", "maxCostUsd must be a positive number");
        }
        let free = config
            .model
            .as_ref()
            .and_then(|m| m.pricing.as_ref())
            .map_or(true, |p| {
                p.input_per_million.unwrap_or(0.0) == 0.0 && p.output_per_million.unwrap_or(0.0) == 0.0
            });
        if free {
            report.warn(
                "limits.maxCostUsd",
                "Cost limit set but model pricing is zero; only backend-reported costs count",
            );
        }
    }
}

fn validate_tools(config: &AgentConfig, report: &mut ValidationReport) {
    let Some(tools) = &config.tools else { return };
    if tools.max_concurrency == Some(0) {
        report.error("tools.maxConcurrency", "maxConcurrency must be at least 1");
    }
    if tools.default_timeout_secs == Some(0) {
        report.error("tools.defaultTimeoutSecs", "Tool timeout must be greater than 0");
    }
    for (name, over) in &tools.overrides {
        if name.trim().is_empty() {
            report.error("tools.overrides", "Tool name cannot be empty");
        }
        if over.timeout_secs == Some(0) {
            report.error(
                format!("tools.overrides.{name}.timeoutSecs"),
                "Tool timeout must be greater than 0",
            );
        }
    }
}

fn validate_compaction(config: &AgentConfig, report: &mut ValidationReport) {
    let Some(compaction) = &config.compaction else { return };
    if compaction.enabled == Some(false) {
        report.warn(
            "compaction.enabled",
            "Compaction disabled; sessions fail once history exceeds the context window",
        );
    }
    if compaction.keep_recent == Some(0) {
        report.warn("compaction.keepRecent", "keepRecent of 0 lets compaction rewrite the latest turn");
    }
}

fn validate_retry(config: &AgentConfig, report: &mut ValidationReport) {
    let Some(retry) = &config.retry else { return };
    if retry.max_attempts == Some(0) {
        report.error("retry.maxAttempts", "maxAttempts must be at least 1");
    }
    if let (Some(initial), Some(max)) = (retry.initial_backoff_ms, retry.max_backoff_ms) {
        if initial > max {
            report.warn("retry.initialBackoffMs", "Initial backoff exceeds the maximum; it will be capped");
        }
    }
}

fn validate_logging(config: &AgentConfig, report: &mut ValidationReport) {
    let Some(level) = config.logging.as_ref().and_then(|l| l.level.as_deref()) else {
        return;
    };
    if !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
        report.error(
            "logging.level",
            format!("Unknown log level '{level}'; expected one of {}", LOG_LEVELS.join(", ")),
        );
    }
}
