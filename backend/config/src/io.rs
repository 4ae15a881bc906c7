//! Config file location and loading.

use crate::schema::AgentConfig;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Default config file name within the config directory.
const CONFIG_FILE_NAME: &str = "forgeloop.yaml";

/// Resolve the ForgeLoop config directory.
/// Priority: `FORGELOOP_CONFIG_DIR` env > `~/.forgeloop/` > `./.forgeloop`
pub fn config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("FORGELOOP_CONFIG_DIR").filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .map(|home| home.join(".forgeloop"))
        .unwrap_or_else(|| PathBuf::from(".forgeloop"))
}

pub fn config_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CONFIG_FILE_NAME)
}

/// Where session snapshots live: `session.persistenceDir` or `<config dir>/sessions`.
pub fn sessions_dir(config: &AgentConfig, config_dir: &Path) -> PathBuf {
    config
        .session
        .as_ref()
        .and_then(|s| s.persistence_dir.as_deref())
        .map(PathBuf::from)
        .unwrap_or_else(|| config_dir.join("sessions"))
}

/// Where rolling log files go: `logging.dir` or `<config dir>/logs`.
pub fn logs_dir(config: &AgentConfig, config_dir: &Path) -> PathBuf {
    config
        .logging
        .as_ref()
        .and_then(|l| l.dir.as_deref())
        .map(PathBuf::from)
        .unwrap_or_else(|| config_dir.join("logs"))
}

/// Load and parse the config from disk.
///
/// A missing file is not an error; the empty config is returned so defaults
/// can fill it in.
pub async fn load_config(path: &Path) -> Result<AgentConfig> {
    if !fs::try_exists(path).await.unwrap_or(false) {
        debug!(path = %path.display(), "Config file does not exist; using defaults");
        return Ok(AgentConfig::default());
    }

    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    if raw.trim().is_empty() {
        return Ok(AgentConfig::default());
    }

    let config: AgentConfig = serde_yaml::from_str(&raw)
        .with_context(|| format!("Failed to parse config YAML at: {}", path.display()))?;

    info!(path = %path.display(), "Loaded config");
    Ok(config)
}
