use crate::topology::SiteConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

pub const CONFIG_ENV: &str = "FLEETMON_KERNEL_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("invalid kernel config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KernelConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default)]
    pub transport: TransportConf,
    #[serde(default)]
    pub poll: PollConf,
    pub mqtt: Option<MqttConf>,
    #[serde(default)]
    pub site: SiteConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TransportConf {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_agent_path")]
    pub agent_path: String,
    #[serde(default = "default_scheme")]
    pub scheme: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PollConf {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_agent_path() -> String {
    "/monitorRequest".into()
}

fn default_scheme() -> String {
    "http".into()
}

fn default_interval_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for TransportConf {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            agent_path: default_agent_path(),
            scheme: default_scheme(),
        }
    }
}

impl Default for PollConf {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            enabled: true,
        }
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            transport: TransportConf::default(),
            poll: PollConf::default(),
            mqtt: None,
            site: SiteConfig::default(),
        }
    }
}

/// Empty text means defaults.
pub fn parse_config(text: &str) -> Result<KernelConfig, ConfigError> {
    if text.trim().is_empty() {
        return Ok(KernelConfig::default());
    }
    Ok(serde_yaml::from_str(text)?)
}

pub async fn load_config_from(path: &Path) -> Result<KernelConfig, ConfigError> {
    let text = fs::read_to_string(path).await.map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_config(&text)
}

/// Reads the file named by `FLEETMON_KERNEL_CONFIG` (default `kernel.yaml`).
/// A missing or invalid file falls back to defaults so the kernel keeps running.
pub async fn load_config() -> KernelConfig {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "kernel.yaml".into());
    let path = Path::new(&path);
    if !path.exists() {
        tracing::warn!(path = %path.display(), "no kernel config, using defaults");
        return KernelConfig::default();
    }
    load_config_from(path).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "kernel config rejected, using defaults");
        KernelConfig::default()
    })
}
