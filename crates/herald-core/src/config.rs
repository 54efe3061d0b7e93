//! Herald configuration system.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{HeraldError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeraldConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl HeraldConfig {
    /// Load config from `$HERALD_CONFIG` or `~/.herald/config.toml`.
    /// A missing file yields defaults. Env overrides are applied last.
    pub fn load() -> Result<Self> {
        let path = std::env::var("HERALD_CONFIG")
            .map(|p| PathBuf::from(expand_path(&p)))
            .unwrap_or_else(|_| Self::default_path());
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| HeraldError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| HeraldError::Config(format!("Failed to parse config: {e}")))
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| HeraldError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Gateway credentials from the environment win over the file.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("HERALD_WAHA_URL").filter(|v| !v.is_empty()) {
            self.gateway.url = url;
        }
        if let Some(key) = lookup("HERALD_WAHA_API_KEY").filter(|v| !v.is_empty()) {
            self.gateway.api_key = key;
        }
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Herald home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".herald")
    }
}

fn expand_path(raw: &str) -> String {
    shellexpand::tilde(raw).into_owned()
}

/// SQLite store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl StoreConfig {
    /// Database path with `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(expand_path(&self.path))
    }
}

fn default_store_path() -> String {
    "~/.herald/herald.db".into()
}

/// WAHA (WhatsApp HTTP API) gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_waha_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_session")]
    pub session: String,
    #[serde(default = "default_text_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_media_timeout")]
    pub media_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_waha_url(),
            api_key: String::new(),
            session: default_session(),
            timeout_secs: default_text_timeout(),
            media_timeout_secs: default_media_timeout(),
        }
    }
}

fn default_waha_url() -> String {
    "http://localhost:3000".into()
}
fn default_session() -> String {
    "default".into()
}
fn default_text_timeout() -> u64 {
    30
}
fn default_media_timeout() -> u64 {
    60
}

/// What to do at startup with campaigns left `running` by a previous process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    #[default]
    Resume,
    Pause,
}

/// Dispatch loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Sleep between outside-window checks.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Outside-window polls before the campaign is forced to `paused`.
    #[serde(default = "default_max_wait_cycles")]
    pub max_wait_cycles: u32,
    #[serde(default = "default_log_every_cycles")]
    pub log_every_cycles: u32,
    /// Upper bound of one sleep chunk while waiting for the daily cap to reset.
    #[serde(default = "default_daily_cap_chunk")]
    pub daily_cap_chunk_secs: u64,
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
    #[serde(default)]
    pub orphan_policy: OrphanPolicy,
    #[serde(default = "default_template_value_max_len")]
    pub template_value_max_len: usize,
    #[serde(default = "default_error_max_len")]
    pub error_max_len: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            max_wait_cycles: default_max_wait_cycles(),
            log_every_cycles: default_log_every_cycles(),
            daily_cap_chunk_secs: default_daily_cap_chunk(),
            default_timezone: default_timezone(),
            orphan_policy: OrphanPolicy::default(),
            template_value_max_len: default_template_value_max_len(),
            error_max_len: default_error_max_len(),
        }
    }
}

fn default_poll_interval() -> u64 {
    60
}
fn default_max_wait_cycles() -> u32 {
    1440
}
fn default_log_every_cycles() -> u32 {
    60
}
fn default_daily_cap_chunk() -> u64 {
    60
}
fn default_timezone() -> String {
    "America/Sao_Paulo".into()
}
fn default_template_value_max_len() -> usize {
    500
}
fn default_error_max_len() -> usize {
    200
}

/// Outbound completion/error notifications.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}
