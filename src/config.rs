// Monitoring configuration
//
// One TOML file holds everything: the watch settings, the webhook endpoint,
// and the list of monitored certificates. The daemon re-reads it at each
// cycle boundary, so edits made by the CLI commands take effect at the next
// cycle without a restart.

use crate::inventory::CertificateInventory;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub watch: WatchSettings,
    #[serde(default)]
    pub certificates: CertificateInventory,
}

/// Watch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    /// Seconds between evaluation cycles
    pub check_interval_seconds: u64,
    /// Days before expiry at which a certificate becomes Warning
    pub threshold_days: i64,
    /// Minimum hours between repeated notifications for an unchanged state
    pub renotify_interval_hours: u64,
    /// Upper bound on concurrent certificate checks within one cycle
    pub max_concurrent_checks: usize,
    /// Where the notification tracker persists its records
    pub state_path: PathBuf,
    pub webhook: Option<WebhookConfig>,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            check_interval_seconds: 21_600, // 6 hours
            threshold_days: 7,
            renotify_interval_hours: 24,
            max_concurrent_checks: 10,
            state_path: PathBuf::from("certwatch-state.json"),
            webhook: None,
        }
    }
}

/// Webhook endpoint and delivery policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_seconds")]
    pub backoff_base_seconds: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: u32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_seconds() -> u64 {
    1
}

fn default_backoff_factor() -> u32 {
    4
}

fn default_timeout_seconds() -> u64 {
    10
}

impl WebhookConfig {
    /// Create a webhook configuration with default delivery policy
    pub fn new(url: String) -> Self {
        Self {
            url,
            headers: HashMap::new(),
            max_attempts: default_max_attempts(),
            backoff_base_seconds: default_backoff_base_seconds(),
            backoff_factor: default_backoff_factor(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|e| {
            anyhow::anyhow!("failed to read config file {:?}: {}", path.as_ref(), e)
        })?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("failed to parse TOML config: {}", e))?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_str = toml::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("failed to serialize config: {}", e))?;

        fs::write(path.as_ref(), toml_str).map_err(|e| {
            anyhow::anyhow!("failed to write config file {:?}: {}", path.as_ref(), e)
        })?;

        Ok(())
    }

    /// Point notifications at a new webhook URL, keeping any existing
    /// delivery policy settings
    pub fn set_webhook_url(&mut self, url: String) {
        match &mut self.watch.webhook {
            Some(webhook) => webhook.url = url,
            None => self.watch.webhook = Some(WebhookConfig::new(url)),
        }
    }
}
