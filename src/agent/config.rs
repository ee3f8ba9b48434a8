use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Agent configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    pub authority: AuthorityConfig,
    #[serde(default)]
    pub monitor: MonitorSettings,
    #[serde(default)]
    pub protection: ProtectionSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote authority connection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthorityConfig {
    /// Base URL of the parent dashboard API
    pub base_url: String,

    /// Identifier the authority knows this device by (IMEI on phones)
    pub device_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Per-request deadline (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

/// Compliance monitor settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorSettings {
    /// Seconds between compliance checks
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,

    /// Device/server clock skew (seconds) beyond which server time is used
    #[serde(default = "default_clock_drift_tolerance")]
    pub clock_drift_tolerance: u64,
}

/// Uninstall-protection handshake settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProtectionSettings {
    /// Seconds between approval polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    #[serde(default = "default_max_polls")]
    pub max_polls: u32,

    /// Seconds the denial notice stays up
    #[serde(default = "default_denied_grace_period")]
    pub denied_grace_period: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_request_timeout() -> u64 {
    10
}

fn default_check_interval() -> u64 {
    30
}

fn default_clock_drift_tolerance() -> u64 {
    120
}

fn default_poll_interval() -> u64 {
    5
}

fn default_max_polls() -> u32 {
    60 // 5 minutes at the default interval
}

fn default_denied_grace_period() -> u64 {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            clock_drift_tolerance: default_clock_drift_tolerance(),
        }
    }
}

impl Default for ProtectionSettings {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            max_polls: default_max_polls(),
            denied_grace_period: default_denied_grace_period(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl AuthorityConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

impl MonitorSettings {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }

    pub fn clock_drift_tolerance(&self) -> Duration {
        Duration::from_secs(self.clock_drift_tolerance)
    }
}

impl ProtectionSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn denied_grace_period(&self) -> Duration {
        Duration::from_secs(self.denied_grace_period)
    }
}

impl AgentConfig {
    pub fn new(base_url: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            authority: AuthorityConfig {
                base_url: base_url.into(),
                device_id: device_id.into(),
                access_token: None,
                request_timeout: default_request_timeout(),
            },
            monitor: MonitorSettings::default(),
            protection: ProtectionSettings::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: AgentConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to file (mode 0600; it may hold the access token)
    pub fn save(&self, path: &Path) -> Result<()> {
        let toml = toml::to_string_pretty(self).context("Failed to serialize config")?;

        crate::platform::common::atomic_write(path, toml.as_bytes(), 0o600)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.authority.base_url).context("Invalid authority URL")?;

        if url.scheme() != "https" {
            anyhow::bail!("Authority URL must use HTTPS (got: {})", url.scheme());
        }

        if self.authority.device_id.trim().is_empty() {
            anyhow::bail!("Device id must not be empty");
        }

        if self.authority.request_timeout < 1 {
            anyhow::bail!("Request timeout must be at least 1 second");
        }

        if self.monitor.check_interval < 5 {
            anyhow::bail!(
                "Check interval must be at least 5 seconds (got: {})",
                self.monitor.check_interval
            );
        }

        if self.protection.max_polls < 1 {
            anyhow::bail!("Protection max_polls must be at least 1");
        }

        Ok(())
    }
}

/// Get the agent config file path
pub fn get_agent_config_path() -> PathBuf {
    PathBuf::from("/etc/curfew-agent/agent.conf")
}
