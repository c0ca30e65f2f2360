//! Vigil configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, VigilError};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VigilConfig {
    /// Default IANA zone for jobs created without an explicit timezone.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

fn default_timezone() -> String { "UTC".into() }
fn default_data_dir() -> String { "~/.vigil".into() }

impl Default for VigilConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            data_dir: default_data_dir(),
            heartbeat: HeartbeatConfig::default(),
            scheduler: SchedulerConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl VigilConfig {
    /// Load config from the default path (~/.vigil/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| VigilError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| VigilError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| VigilError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check the root timezone.
    ///
    /// The heartbeat section is checked when it is reconciled, so a bad
    /// window only disables the heartbeat.
    pub fn validate(&self) -> Result<()> {
        parse_timezone(&self.timezone)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Vigil home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".vigil")
    }

    /// Expanded data directory.
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.data_dir).to_string())
    }

    /// Path of the persisted job file. Falls back to `<data_dir>/cron_jobs.json`.
    pub fn jobs_path(&self) -> PathBuf {
        match &self.scheduler.jobs_file {
            Some(file) => PathBuf::from(shellexpand::tilde(file).to_string()),
            None => self.data_path().join("cron_jobs.json"),
        }
    }

    /// Zone the heartbeat job runs in: its own, or the root default.
    pub fn heartbeat_timezone(&self) -> &str {
        if self.heartbeat.timezone.trim().is_empty() {
            &self.timezone
        } else {
            &self.heartbeat.timezone
        }
    }
}

/// Heartbeat / proactive wake settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u32,
    /// First active hour (24h, inclusive).
    #[serde(default = "default_active_start")]
    pub active_hours_start: u32,
    /// Last active hour (24h). Must be after `active_hours_start`.
    #[serde(default = "default_active_end")]
    pub active_hours_end: u32,
    /// Empty means "use the root timezone".
    #[serde(default)]
    pub timezone: String,
}

fn default_interval_minutes() -> u32 { 30 }
fn default_active_start() -> u32 { 8 }
fn default_active_end() -> u32 { 22 }

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: default_interval_minutes(),
            active_hours_start: default_active_start(),
            active_hours_end: default_active_end(),
            timezone: String::new(),
        }
    }
}

impl HeartbeatConfig {
    /// Validate the interval and active-hours window.
    ///
    /// Windows that wrap past midnight (e.g. 22 → 6) are rejected: cron hour
    /// ranges do not wrap.
    pub fn validate(&self) -> Result<()> {
        if !(1..=59).contains(&self.interval_minutes) {
            return Err(VigilError::Config(format!(
                "heartbeat.interval_minutes must be between 1 and 59, got {}",
                self.interval_minutes
            )));
        }
        if self.active_hours_start > 23 || self.active_hours_end > 23 {
            return Err(VigilError::Config(format!(
                "heartbeat active hours must be within 0-23, got {}-{}",
                self.active_hours_start, self.active_hours_end
            )));
        }
        if self.active_hours_start >= self.active_hours_end {
            return Err(VigilError::Config(format!(
                "heartbeat.active_hours_start ({}) must be before active_hours_end ({})",
                self.active_hours_start, self.active_hours_end
            )));
        }
        if !self.timezone.trim().is_empty() {
            parse_timezone(&self.timezone)?;
        }
        Ok(())
    }
}

/// Scheduler engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Override for the job file location.
    #[serde(default)]
    pub jobs_file: Option<String>,
    /// Upper bound on a single chat pipeline call.
    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_secs: u64,
    /// How long `stop()` waits for in-flight executions before aborting them.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
    /// `last_result` is truncated to this many characters.
    #[serde(default = "default_result_max_chars")]
    pub result_max_chars: usize,
}

fn default_dispatch_timeout() -> u64 { 300 }
fn default_shutdown_grace() -> u64 { 10 }
fn default_result_max_chars() -> usize { 500 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            jobs_file: None,
            dispatch_timeout_secs: default_dispatch_timeout(),
            shutdown_grace_secs: default_shutdown_grace(),
            result_max_chars: default_result_max_chars(),
        }
    }
}

/// HTTP chat pipeline endpoint used by `vigil run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_pipeline_url")]
    pub url: String,
    #[serde(default = "default_pipeline_timeout")]
    pub timeout_secs: u64,
}

fn default_pipeline_url() -> String { "http://127.0.0.1:3000/api/chat".into() }
fn default_pipeline_timeout() -> u64 { 120 }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            url: default_pipeline_url(),
            timeout_secs: default_pipeline_timeout(),
        }
    }
}

/// Parse an IANA zone name such as "Europe/London".
pub fn parse_timezone(name: &str) -> Result<chrono_tz::Tz> {
    name.trim()
        .parse::<chrono_tz::Tz>()
        .map_err(|_| VigilError::InvalidTimezone(name.to_string()))
}
