//! Job definitions — the core data model for scheduled work.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// A scheduled job that sends a natural-language command to the chat pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID (12 hex chars).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// 5-field cron expression, e.g. "*/30 * * * *".
    pub schedule: String,
    /// Message sent to the chat pipeline when the job fires.
    pub command: String,
    #[serde(default)]
    pub kind: JobKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// IANA zone the schedule is evaluated in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_run: Option<DateTime<Utc>>,
    /// Reply content or error text from the most recent execution.
    #[serde(default)]
    pub last_result: Option<String>,
    /// Completed executions, successful or not.
    #[serde(default)]
    pub run_count: u64,
}

fn default_enabled() -> bool { true }
fn default_timezone() -> String { "UTC".into() }

/// Classification of jobs. Display and filtering only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    #[default]
    User,
    Heartbeat,
    System,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::User => write!(f, "user"),
            JobKind::Heartbeat => write!(f, "heartbeat"),
            JobKind::System => write!(f, "system"),
        }
    }
}

impl Job {
    /// Create an enabled user job in UTC. `next_run` is filled in by the engine.
    pub fn new(name: &str, schedule: &str, command: &str) -> Self {
        Self {
            id: generate_id(),
            name: name.to_string(),
            schedule: schedule.to_string(),
            command: command.to_string(),
            kind: JobKind::User,
            enabled: true,
            timezone: default_timezone(),
            created_at: Utc::now(),
            last_run: None,
            next_run: None,
            last_result: None,
            run_count: 0,
        }
    }

    pub fn with_timezone(mut self, timezone: &str) -> Self {
        self.timezone = timezone.to_string();
        self
    }

    pub fn with_kind(mut self, kind: JobKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    /// Create the job disabled; it is persisted but never registered.
    pub fn paused(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Partial edit of a job's user-facing fields. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub name: Option<String>,
    pub schedule: Option<String>,
    pub command: Option<String>,
    pub timezone: Option<String>,
}

impl JobUpdate {
    /// Whether applying this update changes when the job fires.
    pub fn changes_timing(&self, job: &Job) -> bool {
        self.schedule.as_deref().is_some_and(|s| s != job.schedule)
            || self.timezone.as_deref().is_some_and(|tz| tz != job.timezone)
    }
}

/// 12 hex characters from the OS random source.
pub fn generate_id() -> String {
    let mut bytes = [0u8; 6];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
