//! Heartbeat job — a single well-known system job derived from `HeartbeatConfig`.
//!
//! Reconciliation is idempotent: the job is created, updated in place
//! (keeping its run history), or removed so that the store always matches
//! the current configuration.

use chrono::{DateTime, Utc};
use vigil_core::{HeartbeatConfig, Result, VigilConfig};

use crate::cron;
use crate::job::{Job, JobKind};
use crate::store::JobStore;

/// Fixed id of the heartbeat job.
pub const HEARTBEAT_JOB_ID: &str = "__heartbeat__";

/// Marker the agent replies with when nothing needs attention.
pub const HEARTBEAT_OK: &str = "HEARTBEAT_OK";

/// Command dispatched on every heartbeat.
pub const HEARTBEAT_COMMAND: &str = "Run your HEARTBEAT.md checklist now. \
     Respond with HEARTBEAT_OK if everything is fine, \
     or alert the user on their primary channel if something needs attention.";

/// Cron expression for a heartbeat config: `*/<interval> <start>-<end> * * *`.
pub fn heartbeat_schedule(config: &HeartbeatConfig) -> String {
    format!(
        "*/{} {}-{} * * *",
        config.interval_minutes, config.active_hours_start, config.active_hours_end
    )
}

/// What a reconciliation did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatChange {
    Created,
    Updated,
    Unchanged,
    Removed,
    /// Heartbeat disabled and no job present.
    Absent,
}

/// Keeps the heartbeat job consistent with configuration.
#[derive(Debug, Clone)]
pub struct HeartbeatSynchronizer {
    config: HeartbeatConfig,
    timezone: String,
}

impl HeartbeatSynchronizer {
    /// `timezone` is the zone the heartbeat runs in (already resolved).
    pub fn new(config: HeartbeatConfig, timezone: &str) -> Self {
        Self {
            config,
            timezone: timezone.to_string(),
        }
    }

    pub fn from_config(config: &VigilConfig) -> Self {
        Self::new(config.heartbeat.clone(), config.heartbeat_timezone())
    }

    pub fn config(&self) -> &HeartbeatConfig {
        &self.config
    }

    pub fn timezone(&self) -> &str {
        &self.timezone
    }

    /// Bring the store in line with the configuration.
    ///
    /// Invalid configuration is rejected before anything is written.
    pub fn reconcile(&self, store: &mut JobStore) -> Result<HeartbeatChange> {
        self.reconcile_at(store, Utc::now())
    }

    pub(crate) fn reconcile_at(
        &self,
        store: &mut JobStore,
        now: DateTime<Utc>,
    ) -> Result<HeartbeatChange> {
        if !self.config.enabled {
            if store.remove(HEARTBEAT_JOB_ID)? {
                tracing::debug!("Heartbeat disabled, removed heartbeat job");
                return Ok(HeartbeatChange::Removed);
            }
            return Ok(HeartbeatChange::Absent);
        }

        self.config.validate()?;
        let schedule = heartbeat_schedule(&self.config);
        let next_run = cron::next_run_from_cron(&schedule, &self.timezone, now)?;

        let Some(existing) = store.get(HEARTBEAT_JOB_ID).cloned() else {
            let mut job = Job::new("Heartbeat", &schedule, HEARTBEAT_COMMAND)
                .with_id(HEARTBEAT_JOB_ID)
                .with_kind(JobKind::Heartbeat)
                .with_timezone(&self.timezone);
            job.next_run = Some(next_run);
            store.add(job)?;
            tracing::info!("💓 Created heartbeat job: {} (tz={})", schedule, self.timezone);
            return Ok(HeartbeatChange::Created);
        };

        let unchanged = existing.schedule == schedule
            && existing.timezone == self.timezone
            && existing.enabled
            && existing.command == HEARTBEAT_COMMAND
            && existing.kind == JobKind::Heartbeat;
        if unchanged {
            return Ok(HeartbeatChange::Unchanged);
        }

        let mut job = existing;
        let retimed = job.schedule != schedule || job.timezone != self.timezone || !job.enabled;
        job.schedule = schedule;
        job.timezone = self.timezone.clone();
        job.enabled = true;
        job.command = HEARTBEAT_COMMAND.to_string();
        job.kind = JobKind::Heartbeat;
        if retimed || job.next_run.is_none() {
            job.next_run = Some(next_run);
        }
        tracing::debug!("Updated heartbeat job: {} (tz={})", job.schedule, job.timezone);
        store.update(job)?;
        Ok(HeartbeatChange::Updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::VigilError;

    fn enabled(interval: u32, start: u32, end: u32) -> HeartbeatConfig {
        HeartbeatConfig {
            enabled: true,
            interval_minutes: interval,
            active_hours_start: start,
            active_hours_end: end,
            timezone: String::new(),
        }
    }

    fn temp_store(dir: &tempfile::TempDir) -> JobStore {
        JobStore::open(&dir.path().join("cron_jobs.json"))
    }

    #[test]
    fn test_schedule_string() {
        assert_eq!(heartbeat_schedule(&enabled(30, 8, 22)), "*/30 8-22 * * *");
        assert_eq!(heartbeat_schedule(&enabled(15, 0, 23)), "*/15 0-23 * * *");
    }

    #[test]
    fn test_creates_job_with_well_known_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = temp_store(&dir);
        let sync = HeartbeatSynchronizer::new(enabled(30, 8, 22), "Europe/Rome");

        let now = Utc::now();
        assert_eq!(sync.reconcile_at(&mut store, now).unwrap(), HeartbeatChange::Created);

        let job = store.get(HEARTBEAT_JOB_ID).unwrap();
        assert_eq!(job.kind, JobKind::Heartbeat);
        assert_eq!(job.schedule, "*/30 8-22 * * *");
        assert_eq!(job.timezone, "Europe/Rome");
        assert_eq!(job.command, HEARTBEAT_COMMAND);
        assert!(job.next_run.unwrap() > now);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = temp_store(&dir);
        let sync = HeartbeatSynchronizer::new(enabled(30, 8, 22), "UTC");

        sync.reconcile(&mut store).unwrap();
        let before = store.get(HEARTBEAT_JOB_ID).cloned().unwrap();
        assert_eq!(sync.reconcile(&mut store).unwrap(), HeartbeatChange::Unchanged);
        let after = store.get(HEARTBEAT_JOB_ID).cloned().unwrap();

        assert_eq!(before, after);
        assert_eq!(store.find_by_kind(JobKind::Heartbeat).len(), 1);
    }

    #[test]
    fn test_update_preserves_history() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = temp_store(&dir);
        HeartbeatSynchronizer::new(enabled(30, 8, 22), "UTC")
            .reconcile(&mut store)
            .unwrap();

        let mut job = store.get(HEARTBEAT_JOB_ID).cloned().unwrap();
        job.run_count = 4;
        job.last_result = Some("HEARTBEAT_OK".into());
        store.update(job).unwrap();

        let change = HeartbeatSynchronizer::new(enabled(10, 9, 17), "Asia/Tokyo")
            .reconcile(&mut store)
            .unwrap();
        assert_eq!(change, HeartbeatChange::Updated);

        let job = store.get(HEARTBEAT_JOB_ID).unwrap();
        assert_eq!(job.schedule, "*/10 9-17 * * *");
        assert_eq!(job.timezone, "Asia/Tokyo");
        assert_eq!(job.run_count, 4);
        assert_eq!(job.last_result.as_deref(), Some("HEARTBEAT_OK"));
    }

    #[test]
    fn test_disable_removes_and_reenable_recreates() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = temp_store(&dir);
        let on = HeartbeatSynchronizer::new(enabled(30, 8, 22), "UTC");
        on.reconcile(&mut store).unwrap();

        let mut job = store.get(HEARTBEAT_JOB_ID).cloned().unwrap();
        job.run_count = 9;
        store.update(job).unwrap();

        let off = HeartbeatSynchronizer::new(HeartbeatConfig::default(), "UTC");
        assert_eq!(off.reconcile(&mut store).unwrap(), HeartbeatChange::Removed);
        assert!(store.get(HEARTBEAT_JOB_ID).is_none());
        assert_eq!(off.reconcile(&mut store).unwrap(), HeartbeatChange::Absent);

        assert_eq!(on.reconcile(&mut store).unwrap(), HeartbeatChange::Created);
        assert_eq!(store.get(HEARTBEAT_JOB_ID).unwrap().run_count, 0);
    }

    #[test]
    fn test_overnight_window_rejected_without_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = temp_store(&dir);
        let sync = HeartbeatSynchronizer::new(enabled(30, 22, 6), "UTC");

        assert!(matches!(sync.reconcile(&mut store), Err(VigilError::Config(_))));
        assert!(store.is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_from_config_falls_back_to_root_timezone() {
        let mut config = VigilConfig::default();
        config.timezone = "America/Chicago".into();
        config.heartbeat = enabled(30, 8, 22);
        let sync = HeartbeatSynchronizer::from_config(&config);
        assert_eq!(sync.timezone(), "America/Chicago");
    }
}
