//! Scheduler Engine — bridges persisted jobs and live timed triggers.
//!
//! Every mutation goes through the engine so that the store and the set of
//! registered triggers never diverge. Fired jobs are dispatched to the chat
//! pipeline and their run metadata written back through the store.
//!
//! Lock order: lifecycle → per-job → store. `start`/`stop` hold the
//! lifecycle lock exclusively; job operations share it and serialise per
//! job. The store mutex is never held across an `.await`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::OwnedMutexGuard;
use vigil_core::config::parse_timezone;
use vigil_core::{Result, SchedulerConfig, VigilConfig, VigilError};

use crate::cron::{self, CronSchedule};
use crate::dispatch::{ChatPipeline, Dispatcher};
use crate::heartbeat::{HEARTBEAT_JOB_ID, HeartbeatChange, HeartbeatSynchronizer};
use crate::job::{Job, JobKind, JobUpdate};
use crate::store::JobStore;
use crate::trigger::{FireCallback, TriggerSet};

/// The scheduler engine — manages jobs and fires them on schedule.
pub struct SchedulerEngine {
    store: Mutex<JobStore>,
    heartbeat: Mutex<HeartbeatSynchronizer>,
    dispatcher: Dispatcher,
    triggers: TriggerSet,
    job_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    lifecycle: tokio::sync::RwLock<()>,
    running: AtomicBool,
    shutdown_grace: Duration,
}

impl SchedulerEngine {
    /// Create an engine over an opened store. Nothing fires until [`start`](Self::start).
    pub fn new(
        store: JobStore,
        pipeline: Arc<dyn ChatPipeline>,
        heartbeat: HeartbeatSynchronizer,
        config: &SchedulerConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|engine: &Weak<Self>| {
            let engine = engine.clone();
            let callback: FireCallback = Arc::new(move |id: String| {
                let engine = engine.clone();
                async move {
                    if let Some(engine) = engine.upgrade() {
                        engine.execute_job(&id).await;
                    }
                }
                .boxed()
            });

            Self {
                store: Mutex::new(store),
                heartbeat: Mutex::new(heartbeat),
                dispatcher: Dispatcher::new(pipeline, config),
                triggers: TriggerSet::new(callback),
                job_locks: Mutex::new(HashMap::new()),
                lifecycle: tokio::sync::RwLock::new(()),
                running: AtomicBool::new(false),
                shutdown_grace: Duration::from_secs(config.shutdown_grace_secs),
            }
        })
    }

    /// Build from the root config: opens the job file and derives the heartbeat.
    pub fn from_config(config: &VigilConfig, pipeline: Arc<dyn ChatPipeline>) -> Arc<Self> {
        let store = JobStore::open(&config.jobs_path());
        Self::new(
            store,
            pipeline,
            HeartbeatSynchronizer::from_config(config),
            &config.scheduler,
        )
    }

    // -- Lifecycle -------------------------------------------------------------

    /// Reconcile the heartbeat job and register a trigger for every enabled job.
    /// Calling it on a running engine is a no-op.
    pub async fn start(&self) -> Result<()> {
        let _life = self.lifecycle.write().await;
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        {
            let sync = self.heartbeat_sync();
            if let Err(e) = sync.reconcile(&mut self.store()) {
                tracing::warn!("⚠️ Heartbeat not scheduled: {e}");
            }
        }
        self.refresh_stale_next_runs();
        self.running.store(true, Ordering::SeqCst);

        let jobs: Vec<Job> = self.store().all().to_vec();
        for job in jobs.iter().filter(|j| j.enabled) {
            self.register(job);
        }

        tracing::info!(
            "⏰ Scheduler started with {} jobs ({} registered)",
            jobs.len(),
            self.triggers.len()
        );
        Ok(())
    }

    /// Unregister every trigger and let in-flight executions finish (up to the
    /// shutdown grace period). Persisted state is left untouched.
    pub async fn stop(&self) {
        let _life = self.lifecycle.write().await;
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.triggers.shutdown(self.shutdown_grace).await;
        tracing::info!("Scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.triggers.contains(id)
    }

    pub fn registered_ids(&self) -> Vec<String> {
        self.triggers.ids()
    }

    // -- Job management --------------------------------------------------------

    /// Validate, persist, and (if running and enabled) register a new job.
    ///
    /// An invalid schedule, zone, or empty name is rejected before anything is written,
    /// as is a heartbeat job or an id that is already taken.
    pub async fn add_job(&self, mut job: Job) -> Result<Job> {
        if job.name.trim().is_empty() {
            return Err(VigilError::InvalidJob("job name must not be empty".into()));
        }
        if job.kind == JobKind::Heartbeat || job.id == HEARTBEAT_JOB_ID {
            return Err(VigilError::InvalidJob(
                "the heartbeat job is managed by the heartbeat config".into(),
            ));
        }
        let schedule = CronSchedule::parse(&job.schedule)?;
        job.schedule = schedule.to_string();
        job.next_run = Some(cron::next_run_from_cron(&job.schedule, &job.timezone, Utc::now())?);

        let _life = self.lifecycle.read().await;
        let _guard = self.lock_job(&job.id).await;
        {
            let mut store = self.store();
            if store.get(&job.id).is_some() {
                return Err(VigilError::InvalidJob(format!("job id '{}' already exists", job.id)));
            }
            store.add(job.clone())?;
        }
        if job.enabled && self.is_running() {
            self.register(&job);
        }

        tracing::info!("📅 Added job {} ({}): {}", job.id, job.name, job.schedule);
        Ok(job)
    }

    /// Edit a job's name, schedule, command, or timezone.
    ///
    /// Returns `Ok(None)` for an unknown id. `next_run` is recomputed and the
    /// trigger re-registered when the timing changes.
    pub async fn update_job(&self, id: &str, update: JobUpdate) -> Result<Option<Job>> {
        let _life = self.lifecycle.read().await;
        let _guard = self.lock_job(id).await;
        let Some(mut job) = self.store().get(id).cloned() else {
            return Ok(None);
        };

        let retimed = update.changes_timing(&job);
        if let Some(name) = update.name {
            if name.trim().is_empty() {
                return Err(VigilError::InvalidJob("job name must not be empty".into()));
            }
            job.name = name;
        }
        if let Some(schedule) = update.schedule {
            job.schedule = CronSchedule::parse(&schedule)?.to_string();
        }
        if let Some(timezone) = update.timezone {
            parse_timezone(&timezone)?;
            job.timezone = timezone;
        }
        if let Some(command) = update.command {
            job.command = command;
        }
        if retimed {
            let next = cron::next_run_from_cron(&job.schedule, &job.timezone, Utc::now())?;
            job.next_run = Some(next);
        }

        self.store().update(job.clone())?;
        if retimed && job.enabled && self.is_running() {
            self.register(&job);
        }

        tracing::info!("✏️ Updated job {} ({})", job.id, job.name);
        Ok(Some(job))
    }

    /// Remove a job from the scheduler and the store. Returns whether it existed.
    pub async fn remove_job(&self, id: &str) -> Result<bool> {
        let _life = self.lifecycle.read().await;
        let guard = self.lock_job(id).await;
        self.triggers.unregister(id);
        let removed = self.store().remove(id)?;
        drop(guard);
        self.job_locks().remove(id);

        if removed {
            tracing::info!("🗑️ Removed job {}", id);
        }
        Ok(removed)
    }

    /// Disable a job without deleting it. `next_run` is left as is.
    pub async fn pause_job(&self, id: &str) -> Result<Option<Job>> {
        let _life = self.lifecycle.read().await;
        let _guard = self.lock_job(id).await;
        let Some(mut job) = self.store().get(id).cloned() else {
            return Ok(None);
        };

        self.triggers.unregister(id);
        if job.enabled {
            job.enabled = false;
            self.store().update(job.clone())?;
        }

        tracing::info!("⏸️ Paused job {} ({})", id, job.name);
        Ok(Some(job))
    }

    /// Re-enable a job, recompute `next_run` from now, and re-register it.
    pub async fn resume_job(&self, id: &str) -> Result<Option<Job>> {
        let _life = self.lifecycle.read().await;
        let _guard = self.lock_job(id).await;
        let Some(mut job) = self.store().get(id).cloned() else {
            return Ok(None);
        };

        job.enabled = true;
        job.next_run = Some(cron::next_run_from_cron(&job.schedule, &job.timezone, Utc::now())?);
        self.store().update(job.clone())?;
        if self.is_running() {
            self.register(&job);
        }

        tracing::info!("▶️ Resumed job {} ({})", id, job.name);
        Ok(Some(job))
    }

    pub fn get_job(&self, id: &str) -> Option<Job> {
        self.store().get(id).cloned()
    }

    pub fn list_jobs(&self) -> Vec<Job> {
        self.store().all().to_vec()
    }

    /// Replace the heartbeat configuration and reconcile immediately.
    pub async fn apply_heartbeat_config(&self, sync: HeartbeatSynchronizer) -> Result<HeartbeatChange> {
        let _life = self.lifecycle.read().await;
        let _guard = self.lock_job(HEARTBEAT_JOB_ID).await;

        let change = sync.reconcile(&mut self.store())?;
        *self.heartbeat.lock().unwrap_or_else(|e| e.into_inner()) = sync;

        if self.is_running() {
            match change {
                HeartbeatChange::Created | HeartbeatChange::Updated => {
                    if let Some(job) = self.get_job(HEARTBEAT_JOB_ID) {
                        self.register(&job);
                    }
                }
                HeartbeatChange::Removed => {
                    self.triggers.unregister(HEARTBEAT_JOB_ID);
                }
                HeartbeatChange::Unchanged | HeartbeatChange::Absent => {}
            }
        }
        Ok(change)
    }

    // -- Execution -------------------------------------------------------------

    /// Run a job outside its schedule. Returns `false` for an unknown id.
    pub async fn run_job_now(&self, id: &str) -> bool {
        if self.get_job(id).is_none() {
            return false;
        }
        self.execute_job(id).await;
        true
    }

    /// Fire path: dispatch the job's command and record the outcome.
    ///
    /// A job deleted between scheduling and firing is ignored. Pipeline
    /// failures end up in `last_result`; nothing here returns an error.
    pub async fn execute_job(&self, id: &str) {
        let Some(job) = self.get_job(id) else {
            tracing::debug!("Triggered job {} no longer exists", id);
            return;
        };

        tracing::info!("🔔 Executing job {} ({}): {}", job.id, job.name, job.command);
        let outcome = self.dispatcher.dispatch(&job).await;

        let _guard = self.lock_job(id).await;
        let mut store = self.store();
        let Some(mut current) = store.get(id).cloned() else {
            tracing::debug!("Job {} was removed while executing", id);
            return;
        };

        current.last_run = Some(Utc::now());
        current.run_count += 1;
        current.last_result = Some(outcome.summary);
        if current.enabled {
            match cron::next_run_from_cron(&current.schedule, &current.timezone, Utc::now()) {
                Ok(next) => current.next_run = Some(next),
                Err(e) => tracing::warn!("⚠️ Could not compute next run for job {}: {e}", id),
            }
        }

        if let Err(e) = store.update(current) {
            tracing::warn!("⚠️ Failed to record run of job {}: {e}", id);
        }
    }

    // -- Internal helpers ------------------------------------------------------

    /// Start (or replace) the trigger for a job. Jobs whose schedule or zone no
    /// longer parses are skipped with a warning.
    fn register(&self, job: &Job) {
        let schedule = match CronSchedule::parse(&job.schedule) {
            Ok(schedule) => schedule,
            Err(e) => {
                tracing::warn!("⚠️ Failed to register job {}: {e}", job.id);
                return;
            }
        };
        let tz = match parse_timezone(&job.timezone) {
            Ok(tz) => tz,
            Err(e) => {
                tracing::warn!("⚠️ Failed to register job {}: {e}", job.id);
                return;
            }
        };
        self.triggers.register(&job.id, schedule, tz);
    }

    /// Recompute `next_run` for enabled jobs whose value is missing or already past.
    fn refresh_stale_next_runs(&self) {
        let now = Utc::now();
        let mut store = self.store();
        let stale: Vec<Job> = store
            .all()
            .iter()
            .filter(|j| j.enabled && j.next_run.is_none_or(|next| next <= now))
            .cloned()
            .collect();

        for mut job in stale {
            match cron::next_run_from_cron(&job.schedule, &job.timezone, now) {
                Ok(next) => {
                    job.next_run = Some(next);
                    if let Err(e) = store.update(job) {
                        tracing::warn!("⚠️ Failed to save next run: {e}");
                    }
                }
                Err(e) => tracing::warn!("⚠️ Job {} has an unusable schedule: {e}", job.id),
            }
        }
    }

    async fn lock_job(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .job_locks()
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    fn store(&self) -> MutexGuard<'_, JobStore> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn job_locks(&self) -> MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<()>>>> {
        self.job_locks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn heartbeat_sync(&self) -> HeartbeatSynchronizer {
        self.heartbeat
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
