//! Timed triggers — one tokio task per registered job.
//!
//! Each trigger sleeps until the next cron instant, awaits the fire
//! callback, then computes the following instant. A job therefore never
//! overlaps itself, while different jobs fire independently. Missed
//! instants (long execution, suspended host) are coalesced into one fire.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use futures::future::BoxFuture;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::cron::CronSchedule;

/// Longest single sleep; the wall clock is re-checked after each.
const MAX_SLEEP: Duration = Duration::from_secs(60);

/// Invoked with the job id each time a trigger fires.
pub type FireCallback = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

struct Trigger {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    /// Replaced tasks this one waits on before its first sleep.
    predecessors: Vec<AbortHandle>,
}

#[derive(Default)]
struct Slots {
    active: HashMap<String, Trigger>,
    /// Unregistered triggers that may still be executing their job.
    retired: HashMap<String, Vec<Trigger>>,
}

impl Slots {
    fn retire(&mut self, id: &str, trigger: Trigger) {
        trigger.cancel.cancel();
        let retired = self.retired.entry(id.to_string()).or_default();
        retired.retain(|t| !t.handle.is_finished());
        if !trigger.handle.is_finished() {
            retired.push(trigger);
        }
        if retired.is_empty() {
            self.retired.remove(id);
        }
    }
}

/// Set of live triggers keyed by job id.
pub struct TriggerSet {
    slots: Mutex<Slots>,
    callback: FireCallback,
}

impl TriggerSet {
    pub fn new(callback: FireCallback) -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
            callback,
        }
    }

    /// Start a trigger for `id`, replacing any existing one.
    ///
    /// A replaced or recently unregistered trigger that is still executing
    /// the job is awaited before the new one starts counting, so one job
    /// never runs twice at once. Must be called from within a tokio runtime.
    pub fn register(&self, id: &str, schedule: CronSchedule, tz: Tz) {
        let mut slots = self.lock();
        let mut previous = slots.retired.remove(id).unwrap_or_default();
        if let Some(old) = slots.active.remove(id) {
            old.cancel.cancel();
            previous.push(old);
        }

        let mut waits = Vec::new();
        let mut predecessors = Vec::new();
        for trigger in previous {
            predecessors.push(trigger.handle.abort_handle());
            predecessors.extend(trigger.predecessors);
            waits.push(trigger.handle);
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_trigger(
            id.to_string(),
            schedule,
            tz,
            self.callback.clone(),
            cancel.clone(),
            waits,
        ));
        slots.active.insert(
            id.to_string(),
            Trigger {
                cancel,
                handle,
                predecessors,
            },
        );
    }

    /// Stop the trigger for `id`. An execution already in flight is left to
    /// finish and is still drained by [`shutdown`](Self::shutdown).
    pub fn unregister(&self, id: &str) -> bool {
        let mut slots = self.lock();
        match slots.active.remove(id) {
            Some(trigger) => {
                slots.retire(id, trigger);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().active.contains_key(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().active.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.lock().active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().active.is_empty()
    }

    /// Cancel every trigger, wait up to `grace` for in-flight executions, then abort the rest.
    pub async fn shutdown(&self, grace: Duration) {
        let drained: Vec<Trigger> = {
            let mut slots = self.lock();
            let retired = std::mem::take(&mut slots.retired).into_values().flatten();
            slots.active.drain().map(|(_, t)| t).chain(retired).collect()
        };
        if drained.is_empty() {
            return;
        }

        for trigger in &drained {
            trigger.cancel.cancel();
        }
        let mut aborts = Vec::new();
        let mut handles = Vec::new();
        for trigger in drained {
            aborts.push(trigger.handle.abort_handle());
            aborts.extend(trigger.predecessors);
            handles.push(trigger.handle);
        }

        if tokio::time::timeout(grace, futures::future::join_all(handles))
            .await
            .is_err()
        {
            tracing::warn!(
                "⚠️ In-flight jobs did not finish within {}s, aborting",
                grace.as_secs()
            );
            for abort in aborts {
                abort.abort();
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for TriggerSet {
    fn drop(&mut self) {
        let slots = self.lock();
        for trigger in slots.active.values().chain(slots.retired.values().flatten()) {
            trigger.cancel.cancel();
        }
    }
}

async fn run_trigger(
    id: String,
    schedule: CronSchedule,
    tz: Tz,
    callback: FireCallback,
    cancel: CancellationToken,
    predecessors: Vec<JoinHandle<()>>,
) {
    if !predecessors.is_empty() {
        futures::future::join_all(predecessors).await;
    }

    let mut after = Utc::now();
    loop {
        let Some(fire_at) = schedule.next_after(after, tz) else {
            tracing::warn!("⚠️ Schedule '{}' of job {} has no further occurrences", schedule, id);
            return;
        };

        loop {
            let now = Utc::now();
            if now >= fire_at {
                break;
            }
            let wait = (fire_at - now).to_std().unwrap_or_default().min(MAX_SLEEP);
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(wait) => {}
            }
        }
        if cancel.is_cancelled() {
            return;
        }

        tracing::debug!("🔔 Trigger fired for job {}", id);
        (callback)(id.clone()).await;
        after = std::cmp::max(fire_at, Utc::now());
    }
}
