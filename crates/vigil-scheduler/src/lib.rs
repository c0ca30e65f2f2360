//! # Vigil Scheduler
//!
//! Persistent cron jobs that wake the agent on a schedule.
//!
//! ## Design Principles
//! - One JSON file per store, rewritten atomically on every mutation
//! - Tokio timers only — one task per enabled job, zero overhead when idle
//! - Cron evaluated in each job's own IANA timezone
//! - Heartbeat job derived from config, reconciled on start
//!
//! ## Architecture
//! ```text
//! SchedulerEngine
//!   ├── JobStore: ~/.vigil/cron_jobs.json
//!   ├── HeartbeatSynchronizer: "*/30 8-22 * * *" → "__heartbeat__"
//!   ├── TriggerSet: job id → tokio task (sleep until next cron instant)
//!   └── on fire → Dispatcher → ChatPipeline (HTTP gateway)
//!                   └── result → last_run / run_count / last_result / next_run
//! ```

pub mod cron;
pub mod dispatch;
pub mod engine;
pub mod format;
pub mod heartbeat;
pub mod job;
pub mod pipeline;
pub mod store;
pub mod trigger;

pub use crate::cron::{CronSchedule, next_run_from_cron};
pub use dispatch::{ChatPipeline, ChatReply, DispatchOutcome, DispatchRequest, Dispatcher};
pub use engine::SchedulerEngine;
pub use format::{format_job_details, format_job_list};
pub use heartbeat::{HEARTBEAT_JOB_ID, HeartbeatChange, HeartbeatSynchronizer};
pub use job::{Job, JobKind, JobUpdate};
pub use pipeline::HttpPipeline;
pub use store::JobStore;
