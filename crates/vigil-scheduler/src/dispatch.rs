//! Job dispatch — turns a fired job into a chat pipeline call.
//!
//! The pipeline is an external collaborator; anything it returns or raises
//! is folded into a [`DispatchOutcome`] so the fire path never fails.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vigil_core::{Result, SchedulerConfig};

use crate::heartbeat::HEARTBEAT_OK;
use crate::job::{Job, JobKind};

/// Channel tag for scheduler-originated traffic.
pub const SCHEDULER_CHANNEL: &str = "scheduler";

/// Message handed to the chat pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub text: String,
    pub channel: String,
    pub user_id: String,
    pub session_id: String,
}

impl DispatchRequest {
    pub fn for_job(job: &Job) -> Self {
        Self {
            text: job.command.clone(),
            channel: SCHEDULER_CHANNEL.to_string(),
            user_id: SCHEDULER_CHANNEL.to_string(),
            session_id: format!("scheduler-{}", job.id),
        }
    }
}

/// Pipeline reply. Either field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ChatReply {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            error: None,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: None,
            error: Some(text.into()),
        }
    }
}

/// The chat/agent pipeline that answers dispatched commands.
#[async_trait]
pub trait ChatPipeline: Send + Sync {
    async fn run(&self, request: DispatchRequest) -> Result<ChatReply>;
}

#[async_trait]
impl<F, Fut> ChatPipeline for F
where
    F: Fn(DispatchRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ChatReply>> + Send + 'static,
{
    async fn run(&self, request: DispatchRequest) -> Result<ChatReply> {
        (self)(request).await
    }
}

/// Result of one dispatch, ready to be written into `last_result`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub success: bool,
    pub summary: String,
}

/// Calls the pipeline for fired jobs, with a timeout and result truncation.
pub struct Dispatcher {
    pipeline: Arc<dyn ChatPipeline>,
    timeout: Option<Duration>,
    result_max_chars: usize,
}

impl Dispatcher {
    pub fn new(pipeline: Arc<dyn ChatPipeline>, config: &SchedulerConfig) -> Self {
        Self {
            pipeline,
            timeout: (config.dispatch_timeout_secs > 0)
                .then(|| Duration::from_secs(config.dispatch_timeout_secs)),
            result_max_chars: config.result_max_chars,
        }
    }

    /// Send the job's command through the pipeline. Never fails.
    pub async fn dispatch(&self, job: &Job) -> DispatchOutcome {
        let request = DispatchRequest::for_job(job);
        let call = self.pipeline.run(request);

        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!("⚠️ Job '{}' timed out after {}s", job.name, limit.as_secs());
                    return DispatchOutcome {
                        success: false,
                        summary: format!("Timed out after {}s", limit.as_secs()),
                    };
                }
            },
            None => call.await,
        };

        let outcome = match result {
            Ok(ChatReply {
                content: Some(content),
                ..
            }) if !content.is_empty() => DispatchOutcome {
                success: true,
                summary: truncate_chars(&content, self.result_max_chars),
            },
            Ok(reply) => DispatchOutcome {
                success: false,
                summary: reply.error.unwrap_or_else(|| "Empty response".to_string()),
            },
            Err(e) => DispatchOutcome {
                success: false,
                summary: e.to_string(),
            },
        };

        if job.kind == JobKind::Heartbeat {
            log_heartbeat(&outcome);
        } else if outcome.success {
            tracing::info!("✅ Job '{}' completed: {}", job.name, preview(&outcome.summary));
        } else {
            tracing::warn!("⚠️ Job '{}' failed: {}", job.name, outcome.summary);
        }

        outcome
    }
}

fn log_heartbeat(outcome: &DispatchOutcome) {
    if outcome.success && outcome.summary.contains(HEARTBEAT_OK) {
        tracing::debug!("Heartbeat OK");
    } else {
        tracing::warn!(
            "Heartbeat response (agent may have sent an alert): {}",
            preview(&outcome.summary)
        );
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > 200 {
        format!("{}...", truncate_chars(text, 200))
    } else {
        text.to_string()
    }
}

/// First `max` characters of `text`, never splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
