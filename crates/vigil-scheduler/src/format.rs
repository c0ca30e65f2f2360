//! Human-readable job summaries for the CLI and agent tools.

use chrono::{DateTime, Utc};

use crate::dispatch::truncate_chars;
use crate::job::Job;

const RESULT_PREVIEW_CHARS: usize = 200;

fn timestamp(at: Option<DateTime<Utc>>, missing: &str) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| missing.to_string())
}

fn status(job: &Job) -> &'static str {
    if job.enabled { "enabled" } else { "paused" }
}

/// One entry per job: name, id, status, then schedule and run stats.
pub fn format_job_list(jobs: &[Job]) -> String {
    if jobs.is_empty() {
        return "No scheduled jobs.".to_string();
    }

    let mut out = format!("⏰ Scheduled jobs ({})\n", jobs.len());
    out.push_str(&"─".repeat(60));
    out.push('\n');
    for job in jobs {
        out.push_str(&format!("  {} (ID: {}) [{}]\n", job.name, job.id, status(job)));
        out.push_str(&format!(
            "     Cron: {} ({}) | Kind: {} | Runs: {} | Last: {} | Next: {}\n",
            job.schedule,
            job.timezone,
            job.kind,
            job.run_count,
            timestamp(job.last_run, "never"),
            timestamp(job.next_run, "N/A"),
        ));
    }
    out
}

pub fn format_job_details(job: &Job) -> String {
    let mut out = format!("📅 Job: {}\n", job.name);
    out.push_str(&format!("  ID:        {}\n", job.id));
    out.push_str(&format!("  Cron:      {}\n", job.schedule));
    out.push_str(&format!("  Command:   {}\n", job.command));
    out.push_str(&format!("  Kind:      {}\n", job.kind));
    out.push_str(&format!("  Status:    {}\n", status(job)));
    out.push_str(&format!("  Timezone:  {}\n", job.timezone));
    out.push_str(&format!("  Created:   {}\n", timestamp(Some(job.created_at), "")));
    out.push_str(&format!("  Last run:  {}\n", timestamp(job.last_run, "never")));
    out.push_str(&format!("  Next run:  {}\n", timestamp(job.next_run, "N/A")));
    out.push_str(&format!("  Run count: {}\n", job.run_count));
    if let Some(result) = job.last_result.as_deref().filter(|r| !r.is_empty()) {
        out.push_str(&format!(
            "  Last result: {}\n",
            truncate_chars(result, RESULT_PREVIEW_CHARS)
        ));
    }
    out
}
