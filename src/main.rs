//! # Vigil — scheduled agent jobs
//!
//! Usage:
//!   vigil run                                  # Start the scheduler until Ctrl+C
//!   vigil add "Brief" "0 8 * * 1-5" "Summarise my inbox" --tz Europe/Berlin
//!   vigil list                                 # Show all jobs
//!   vigil pause <id> | resume <id> | remove <id>
//!   vigil trigger <id>                         # Run a job once, right now

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use vigil_core::VigilConfig;
use vigil_scheduler::{
    HttpPipeline, Job, JobUpdate, SchedulerEngine, format_job_details, format_job_list,
};

#[derive(Parser)]
#[command(name = "vigil", version, about = "⏰ Vigil — persistent cron jobs for your agent")]
struct Cli {
    /// Config file (default: ~/.vigil/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the scheduler and fire jobs until interrupted
    Run,
    /// Add a job
    Add {
        name: String,
        /// 5-field cron expression, e.g. "*/15 9-17 * * 1-5"
        schedule: String,
        /// Text sent to the agent when the job fires
        command: String,
        /// IANA timezone (default: config timezone)
        #[arg(long = "tz")]
        timezone: Option<String>,
        /// Create the job paused
        #[arg(long)]
        paused: bool,
    },
    /// List all jobs
    List,
    /// Show one job
    Show { id: String },
    /// Change a job's name, schedule, command, or timezone
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        schedule: Option<String>,
        #[arg(long)]
        command: Option<String>,
        #[arg(long = "tz")]
        timezone: Option<String>,
    },
    /// Pause a job without deleting it
    Pause { id: String },
    /// Resume a paused job
    Resume { id: String },
    /// Delete a job
    Remove { id: String },
    /// Run a job immediately
    Trigger { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "vigil=debug,vigil_scheduler=debug"
    } else {
        "vigil=info,vigil_scheduler=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => VigilConfig::load_from(path)?,
        None => VigilConfig::load()?,
    };
    let pipeline = Arc::new(HttpPipeline::new(&config.pipeline)?);
    let engine = SchedulerEngine::from_config(&config, pipeline);

    match cli.command {
        Command::Run => {
            engine.start().await?;
            println!("⏰ Vigil scheduler running — {} job(s)", engine.registered_ids().len());
            println!("   Jobs file: {}", config.jobs_path().display());
            println!("   Pipeline:  {}", config.pipeline.url);

            tokio::signal::ctrl_c().await?;
            println!("\n🛑 Shutting down...");
            engine.stop().await;
        }
        Command::Add {
            name,
            schedule,
            command,
            timezone,
            paused,
        } => {
            let tz = timezone.unwrap_or_else(|| config.timezone.clone());
            let mut job = Job::new(&name, &schedule, &command).with_timezone(&tz);
            if paused {
                job = job.paused();
            }
            let job = engine.add_job(job).await?;
            println!("✅ Added job {}", job.id);
            print!("{}", format_job_details(&job));
        }
        Command::List => print!("{}", format_job_list(&engine.list_jobs())),
        Command::Show { id } => match engine.get_job(&id) {
            Some(job) => print!("{}", format_job_details(&job)),
            None => bail!("Job '{id}' not found"),
        },
        Command::Edit {
            id,
            name,
            schedule,
            command,
            timezone,
        } => {
            let update = JobUpdate {
                name,
                schedule,
                command,
                timezone,
            };
            match engine.update_job(&id, update).await? {
                Some(job) => {
                    println!("✏️ Updated job {id}");
                    print!("{}", format_job_details(&job));
                }
                None => bail!("Job '{id}' not found"),
            }
        }
        Command::Pause { id } => match engine.pause_job(&id).await? {
            Some(job) => println!("⏸️ Paused '{}' ({id})", job.name),
            None => bail!("Job '{id}' not found"),
        },
        Command::Resume { id } => match engine.resume_job(&id).await? {
            Some(job) => {
                let next = job
                    .next_run
                    .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_else(|| "pending".into());
                println!("▶️ Resumed '{}' ({id}). Next run: {next}", job.name);
            }
            None => bail!("Job '{id}' not found"),
        },
        Command::Remove { id } => {
            if !engine.remove_job(&id).await? {
                bail!("Job '{id}' not found");
            }
            println!("🗑️ Removed job {id}");
        }
        Command::Trigger { id } => {
            if !engine.run_job_now(&id).await {
                bail!("Job '{id}' not found");
            }
            if let Some(job) = engine.get_job(&id) {
                println!(
                    "🔔 Ran '{}': {}",
                    job.name,
                    job.last_result.as_deref().unwrap_or("(no result)")
                );
            }
        }
    }

    Ok(())
}
