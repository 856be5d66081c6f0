//! Job management commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};
use jobhub_core::config::AppConfig;
use jobhub_core::error::AppError;
use jobhub_core::traits::JobRepository;
use jobhub_core::types::{Job, JobStatus, NewJob};
use jobhub_service::QueueService;

/// Arguments for the job command
#[derive(Debug, Args)]
pub struct JobArgs {
    /// Job subcommand
    #[command(subcommand)]
    pub command: JobCommand,
}

/// Job subcommands
#[derive(Debug, Subcommand)]
pub enum JobCommand {
    /// Enqueue a job
    Add {
        /// Task type
        task_type: String,
        /// Task parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,
        /// Job id; a UUID is generated when omitted
        #[arg(long)]
        job_id: Option<String>,
        /// Producer attribution
        #[arg(long)]
        created_by: Option<String>,
        /// Stored priority
        #[arg(long)]
        priority: Option<i32>,
    },
    /// Show a job
    Get {
        /// Job id
        job_id: String,
    },
    /// List jobs, newest first
    List {
        /// Filter by status
        #[arg(long)]
        status: Option<JobStatus>,
        /// Maximum number of rows
        #[arg(long, default_value = "50")]
        limit: u32,
    },
    /// Count jobs per status
    Stats,
    /// Delete a job
    Delete {
        /// Job id
        job_id: String,
    },
}

#[derive(Debug, Serialize, Tabled)]
struct JobRow {
    job_id: String,
    task_type: String,
    status: String,
    progress: i32,
    created: String,
    started: String,
    completed: String,
    retries: String,
}

impl From<&Job> for JobRow {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.job_id.clone(),
            task_type: job.task_type.clone(),
            status: job.status.to_string(),
            progress: job.progress,
            created: output::format_ms(Some(job.created_at)),
            started: output::format_ms(job.started_at),
            completed: output::format_ms(job.completed_at),
            retries: format!("{}/{}", job.retry_count, job.max_retries),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
struct StatusCountRow {
    status: String,
    count: i64,
}

/// Execute job commands
pub async fn execute(args: &JobArgs, config: &AppConfig, format: OutputFormat) -> Result<(), AppError> {
    let announce = matches!(args.command, JobCommand::Add { .. } | JobCommand::Delete { .. });
    let queue = super::create_queue(config, announce).await?;
    let result = run(&queue, &args.command, format).await;
    super::close_queue(queue).await;
    result
}

async fn run(queue: &QueueService, command: &JobCommand, format: OutputFormat) -> Result<(), AppError> {
    match command {
        JobCommand::Add {
            task_type,
            params,
            job_id,
            created_by,
            priority,
        } => {
            let params: serde_json::Value = serde_json::from_str(params)
                .map_err(|e| AppError::validation(format!("--params is not valid JSON: {}", e)))?;
            if !params.is_object() {
                return Err(AppError::validation("--params must be a JSON object"));
            }

            let job_id = job_id.clone().unwrap_or_else(NewJob::generate_id);
            let new_job = NewJob::new(job_id.clone(), task_type.clone(), params);
            queue
                .add_job(new_job, created_by.as_deref(), *priority)
                .await?;

            match format {
                OutputFormat::Json => output::print_item(&serde_json::json!({ "job_id": job_id }), format),
                OutputFormat::Table => output::print_success(&format!("Job '{}' queued", job_id)),
            }
        }
        JobCommand::Get { job_id } => {
            let job = queue
                .get_job(job_id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("Job '{}' not found", job_id)))?;
            output::print_item(&job, format);
        }
        JobCommand::List { status, limit } => {
            let jobs = queue.list_jobs(*status, *limit).await?;
            let rows: Vec<JobRow> = jobs.iter().map(JobRow::from).collect();
            output::print_list(&rows, format);
        }
        JobCommand::Stats => {
            let rows: Vec<StatusCountRow> = queue
                .count_by_status()
                .await?
                .into_iter()
                .map(|(status, count)| StatusCountRow {
                    status: status.to_string(),
                    count,
                })
                .collect();
            output::print_list(&rows, format);
        }
        JobCommand::Delete { job_id } => {
            if queue.delete_job(job_id).await? {
                output::print_success(&format!("Job '{}' deleted", job_id));
            } else {
                output::print_warning(&format!("Job '{}' does not exist", job_id));
            }
        }
    }
    Ok(())
}
