//! Job storage maintenance commands.

use std::time::Duration;

use clap::{Args, Subcommand};

use crate::output::{self, OutputFormat};
use jobhub_core::config::AppConfig;
use jobhub_core::error::AppError;
use jobhub_core::traits::JobStorage;
use jobhub_storage::LocalJobStorage;

/// Arguments for the storage command
#[derive(Debug, Args)]
pub struct StorageArgs {
    /// Storage subcommand
    #[command(subcommand)]
    pub command: StorageCommand,
}

/// Storage subcommands
#[derive(Debug, Subcommand)]
pub enum StorageCommand {
    /// Delete job directories older than the retention period
    Sweep {
        /// Age threshold in days; defaults to `storage.retention_days`
        #[arg(long)]
        older_than_days: Option<u64>,
    },
    /// Show total size and number of job directories
    Usage,
}

/// Execute storage commands
pub async fn execute(
    args: &StorageArgs,
    config: &AppConfig,
    format: OutputFormat,
) -> Result<(), AppError> {
    let storage = LocalJobStorage::from_config(&config.storage).await?;

    match &args.command {
        StorageCommand::Sweep { older_than_days } => {
            let days = older_than_days.unwrap_or(config.storage.retention_days);
            let report = storage
                .cleanup_old_jobs(Duration::from_secs(days * 24 * 60 * 60))
                .await?;

            match format {
                OutputFormat::Json => output::print_item(&report, format),
                OutputFormat::Table => output::print_success(&format!(
                    "Removed {} job directories older than {} days, freed {}",
                    report.deleted_count,
                    days,
                    output::format_bytes(report.freed_bytes)
                )),
            }
        }
        StorageCommand::Usage => {
            let usage = storage.storage_usage().await?;

            match format {
                OutputFormat::Json => output::print_item(&usage, format),
                OutputFormat::Table => {
                    output::print_kv("Base directory", &storage.base_dir().display().to_string());
                    output::print_kv("Job directories", &usage.job_count.to_string());
                    output::print_kv("Total size", &output::format_bytes(usage.total_bytes));
                }
            }
        }
    }

    Ok(())
}
