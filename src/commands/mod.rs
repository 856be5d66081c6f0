//! CLI command definitions and dispatch.

pub mod job;
pub mod migrate;
pub mod reap;
pub mod storage;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;
use jobhub_core::config::AppConfig;
use jobhub_core::error::AppError;
use jobhub_core::traits::EventBroadcaster;
use jobhub_database::{DatabasePool, JobStore};
use jobhub_realtime::Broadcaster;
use jobhub_service::QueueService;

/// JobHub: job queue, job file storage and lifecycle events
#[derive(Debug, Parser)]
#[command(name = "jobhub", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/jobhub.toml")]
    pub config: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Database migration management
    Migrate(migrate::MigrateArgs),
    /// Enqueue, inspect and delete jobs
    Job(job::JobArgs),
    /// Job storage maintenance
    Storage(storage::StorageArgs),
    /// Requeue jobs whose claim has gone stale
    Reap(reap::ReapArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self, config: &AppConfig) -> Result<(), AppError> {
        match &self.command {
            Commands::Migrate(args) => migrate::execute(args, config, self.format).await,
            Commands::Job(args) => job::execute(args, config, self.format).await,
            Commands::Storage(args) => storage::execute(args, config, self.format).await,
            Commands::Reap(args) => reap::execute(args, config, self.format).await,
        }
    }
}

/// Helper: load configuration from file and environment
pub fn load_config(config_path: &str) -> Result<AppConfig, AppError> {
    AppConfig::load(Some(config_path))
}

/// Helper: create database pool from config
pub async fn create_db_pool(config: &AppConfig) -> Result<DatabasePool, AppError> {
    DatabasePool::connect(&config.database).await
}

/// Helper: build the queue service.
///
/// Read-only commands pass `announce = false` and skip the broker.
pub async fn create_queue(config: &AppConfig, announce: bool) -> Result<QueueService, AppError> {
    let pool = create_db_pool(config).await?;
    let broadcaster = if announce {
        Broadcaster::connect(config.broadcast.clone()).await
    } else {
        Broadcaster::disabled()
    };
    Ok(QueueService::new(JobStore::new(pool.into_pool()), broadcaster))
}

/// Helper: release the queue's broker connection and database pool
pub async fn close_queue(queue: QueueService) {
    queue.broadcaster().disconnect().await;
    queue.store().pool().close().await;
}
