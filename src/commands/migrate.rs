//! Database migration management commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};
use jobhub_core::config::AppConfig;
use jobhub_core::error::AppError;
use jobhub_database::migration;

/// Arguments for the migrate command
#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Migration subcommand; defaults to `run`
    #[command(subcommand)]
    pub command: Option<MigrateCommand>,
}

/// Migration subcommands
#[derive(Debug, Subcommand)]
pub enum MigrateCommand {
    /// Run all pending migrations
    Run,
    /// Show migration status
    Status,
}

#[derive(Debug, Serialize, Tabled)]
struct MigrationRow {
    version: i64,
    description: String,
    applied: bool,
}

/// Execute migration commands
pub async fn execute(
    args: &MigrateArgs,
    config: &AppConfig,
    format: OutputFormat,
) -> Result<(), AppError> {
    let pool = super::create_db_pool(config).await?;

    let result = match args.command.as_ref().unwrap_or(&MigrateCommand::Run) {
        MigrateCommand::Run => {
            println!("Running database migrations...");
            migration::run_migrations(pool.pool()).await.map(|()| {
                output::print_success("All migrations applied successfully.");
            })
        }
        MigrateCommand::Status => migration::migration_status(pool.pool()).await.map(|states| {
            let rows: Vec<MigrationRow> = states
                .into_iter()
                .map(|m| MigrationRow {
                    version: m.version,
                    description: m.description,
                    applied: m.applied,
                })
                .collect();
            output::print_list(&rows, format);
        }),
    };

    pool.close().await;
    result
}
