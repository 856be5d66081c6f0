//! Database migration runner.

use sqlx::SqlitePool;
use tracing::info;

use jobhub_core::error::{AppError, ErrorKind};

/// Run all pending database migrations.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), AppError> {
    info!("Running database migrations...");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| {
            AppError::with_source(
                ErrorKind::Database,
                format!("Failed to run migrations: {e}"),
                e,
            )
        })?;

    info!("Database migrations completed successfully");
    Ok(())
}

/// One embedded migration and whether it has been applied.
#[derive(Debug, Clone)]
pub struct MigrationState {
    /// Migration version.
    pub version: i64,
    /// Description taken from the file name.
    pub description: String,
    /// Whether the version is recorded as applied.
    pub applied: bool,
}

/// List the embedded migrations with their applied state.
pub async fn migration_status(pool: &SqlitePool) -> Result<Vec<MigrationState>, AppError> {
    let ledger_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await
    .map_err(|e| AppError::from_sqlx("Failed to inspect migration ledger", e))?;

    let applied: Vec<i64> = if ledger_exists {
        sqlx::query_scalar("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await
            .map_err(|e| AppError::from_sqlx("Failed to read migration ledger", e))?
    } else {
        Vec::new()
    };

    Ok(sqlx::migrate!("./migrations")
        .iter()
        .map(|m| MigrationState {
            version: m.version,
            description: m.description.to_string(),
            applied: applied.contains(&m.version),
        })
        .collect())
}
