pub mod admin;
pub mod init;
pub mod serve;

use anyhow::Context;
use sqlx::SqlitePool;

use crate::config::AppConfig;
use crate::database::DatabaseManager;

/// Open the configured database with migrations applied.
pub(crate) async fn open_database(config: &AppConfig) -> anyhow::Result<SqlitePool> {
    let pool = DatabaseManager::connect(&config.database)
        .await
        .with_context(|| format!("failed to open database {}", config.database.url))?;
    DatabaseManager::migrate(&pool).await.context("failed to apply migrations")?;
    Ok(pool)
}
