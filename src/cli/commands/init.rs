use serde_json::json;

use crate::cli::{utils::output_success, OutputFormat};
use crate::config;

pub async fn handle(output_format: OutputFormat) -> anyhow::Result<()> {
    let config = config::config();
    super::open_database(config).await?;
    output_success(
        &output_format,
        &format!("Database ready at {}", config.database.url),
        Some(json!({ "database": config.database.url })),
    )
}
