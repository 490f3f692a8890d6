use serde_json::json;

use crate::cli::{utils::output_success, OutputFormat};
use crate::config;
use crate::services::admin_service;

pub async fn create_super(
    account: &str,
    password: &str,
    display_name: Option<&str>,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let pool = super::open_database(config::config()).await?;

    let mut tx = pool.begin().await?;
    let admin = admin_service::create_super(&mut tx, account, password, display_name)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e.message()))?;
    tx.commit().await?;

    output_success(
        &output_format,
        &format!("Created super-admin '{}'", admin.account),
        Some(json!({ "id": admin.id, "account": admin.account })),
    )
}
