use anyhow::Context;
use tracing::info;

use crate::config;
use crate::{app, AppState};

pub async fn handle(port: Option<u16>) -> anyhow::Result<()> {
    let config = config::config().clone();
    info!("Starting school meal API in {:?} mode", config.environment);

    if config.security.jwt_secret.is_empty() {
        anyhow::bail!("SECURITY_JWT_SECRET must be set outside development");
    }

    let pool = super::open_database(&config).await?;
    let port = port.unwrap_or(config.api.port);
    let app = app(AppState::new(pool, config));

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    info!("School meal API listening on http://{}", bind_addr);
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
