use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use tracing::error;

use crate::database::DatabaseManager;
use crate::AppState;

/// GET /ping - raw health probe, never wrapped in the envelope.
pub async fn get(State(state): State<AppState>) -> impl IntoResponse {
    match DatabaseManager::health_check(&state.pool).await {
        Ok(()) => (StatusCode::OK, Json(json!({"pong": true, "database": "ok"}))),
        Err(e) => {
            error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"pong": true, "database": "unavailable"})),
            )
        }
    }
}
