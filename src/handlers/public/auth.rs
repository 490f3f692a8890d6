use axum::{extract::State, Extension};

use crate::auth::RefreshClaims;
use crate::handlers::extract::JsonBody;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::account_service::{self, LoginRequest, LoginResult, RefreshResult};
use crate::AppState;

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<LoginRequest>,
) -> ApiResult<LoginResult> {
    let mut tx = state.pool.begin().await?;
    let result = account_service::authenticate(&mut tx, &request, &state.config.security).await?;
    tx.commit().await?;
    Ok(ApiResponse::success(result))
}

/// POST /auth/refresh - the refresh token was validated by the middleware.
pub async fn refresh(
    State(state): State<AppState>,
    Extension(claims): Extension<RefreshClaims>,
) -> ApiResult<RefreshResult> {
    let mut tx = state.pool.begin().await?;
    let result = account_service::refresh(&mut tx, &claims, &state.config.security).await?;
    tx.commit().await?;
    Ok(ApiResponse::success(result))
}
