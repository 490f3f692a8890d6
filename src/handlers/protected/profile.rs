use axum::extract::State;

use crate::handlers::extract::JsonBody;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::account_service::{self, ProfileUpdate};
use crate::AppState;

/// PUT /profile
pub async fn put(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(update): JsonBody<ProfileUpdate>,
) -> ApiResult<()> {
    let mut tx = state.pool.begin().await?;
    account_service::update_profile(&mut tx, &user.identity(), &update).await?;
    tx.commit().await?;
    Ok(ApiResponse::message("个人信息更新成功"))
}
