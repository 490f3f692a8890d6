use axum::extract::State;
use serde_json::{json, Value};

use crate::database::models::AdminView;
use crate::database::{PageParams, PageResult};
use crate::handlers::extract::{JsonBody, PathParam, QueryParams};
use crate::middleware::{ApiResponse, ApiResult, RequireAdmin, RequireSuperAdmin};
use crate::services::admin_service::{self, AdminFilter, AdminUpdate, AdminUpdateResult, NewAdmin};
use crate::AppState;

/// GET /admins
pub async fn list(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(filter): QueryParams<AdminFilter>,
) -> ApiResult<PageResult<AdminView>> {
    let mut tx = state.pool.begin().await?;
    let result = admin_service::list(&mut tx, &filter, page.pagination()).await?;
    tx.commit().await?;
    Ok(ApiResponse::success(result))
}

/// POST /admins
pub async fn create(
    State(state): State<AppState>,
    _super: RequireSuperAdmin,
    JsonBody(input): JsonBody<NewAdmin>,
) -> ApiResult<AdminView> {
    let mut tx = state.pool.begin().await?;
    let admin = admin_service::create(&mut tx, &input).await?;
    tx.commit().await?;
    Ok(ApiResponse::success(admin))
}

/// PUT /admins/:id - account fields and the school set change together or
/// not at all.
pub async fn update(
    State(state): State<AppState>,
    _super: RequireSuperAdmin,
    PathParam(id): PathParam<String>,
    JsonBody(input): JsonBody<AdminUpdate>,
) -> ApiResult<AdminUpdateResult> {
    let mut tx = state.pool.begin().await?;
    let result = admin_service::update(&mut tx, &id, &input).await?;
    tx.commit().await?;
    Ok(ApiResponse::with_msg(result, "修改成功"))
}

/// DELETE /admins/:id
pub async fn delete(
    State(state): State<AppState>,
    RequireSuperAdmin(actor): RequireSuperAdmin,
    PathParam(id): PathParam<String>,
) -> ApiResult<Value> {
    let mut tx = state.pool.begin().await?;
    admin_service::delete(&mut tx, actor.uid(), &id).await?;
    tx.commit().await?;
    Ok(ApiResponse::with_msg(json!({ "id": id }), "已删除"))
}
