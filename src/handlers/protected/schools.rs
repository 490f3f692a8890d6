use axum::extract::State;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::database::models::School;
use crate::database::{PageParams, PageResult};
use crate::handlers::extract::{JsonBody, PathParam, QueryParams};
use crate::middleware::{ApiResponse, ApiResult, AuthUser, RequireAdmin};
use crate::services::school_service::{self, SchoolInput};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SchoolQuery {
    pub kw: Option<String>,
}

/// GET /schools
pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(query): QueryParams<SchoolQuery>,
) -> ApiResult<PageResult<School>> {
    let mut tx = state.pool.begin().await?;
    let scope = school_service::visible_scope(&mut tx, &user).await?;
    let result = school_service::list(&mut tx, &scope, query.kw.as_deref(), page.pagination()).await?;
    tx.commit().await?;
    Ok(ApiResponse::success(result))
}

/// GET /schools/:id
pub async fn show(
    State(state): State<AppState>,
    _user: AuthUser,
    PathParam(id): PathParam<String>,
) -> ApiResult<School> {
    let mut tx = state.pool.begin().await?;
    let school = school_service::get(&mut tx, &id).await?;
    tx.commit().await?;
    Ok(ApiResponse::success(school))
}

/// POST /schools
pub async fn create(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    JsonBody(input): JsonBody<SchoolInput>,
) -> ApiResult<School> {
    let mut tx = state.pool.begin().await?;
    let school = school_service::create(&mut tx, &input).await?;
    tx.commit().await?;
    Ok(ApiResponse::success(school))
}

/// PUT /schools/:id
pub async fn update(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    PathParam(id): PathParam<String>,
    JsonBody(input): JsonBody<SchoolInput>,
) -> ApiResult<School> {
    let mut tx = state.pool.begin().await?;
    let school = school_service::update(&mut tx, &id, &input).await?;
    tx.commit().await?;
    Ok(ApiResponse::success(school))
}

/// DELETE /schools/:id
pub async fn delete(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    PathParam(id): PathParam<String>,
) -> ApiResult<Value> {
    let mut tx = state.pool.begin().await?;
    school_service::delete(&mut tx, &id).await?;
    tx.commit().await?;
    Ok(ApiResponse::with_msg(json!({ "id": id }), "已删除"))
}
