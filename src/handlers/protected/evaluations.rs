use axum::extract::State;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::database::models::{EvaluationCategory, EvaluationNode};
use crate::database::{PageParams, PageResult};
use crate::handlers::extract::{JsonBody, PathParam, QueryParams};
use crate::middleware::{ApiResponse, ApiResult, AuthUser, RequireAdmin};
use crate::services::assignment_service::SchoolScope;
use crate::services::evaluation_service::{
    self, Author, CategoryInput, EvaluationFilter, NewEvaluation, NewReply,
};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct MineQuery {
    pub category_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CategoryQuery {
    pub kw: Option<String>,
}

/// GET /evaluations
pub async fn list(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(filter): QueryParams<EvaluationFilter>,
) -> ApiResult<PageResult<EvaluationNode>> {
    let mut tx = state.pool.begin().await?;
    let scope = SchoolScope::of(&mut tx, &admin).await?;
    let result = evaluation_service::list(&mut tx, &scope, &filter, page.pagination()).await?;
    tx.commit().await?;
    Ok(ApiResponse::success(result))
}

/// POST /evaluations
pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(input): JsonBody<NewEvaluation>,
) -> ApiResult<EvaluationNode> {
    let student_id = user.student_id()?;
    let mut tx = state.pool.begin().await?;
    let node = evaluation_service::create_top_level(&mut tx, student_id, &input).await?;
    tx.commit().await?;
    Ok(ApiResponse::with_msg(node, "评价提交成功"))
}

/// GET /evaluations/mine
pub async fn mine(
    State(state): State<AppState>,
    user: AuthUser,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(query): QueryParams<MineQuery>,
) -> ApiResult<PageResult<EvaluationNode>> {
    let student_id = user.student_id()?;
    let mut tx = state.pool.begin().await?;
    let result =
        evaluation_service::list_mine(&mut tx, student_id, query.category_id.as_deref(), page.pagination()).await?;
    tx.commit().await?;
    Ok(ApiResponse::success(result))
}

/// GET /evaluations/:id
pub async fn show(
    State(state): State<AppState>,
    _user: AuthUser,
    PathParam(id): PathParam<i64>,
) -> ApiResult<EvaluationNode> {
    let mut tx = state.pool.begin().await?;
    let thread = evaluation_service::fetch_thread(&mut tx, id).await?;
    tx.commit().await?;
    Ok(ApiResponse::success(thread))
}

/// DELETE /evaluations/:id
pub async fn delete(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    PathParam(id): PathParam<i64>,
) -> ApiResult<Value> {
    let mut tx = state.pool.begin().await?;
    evaluation_service::soft_delete(&mut tx, id).await?;
    tx.commit().await?;
    Ok(ApiResponse::with_msg(json!({ "id": id }), "删除成功"))
}

/// POST /evaluations/:id/reply
pub async fn admin_reply(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    PathParam(id): PathParam<i64>,
    JsonBody(input): JsonBody<NewReply>,
) -> ApiResult<EvaluationNode> {
    let mut tx = state.pool.begin().await?;
    let node = evaluation_service::reply(&mut tx, id, &input, Author::Admin(admin.uid().to_string())).await?;
    tx.commit().await?;
    Ok(ApiResponse::with_msg(node, "回复成功"))
}

/// POST /evaluations/:id/student-reply
pub async fn student_reply(
    State(state): State<AppState>,
    user: AuthUser,
    PathParam(id): PathParam<i64>,
    JsonBody(input): JsonBody<NewReply>,
) -> ApiResult<EvaluationNode> {
    let student_id = user.student_id()?;
    let mut tx = state.pool.begin().await?;
    let node = evaluation_service::reply(&mut tx, id, &input, Author::Student(student_id)).await?;
    tx.commit().await?;
    Ok(ApiResponse::with_msg(node, "回复成功"))
}

/// GET /evaluations/categories
pub async fn all_categories(State(state): State<AppState>, _user: AuthUser) -> ApiResult<Vec<EvaluationCategory>> {
    let mut conn = state.pool.acquire().await?;
    let categories = evaluation_service::all_categories(&mut conn).await?;
    Ok(ApiResponse::success(categories))
}

/// GET /evaluations/categories/list
pub async fn list_categories(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(query): QueryParams<CategoryQuery>,
) -> ApiResult<PageResult<EvaluationCategory>> {
    let mut conn = state.pool.acquire().await?;
    let result = evaluation_service::list_categories(&mut conn, query.kw.as_deref(), page.pagination()).await?;
    Ok(ApiResponse::success(result))
}

/// POST /evaluations/categories
pub async fn create_category(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    JsonBody(input): JsonBody<CategoryInput>,
) -> ApiResult<EvaluationCategory> {
    let mut tx = state.pool.begin().await?;
    let category = evaluation_service::create_category(&mut tx, &input).await?;
    tx.commit().await?;
    Ok(ApiResponse::success(category))
}

/// PUT /evaluations/categories/:id
pub async fn update_category(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    PathParam(id): PathParam<i64>,
    JsonBody(input): JsonBody<CategoryInput>,
) -> ApiResult<EvaluationCategory> {
    let mut tx = state.pool.begin().await?;
    let category = evaluation_service::update_category(&mut tx, id, &input).await?;
    tx.commit().await?;
    Ok(ApiResponse::success(category))
}

/// DELETE /evaluations/categories/:id
pub async fn delete_category(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    PathParam(id): PathParam<i64>,
) -> ApiResult<Value> {
    let mut tx = state.pool.begin().await?;
    evaluation_service::delete_category(&mut tx, id).await?;
    tx.commit().await?;
    Ok(ApiResponse::with_msg(json!({ "id": id }), "已删除"))
}
