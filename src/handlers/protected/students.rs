use axum::{extract::State, response::IntoResponse};
use chrono::Utc;
use serde_json::{json, Value};

use crate::api::format::local_date;
use crate::database::models::StudentView;
use crate::database::{PageParams, PageResult};
use crate::error::ApiError;
use crate::handlers::extract::{JsonBody, PathParam, QueryParams};
use crate::middleware::{ApiResponse, ApiResult, AuthUser, RequireAdmin};
use crate::services::assignment_service::SchoolScope;
use crate::services::student_service::{
    self, EatingStatus, EatingStatusInput, LeavePeriod, LeaveRequest, NewStudent, StatsQuery, StudentFilter,
    StudentStats, StudentUpdate,
};
use crate::AppState;

/// GET /students
pub async fn list(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    QueryParams(page): QueryParams<PageParams>,
    QueryParams(filter): QueryParams<StudentFilter>,
) -> ApiResult<PageResult<StudentView>> {
    let mut tx = state.pool.begin().await?;
    let scope = SchoolScope::of(&mut tx, &admin).await?;
    let result = student_service::list(&mut tx, &scope, &filter, page.pagination()).await?;
    tx.commit().await?;
    Ok(ApiResponse::success(result))
}

/// GET /students/stats
pub async fn stats(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    QueryParams(query): QueryParams<StatsQuery>,
) -> ApiResult<StudentStats> {
    let mut tx = state.pool.begin().await?;
    let scope = SchoolScope::of(&mut tx, &admin).await?;
    let result = student_service::stats(&mut tx, &scope, &query).await?;
    tx.commit().await?;
    Ok(ApiResponse::success(result))
}

/// POST /students
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    JsonBody(input): JsonBody<NewStudent>,
) -> ApiResult<StudentView> {
    let mut tx = state.pool.begin().await?;
    let scope = SchoolScope::of(&mut tx, &admin).await?;
    let student = student_service::create(&mut tx, &scope, &input).await?;
    tx.commit().await?;
    Ok(ApiResponse::success(student))
}

/// PUT /students/:id
pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    PathParam(id): PathParam<i64>,
    JsonBody(input): JsonBody<StudentUpdate>,
) -> ApiResult<StudentView> {
    let mut tx = state.pool.begin().await?;
    let scope = SchoolScope::of(&mut tx, &admin).await?;
    let student = student_service::update(&mut tx, &scope, id, &input).await?;
    tx.commit().await?;
    Ok(ApiResponse::success(student))
}

/// DELETE /students/:id
pub async fn delete(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    PathParam(id): PathParam<i64>,
) -> ApiResult<Value> {
    let mut tx = state.pool.begin().await?;
    let scope = SchoolScope::of(&mut tx, &admin).await?;
    student_service::delete(&mut tx, &scope, id).await?;
    tx.commit().await?;
    Ok(ApiResponse::with_msg(json!({ "id": id }), "已删除"))
}

/// GET /students/me/status
pub async fn my_status(State(state): State<AppState>, user: AuthUser) -> ApiResult<EatingStatus> {
    let student_id = user.student_id()?;
    let today = local_date(Utc::now(), state.config.local_offset());
    let mut tx = state.pool.begin().await?;
    let status = student_service::my_status(&mut tx, student_id, today).await?;
    tx.commit().await?;
    Ok(ApiResponse::success(status))
}

/// PUT /students/me/eating-status
pub async fn set_eating(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(input): JsonBody<EatingStatusInput>,
) -> ApiResult<Value> {
    let student_id = user.student_id()?;
    let mut tx = state.pool.begin().await?;
    let is_eating = student_service::set_eating(&mut tx, student_id, &input).await?;
    tx.commit().await?;
    Ok(ApiResponse::with_msg(json!({ "is_eating": is_eating }), "就餐状态已更新"))
}

/// POST /students/me/leave
pub async fn apply_leave(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(input): JsonBody<LeaveRequest>,
) -> ApiResult<LeavePeriod> {
    let student_id = user.student_id()?;
    let today = local_date(Utc::now(), state.config.local_offset());
    let mut tx = state.pool.begin().await?;
    let period = student_service::apply_leave(&mut tx, student_id, &input, today).await?;
    tx.commit().await?;
    Ok(ApiResponse::with_msg(period, "请假申请成功"))
}

/// DELETE /students/me/leave - answers with plain text; the response
/// unifier turns it into the envelope.
pub async fn cancel_leave(State(state): State<AppState>, user: AuthUser) -> Result<impl IntoResponse, ApiError> {
    let student_id = user.student_id()?;
    let mut tx = state.pool.begin().await?;
    student_service::cancel_leave(&mut tx, student_id).await?;
    tx.commit().await?;
    Ok("请假已取消")
}
