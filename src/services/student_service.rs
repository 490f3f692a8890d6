//! Students: admin management and student self-service (eating status and
//! leave requests).

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::info;

use crate::api::format::parse_date;
use crate::auth::password::hash_password;
use crate::database::models::{Student, StudentRow, StudentView};
use crate::database::{PageResult, Pagination};
use crate::error::ApiError;
use crate::services::assignment_service::SchoolScope;
use crate::services::school_service;
use crate::validation::{length_between, non_blank, FieldErrors};

const STUDENT_SELECT: &str = "SELECT st.id, st.name, st.student_number, st.is_eating, \
     st.leave_start_date, st.leave_end_date, st.school_id, \
     sc.name AS school_name, sc.alias AS school_alias, \
     st.created_at, st.updated_at \
     FROM students st JOIN schools sc ON sc.id = st.school_id";

const BAD_DATE: &str = "日期格式不正确，请使用 YYYY-MM-DD 格式";
const NAME_LENGTH: &str = "姓名长度需在1-64个字符之间";
const NUMBER_LENGTH: &str = "学号长度需在1-64个字符之间";

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StudentFilter {
    pub school_id: Option<String>,
    pub kw: Option<String>,
    pub date: Option<String>,
    pub is_eating: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsQuery {
    pub date: Option<String>,
    pub school_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StudentStats {
    pub total_students: i64,
    pub eating_count: i64,
    pub not_eating_count: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewStudent {
    pub name: Option<String>,
    pub student_number: Option<String>,
    pub password: Option<String>,
    pub school_id: Option<String>,
    pub is_eating: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StudentUpdate {
    pub name: Option<String>,
    pub student_number: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub password: Option<Option<String>>,
    pub is_eating: Option<bool>,
    #[serde(default, deserialize_with = "present")]
    pub leave_start_date: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub leave_end_date: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EatingStatusInput {
    pub is_eating: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeaveRequest {
    pub leave_start_date: Option<String>,
    pub leave_end_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeavePeriod {
    pub leave_start_date: NaiveDate,
    pub leave_end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReason {
    pub is_on_leave: bool,
    pub eating_setting: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leave_start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leave_end_date: Option<NaiveDate>,
}

/// Effective eating status for one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EatingStatus {
    pub is_eating: bool,
    pub reason: StatusReason,
}

impl EatingStatus {
    pub fn of(student: &Student, day: NaiveDate) -> Self {
        Self {
            is_eating: student.eats_on(day),
            reason: StatusReason {
                is_on_leave: student.is_on_leave(day),
                eating_setting: student.is_eating,
                leave_start_date: student.leave_start_date.filter(|_| student.leave_end_date.is_some()),
                leave_end_date: student.leave_end_date.filter(|_| student.leave_start_date.is_some()),
            },
        }
    }
}

fn trimmed(value: Option<&str>) -> Option<String> {
    non_blank(value).map(str::to_string)
}

/// `?is_eating=`: `true` in any case means true, anything else false.
fn parse_eating_flag(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("true")
}

async fn find_live(conn: &mut SqliteConnection, id: i64) -> Result<Student, ApiError> {
    let student: Option<Student> = sqlx::query_as("SELECT * FROM students WHERE id = ? AND is_deleted = 0")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    student.ok_or_else(|| ApiError::not_found("学生不存在"))
}

async fn view(conn: &mut SqliteConnection, id: i64) -> Result<StudentView, ApiError> {
    let sql = format!("{STUDENT_SELECT} WHERE st.id = ?");
    let row: Option<StudentRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&mut *conn).await?;
    row.map(StudentView::from)
        .ok_or_else(|| ApiError::not_found("学生不存在"))
}

async fn number_taken(
    conn: &mut SqliteConnection,
    school_id: &str,
    student_number: &str,
    except: Option<i64>,
) -> Result<bool, ApiError> {
    let taken: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM students WHERE school_id = ? AND student_number = ? AND is_deleted = 0 \
         AND (? IS NULL OR id != ?) LIMIT 1",
    )
    .bind(school_id)
    .bind(student_number)
    .bind(except)
    .bind(except)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(taken.is_some())
}

pub async fn list(
    conn: &mut SqliteConnection,
    scope: &SchoolScope,
    filter: &StudentFilter,
    pagination: Pagination,
) -> Result<PageResult<StudentView>, ApiError> {
    let school_id = trimmed(filter.school_id.as_deref());
    scope.check(school_id.as_deref(), "无权访问该学校")?;

    let on_leave = match non_blank(filter.date.as_deref()) {
        Some(raw) => Some(parse_date(raw).ok_or_else(|| ApiError::bad_request(BAD_DATE))?),
        None => None,
    };
    let pattern = trimmed(filter.kw.as_deref()).map(|kw| format!("%{kw}%"));
    let is_eating = filter.is_eating.as_deref().map(parse_eating_flag);

    let filters = |q: &mut QueryBuilder<'_, Sqlite>| {
        scope.push_filter(q, "st.school_id");
        if let Some(school_id) = &school_id {
            q.push(" AND st.school_id = ").push_bind(school_id.clone());
        }
        if let Some(pattern) = &pattern {
            q.push(" AND (st.name LIKE ")
                .push_bind(pattern.clone())
                .push(" OR st.student_number LIKE ")
                .push_bind(pattern.clone())
                .push(")");
        }
        if let Some(day) = on_leave {
            q.push(" AND st.leave_start_date IS NOT NULL AND st.leave_end_date IS NOT NULL AND st.leave_start_date <= ")
                .push_bind(day)
                .push(" AND st.leave_end_date >= ")
                .push_bind(day);
        }
        if let Some(is_eating) = is_eating {
            q.push(" AND st.is_eating = ").push_bind(is_eating);
        }
    };

    let mut count: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT COUNT(*) FROM students st JOIN schools sc ON sc.id = st.school_id WHERE st.is_deleted = 0",
    );
    filters(&mut count);
    let total: i64 = count.build_query_scalar().fetch_one(&mut *conn).await?;

    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(STUDENT_SELECT);
    query.push(" WHERE st.is_deleted = 0");
    filters(&mut query);
    query.push(" ORDER BY st.created_at DESC, st.id DESC");
    pagination.push_limit(&mut query);
    let rows: Vec<StudentRow> = query.build_query_as().fetch_all(&mut *conn).await?;

    Ok(PageResult::new(rows, total, pagination).map(StudentView::from))
}

/// Head counts for one day. Not eating means the flag is off or a leave
/// covers the day.
pub async fn stats(
    conn: &mut SqliteConnection,
    scope: &SchoolScope,
    query: &StatsQuery,
) -> Result<StudentStats, ApiError> {
    let raw = non_blank(query.date.as_deref()).ok_or_else(|| ApiError::bad_request("必须提供 日期 参数"))?;
    let day = parse_date(raw).ok_or_else(|| ApiError::bad_request(BAD_DATE))?;
    let school_id = trimmed(query.school_id.as_deref());
    scope.check(school_id.as_deref(), "无权访问该学校的统计数据")?;

    let mut sql: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT COUNT(*), COALESCE(SUM(CASE WHEN is_eating = 0 OR (leave_start_date IS NOT NULL \
         AND leave_end_date IS NOT NULL AND leave_start_date <= ",
    );
    sql.push_bind(day)
        .push(" AND leave_end_date >= ")
        .push_bind(day)
        .push(") THEN 1 ELSE 0 END), 0) FROM students WHERE is_deleted = 0");
    scope.push_filter(&mut sql, "school_id");
    if let Some(school_id) = &school_id {
        sql.push(" AND school_id = ").push_bind(school_id.clone());
    }

    let (total, not_eating): (i64, i64) = sql.build_query_as().fetch_one(&mut *conn).await?;
    Ok(StudentStats {
        total_students: total,
        eating_count: total - not_eating,
        not_eating_count: not_eating,
    })
}

pub async fn create(
    conn: &mut SqliteConnection,
    scope: &SchoolScope,
    input: &NewStudent,
) -> Result<StudentView, ApiError> {
    let mut errors = FieldErrors::new();
    let name = errors.required("name", input.name.as_deref(), "姓名不能为空", |v| {
        length_between(v, 1, 64, NAME_LENGTH)
    });
    let number = errors.required("student_number", input.student_number.as_deref(), "学号不能为空", |v| {
        length_between(v, 1, 64, NUMBER_LENGTH)
    });
    let school_id = errors.required("school_id", input.school_id.as_deref(), "必须选择一个学校", |_| Ok(()));
    errors.into_result()?;
    let (name, number, school_id) = (
        name.unwrap_or_default(),
        number.unwrap_or_default(),
        school_id.unwrap_or_default(),
    );

    scope.check(Some(&school_id), "无权在该学校下创建学生")?;
    school_service::get(conn, &school_id).await?;
    if number_taken(conn, &school_id, &number, None).await? {
        return Err(ApiError::conflict("该学校下学号已存在"));
    }

    let password_hash = match non_blank(input.password.as_deref()) {
        Some(password) => Some(hash_password(password)?),
        None => None,
    };

    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO students (name, student_number, password_hash, is_eating, school_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&name)
    .bind(&number)
    .bind(&password_hash)
    .bind(input.is_eating.unwrap_or(true))
    .bind(&school_id)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let id = result.last_insert_rowid();
    info!("Created student {} ({}) in school {}", id, number, school_id);
    view(conn, id).await
}

fn parse_optional_date(
    errors: &mut FieldErrors,
    field: &str,
    value: &Option<Option<String>>,
    current: Option<NaiveDate>,
) -> Option<NaiveDate> {
    match value {
        None => current,
        Some(raw) => match non_blank(raw.as_deref()) {
            None => None,
            Some(raw) => {
                let parsed = parse_date(raw);
                if parsed.is_none() {
                    errors.add(field, "不是有效的日期格式");
                }
                parsed
            }
        },
    }
}

/// Partial update. A blank or null password clears it, so the student logs
/// in without one.
pub async fn update(
    conn: &mut SqliteConnection,
    scope: &SchoolScope,
    id: i64,
    input: &StudentUpdate,
) -> Result<StudentView, ApiError> {
    let mut student = find_live(conn, id).await?;
    scope.check(Some(&student.school_id), "无权修改该学生信息")?;

    let mut errors = FieldErrors::new();
    if let Some(name) = input.name.as_deref() {
        errors.check("name", length_between(name.trim(), 1, 64, NAME_LENGTH));
    }
    if let Some(number) = input.student_number.as_deref() {
        errors.check("student_number", length_between(number.trim(), 1, 64, NUMBER_LENGTH));
    }
    let start = parse_optional_date(&mut errors, "leave_start_date", &input.leave_start_date, student.leave_start_date);
    let end = parse_optional_date(&mut errors, "leave_end_date", &input.leave_end_date, student.leave_end_date);
    match (start, end) {
        (Some(start), Some(end)) if end < start => errors.add("leave_end_date", "请假结束日期不能早于开始日期"),
        (Some(_), None) | (None, Some(_)) => errors.add("leave_end_date", "请假开始和结束日期必须同时设置"),
        _ => {}
    }
    errors.into_result()?;

    if let Some(name) = input.name.as_deref() {
        student.name = name.trim().to_string();
    }
    if let Some(number) = input.student_number.as_deref().map(str::trim) {
        if number_taken(conn, &student.school_id, number, Some(id)).await? {
            return Err(ApiError::conflict("该学校下学号已存在"));
        }
        student.student_number = number.to_string();
    }
    if let Some(password) = &input.password {
        student.password_hash = match non_blank(password.as_deref()) {
            Some(password) => Some(hash_password(password)?),
            None => None,
        };
    }
    if let Some(is_eating) = input.is_eating {
        student.is_eating = is_eating;
    }
    student.leave_start_date = start;
    student.leave_end_date = end;

    sqlx::query(
        "UPDATE students SET name = ?, student_number = ?, password_hash = ?, is_eating = ?, \
         leave_start_date = ?, leave_end_date = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&student.name)
    .bind(&student.student_number)
    .bind(&student.password_hash)
    .bind(student.is_eating)
    .bind(student.leave_start_date)
    .bind(student.leave_end_date)
    .bind(Utc::now())
    .bind(id)
    .execute(&mut *conn)
    .await?;

    info!("Updated student {}", id);
    view(conn, id).await
}

pub async fn delete(conn: &mut SqliteConnection, scope: &SchoolScope, id: i64) -> Result<(), ApiError> {
    let student = find_live(conn, id).await?;
    scope.check(Some(&student.school_id), "无权删除该学生")?;

    sqlx::query("UPDATE students SET is_deleted = 1, updated_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await?;
    info!("Soft-deleted student {}", id);
    Ok(())
}

// Self-service

pub async fn my_status(conn: &mut SqliteConnection, student_id: i64, today: NaiveDate) -> Result<EatingStatus, ApiError> {
    let student = find_live(conn, student_id).await?;
    Ok(EatingStatus::of(&student, today))
}

/// Set the standing eating flag. Only a JSON boolean is accepted.
pub async fn set_eating(
    conn: &mut SqliteConnection,
    student_id: i64,
    input: &EatingStatusInput,
) -> Result<bool, ApiError> {
    find_live(conn, student_id).await?;
    let Some(Value::Bool(is_eating)) = input.is_eating else {
        return Err(ApiError::bad_request("请求参数错误，需要提供布尔型的 'is_eating' 字段"));
    };

    sqlx::query("UPDATE students SET is_eating = ?, updated_at = ? WHERE id = ?")
        .bind(is_eating)
        .bind(Utc::now())
        .bind(student_id)
        .execute(&mut *conn)
        .await?;
    info!("Student {} set eating status to {}", student_id, is_eating);
    Ok(is_eating)
}

/// Request leave. The first day must be tomorrow or later in local time.
pub async fn apply_leave(
    conn: &mut SqliteConnection,
    student_id: i64,
    input: &LeaveRequest,
    today: NaiveDate,
) -> Result<LeavePeriod, ApiError> {
    find_live(conn, student_id).await?;

    let mut errors = FieldErrors::new();
    let mut date_field = |field: &str, value: Option<&str>, missing: &str| match non_blank(value) {
        None => {
            errors.add(field, missing);
            None
        }
        Some(raw) => {
            let parsed = parse_date(raw);
            if parsed.is_none() {
                errors.add(field, "不是有效的日期格式");
            }
            parsed
        }
    };
    let start = date_field("leave_start_date", input.leave_start_date.as_deref(), "请假开始日期不能为空");
    let end = date_field("leave_end_date", input.leave_end_date.as_deref(), "请假结束日期不能为空");
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            errors.add("leave_end_date", "请假结束日期不能早于开始日期");
        }
    }
    errors.into_result()?;
    let (Some(start), Some(end)) = (start, end) else {
        return Err(ApiError::bad_request("请假日期不能为空"));
    };

    if start < today + Duration::days(1) {
        return Err(ApiError::bad_request("请假申请必须至少提前一天提交"));
    }

    sqlx::query("UPDATE students SET leave_start_date = ?, leave_end_date = ?, updated_at = ? WHERE id = ?")
        .bind(start)
        .bind(end)
        .bind(Utc::now())
        .bind(student_id)
        .execute(&mut *conn)
        .await?;
    info!("Student {} applied for leave {} .. {}", student_id, start, end);
    Ok(LeavePeriod {
        leave_start_date: start,
        leave_end_date: end,
    })
}

pub async fn cancel_leave(conn: &mut SqliteConnection, student_id: i64) -> Result<(), ApiError> {
    find_live(conn, student_id).await?;
    sqlx::query("UPDATE students SET leave_start_date = NULL, leave_end_date = NULL, updated_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(student_id)
        .execute(&mut *conn)
        .await?;
    info!("Student {} cancelled leave", student_id);
    Ok(())
}
