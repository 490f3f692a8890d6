use chrono::Utc;
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::info;
use uuid::Uuid;

use crate::database::models::School;
use crate::database::{PageResult, Pagination};
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::services::assignment_service::SchoolScope;
use crate::types::AccountKind;
use crate::validation::{is_valid_alias, length_between, non_blank, FieldErrors};

const NAME_LENGTH: &str = "学校名称长度需在 1~64 个字符之间";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchoolInput {
    pub name: Option<String>,
    pub alias: Option<String>,
}

/// Which schools a caller sees in the school listing: super-admins all of
/// them, admins their assigned ones, students their own.
pub async fn visible_scope(conn: &mut SqliteConnection, user: &AuthUser) -> Result<SchoolScope, ApiError> {
    match user.kind() {
        AccountKind::Admin => SchoolScope::of(conn, user).await,
        AccountKind::Student => {
            let row: Option<(String,)> =
                sqlx::query_as("SELECT school_id FROM students WHERE id = ? AND is_deleted = 0")
                    .bind(user.student_id()?)
                    .fetch_optional(&mut *conn)
                    .await?;
            Ok(SchoolScope::Only(row.map(|(id,)| id).into_iter().collect()))
        }
    }
}

pub async fn list(
    conn: &mut SqliteConnection,
    scope: &SchoolScope,
    kw: Option<&str>,
    pagination: Pagination,
) -> Result<PageResult<School>, ApiError> {
    let pattern = non_blank(kw).map(|kw| format!("%{kw}%"));
    let filters = |q: &mut QueryBuilder<'_, Sqlite>| {
        scope.push_filter(q, "id");
        if let Some(pattern) = &pattern {
            q.push(" AND (name LIKE ")
                .push_bind(pattern.clone())
                .push(" OR alias LIKE ")
                .push_bind(pattern.clone())
                .push(")");
        }
    };

    let mut count: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM schools WHERE is_deleted = 0");
    filters(&mut count);
    let total: i64 = count.build_query_scalar().fetch_one(&mut *conn).await?;

    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM schools WHERE is_deleted = 0");
    filters(&mut query);
    query.push(" ORDER BY created_at DESC, id DESC");
    pagination.push_limit(&mut query);
    let records: Vec<School> = query.build_query_as().fetch_all(&mut *conn).await?;

    Ok(PageResult::new(records, total, pagination))
}

pub async fn find(conn: &mut SqliteConnection, id: &str) -> Result<Option<School>, ApiError> {
    Ok(
        sqlx::query_as("SELECT * FROM schools WHERE id = ? AND is_deleted = 0")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?,
    )
}

pub async fn get(conn: &mut SqliteConnection, id: &str) -> Result<School, ApiError> {
    find(conn, id).await?.ok_or_else(|| ApiError::not_found("学校不存在"))
}

async fn column_taken(
    conn: &mut SqliteConnection,
    column: &str,
    value: &str,
    except: Option<&str>,
) -> Result<bool, ApiError> {
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM schools WHERE is_deleted = 0 AND ");
    query.push(column).push(" = ").push_bind(value.to_string());
    if let Some(id) = except {
        query.push(" AND id != ").push_bind(id.to_string());
    }
    let count: i64 = query.build_query_scalar().fetch_one(&mut *conn).await?;
    Ok(count > 0)
}

pub async fn create(conn: &mut SqliteConnection, input: &SchoolInput) -> Result<School, ApiError> {
    let mut errors = FieldErrors::new();
    let name = errors.required("name", input.name.as_deref(), "学校名称为必填项", |v| {
        length_between(v, 1, 64, NAME_LENGTH)
    });
    let alias = errors.required("alias", input.alias.as_deref(), "别名为必填项", is_valid_alias);
    errors.into_result()?;
    let (name, alias) = (name.unwrap_or_default(), alias.unwrap_or_default());

    if column_taken(conn, "name", &name, None).await? || column_taken(conn, "alias", &alias, None).await? {
        return Err(ApiError::conflict("学校名称或别名已存在"));
    }

    let now = Utc::now();
    let school = School {
        id: Uuid::new_v4().to_string(),
        name,
        alias,
        created_at: now,
        updated_at: now,
        is_deleted: false,
    };
    sqlx::query("INSERT INTO schools (id, name, alias, created_at, updated_at, is_deleted) VALUES (?, ?, ?, ?, ?, 0)")
        .bind(&school.id)
        .bind(&school.name)
        .bind(&school.alias)
        .bind(school.created_at)
        .bind(school.updated_at)
        .execute(&mut *conn)
        .await?;

    info!("Created school {} ({})", school.name, school.id);
    Ok(school)
}

/// Partial update; absent fields keep their value.
pub async fn update(conn: &mut SqliteConnection, id: &str, input: &SchoolInput) -> Result<School, ApiError> {
    let mut errors = FieldErrors::new();
    if let Some(name) = input.name.as_deref() {
        errors.check("name", length_between(name.trim(), 1, 64, NAME_LENGTH));
    }
    if let Some(alias) = input.alias.as_deref() {
        errors.check("alias", is_valid_alias(alias.trim()));
    }
    errors.into_result()?;

    let mut school = get(conn, id).await?;

    if let Some(name) = input.name.as_deref().map(str::trim) {
        if column_taken(conn, "name", name, Some(id)).await? {
            return Err(ApiError::conflict("学校名称已存在"));
        }
        school.name = name.to_string();
    }
    if let Some(alias) = input.alias.as_deref().map(str::trim) {
        if column_taken(conn, "alias", alias, Some(id)).await? {
            return Err(ApiError::conflict("别名已存在"));
        }
        school.alias = alias.to_string();
    }

    school.updated_at = Utc::now();
    sqlx::query("UPDATE schools SET name = ?, alias = ?, updated_at = ? WHERE id = ?")
        .bind(&school.name)
        .bind(&school.alias)
        .bind(school.updated_at)
        .bind(id)
        .execute(&mut *conn)
        .await?;

    info!("Updated school {}", id);
    Ok(school)
}

/// Soft delete. Students and assignments keep pointing at the row.
pub async fn delete(conn: &mut SqliteConnection, id: &str) -> Result<(), ApiError> {
    let result = sqlx::query("UPDATE schools SET is_deleted = 1, updated_at = ? WHERE id = ? AND is_deleted = 0")
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("学校不存在"));
    }
    info!("Soft-deleted school {}", id);
    Ok(())
}
