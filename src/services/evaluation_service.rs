//! Evaluation threads and their categories.
//!
//! A thread is loaded flat (one row per node) into a [`ThreadArena`] and
//! materialized into nested [`EvaluationNode`]s from a parent → children
//! index. Deleted nodes stay in the arena so their live replies can be
//! lifted to the nearest live ancestor.

use std::collections::HashMap;

use chrono::Utc;
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::{info, warn};

use crate::database::models::{EvaluationCategory, EvaluationNode, EvaluationRow};
use crate::database::{PageResult, Pagination};
use crate::error::ApiError;
use crate::services::assignment_service::SchoolScope;
use crate::validation::{length_between, FieldErrors};

const ROW_SELECT: &str = "SELECT e.id, e.content, e.parent_id, \
     e.school_id, s.name AS school_name, \
     e.category_id, c.name AS category_name, \
     e.student_id, st.name AS student_name, \
     e.admin_id, a.display_name AS admin_display_name, \
     e.created_at, e.is_deleted \
     FROM evaluations e \
     LEFT JOIN schools s ON s.id = e.school_id \
     LEFT JOIN evaluation_categories c ON c.id = e.category_id \
     LEFT JOIN students st ON st.id = e.student_id \
     LEFT JOIN admins a ON a.id = e.admin_id";

/// Rows of one thread keyed by id, with a child index per parent.
#[derive(Debug, Default)]
pub struct ThreadArena {
    nodes: HashMap<i64, EvaluationRow>,
    children: HashMap<i64, Vec<i64>>,
}

impl ThreadArena {
    pub fn new(rows: Vec<EvaluationRow>) -> Self {
        let mut arena = Self::default();
        for row in rows {
            if let Some(parent) = row.parent_id {
                arena.children.entry(parent).or_default().push(row.id);
            }
            arena.nodes.insert(row.id, row);
        }

        // Replies read oldest first.
        let nodes = &arena.nodes;
        for ids in arena.children.values_mut() {
            ids.retain(|id| nodes.contains_key(id));
            ids.sort_by_key(|id| (nodes[id].created_at, *id));
        }
        arena
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The live node `id` with every live reply below it nested under
    /// `replies`.
    pub fn materialize(&self, id: i64) -> Option<EvaluationNode> {
        let row = self.nodes.get(&id).filter(|row| !row.is_deleted)?;
        let mut node = EvaluationNode::leaf(row);
        node.replies = self
            .live_children(id)
            .into_iter()
            .filter_map(|child| self.materialize(child))
            .collect();
        Some(node)
    }

    /// Live children of `id`, with each deleted child replaced by its own
    /// live children.
    fn live_children(&self, id: i64) -> Vec<i64> {
        let mut lifted = Vec::new();
        let mut stack: Vec<i64> = self.children.get(&id).cloned().unwrap_or_default();
        while let Some(child) = stack.pop() {
            match self.nodes.get(&child) {
                Some(row) if row.is_deleted => {
                    stack.extend(self.children.get(&child).into_iter().flatten().copied());
                }
                Some(_) => lifted.push(child),
                None => {}
            }
        }
        lifted.sort_by_key(|child| (self.nodes[child].created_at, *child));
        lifted
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewEvaluation {
    pub content: Option<String>,
    pub category_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewReply {
    pub content: Option<String>,
}

/// Who writes a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Author {
    Student(i64),
    Admin(String),
}

/// Filters for the admin listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvaluationFilter {
    pub school_id: Option<String>,
    pub category_id: Option<String>,
}

async fn load_row(conn: &mut SqliteConnection, id: i64) -> Result<Option<EvaluationRow>, ApiError> {
    let sql = format!("{ROW_SELECT} WHERE e.id = ?");
    Ok(sqlx::query_as(&sql).bind(id).fetch_optional(&mut *conn).await?)
}

async fn insert(
    conn: &mut SqliteConnection,
    content: &str,
    school_id: Option<&str>,
    category_id: Option<i64>,
    parent_id: Option<i64>,
    author: &Author,
) -> Result<i64, ApiError> {
    let (student_id, admin_id) = match author {
        Author::Student(id) => (Some(*id), None),
        Author::Admin(id) => (None, Some(id.as_str())),
    };
    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO evaluations (content, school_id, category_id, student_id, admin_id, parent_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(content)
    .bind(school_id)
    .bind(category_id)
    .bind(student_id)
    .bind(admin_id)
    .bind(parent_id)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

async fn inserted_node(conn: &mut SqliteConnection, id: i64) -> Result<EvaluationNode, ApiError> {
    let row = load_row(conn, id)
        .await?
        .ok_or_else(|| ApiError::internal_server_error("评价写入后无法读取"))?;
    Ok(EvaluationNode::leaf(&row))
}

fn required_content(content: Option<&str>, message: &str) -> Result<String, ApiError> {
    let mut errors = FieldErrors::new();
    let content = errors.required("content", content, message, |_| Ok(()));
    errors.into_result()?;
    Ok(content.unwrap_or_default())
}

async fn student_school(conn: &mut SqliteConnection, student_id: i64) -> Result<String, ApiError> {
    let row: Option<(String,)> = sqlx::query_as("SELECT school_id FROM students WHERE id = ? AND is_deleted = 0")
        .bind(student_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|(school_id,)| school_id)
        .ok_or_else(|| ApiError::not_found("学生不存在"))
}

/// A student opens a new thread. The student's current school is copied
/// onto the evaluation.
pub async fn create_top_level(
    conn: &mut SqliteConnection,
    student_id: i64,
    input: &NewEvaluation,
) -> Result<EvaluationNode, ApiError> {
    let school_id = student_school(conn, student_id).await?;

    let mut errors = FieldErrors::new();
    let content = errors.required("content", input.content.as_deref(), "评价内容不能为空", |_| Ok(()));
    if input.category_id.is_none() {
        errors.add("category_id", "必须选择一个评价类别");
    }
    errors.into_result()?;
    let content = content.unwrap_or_default();
    let category_id = input.category_id.unwrap_or_default();

    if find_category(conn, category_id).await?.is_none() {
        return Err(ApiError::not_found("选择的评价类别不存在"));
    }

    let id = insert(conn, &content, Some(&school_id), Some(category_id), None, &Author::Student(student_id)).await?;
    info!("Student {} created evaluation {} in school {}", student_id, id, school_id);
    inserted_node(conn, id).await
}

/// Reply to any live node. Students may only reply inside their own school;
/// admins may reply anywhere. The reply carries the parent's school.
pub async fn reply(
    conn: &mut SqliteConnection,
    parent_id: i64,
    input: &NewReply,
    author: Author,
) -> Result<EvaluationNode, ApiError> {
    let student_school_id = match &author {
        Author::Student(id) => Some(student_school(conn, *id).await?),
        Author::Admin(_) => None,
    };
    let content = required_content(input.content.as_deref(), "回复内容不能为空")?;

    let parent: Option<(Option<String>,)> =
        sqlx::query_as("SELECT school_id FROM evaluations WHERE id = ? AND is_deleted = 0")
            .bind(parent_id)
            .fetch_optional(&mut *conn)
            .await?;
    let (parent_school,) = parent.ok_or_else(|| ApiError::not_found("要回复的评价不存在"))?;

    if let Some(own) = &student_school_id {
        if parent_school.as_deref() != Some(own.as_str()) {
            warn!("Student reply to evaluation {} refused: school mismatch", parent_id);
            return Err(ApiError::forbidden("无权回复该评价"));
        }
    }

    let id = insert(conn, &content, parent_school.as_deref(), None, Some(parent_id), &author).await?;
    info!("{:?} replied to evaluation {} with {}", author, parent_id, id);
    inserted_node(conn, id).await
}

/// Load a live node and all live replies below it. Replies under a deleted
/// node are attached to its nearest live ancestor.
pub async fn fetch_thread(conn: &mut SqliteConnection, id: i64) -> Result<EvaluationNode, ApiError> {
    let sql = format!(
        "WITH RECURSIVE thread(id) AS ( \
             SELECT id FROM evaluations WHERE id = ? AND is_deleted = 0 \
             UNION ALL \
             SELECT child.id FROM evaluations child JOIN thread ON child.parent_id = thread.id \
         ) {ROW_SELECT} WHERE e.id IN (SELECT id FROM thread)"
    );
    let rows: Vec<EvaluationRow> = sqlx::query_as(&sql).bind(id).fetch_all(&mut *conn).await?;

    ThreadArena::new(rows)
        .materialize(id)
        .ok_or_else(|| ApiError::not_found("评价不存在"))
}

/// Mark one node deleted. Replies below it stay live.
pub async fn soft_delete(conn: &mut SqliteConnection, id: i64) -> Result<(), ApiError> {
    let result = sqlx::query("UPDATE evaluations SET is_deleted = 1, updated_at = ? WHERE id = ? AND is_deleted = 0")
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("评价不存在"));
    }
    info!("Soft-deleted evaluation {}", id);
    Ok(())
}

fn parse_category_filter(raw: Option<&str>) -> Result<Option<i64>, ApiError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| ApiError::bad_request("category_id 必须为整数")),
    }
}

async fn page_of_top_level(
    conn: &mut SqliteConnection,
    push_filters: impl Fn(&mut QueryBuilder<'_, Sqlite>),
    pagination: Pagination,
) -> Result<PageResult<EvaluationNode>, ApiError> {
    let mut count: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT COUNT(*) FROM evaluations e WHERE e.parent_id IS NULL AND e.is_deleted = 0");
    push_filters(&mut count);
    let total: i64 = count.build_query_scalar().fetch_one(&mut *conn).await?;

    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(ROW_SELECT);
    query.push(" WHERE e.parent_id IS NULL AND e.is_deleted = 0");
    push_filters(&mut query);
    query.push(" ORDER BY e.created_at DESC, e.id DESC");
    pagination.push_limit(&mut query);
    let rows: Vec<EvaluationRow> = query.build_query_as().fetch_all(&mut *conn).await?;

    let records = rows.iter().map(EvaluationNode::leaf).collect();
    Ok(PageResult::new(records, total, pagination))
}

/// Top-level evaluations visible to an admin, newest first.
pub async fn list(
    conn: &mut SqliteConnection,
    scope: &SchoolScope,
    filter: &EvaluationFilter,
    pagination: Pagination,
) -> Result<PageResult<EvaluationNode>, ApiError> {
    let school_id = filter
        .school_id
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);
    scope.check(school_id.as_deref(), "无权访问该学校的评价")?;
    let category_id = parse_category_filter(filter.category_id.as_deref())?;

    page_of_top_level(
        conn,
        |q| {
            scope.push_filter(q, "e.school_id");
            if let Some(school_id) = &school_id {
                q.push(" AND e.school_id = ");
                q.push_bind(school_id.clone());
            }
            if let Some(category_id) = category_id {
                q.push(" AND e.category_id = ");
                q.push_bind(category_id);
            }
        },
        pagination,
    )
    .await
}

/// A student's own top-level evaluations, newest first.
pub async fn list_mine(
    conn: &mut SqliteConnection,
    student_id: i64,
    category_id: Option<&str>,
    pagination: Pagination,
) -> Result<PageResult<EvaluationNode>, ApiError> {
    let category_id = parse_category_filter(category_id)?;
    page_of_top_level(
        conn,
        |q| {
            q.push(" AND e.student_id = ");
            q.push_bind(student_id);
            if let Some(category_id) = category_id {
                q.push(" AND e.category_id = ");
                q.push_bind(category_id);
            }
        },
        pagination,
    )
    .await
}

// Categories

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryInput {
    pub name: Option<String>,
}

fn validate_category(input: &CategoryInput) -> Result<String, ApiError> {
    let mut errors = FieldErrors::new();
    let name = errors.required("name", input.name.as_deref(), "类别名称不能为空", |v| {
        length_between(v, 1, 64, "类别名称长度需在1-64个字符之间")
    });
    errors.into_result()?;
    Ok(name.unwrap_or_default())
}

async fn find_category(conn: &mut SqliteConnection, id: i64) -> Result<Option<EvaluationCategory>, ApiError> {
    Ok(
        sqlx::query_as("SELECT * FROM evaluation_categories WHERE id = ? AND is_deleted = 0")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?,
    )
}

async fn ensure_category_name_free(
    conn: &mut SqliteConnection,
    name: &str,
    except: Option<i64>,
) -> Result<(), ApiError> {
    let taken: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM evaluation_categories WHERE name = ? AND is_deleted = 0 AND (? IS NULL OR id != ?) LIMIT 1",
    )
    .bind(name)
    .bind(except)
    .bind(except)
    .fetch_optional(&mut *conn)
    .await?;
    match taken {
        Some(_) => Err(ApiError::conflict("该类别名称已存在")),
        None => Ok(()),
    }
}

/// Every live category, newest first.
pub async fn all_categories(conn: &mut SqliteConnection) -> Result<Vec<EvaluationCategory>, ApiError> {
    Ok(
        sqlx::query_as("SELECT * FROM evaluation_categories WHERE is_deleted = 0 ORDER BY created_at DESC, id DESC")
            .fetch_all(&mut *conn)
            .await?,
    )
}

pub async fn list_categories(
    conn: &mut SqliteConnection,
    kw: Option<&str>,
    pagination: Pagination,
) -> Result<PageResult<EvaluationCategory>, ApiError> {
    let pattern = kw
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|kw| format!("%{kw}%"));

    let mut count: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT COUNT(*) FROM evaluation_categories WHERE is_deleted = 0");
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM evaluation_categories WHERE is_deleted = 0");
    if let Some(pattern) = &pattern {
        count.push(" AND name LIKE ").push_bind(pattern.clone());
        query.push(" AND name LIKE ").push_bind(pattern.clone());
    }
    query.push(" ORDER BY created_at DESC, id DESC");
    pagination.push_limit(&mut query);

    let total: i64 = count.build_query_scalar().fetch_one(&mut *conn).await?;
    let records: Vec<EvaluationCategory> = query.build_query_as().fetch_all(&mut *conn).await?;
    Ok(PageResult::new(records, total, pagination))
}

pub async fn create_category(
    conn: &mut SqliteConnection,
    input: &CategoryInput,
) -> Result<EvaluationCategory, ApiError> {
    let name = validate_category(input)?;
    ensure_category_name_free(conn, &name, None).await?;

    let now = Utc::now();
    let result = sqlx::query("INSERT INTO evaluation_categories (name, created_at, updated_at) VALUES (?, ?, ?)")
        .bind(&name)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

    info!("Created evaluation category '{}'", name);
    find_category(conn, result.last_insert_rowid())
        .await?
        .ok_or_else(|| ApiError::internal_server_error("类别写入后无法读取"))
}

pub async fn update_category(
    conn: &mut SqliteConnection,
    id: i64,
    input: &CategoryInput,
) -> Result<EvaluationCategory, ApiError> {
    let name = validate_category(input)?;
    let mut category = find_category(conn, id)
        .await?
        .ok_or_else(|| ApiError::not_found("类别不存在"))?;
    ensure_category_name_free(conn, &name, Some(id)).await?;

    let now = Utc::now();
    sqlx::query("UPDATE evaluation_categories SET name = ?, updated_at = ? WHERE id = ?")
        .bind(&name)
        .bind(now)
        .bind(id)
        .execute(&mut *conn)
        .await?;

    category.name = name;
    category.updated_at = now;
    Ok(category)
}

pub async fn delete_category(conn: &mut SqliteConnection, id: i64) -> Result<(), ApiError> {
    let result = sqlx::query(
        "UPDATE evaluation_categories SET is_deleted = 1, updated_at = ? WHERE id = ? AND is_deleted = 0",
    )
    .bind(Utc::now())
    .bind(id)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("类别不存在"));
    }
    info!("Soft-deleted evaluation category {}", id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseManager;
    use chrono::{Duration, TimeZone};

    fn row(id: i64, parent_id: Option<i64>, minute: u32) -> EvaluationRow {
        EvaluationRow {
            id,
            content: format!("node {id}"),
            parent_id,
            school_id: Some("s".to_string()),
            school_name: Some("School".to_string()),
            category_id: None,
            category_name: None,
            student_id: None,
            student_name: None,
            admin_id: Some("a".to_string()),
            admin_display_name: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 8, minute, 0).unwrap(),
            is_deleted: false,
        }
    }

    fn deleted(id: i64, parent_id: Option<i64>, minute: u32) -> EvaluationRow {
        EvaluationRow {
            is_deleted: true,
            ..row(id, parent_id, minute)
        }
    }

    #[test]
    fn arena_nests_replies_oldest_first() {
        let arena = ThreadArena::new(vec![
            row(1, None, 0),
            row(3, Some(1), 5),
            row(2, Some(1), 2),
            row(4, Some(2), 9),
        ]);
        assert_eq!(arena.len(), 4);

        let tree = arena.materialize(1).unwrap();
        let ids: Vec<i64> = tree.replies.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(tree.replies[0].replies[0].id, 4);
        assert!(tree.replies[1].replies.is_empty());
    }

    #[test]
    fn arena_materializes_subtrees_and_misses() {
        let arena = ThreadArena::new(vec![row(1, None, 0), row(2, Some(1), 1)]);
        assert_eq!(arena.materialize(2).unwrap().replies.len(), 0);
        assert!(arena.materialize(9).is_none());
        assert!(ThreadArena::new(Vec::new()).is_empty());
    }

    #[test]
    fn arena_lifts_replies_past_deleted_nodes() {
        let arena = ThreadArena::new(vec![
            row(1, None, 0),
            deleted(2, Some(1), 1),
            deleted(3, Some(2), 2),
            row(4, Some(3), 3),
            row(5, Some(2), 6),
            row(6, Some(1), 4),
            row(7, Some(5), 7),
        ]);

        let tree = arena.materialize(1).unwrap();
        let ids: Vec<i64> = tree.replies.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![4, 6, 5]);
        assert_eq!(tree.replies[2].replies[0].id, 7);
        assert!(arena.materialize(2).is_none());
    }

    #[test]
    fn leaf_exposes_author_refs() {
        let node = EvaluationNode::leaf(&row(1, None, 0));
        assert_eq!(node.admin.unwrap().id, "a");
        assert!(node.student.is_none());
        assert_eq!(node.school.unwrap().name.as_deref(), Some("School"));
    }

    async fn setup() -> sqlx::SqlitePool {
        let pool = DatabaseManager::connect_in_memory().await.unwrap();
        DatabaseManager::migrate(&pool).await.unwrap();
        let now = Utc::now();
        for (id, alias) in [("X", "XX"), ("Y", "YY")] {
            sqlx::query("INSERT INTO schools (id, name, alias, created_at, updated_at) VALUES (?, ?, ?, ?, ?)")
                .bind(id)
                .bind(format!("School {id}"))
                .bind(alias)
                .bind(now)
                .bind(now)
                .execute(&pool)
                .await
                .unwrap();
        }
        for (name, school) in [("Xu", "X"), ("Yang", "Y")] {
            sqlx::query(
                "INSERT INTO students (name, student_number, school_id, created_at, updated_at) VALUES (?, '001', ?, ?, ?)",
            )
            .bind(name)
            .bind(school)
            .bind(now)
            .bind(now)
            .execute(&pool)
            .await
            .unwrap();
        }
        sqlx::query("INSERT INTO admins (id, account, password_hash, display_name, created_at, updated_at) VALUES ('adm', 'adm', 'x', 'Boss', ?, ?)")
            .bind(now)
            .bind(now)
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    fn new_evaluation(category_id: i64) -> NewEvaluation {
        NewEvaluation {
            content: Some("too salty".to_string()),
            category_id: Some(category_id),
        }
    }

    fn reply_text(text: &str) -> NewReply {
        NewReply {
            content: Some(text.to_string()),
        }
    }

    #[tokio::test]
    async fn reply_scoping_by_school() {
        let pool = setup().await;
        let mut conn = pool.acquire().await.unwrap();
        let category = create_category(&mut conn, &CategoryInput { name: Some("Taste".to_string()) })
            .await
            .unwrap();

        // Student 2 (school Y) writes; student 1 (school X) may not reply.
        let top = create_top_level(&mut conn, 2, &new_evaluation(category.id)).await.unwrap();
        assert_eq!(top.school.as_ref().unwrap().id, "Y");

        let err = reply(&mut conn, top.id, &reply_text("me too"), Author::Student(1)).await.unwrap_err();
        assert_eq!((err.code(), err.message()), (403, "无权回复该评价"));

        let by_admin = reply(&mut conn, top.id, &reply_text("noted"), Author::Admin("adm".to_string()))
            .await
            .unwrap();
        assert_eq!(by_admin.admin.as_ref().unwrap().display_name.as_deref(), Some("Boss"));
        assert_eq!(by_admin.school.as_ref().unwrap().id, "Y");

        reply(&mut conn, by_admin.id, &reply_text("thanks"), Author::Student(2)).await.unwrap();

        let thread = fetch_thread(&mut conn, top.id).await.unwrap();
        assert_eq!(thread.replies.len(), 1);
        assert_eq!(thread.replies[0].replies[0].content, "thanks");
    }

    #[tokio::test]
    async fn soft_delete_hides_node_but_not_siblings() {
        let pool = setup().await;
        let mut conn = pool.acquire().await.unwrap();
        let category = create_category(&mut conn, &CategoryInput { name: Some("Portion".to_string()) })
            .await
            .unwrap();
        let top = create_top_level(&mut conn, 1, &new_evaluation(category.id)).await.unwrap();
        let admin = Author::Admin("adm".to_string());
        let first = reply(&mut conn, top.id, &reply_text("a"), admin.clone()).await.unwrap();
        reply(&mut conn, top.id, &reply_text("b"), admin).await.unwrap();

        soft_delete(&mut conn, first.id).await.unwrap();
        assert_eq!(soft_delete(&mut conn, first.id).await.unwrap_err().code(), 404);

        let thread = fetch_thread(&mut conn, top.id).await.unwrap();
        let contents: Vec<&str> = thread.replies.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["b"]);

        let err = reply(&mut conn, first.id, &reply_text("late"), Author::Student(1)).await.unwrap_err();
        assert_eq!(err.code(), 404);
    }

    #[tokio::test]
    async fn create_requires_live_category() {
        let pool = setup().await;
        let mut conn = pool.acquire().await.unwrap();
        let err = create_top_level(&mut conn, 1, &new_evaluation(42)).await.unwrap_err();
        assert_eq!((err.code(), err.message()), (404, "选择的评价类别不存在"));

        let err = create_top_level(&mut conn, 1, &NewEvaluation::default()).await.unwrap_err();
        assert_eq!(err.code(), 400);
    }

    #[tokio::test]
    async fn listing_is_scoped_and_top_level_only() {
        let pool = setup().await;
        let mut conn = pool.acquire().await.unwrap();
        let category = create_category(&mut conn, &CategoryInput { name: Some("Service".to_string()) })
            .await
            .unwrap();
        let x = create_top_level(&mut conn, 1, &new_evaluation(category.id)).await.unwrap();
        let y = create_top_level(&mut conn, 2, &new_evaluation(category.id)).await.unwrap();
        sqlx::query("UPDATE evaluations SET created_at = ? WHERE id = ?")
            .bind(Utc::now() - Duration::minutes(5))
            .bind(x.id)
            .execute(&mut *conn)
            .await
            .unwrap();
        reply(&mut conn, x.id, &reply_text("r"), Author::Admin("adm".to_string())).await.unwrap();

        let all = list(&mut conn, &SchoolScope::All, &EvaluationFilter::default(), Pagination::default())
            .await
            .unwrap();
        let ids: Vec<i64> = all.records.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![y.id, x.id]);
        assert_eq!(all.total, 2);

        let only_x = SchoolScope::Only(vec!["X".to_string()]);
        let page = list(&mut conn, &only_x, &EvaluationFilter::default(), Pagination::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);

        let filter = EvaluationFilter {
            school_id: Some("Y".to_string()),
            category_id: None,
        };
        let err = list(&mut conn, &only_x, &filter, Pagination::default()).await.unwrap_err();
        assert_eq!((err.code(), err.message()), (403, "无权访问该学校的评价"));

        let mine = list_mine(&mut conn, 2, None, Pagination::default()).await.unwrap();
        assert_eq!(mine.total, 1);
        assert_eq!(mine.records[0].id, y.id);
    }

    #[tokio::test]
    async fn category_names_unique_among_live_rows() {
        let pool = setup().await;
        let mut conn = pool.acquire().await.unwrap();
        let input = CategoryInput { name: Some("Taste".to_string()) };
        let first = create_category(&mut conn, &input).await.unwrap();
        assert_eq!(create_category(&mut conn, &input).await.unwrap_err().code(), 409);

        update_category(&mut conn, first.id, &input).await.unwrap();
        delete_category(&mut conn, first.id).await.unwrap();
        create_category(&mut conn, &input).await.unwrap();

        let page = list_categories(&mut conn, Some("ast"), Pagination::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(all_categories(&mut conn).await.unwrap().len(), 1);
    }
}
