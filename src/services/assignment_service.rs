//! Admin ↔ school assignments.
//!
//! Assignment rows are never removed: dropping a school soft-deletes the
//! row and picking it again reactivates the same row, so there is at most
//! one row per (admin, school) pair. Callers run these on the transaction
//! that carries the admin write they belong to.

use std::collections::{BTreeSet, HashSet};

use chrono::Utc;
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::info;
use uuid::Uuid;

use crate::database::models::AssignmentState;
use crate::database::push_in;
use crate::error::ApiError;
use crate::middleware::AuthUser;

/// What a reconciliation changes, by school id.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub to_add: BTreeSet<String>,
    pub to_reactivate: BTreeSet<String>,
    pub to_soft_delete: BTreeSet<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileCounts {
    pub added: usize,
    pub reactivated: usize,
    pub soft_deleted: usize,
}

impl ReconcilePlan {
    /// Diff the desired school set against every existing row for the admin.
    pub fn replace_all(current: &[AssignmentState], desired: &BTreeSet<String>) -> Self {
        let active: BTreeSet<&String> = current.iter().filter(|a| !a.is_deleted).map(|a| &a.school_id).collect();
        let deleted: BTreeSet<&String> = current.iter().filter(|a| a.is_deleted).map(|a| &a.school_id).collect();

        Self {
            to_add: desired
                .iter()
                .filter(|id| !active.contains(id) && !deleted.contains(id))
                .cloned()
                .collect(),
            to_reactivate: desired.iter().filter(|id| deleted.contains(id)).cloned().collect(),
            to_soft_delete: active
                .iter()
                .filter(|id| !desired.contains(id.as_str()))
                .map(|id| (*id).clone())
                .collect(),
        }
    }

    /// Additive variant: rows outside `requested` are left alone.
    pub fn bind_new(current: &[AssignmentState], requested: &BTreeSet<String>) -> Self {
        let mut plan = Self::replace_all(current, requested);
        plan.to_soft_delete.clear();
        plan
    }

    pub fn counts(&self) -> ReconcileCounts {
        ReconcileCounts {
            added: self.to_add.len(),
            reactivated: self.to_reactivate.len(),
            soft_deleted: self.to_soft_delete.len(),
        }
    }
}

async fn current_assignments(
    conn: &mut SqliteConnection,
    admin_id: &str,
    only: Option<&[String]>,
) -> Result<Vec<AssignmentState>, ApiError> {
    let mut query: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT school_id, is_deleted FROM admin_school_map WHERE admin_id = ");
    query.push_bind(admin_id.to_string());
    if let Some(ids) = only {
        query.push(" AND ");
        push_in(&mut query, "school_id", ids);
    }
    Ok(query.build_query_as().fetch_all(&mut *conn).await?)
}

async fn set_deleted(
    conn: &mut SqliteConnection,
    admin_id: &str,
    school_ids: &BTreeSet<String>,
    deleted: bool,
) -> Result<(), ApiError> {
    if school_ids.is_empty() {
        return Ok(());
    }
    let ids: Vec<String> = school_ids.iter().cloned().collect();
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE admin_school_map SET is_deleted = ");
    query.push_bind(deleted);
    query.push(", updated_at = ");
    query.push_bind(Utc::now());
    query.push(" WHERE admin_id = ");
    query.push_bind(admin_id.to_string());
    query.push(" AND ");
    push_in(&mut query, "school_id", &ids);
    query.build().execute(&mut *conn).await?;
    Ok(())
}

async fn insert_rows(
    conn: &mut SqliteConnection,
    admin_id: &str,
    school_ids: &BTreeSet<String>,
) -> Result<(), ApiError> {
    if school_ids.is_empty() {
        return Ok(());
    }
    let now = Utc::now();
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
        "INSERT INTO admin_school_map (id, admin_id, school_id, created_at, updated_at, is_deleted) ",
    );
    query.push_values(school_ids, |mut row, school_id| {
        row.push_bind(Uuid::new_v4().to_string())
            .push_bind(admin_id.to_string())
            .push_bind(school_id.clone())
            .push_bind(now)
            .push_bind(now)
            .push_bind(false);
    });
    query.build().execute(&mut *conn).await?;
    Ok(())
}

async fn apply(conn: &mut SqliteConnection, admin_id: &str, plan: &ReconcilePlan) -> Result<(), ApiError> {
    set_deleted(conn, admin_id, &plan.to_reactivate, false).await?;
    set_deleted(conn, admin_id, &plan.to_soft_delete, true).await?;
    insert_rows(conn, admin_id, &plan.to_add).await?;
    Ok(())
}

/// Create-time binding: activate every requested school for the admin,
/// touching nothing else. Returns how many rows were inserted or reactivated.
pub async fn bind_new(
    conn: &mut SqliteConnection,
    admin_id: &str,
    school_ids: &[String],
) -> Result<usize, ApiError> {
    let requested: BTreeSet<String> = school_ids.iter().cloned().collect();
    if requested.is_empty() {
        return Ok(0);
    }
    let ids: Vec<String> = requested.iter().cloned().collect();
    let current = current_assignments(conn, admin_id, Some(&ids)).await?;
    let plan = ReconcilePlan::bind_new(&current, &requested);
    apply(conn, admin_id, &plan).await?;

    let counts = plan.counts();
    info!(
        "Bound schools to admin {}: {} added, {} reactivated",
        admin_id, counts.added, counts.reactivated
    );
    Ok(counts.added + counts.reactivated)
}

/// Update-time replacement: afterwards exactly `school_ids` are active.
pub async fn replace_all(
    conn: &mut SqliteConnection,
    admin_id: &str,
    school_ids: &[String],
) -> Result<ReconcileCounts, ApiError> {
    let desired: BTreeSet<String> = school_ids.iter().cloned().collect();
    let current = current_assignments(conn, admin_id, None).await?;
    let plan = ReconcilePlan::replace_all(&current, &desired);
    apply(conn, admin_id, &plan).await?;

    let counts = plan.counts();
    info!(
        "Replaced schools of admin {}: {} added, {} reactivated, {} soft-deleted",
        admin_id, counts.added, counts.reactivated, counts.soft_deleted
    );
    Ok(counts)
}

/// Fail unless every id names a non-deleted school. All missing ids are
/// reported together, in request order.
pub async fn validate_exist(conn: &mut SqliteConnection, school_ids: &[String]) -> Result<(), ApiError> {
    if school_ids.is_empty() {
        return Ok(());
    }
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT id FROM schools WHERE is_deleted = 0 AND ");
    push_in(&mut query, "id", school_ids);
    let found: HashSet<String> = query
        .build_query_scalar::<String>()
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .collect();

    let mut seen = HashSet::new();
    let missing: Vec<&str> = school_ids
        .iter()
        .filter(|id| !found.contains(*id) && seen.insert(id.as_str()))
        .map(String::as_str)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!("学校不存在或已删除: {}", missing.join(", "))))
    }
}

/// Active school ids of one admin, sorted.
pub async fn managed_school_ids(conn: &mut SqliteConnection, admin_id: &str) -> Result<Vec<String>, ApiError> {
    Ok(sqlx::query_scalar(
        "SELECT school_id FROM admin_school_map WHERE admin_id = ? AND is_deleted = 0 ORDER BY school_id",
    )
    .bind(admin_id)
    .fetch_all(&mut *conn)
    .await?)
}

/// Which schools a caller may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchoolScope {
    All,
    Only(Vec<String>),
}

impl SchoolScope {
    pub async fn of(conn: &mut SqliteConnection, user: &AuthUser) -> Result<Self, ApiError> {
        if user.is_super_admin() {
            Ok(SchoolScope::All)
        } else {
            Ok(SchoolScope::Only(managed_school_ids(conn, user.uid()).await?))
        }
    }

    pub fn allows(&self, school_id: &str) -> bool {
        match self {
            SchoolScope::All => true,
            SchoolScope::Only(ids) => ids.iter().any(|id| id == school_id),
        }
    }

    /// Refuse an explicitly requested school outside the scope.
    pub fn check(&self, school_id: Option<&str>, message: &str) -> Result<(), ApiError> {
        match school_id {
            Some(id) if !self.allows(id) => Err(ApiError::forbidden(message)),
            _ => Ok(()),
        }
    }

    /// Append ` AND <column> IN (...)` when the scope is limited.
    pub fn push_filter(&self, query: &mut QueryBuilder<'_, Sqlite>, column: &str) {
        if let SchoolScope::Only(ids) = self {
            query.push(" AND ");
            push_in(query, column, ids);
        }
    }
}
