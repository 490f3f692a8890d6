use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::api::format::serialize_datetime;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EvaluationCategory {
    pub id: i64,
    pub name: String,
    #[serde(serialize_with = "serialize_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub is_deleted: bool,
}

/// One evaluation joined with the display names of everything it links to.
#[derive(Debug, Clone, FromRow)]
pub struct EvaluationRow {
    pub id: i64,
    pub content: String,
    pub parent_id: Option<i64>,
    pub school_id: Option<String>,
    pub school_name: Option<String>,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub student_id: Option<i64>,
    pub student_name: Option<String>,
    pub admin_id: Option<String>,
    pub admin_display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedRef<I> {
    pub id: I,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminRef {
    pub id: String,
    pub display_name: Option<String>,
}

/// Evaluation as returned to clients, replies nested to any depth.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationNode {
    pub id: i64,
    pub content: String,
    #[serde(serialize_with = "serialize_datetime")]
    pub created_at: DateTime<Utc>,
    pub school: Option<NamedRef<String>>,
    pub category: Option<NamedRef<i64>>,
    pub student: Option<NamedRef<i64>>,
    pub admin: Option<AdminRef>,
    pub replies: Vec<EvaluationNode>,
}

impl EvaluationNode {
    /// A node without its replies.
    pub fn leaf(row: &EvaluationRow) -> Self {
        Self {
            id: row.id,
            content: row.content.clone(),
            created_at: row.created_at,
            school: row.school_id.clone().map(|id| NamedRef {
                id,
                name: row.school_name.clone(),
            }),
            category: row.category_id.map(|id| NamedRef {
                id,
                name: row.category_name.clone(),
            }),
            student: row.student_id.map(|id| NamedRef {
                id,
                name: row.student_name.clone(),
            }),
            admin: row.admin_id.clone().map(|id| AdminRef {
                id,
                display_name: row.admin_display_name.clone(),
            }),
            replies: Vec::new(),
        }
    }
}
