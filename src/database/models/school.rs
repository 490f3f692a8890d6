use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::api::format::serialize_datetime;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct School {
    pub id: String,
    pub name: String,
    /// Short code; also the prefix of every student login in this school.
    pub alias: String,
    #[serde(serialize_with = "serialize_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_datetime")]
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub is_deleted: bool,
}
