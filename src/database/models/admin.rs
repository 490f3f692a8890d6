use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::api::format::serialize_datetime;
use crate::types::{AdminTier, Role};

#[derive(Debug, Clone, FromRow)]
pub struct Admin {
    pub id: String,
    pub account: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub tier: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
}

impl Admin {
    pub fn tier(&self) -> AdminTier {
        AdminTier::from_column(&self.tier)
    }

    pub fn role(&self) -> Role {
        self.tier().role()
    }

    pub fn into_view(self, school_ids: Vec<String>) -> AdminView {
        AdminView {
            role: self.role(),
            id: self.id,
            account: self.account,
            display_name: self.display_name,
            created_at: self.created_at,
            updated_at: self.updated_at,
            school_ids,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminView {
    pub id: String,
    pub account: String,
    pub display_name: Option<String>,
    pub role: Role,
    #[serde(serialize_with = "serialize_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_datetime")]
    pub updated_at: DateTime<Utc>,
    /// Schools this admin currently manages (active assignments only).
    pub school_ids: Vec<String>,
}
