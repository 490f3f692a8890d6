use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::api::format::serialize_datetime;

#[derive(Debug, Clone, FromRow)]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub student_number: String,
    pub password_hash: Option<String>,
    pub is_eating: bool,
    pub leave_start_date: Option<NaiveDate>,
    pub leave_end_date: Option<NaiveDate>,
    pub school_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
}

impl Student {
    /// Login account: school alias followed by the student number. Never stored.
    pub fn account(alias: &str, student_number: &str) -> String {
        format!("{alias}{student_number}")
    }

    /// Inclusive leave interval check; a half-set interval never counts.
    pub fn is_on_leave(&self, day: NaiveDate) -> bool {
        match (self.leave_start_date, self.leave_end_date) {
            (Some(start), Some(end)) => start <= day && day <= end,
            _ => false,
        }
    }

    /// Eats on `day` only when the eating flag is set and no leave covers the day.
    pub fn eats_on(&self, day: NaiveDate) -> bool {
        self.is_eating && !self.is_on_leave(day)
    }
}

/// A student joined with the owning school's name and alias.
#[derive(Debug, Clone, FromRow)]
pub struct StudentRow {
    pub id: i64,
    pub name: String,
    pub student_number: String,
    pub is_eating: bool,
    pub leave_start_date: Option<NaiveDate>,
    pub leave_end_date: Option<NaiveDate>,
    pub school_id: String,
    pub school_name: String,
    pub school_alias: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchoolSummary {
    pub id: String,
    pub name: String,
    pub alias: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentView {
    pub id: i64,
    pub name: String,
    pub student_number: String,
    pub account: String,
    pub is_eating: bool,
    pub leave_start_date: Option<NaiveDate>,
    pub leave_end_date: Option<NaiveDate>,
    #[serde(serialize_with = "serialize_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_datetime")]
    pub updated_at: DateTime<Utc>,
    pub school: SchoolSummary,
}

impl From<StudentRow> for StudentView {
    fn from(row: StudentRow) -> Self {
        Self {
            account: Student::account(&row.school_alias, &row.student_number),
            id: row.id,
            name: row.name,
            student_number: row.student_number,
            is_eating: row.is_eating,
            leave_start_date: row.leave_start_date,
            leave_end_date: row.leave_end_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
            school: SchoolSummary {
                id: row.school_id,
                name: row.school_name,
                alias: row.school_alias,
            },
        }
    }
}
