//! Wire formatting for timestamps and local calendar days.
//!
//! Rows keep `DateTime<Utc>`; clients see `YYYY-MM-DD HH:MM:SS` in the
//! configured local offset.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serializer;

use crate::config;

pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn format_datetime(value: &DateTime<Utc>, offset: FixedOffset) -> String {
    value.with_timezone(&offset).format(DATETIME_FORMAT).to_string()
}

/// `serialize_with` target for timestamp fields.
pub fn serialize_datetime<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_datetime(value, config::config().local_offset()))
}

/// The calendar day at `now` in the given offset.
pub fn local_date(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

/// Strict `YYYY-MM-DD` parsing for query parameters and request bodies.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()
}
