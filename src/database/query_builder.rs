use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};

/// Push `column IN (?, ?, ...)` with one bind per value.
///
/// An empty list pushes a predicate that never matches instead of the
/// empty `IN ()` form.
pub fn push_in<'q, V>(builder: &mut QueryBuilder<'q, Sqlite>, column: &str, values: &[V])
where
    V: 'q + Clone + Send + sqlx::Encode<'q, Sqlite> + sqlx::Type<Sqlite>,
{
    if values.is_empty() {
        builder.push("0 = 1");
        return;
    }

    builder.push(column);
    builder.push(" IN (");
    let mut separated = builder.separated(", ");
    for value in values {
        separated.push_bind(value.clone());
    }
    separated.push_unseparated(")");
}

/// Raw paging query parameters. Both the `page`/`size` and the
/// `current`/`pageSize` spellings are accepted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<String>,
    pub current: Option<String>,
    pub size: Option<String>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<String>,
}

impl PageParams {
    pub fn pagination(&self) -> Pagination {
        let page = self.page.as_deref().or(self.current.as_deref());
        let size = self.size.as_deref().or(self.page_size.as_deref());
        Pagination::from_raw(page, size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub size: i64,
}

impl Pagination {
    pub const DEFAULT_PAGE: i64 = 1;
    pub const DEFAULT_SIZE: i64 = 10;
    pub const MAX_SIZE: i64 = 100;

    /// Unparsable input resets both values to their defaults; parsed values
    /// are clamped.
    pub fn from_raw(page: Option<&str>, size: Option<&str>) -> Self {
        let parsed = (
            page.map(|p| p.trim().parse::<i64>()).unwrap_or(Ok(Self::DEFAULT_PAGE)),
            size.map(|s| s.trim().parse::<i64>()).unwrap_or(Ok(Self::DEFAULT_SIZE)),
        );

        let (page, size) = match parsed {
            (Ok(page), Ok(size)) => (page, size),
            _ => (Self::DEFAULT_PAGE, Self::DEFAULT_SIZE),
        };

        Self {
            page: page.max(1),
            size: size.clamp(1, Self::MAX_SIZE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.size
    }

    /// Append `LIMIT ? OFFSET ?` for this page.
    pub fn push_limit(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        builder.push(" LIMIT ");
        builder.push_bind(self.size);
        builder.push(" OFFSET ");
        builder.push_bind(self.offset());
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: Self::DEFAULT_PAGE,
            size: Self::DEFAULT_SIZE,
        }
    }
}

/// One page of results: `{records, total, size, current, pages}`.
#[derive(Debug, Clone, Serialize)]
pub struct PageResult<T> {
    pub records: Vec<T>,
    pub total: i64,
    pub size: i64,
    pub current: i64,
    pub pages: i64,
}

impl<T> PageResult<T> {
    pub fn new(records: Vec<T>, total: i64, pagination: Pagination) -> Self {
        let pages = if total == 0 {
            0
        } else {
            (total + pagination.size - 1) / pagination.size
        };

        Self {
            records,
            total,
            size: pagination.size,
            current: pagination.page,
            pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageResult<U> {
        PageResult {
            records: self.records.into_iter().map(f).collect(),
            total: self.total,
            size: self.size,
            current: self.current,
            pages: self.pages,
        }
    }
}
