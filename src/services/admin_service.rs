//! Admin accounts and their school assignments.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::password::hash_password;
use crate::database::models::{Admin, AdminView};
use crate::database::{push_in, PageResult, Pagination};
use crate::error::ApiError;
use crate::services::assignment_service::{self, ReconcileCounts};
use crate::types::AdminTier;
use crate::validation::{length_between, non_blank, FieldErrors};

const ACCOUNT_LENGTH: &str = "账号长度需在 1~64 个字符之间";
const NAME_LENGTH: &str = "姓名长度需在 1~64 个字符之间";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminFilter {
    pub account: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAdmin {
    pub account: Option<String>,
    pub password: Option<String>,
    pub display_name: Option<String>,
    pub school_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminUpdate {
    pub account: Option<String>,
    pub display_name: Option<String>,
    pub password: Option<String>,
    pub school_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminUpdateResult {
    pub admin: AdminView,
    pub schools: ReconcileCounts,
}

/// Active school ids per admin for a batch of admins.
async fn school_ids_by_admin(
    conn: &mut SqliteConnection,
    admin_ids: &[String],
) -> Result<HashMap<String, Vec<String>>, ApiError> {
    let mut query: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT admin_id, school_id FROM admin_school_map WHERE is_deleted = 0 AND ");
    push_in(&mut query, "admin_id", admin_ids);
    query.push(" ORDER BY school_id");
    let rows: Vec<(String, String)> = query.build_query_as().fetch_all(&mut *conn).await?;

    let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
    for (admin_id, school_id) in rows {
        grouped.entry(admin_id).or_default().push(school_id);
    }
    Ok(grouped)
}

async fn find_live(conn: &mut SqliteConnection, id: &str) -> Result<Option<Admin>, ApiError> {
    Ok(
        sqlx::query_as("SELECT * FROM admins WHERE id = ? AND is_deleted = 0")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?,
    )
}

async fn view(conn: &mut SqliteConnection, admin: Admin) -> Result<AdminView, ApiError> {
    let school_ids = assignment_service::managed_school_ids(conn, &admin.id).await?;
    Ok(admin.into_view(school_ids))
}

async fn account_taken(conn: &mut SqliteConnection, account: &str, except: Option<&str>) -> Result<bool, ApiError> {
    let row: Option<(String,)> = sqlx::query_as(
        "SELECT id FROM admins WHERE account = ? AND is_deleted = 0 AND (? IS NULL OR id != ?) LIMIT 1",
    )
    .bind(account)
    .bind(except)
    .bind(except)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.is_some())
}

pub async fn list(
    conn: &mut SqliteConnection,
    filter: &AdminFilter,
    pagination: Pagination,
) -> Result<PageResult<AdminView>, ApiError> {
    let account = non_blank(filter.account.as_deref()).map(|v| format!("%{v}%"));
    let display_name = non_blank(filter.display_name.as_deref()).map(|v| format!("%{v}%"));
    let filters = |q: &mut QueryBuilder<'_, Sqlite>| {
        if let Some(account) = &account {
            q.push(" AND account LIKE ").push_bind(account.clone());
        }
        if let Some(display_name) = &display_name {
            q.push(" AND display_name LIKE ").push_bind(display_name.clone());
        }
    };

    let mut count: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM admins WHERE is_deleted = 0");
    filters(&mut count);
    let total: i64 = count.build_query_scalar().fetch_one(&mut *conn).await?;

    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM admins WHERE is_deleted = 0");
    filters(&mut query);
    query.push(" ORDER BY created_at DESC, id DESC");
    pagination.push_limit(&mut query);
    let admins: Vec<Admin> = query.build_query_as().fetch_all(&mut *conn).await?;

    let ids: Vec<String> = admins.iter().map(|a| a.id.clone()).collect();
    let mut schools = school_ids_by_admin(conn, &ids).await?;
    let records = admins
        .into_iter()
        .map(|admin| {
            let school_ids = schools.remove(&admin.id).unwrap_or_default();
            admin.into_view(school_ids)
        })
        .collect();

    Ok(PageResult::new(records, total, pagination))
}

async fn insert(
    conn: &mut SqliteConnection,
    account: &str,
    password: &str,
    display_name: Option<&str>,
    tier: AdminTier,
) -> Result<Admin, ApiError> {
    if account_taken(conn, account, None).await? {
        return Err(ApiError::conflict("账号已存在"));
    }

    let now = Utc::now();
    let admin = Admin {
        id: Uuid::new_v4().to_string(),
        account: account.to_string(),
        password_hash: hash_password(password)?,
        display_name: display_name.map(str::to_string),
        tier: tier.as_str().to_string(),
        created_at: now,
        updated_at: now,
        is_deleted: false,
    };
    sqlx::query(
        "INSERT INTO admins (id, account, password_hash, display_name, tier, created_at, updated_at, is_deleted) \
         VALUES (?, ?, ?, ?, ?, ?, ?, 0)",
    )
    .bind(&admin.id)
    .bind(&admin.account)
    .bind(&admin.password_hash)
    .bind(&admin.display_name)
    .bind(&admin.tier)
    .bind(admin.created_at)
    .bind(admin.updated_at)
    .execute(&mut *conn)
    .await?;

    info!("Created {} account '{}' ({})", admin.tier, admin.account, admin.id);
    Ok(admin)
}

/// Create an ordinary admin, binding the requested schools.
pub async fn create(conn: &mut SqliteConnection, input: &NewAdmin) -> Result<AdminView, ApiError> {
    let mut errors = FieldErrors::new();
    let account = errors.required("account", input.account.as_deref(), "账号为必填项", |v| {
        length_between(v, 1, 64, ACCOUNT_LENGTH)
    });
    let password = errors.required("password", input.password.as_deref(), "密码为必填项", |_| Ok(()));
    let display_name = non_blank(input.display_name.as_deref());
    if let Some(name) = display_name {
        errors.check("display_name", length_between(name, 1, 64, NAME_LENGTH));
    }
    errors.into_result()?;
    let (account, password) = (account.unwrap_or_default(), password.unwrap_or_default());

    let school_ids = input.school_ids.clone().unwrap_or_default();
    assignment_service::validate_exist(conn, &school_ids).await?;

    let admin = insert(conn, &account, &password, display_name, AdminTier::Admin).await?;
    assignment_service::bind_new(conn, &admin.id, &school_ids).await?;
    view(conn, admin).await
}

/// Bootstrap a super-admin account.
pub async fn create_super(
    conn: &mut SqliteConnection,
    account: &str,
    password: &str,
    display_name: Option<&str>,
) -> Result<Admin, ApiError> {
    let mut errors = FieldErrors::new();
    errors.check("account", length_between(account.trim(), 1, 64, ACCOUNT_LENGTH));
    if password.trim().is_empty() {
        errors.add("password", "密码为必填项");
    }
    errors.into_result()?;
    insert(conn, account.trim(), password, non_blank(display_name), AdminTier::Super).await
}

/// Full update of an admin. The school set is replaced on the caller's
/// transaction; a blank password leaves the stored one unchanged.
pub async fn update(
    conn: &mut SqliteConnection,
    id: &str,
    input: &AdminUpdate,
) -> Result<AdminUpdateResult, ApiError> {
    let mut errors = FieldErrors::new();
    let account = errors.required("account", input.account.as_deref(), "账号为必填项", |v| {
        length_between(v, 1, 64, ACCOUNT_LENGTH)
    });
    let display_name = errors.required("display_name", input.display_name.as_deref(), "姓名为必填项", |v| {
        length_between(v, 1, 64, NAME_LENGTH)
    });
    let password = non_blank(input.password.as_deref());
    if let Some(password) = password {
        errors.check("password", length_between(password, 6, 15, "密码长度需在 6-15 个字符之间"));
    }
    let school_ids = match &input.school_ids {
        None => {
            errors.add("school_ids", "学校为必填项");
            Vec::new()
        }
        Some(ids) if ids.is_empty() => {
            errors.add("school_ids", "至少选择 1 所学校");
            Vec::new()
        }
        Some(ids) => ids.clone(),
    };
    errors.into_result()?;
    let (account, display_name) = (account.unwrap_or_default(), display_name.unwrap_or_default());

    if account_taken(conn, &account, Some(id)).await? {
        return Err(ApiError::conflict("此账号已存在"));
    }
    let mut admin = find_live(conn, id)
        .await?
        .ok_or_else(|| ApiError::not_found("管理员不存在或已被删除"))?;
    assignment_service::validate_exist(conn, &school_ids).await?;

    if let Some(password) = password {
        admin.password_hash = hash_password(password)?;
    }
    admin.account = account;
    admin.display_name = Some(display_name);
    admin.updated_at = Utc::now();

    sqlx::query("UPDATE admins SET account = ?, display_name = ?, password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(&admin.account)
        .bind(&admin.display_name)
        .bind(&admin.password_hash)
        .bind(admin.updated_at)
        .bind(id)
        .execute(&mut *conn)
        .await?;

    let schools = assignment_service::replace_all(conn, id, &school_ids).await?;
    info!("Updated admin {}", id);
    Ok(AdminUpdateResult {
        admin: view(conn, admin).await?,
        schools,
    })
}

/// Soft-delete an admin and every assignment it holds.
pub async fn delete(conn: &mut SqliteConnection, actor_id: &str, id: &str) -> Result<(), ApiError> {
    if actor_id == id {
        warn!("Admin {} tried to delete their own account", actor_id);
        return Err(ApiError::bad_request("不能删除自己的账号"));
    }
    if find_live(conn, id).await?.is_none() {
        return Err(ApiError::not_found("管理员不存在或已被删除"));
    }

    sqlx::query("UPDATE admins SET is_deleted = 1, updated_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await?;
    assignment_service::replace_all(conn, id, &[]).await?;

    info!("Soft-deleted admin {}", id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseManager;
    use crate::services::school_service::{self, SchoolInput};

    async fn setup() -> (sqlx::SqlitePool, Vec<String>) {
        let pool = DatabaseManager::connect_in_memory().await.unwrap();
        DatabaseManager::migrate(&pool).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let mut ids = Vec::new();
        for (name, alias) in [("North", "NO"), ("South", "SO"), ("East", "EA")] {
            let input = SchoolInput {
                name: Some(name.to_string()),
                alias: Some(alias.to_string()),
            };
            ids.push(school_service::create(&mut conn, &input).await.unwrap().id);
        }
        drop(conn);
        (pool, ids)
    }

    fn new_admin(account: &str, schools: &[String]) -> NewAdmin {
        NewAdmin {
            account: Some(account.to_string()),
            password: Some("secret1".to_string()),
            display_name: Some(account.to_uppercase()),
            school_ids: Some(schools.to_vec()),
        }
    }

    fn update_of(admin: &AdminView, schools: &[String]) -> AdminUpdate {
        AdminUpdate {
            account: Some(admin.account.clone()),
            display_name: admin.display_name.clone(),
            password: None,
            school_ids: Some(schools.to_vec()),
        }
    }

    #[tokio::test]
    async fn create_binds_and_rejects_unknown_schools() {
        let (pool, schools) = setup().await;
        let mut conn = pool.acquire().await.unwrap();

        let admin = create(&mut conn, &new_admin("ops", &schools[..2])).await.unwrap();
        let mut expected = schools[..2].to_vec();
        expected.sort();
        assert_eq!(admin.school_ids, expected);

        let err = create(&mut conn, &new_admin("ops2", &["ghost".to_string()])).await.unwrap_err();
        assert_eq!(err.message(), "学校不存在或已删除: ghost");
        assert_eq!(create(&mut conn, &new_admin("ops", &[])).await.unwrap_err().code(), 409);
    }

    #[tokio::test]
    async fn update_replaces_school_set() {
        let (pool, schools) = setup().await;
        let mut conn = pool.acquire().await.unwrap();
        let admin = create(&mut conn, &new_admin("ops", &schools[..2])).await.unwrap();

        let result = update(&mut conn, &admin.id, &update_of(&admin, &schools[1..])).await.unwrap();
        assert_eq!(
            result.schools,
            ReconcileCounts {
                added: 1,
                reactivated: 0,
                soft_deleted: 1
            }
        );

        let result = update(&mut conn, &admin.id, &update_of(&admin, &schools[1..])).await.unwrap();
        assert_eq!(result.schools, ReconcileCounts::default());

        let err = update(&mut conn, &admin.id, &update_of(&admin, &[])).await.unwrap_err();
        assert_eq!(err.to_json()["errors"]["school_ids"][0], "至少选择 1 所学校");

        let mut short = update_of(&admin, &schools);
        short.password = Some("123".to_string());
        assert_eq!(update(&mut conn, &admin.id, &short).await.unwrap_err().code(), 400);
    }

    #[tokio::test]
    async fn account_conflicts_ignore_deleted_admins() {
        let (pool, schools) = setup().await;
        let mut conn = pool.acquire().await.unwrap();
        let boss = create_super(&mut conn, "root", "rootpass", None).await.unwrap();
        assert_eq!(boss.tier(), AdminTier::Super);

        let ops = create(&mut conn, &new_admin("ops", &schools)).await.unwrap();
        let other = create(&mut conn, &new_admin("other", &[])).await.unwrap();

        let mut clash = update_of(&other, &schools);
        clash.account = Some("ops".to_string());
        assert_eq!(update(&mut conn, &other.id, &clash).await.unwrap_err().message(), "此账号已存在");

        assert_eq!(delete(&mut conn, &boss.id, &boss.id).await.unwrap_err().code(), 400);
        delete(&mut conn, &boss.id, &ops.id).await.unwrap();
        assert!(assignment_service::managed_school_ids(&mut conn, &ops.id).await.unwrap().is_empty());
        assert_eq!(delete(&mut conn, &boss.id, &ops.id).await.unwrap_err().code(), 404);

        update(&mut conn, &other.id, &clash).await.unwrap();
    }

    #[tokio::test]
    async fn list_includes_active_school_ids() {
        let (pool, schools) = setup().await;
        let mut conn = pool.acquire().await.unwrap();
        create(&mut conn, &new_admin("alpha", &schools[..1])).await.unwrap();
        create(&mut conn, &new_admin("beta", &[])).await.unwrap();

        let page = list(&mut conn, &AdminFilter::default(), Pagination::default()).await.unwrap();
        assert_eq!(page.total, 2);

        let filter = AdminFilter {
            account: Some("alp".to_string()),
            display_name: None,
        };
        let page = list(&mut conn, &filter, Pagination::default()).await.unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].school_ids, vec![schools[0].clone()]);
    }
}
