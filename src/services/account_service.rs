//! Credentials, identities and token revocation.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{info, warn};

use crate::auth::password::{hash_password, verify_password};
use crate::auth::{self, Identity, RefreshClaims};
use crate::config::SecurityConfig;
use crate::database::models::{Admin, School, Student};
use crate::error::ApiError;
use crate::types::{AccountKind, Role};
use crate::validation::{length_between, non_blank, FieldErrors};

const BAD_CREDENTIALS: &str = "用户名或密码错误";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub account: Option<String>,
    pub password: Option<String>,
    #[serde(rename = "userType")]
    pub user_type: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub account: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
    pub access_token: String,
    pub refresh_token: String,
    pub role: Role,
    pub user: UserSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshResult {
    pub access_token: String,
    pub role: Role,
}

/// Schools whose alias prefixes `login_id` with a non-empty remainder, in the
/// order given, paired with that remainder.
pub fn alias_candidates<'a>(schools: &'a [School], login_id: &'a str) -> Vec<(&'a School, &'a str)> {
    schools
        .iter()
        .filter_map(|school| {
            login_id
                .strip_prefix(school.alias.as_str())
                .filter(|number| !number.is_empty())
                .map(|number| (school, number))
        })
        .collect()
}

/// Find the student behind a synthesized login (`alias + student_number`).
/// Schools are tried oldest first; the first school holding a matching
/// student wins.
pub async fn resolve_student_login(
    conn: &mut SqliteConnection,
    login_id: &str,
) -> Result<Option<(School, Student)>, ApiError> {
    let schools: Vec<School> = sqlx::query_as(
        "SELECT * FROM schools WHERE is_deleted = 0 ORDER BY created_at, id",
    )
    .fetch_all(&mut *conn)
    .await?;

    for (school, number) in alias_candidates(&schools, login_id) {
        let student: Option<Student> = sqlx::query_as(
            "SELECT * FROM students WHERE school_id = ? AND student_number = ? AND is_deleted = 0 LIMIT 1",
        )
        .bind(&school.id)
        .bind(number)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(student) = student {
            return Ok(Some((school.clone(), student)));
        }
    }

    Ok(None)
}

fn student_identity(school_alias: &str, student: &Student) -> Identity {
    Identity {
        uid: student.id.to_string(),
        kind: AccountKind::Student,
        role: Role::Student,
        account: Student::account(school_alias, &student.student_number),
        name: Some(student.name.clone()),
    }
}

fn admin_identity(admin: &Admin) -> Identity {
    Identity {
        uid: admin.id.clone(),
        kind: AccountKind::Admin,
        role: admin.role(),
        account: admin.account.clone(),
        name: admin.display_name.clone(),
    }
}

async fn find_admin_by_account(conn: &mut SqliteConnection, account: &str) -> Result<Option<Admin>, ApiError> {
    Ok(
        sqlx::query_as("SELECT * FROM admins WHERE account = ? AND is_deleted = 0 LIMIT 1")
            .bind(account)
            .fetch_optional(&mut *conn)
            .await?,
    )
}

/// Verify credentials and issue an access/refresh token pair.
///
/// Unknown accounts and wrong passwords produce the same error.
pub async fn authenticate(
    conn: &mut SqliteConnection,
    request: &LoginRequest,
    security: &SecurityConfig,
) -> Result<LoginResult, ApiError> {
    let login_id = non_blank(request.username.as_deref())
        .or(non_blank(request.account.as_deref()))
        .unwrap_or_default();
    let password = request.password.as_deref().unwrap_or_default();
    let kind = non_blank(request.user_type.as_deref())
        .or(non_blank(request.kind.as_deref()))
        .unwrap_or("student");

    if login_id.is_empty() {
        return Err(ApiError::bad_request("用户名不能为空"));
    }

    let kind = AccountKind::parse(kind).ok_or_else(|| ApiError::bad_request("不支持的登录类型"))?;

    let identity = match kind {
        AccountKind::Student => {
            let Some((school, student)) = resolve_student_login(conn, login_id).await? else {
                warn!("Student login failed: no student for '{}'", login_id);
                return Err(ApiError::bad_request(BAD_CREDENTIALS));
            };
            if !verify_password(password, student.password_hash.as_deref()) {
                warn!("Student login failed: wrong password for '{}'", login_id);
                return Err(ApiError::bad_request(BAD_CREDENTIALS));
            }
            student_identity(&school.alias, &student)
        }
        AccountKind::Admin => {
            let Some(admin) = find_admin_by_account(conn, login_id).await? else {
                warn!("Admin login failed: no admin '{}'", login_id);
                return Err(ApiError::bad_request(BAD_CREDENTIALS));
            };
            if !verify_password(password, Some(&admin.password_hash)) {
                warn!("Admin login failed: wrong password for '{}'", login_id);
                return Err(ApiError::bad_request(BAD_CREDENTIALS));
            }
            admin_identity(&admin)
        }
    };

    let tokens = auth::issue_token_pair(&identity, security)?;
    info!("{:?} {} logged in as {}", identity.kind, identity.uid, identity.role);

    Ok(LoginResult {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        role: identity.role,
        user: UserSummary {
            id: identity.uid,
            account: identity.account,
            name: identity.name,
        },
    })
}

/// Load the current identity of an account from storage. Deleted or missing
/// accounts yield `None`.
pub async fn load_identity(
    conn: &mut SqliteConnection,
    kind: AccountKind,
    uid: &str,
) -> Result<Option<Identity>, ApiError> {
    match kind {
        AccountKind::Student => {
            let Ok(id) = uid.parse::<i64>() else {
                return Ok(None);
            };
            let student: Option<Student> =
                sqlx::query_as("SELECT * FROM students WHERE id = ? AND is_deleted = 0")
                    .bind(id)
                    .fetch_optional(&mut *conn)
                    .await?;
            let Some(student) = student else {
                return Ok(None);
            };
            let alias: Option<(String,)> = sqlx::query_as("SELECT alias FROM schools WHERE id = ?")
                .bind(&student.school_id)
                .fetch_optional(&mut *conn)
                .await?;
            Ok(alias.map(|(alias,)| student_identity(&alias, &student)))
        }
        AccountKind::Admin => {
            let admin: Option<Admin> = sqlx::query_as("SELECT * FROM admins WHERE id = ? AND is_deleted = 0")
                .bind(uid)
                .fetch_optional(&mut *conn)
                .await?;
            Ok(admin.as_ref().map(admin_identity))
        }
    }
}

/// Mint a new access token from the account's current state, so role
/// changes and deletions take effect on refresh.
pub async fn refresh(
    conn: &mut SqliteConnection,
    claims: &RefreshClaims,
    security: &SecurityConfig,
) -> Result<RefreshResult, ApiError> {
    let identity = load_identity(conn, claims.kind, &claims.uid)
        .await?
        .ok_or_else(|| {
            warn!("Refresh refused: {:?} {} no longer exists", claims.kind, claims.uid);
            ApiError::unauthorized("账号不存在或已被删除")
        })?;

    let access_token = auth::issue_access_token(&identity, security)?;
    Ok(RefreshResult {
        access_token,
        role: identity.role,
    })
}

pub async fn is_revoked(conn: &mut SqliteConnection, jti: &str) -> Result<bool, ApiError> {
    let row: Option<(String,)> = sqlx::query_as("SELECT jti FROM revoked_tokens WHERE jti = ?")
        .bind(jti)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}

/// Record a token id as revoked until its own expiry. Revoking twice is a no-op.
pub async fn revoke(conn: &mut SqliteConnection, jti: &str, exp: i64) -> Result<(), ApiError> {
    let expires_at: DateTime<Utc> = Utc.timestamp_opt(exp, 0).single().unwrap_or_else(Utc::now);
    sqlx::query("INSERT OR IGNORE INTO revoked_tokens (jti, expires_at, created_at) VALUES (?, ?, ?)")
        .bind(jti)
        .bind(expires_at)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Drop revocation records whose tokens would have expired anyway.
pub async fn purge_expired_revocations(conn: &mut SqliteConnection) -> Result<u64, ApiError> {
    let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at < ?")
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub password: Option<String>,
    pub current_password: Option<String>,
}

/// Self-service profile update for any signed-in account. Changing the
/// password requires the current one.
pub async fn update_profile(
    conn: &mut SqliteConnection,
    identity: &Identity,
    update: &ProfileUpdate,
) -> Result<(), ApiError> {
    let mut errors = FieldErrors::new();
    let name = errors.required("name", update.name.as_deref(), "名称不能为空", |v| {
        length_between(v, 1, 64, "名称长度需在1-64个字符之间")
    });
    let password = non_blank(update.password.as_deref());
    let current_password = non_blank(update.current_password.as_deref());
    if password.is_some() && current_password.is_none() {
        errors.add("current_password", "如需修改密码，必须提供当前密码。");
    }
    errors.into_result()?;
    let name = name.unwrap_or_default();

    let student_id: Option<i64> = match identity.kind {
        AccountKind::Student => Some(identity.uid.parse().map_err(|_| ApiError::not_found("学生不存在"))?),
        AccountKind::Admin => None,
    };

    let stored_hash: Option<String> = match student_id {
        Some(id) => {
            let row: Option<(Option<String>,)> =
                sqlx::query_as("SELECT password_hash FROM students WHERE id = ? AND is_deleted = 0")
                    .bind(id)
                    .fetch_optional(&mut *conn)
                    .await?;
            row.ok_or_else(|| ApiError::not_found("学生不存在"))?.0
        }
        None => {
            let row: Option<(String,)> =
                sqlx::query_as("SELECT password_hash FROM admins WHERE id = ? AND is_deleted = 0")
                    .bind(&identity.uid)
                    .fetch_optional(&mut *conn)
                    .await?;
            Some(row.ok_or_else(|| ApiError::not_found("管理员不存在"))?.0)
        }
    };

    let new_hash = match (password, current_password) {
        (Some(password), Some(current)) => {
            let Some(stored) = stored_hash.as_deref().filter(|h| !h.is_empty()) else {
                return Err(ApiError::bad_request(
                    "您的账户当前未设置密码，无法使用“当前密码”进行验证",
                ));
            };
            if !verify_password(current, Some(stored)) {
                return Err(ApiError::bad_request("当前密码不正确"));
            }
            Some(hash_password(password)?)
        }
        _ => None,
    };

    let now = Utc::now();
    match student_id {
        Some(id) => {
            sqlx::query(
                "UPDATE students SET name = ?, password_hash = COALESCE(?, password_hash), updated_at = ? WHERE id = ?",
            )
            .bind(&name)
            .bind(&new_hash)
            .bind(now)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        }
        None => {
            sqlx::query(
                "UPDATE admins SET display_name = ?, password_hash = COALESCE(?, password_hash), updated_at = ? WHERE id = ?",
            )
            .bind(&name)
            .bind(&new_hash)
            .bind(now)
            .bind(&identity.uid)
            .execute(&mut *conn)
            .await?;
        }
    }

    info!("{:?} {} updated their profile", identity.kind, identity.uid);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::database::DatabaseManager;

    fn school(id: &str, alias: &str) -> School {
        School {
            id: id.to_string(),
            name: format!("school {id}"),
            alias: alias.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            is_deleted: false,
        }
    }

    #[test]
    fn alias_candidates_keep_order_and_need_a_remainder() {
        let schools = vec![school("1", "BJ"), school("2", "BJS"), school("3", "SH")];
        let found: Vec<(&str, &str)> = alias_candidates(&schools, "BJS001")
            .into_iter()
            .map(|(s, n)| (s.id.as_str(), n))
            .collect();
        assert_eq!(found, vec![("1", "S001"), ("2", "001")]);

        assert!(alias_candidates(&schools, "BJ").is_empty());
        assert!(alias_candidates(&schools, "GZ001").is_empty());
    }

    async fn seeded() -> (sqlx::SqlitePool, AppConfig) {
        let pool = DatabaseManager::connect_in_memory().await.unwrap();
        DatabaseManager::migrate(&pool).await.unwrap();
        let now = Utc::now();
        sqlx::query("INSERT INTO schools (id, name, alias, created_at, updated_at) VALUES ('s1', 'One', 'ONE', ?, ?)")
            .bind(now)
            .bind(now)
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO students (name, student_number, password_hash, school_id, created_at, updated_at) VALUES ('Li', '007', NULL, 's1', ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await
        .unwrap();
        (pool, AppConfig::development())
    }

    #[tokio::test]
    async fn passwordless_student_logs_in_with_anything() {
        let (pool, config) = seeded().await;
        let mut conn = pool.acquire().await.unwrap();
        let request = LoginRequest {
            username: Some("ONE007".to_string()),
            password: Some(String::new()),
            ..Default::default()
        };
        let result = authenticate(&mut conn, &request, &config.security).await.unwrap();
        assert_eq!(result.role, Role::Student);
        assert_eq!(result.user.account, "ONE007");
        assert_eq!(result.user.name.as_deref(), Some("Li"));
    }

    #[tokio::test]
    async fn login_rejections() {
        let (pool, config) = seeded().await;
        let mut conn = pool.acquire().await.unwrap();

        let empty = LoginRequest::default();
        let err = authenticate(&mut conn, &empty, &config.security).await.unwrap_err();
        assert_eq!(err.message(), "用户名不能为空");

        let teacher = LoginRequest {
            account: Some("x".to_string()),
            user_type: Some("teacher".to_string()),
            ..Default::default()
        };
        let err = authenticate(&mut conn, &teacher, &config.security).await.unwrap_err();
        assert_eq!(err.message(), "不支持的登录类型");

        let unknown = LoginRequest {
            account: Some("ONE999".to_string()),
            ..Default::default()
        };
        let err = authenticate(&mut conn, &unknown, &config.security).await.unwrap_err();
        assert_eq!((err.code(), err.message()), (400, BAD_CREDENTIALS));
    }

    #[tokio::test]
    async fn revocation_is_idempotent() {
        let (pool, _) = seeded().await;
        let mut conn = pool.acquire().await.unwrap();
        let exp = Utc::now().timestamp() + 3600;
        assert!(!is_revoked(&mut conn, "j1").await.unwrap());
        revoke(&mut conn, "j1", exp).await.unwrap();
        revoke(&mut conn, "j1", exp).await.unwrap();
        assert!(is_revoked(&mut conn, "j1").await.unwrap());
        assert_eq!(purge_expired_revocations(&mut conn).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn deleted_students_have_no_identity() {
        let (pool, _) = seeded().await;
        let mut conn = pool.acquire().await.unwrap();
        let identity = load_identity(&mut conn, AccountKind::Student, "1").await.unwrap().unwrap();
        assert_eq!(identity.account, "ONE007");

        sqlx::query("UPDATE students SET is_deleted = 1 WHERE id = 1")
            .execute(&mut *conn)
            .await
            .unwrap();
        assert!(load_identity(&mut conn, AccountKind::Student, "1").await.unwrap().is_none());
        assert!(load_identity(&mut conn, AccountKind::Admin, "nobody").await.unwrap().is_none());
    }
}
