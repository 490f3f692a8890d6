mod common;

use anyhow::Result;
use axum::http::Method;
use serde_json::json;

use common::{TestApp, ROOT_ACCOUNT, ROOT_PASSWORD};
use school_meal_api::config::AppConfig;

#[tokio::test]
async fn admin_login_issues_token_pair() -> Result<()> {
    let app = TestApp::spawn().await?;
    let data = app.login(ROOT_ACCOUNT, ROOT_PASSWORD, "admin").await?;

    assert!(data["access_token"].is_string());
    assert!(data["refresh_token"].is_string());
    assert_eq!(data["role"], "superadmin");
    assert_eq!(data["user"]["account"], ROOT_ACCOUNT);
    Ok(())
}

#[tokio::test]
async fn bad_credentials_are_rejected_alike() -> Result<()> {
    let app = TestApp::spawn().await?;

    for (username, password) in [(ROOT_ACCOUNT, "wrong"), ("nobody", ROOT_PASSWORD)] {
        let res = app
            .request(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({"username": username, "password": password, "userType": "admin"})),
            )
            .await?;
        assert_eq!(res.code(), 400);
        assert_eq!(res.msg(), "用户名或密码错误");
        assert!(res.data().is_null());
    }
    Ok(())
}

#[tokio::test]
async fn student_logs_in_with_alias_and_number() -> Result<()> {
    let app = TestApp::spawn().await?;
    let root = app.root_token().await?;
    let school = app.create_school(&root, "Beijing No.1", "BJ").await?;
    app.create_student(&root, &school, "Li Lei", "2024001", "secret1").await?;

    let data = app.login("BJ2024001", "secret1", "student").await?;
    assert_eq!(data["role"], "student");
    assert_eq!(data["user"]["account"], "BJ2024001");

    // The alias alone leaves no student number.
    let res = app
        .request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"username": "BJ", "password": "secret1", "userType": "student"})),
        )
        .await?;
    assert_eq!(res.code(), 400);
    Ok(())
}

#[tokio::test]
async fn blank_login_fields_fall_back_to_alternates() -> Result<()> {
    let app = TestApp::spawn().await?;
    let root = app.root_token().await?;
    let school = app.create_school(&root, "Anling", "AL").await?;
    app.create_student(&root, &school, "Han Meimei", "001", "secret1").await?;

    let res = app
        .request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"username": "", "account": "AL001", "password": "secret1", "userType": ""})),
        )
        .await?;
    assert_eq!(res.code(), 0);
    assert_eq!(res.data()["role"], "student");
    assert_eq!(res.data()["user"]["account"], "AL001");

    let res = app
        .request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"username": " ", "account": ROOT_ACCOUNT, "password": ROOT_PASSWORD, "userType": "", "type": "admin"})),
        )
        .await?;
    assert_eq!(res.code(), 0);
    assert_eq!(res.data()["role"], "superadmin");
    Ok(())
}

#[tokio::test]
async fn me_reports_identity_and_requires_token() -> Result<()> {
    let app = TestApp::spawn().await?;
    let token = app.root_token().await?;

    let res = app.get("/auth/me", &token).await?;
    assert_eq!(res.code(), 0);
    assert_eq!(res.data()["identity"]["account"], ROOT_ACCOUNT);
    assert_eq!(res.data()["identity"]["role"], "superadmin");

    let res = app.request(Method::GET, "/auth/me", None, None).await?;
    assert_eq!(res.code(), 401);

    let res = app.get("/auth/me", "not-a-jwt").await?;
    assert_eq!(res.code(), 401);
    Ok(())
}

#[tokio::test]
async fn refresh_requires_a_refresh_token() -> Result<()> {
    let app = TestApp::spawn().await?;
    let data = app.login(ROOT_ACCOUNT, ROOT_PASSWORD, "admin").await?;
    let access = data["access_token"].as_str().unwrap_or_default().to_string();
    let refresh = data["refresh_token"].as_str().unwrap_or_default().to_string();

    let res = app.request(Method::POST, "/auth/refresh", Some(&refresh), None).await?;
    assert_eq!(res.code(), 0);
    assert_eq!(res.data()["role"], "superadmin");
    let fresh = res.data()["access_token"].as_str().unwrap_or_default().to_string();
    assert_eq!(app.get("/auth/me", &fresh).await?.code(), 0);

    // An access token is not accepted in place of a refresh token.
    let res = app.request(Method::POST, "/auth/refresh", Some(&access), None).await?;
    assert_eq!(res.code(), 401);
    Ok(())
}

#[tokio::test]
async fn expiring_access_token_is_renewed_in_header() -> Result<()> {
    let mut config = AppConfig::development();
    config.security.refresh_if_expires_in_minutes = 24 * 60;
    let app = TestApp::with_config(config).await?;
    let token = app.root_token().await?;

    let res = app.get("/auth/me", &token).await?;
    assert_eq!(res.code(), 0);
    let renewed = res
        .headers
        .get("x-new-access-token")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let renewed = renewed.expect("renewal header present");
    assert_ne!(renewed, token);
    assert_eq!(app.get("/auth/me", &renewed).await?.code(), 0);
    Ok(())
}

#[tokio::test]
async fn fresh_tokens_are_not_renewed() -> Result<()> {
    let app = TestApp::spawn().await?;
    let token = app.root_token().await?;
    let res = app.get("/auth/me", &token).await?;
    assert!(res.headers.get("x-new-access-token").is_none());
    Ok(())
}

#[tokio::test]
async fn logout_revokes_both_tokens() -> Result<()> {
    let app = TestApp::spawn().await?;
    let data = app.login(ROOT_ACCOUNT, ROOT_PASSWORD, "admin").await?;
    let access = data["access_token"].as_str().unwrap_or_default().to_string();
    let refresh = data["refresh_token"].as_str().unwrap_or_default().to_string();

    let res = app.post("/auth/logout", &access, json!({"refresh_token": refresh})).await?;
    assert_eq!(res.code(), 0);
    assert_eq!(res.msg(), "已退出登录");

    let res = app.get("/auth/me", &access).await?;
    assert_eq!((res.code(), res.msg()), (401, "令牌已撤销"));

    let res = app.request(Method::POST, "/auth/refresh", Some(&refresh), None).await?;
    assert_eq!(res.code(), 401);
    Ok(())
}

#[tokio::test]
async fn refresh_fails_once_account_is_deleted() -> Result<()> {
    let app = TestApp::spawn().await?;
    let root = app.root_token().await?;
    let school = app.create_school(&root, "Alpha", "AL").await?;
    let res = app
        .post(
            "/admins",
            &root,
            json!({"account": "ops", "password": "opspass", "display_name": "Ops", "school_ids": [school]}),
        )
        .await?;
    assert_eq!(res.code(), 0);
    let admin_id = res.data()["id"].as_str().unwrap_or_default().to_string();

    let data = app.login("ops", "opspass", "admin").await?;
    let refresh = data["refresh_token"].as_str().unwrap_or_default().to_string();

    assert_eq!(app.delete(&format!("/admins/{admin_id}"), &root).await?.code(), 0);

    let res = app.request(Method::POST, "/auth/refresh", Some(&refresh), None).await?;
    assert_eq!((res.code(), res.msg()), (401, "账号不存在或已被删除"));
    Ok(())
}

#[tokio::test]
async fn profile_password_change_needs_current_password() -> Result<()> {
    let app = TestApp::spawn().await?;
    let token = app.root_token().await?;

    let res = app.put("/profile", &token, json!({"name": "Root", "password": "newpass1"})).await?;
    assert_eq!(res.code(), 400);
    assert!(res.msg().contains("如需修改密码，必须提供当前密码。"));

    let res = app
        .put(
            "/profile",
            &token,
            json!({"name": "Root", "password": "newpass1", "current_password": ROOT_PASSWORD}),
        )
        .await?;
    assert_eq!((res.code(), res.msg()), (0, "个人信息更新成功"));

    app.login(ROOT_ACCOUNT, "newpass1", "admin").await?;
    Ok(())
}
