mod common;

use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::TestApp;

#[tokio::test]
async fn ping_is_not_wrapped() -> Result<()> {
    let app = TestApp::spawn().await?;
    let res = app.request(Method::GET, "/ping", None, None).await?;
    assert_eq!(res.body, json!({"pong": true, "database": "ok"}));
    Ok(())
}

#[tokio::test]
async fn unknown_path_answers_with_failure_envelope() -> Result<()> {
    let app = TestApp::spawn().await?;
    let res = app.request(Method::GET, "/nowhere", None, None).await?;
    assert_eq!(
        res.body,
        json!({"success": false, "code": 404, "msg": "接口不存在", "data": null})
    );
    Ok(())
}

#[tokio::test]
async fn failures_keep_transport_status_ok() -> Result<()> {
    let app = TestApp::spawn().await?;
    let request = Request::builder().uri("/schools").body(Body::empty())?;
    let response = app.router.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await?)?;
    assert_eq!(body["code"], 401);
    assert_eq!(body["success"], false);
    Ok(())
}

#[tokio::test]
async fn validation_errors_are_folded_into_msg() -> Result<()> {
    let app = TestApp::spawn().await?;
    let token = app.root_token().await?;

    let res = app.post("/schools", &token, json!({})).await?;
    assert_eq!(res.code(), 400);
    assert_eq!(res.msg(), "参数校验失败,别名为必填项,学校名称为必填项");
    assert!(res.body.get("errors").is_none());
    Ok(())
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() -> Result<()> {
    let app = TestApp::spawn().await?;
    let token = app.root_token().await?;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/schools")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))?;
    let response = app.router.clone().oneshot(request).await?;
    let body: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await?)?;
    assert_eq!(body["code"], 400);
    assert!(body["msg"].as_str().unwrap_or_default().starts_with("请求体必须为 JSON"));
    Ok(())
}

#[tokio::test]
async fn invalid_path_parameter_is_a_bad_request() -> Result<()> {
    let app = TestApp::spawn().await?;
    let token = app.root_token().await?;
    let res = app.get("/evaluations/abc", &token).await?;
    assert_eq!(res.code(), 400);
    assert!(res.msg().starts_with("路径参数无效"));
    Ok(())
}

#[tokio::test]
async fn success_carries_custom_message() -> Result<()> {
    let app = TestApp::spawn().await?;
    let token = app.root_token().await?;
    let id = app.create_school(&token, "Alpha", "AL").await?;

    let res = app.delete(&format!("/schools/{id}"), &token).await?;
    assert_eq!(
        res.body,
        json!({"success": true, "code": 0, "msg": "已删除", "data": {"id": id}})
    );
    Ok(())
}
