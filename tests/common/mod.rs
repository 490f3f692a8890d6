#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request},
    Router,
};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower::ServiceExt;

use school_meal_api::config::AppConfig;
use school_meal_api::database::DatabaseManager;
use school_meal_api::services::admin_service;
use school_meal_api::{app, AppState};

pub const ROOT_ACCOUNT: &str = "root";
pub const ROOT_PASSWORD: &str = "rootpass";

/// The whole router over a private in-memory database, seeded with one
/// super-admin.
pub struct TestApp {
    pub router: Router,
    pub pool: SqlitePool,
}

pub struct TestResponse {
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn code(&self) -> i64 {
        self.body["code"].as_i64().unwrap_or(-1)
    }

    pub fn msg(&self) -> &str {
        self.body["msg"].as_str().unwrap_or_default()
    }

    pub fn data(&self) -> &Value {
        &self.body["data"]
    }
}

impl TestApp {
    pub async fn spawn() -> Result<Self> {
        Self::with_config(AppConfig::development()).await
    }

    pub async fn with_config(config: AppConfig) -> Result<Self> {
        let pool = DatabaseManager::connect_in_memory().await?;
        DatabaseManager::migrate(&pool).await?;

        {
            let mut conn = pool.acquire().await?;
            admin_service::create_super(&mut conn, ROOT_ACCOUNT, ROOT_PASSWORD, Some("Root"))
                .await
                .map_err(|e| anyhow::anyhow!("seeding super-admin failed: {}", e.message()))?;
        }

        let router = app(AppState::new(pool.clone(), config));
        Ok(Self { router, pool })
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<TestResponse> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.router.clone().oneshot(request).await?;
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).context("response body is not JSON")?
        };
        Ok(TestResponse { headers, body })
    }

    pub async fn get(&self, uri: &str, token: &str) -> Result<TestResponse> {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> Result<TestResponse> {
        self.request(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> Result<TestResponse> {
        self.request(Method::PUT, uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> Result<TestResponse> {
        self.request(Method::DELETE, uri, Some(token), None).await
    }

    /// Log in and return the full login payload.
    pub async fn login(&self, username: &str, password: &str, user_type: &str) -> Result<Value> {
        let res = self
            .request(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({"username": username, "password": password, "userType": user_type})),
            )
            .await?;
        anyhow::ensure!(res.code() == 0, "login as {} failed: {}", username, res.body);
        Ok(res.data().clone())
    }

    pub async fn access_token(&self, username: &str, password: &str, user_type: &str) -> Result<String> {
        let data = self.login(username, password, user_type).await?;
        data["access_token"]
            .as_str()
            .map(str::to_string)
            .context("login response has no access_token")
    }

    pub async fn root_token(&self) -> Result<String> {
        self.access_token(ROOT_ACCOUNT, ROOT_PASSWORD, "admin").await
    }

    pub async fn create_school(&self, token: &str, name: &str, alias: &str) -> Result<String> {
        let res = self.post("/schools", token, json!({"name": name, "alias": alias})).await?;
        anyhow::ensure!(res.code() == 0, "create school failed: {}", res.body);
        res.data()["id"].as_str().map(str::to_string).context("school has no id")
    }

    pub async fn create_student(
        &self,
        token: &str,
        school_id: &str,
        name: &str,
        number: &str,
        password: &str,
    ) -> Result<i64> {
        let res = self
            .post(
                "/students",
                token,
                json!({"name": name, "student_number": number, "password": password, "school_id": school_id}),
            )
            .await?;
        anyhow::ensure!(res.code() == 0, "create student failed: {}", res.body);
        res.data()["id"].as_i64().context("student has no id")
    }

    pub async fn create_category(&self, token: &str, name: &str) -> Result<i64> {
        let res = self.post("/evaluations/categories", token, json!({"name": name})).await?;
        anyhow::ensure!(res.code() == 0, "create category failed: {}", res.body);
        res.data()["id"].as_i64().context("category has no id")
    }
}
