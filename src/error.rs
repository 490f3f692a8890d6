// HTTP API error types
use std::collections::BTreeMap;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::auth::AuthError;
use crate::database::DatabaseError;

/// Business codes carried inside the envelope. The transport status stays 200.
pub mod codes {
    pub const OK: u16 = 0;
    pub const BAD_REQUEST: u16 = 400;
    pub const UNAUTHORIZED: u16 = 401;
    pub const FORBIDDEN: u16 = 403;
    pub const NOT_FOUND: u16 = 404;
    pub const CONFLICT: u16 = 409;
    pub const SERVER_ERROR: u16 = 500;
}

/// Every failure a handler can report, with a client-safe message.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    /// Field-level failures. Rendered with an `errors` map that the response
    /// unifier folds into `msg`.
    #[error("{message}")]
    ValidationError {
        message: String,
        field_errors: BTreeMap<String, Vec<String>>,
    },

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InternalServerError(String),
}

impl ApiError {
    pub fn code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) | ApiError::ValidationError { .. } => codes::BAD_REQUEST,
            ApiError::Unauthorized(_) => codes::UNAUTHORIZED,
            ApiError::Forbidden(_) => codes::FORBIDDEN,
            ApiError::NotFound(_) => codes::NOT_FOUND,
            ApiError::Conflict(_) => codes::CONFLICT,
            ApiError::InternalServerError(_) => codes::SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::InternalServerError(msg) => msg,
            ApiError::ValidationError { message, .. } => message,
        }
    }

    /// The failure envelope.
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "success": false,
            "code": self.code(),
            "msg": self.message(),
            "data": null,
        });

        if let ApiError::ValidationError { field_errors, .. } = self {
            if !field_errors.is_empty() {
                body["errors"] = json!(field_errors);
            }
        }

        body
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(
        message: impl Into<String>,
        field_errors: BTreeMap<String, Vec<String>>,
    ) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    /// The generic server error, `服务器错误: <detail>`.
    pub fn server_error(detail: impl std::fmt::Display) -> Self {
        ApiError::InternalServerError(format!("服务器错误: {detail}"))
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::UniqueViolation(msg) => {
                tracing::warn!("Unique index rejected write: {}", msg);
                ApiError::conflict("数据已存在")
            }
            DatabaseError::InvalidDatabaseUrl(url) => {
                tracing::error!("Invalid database URL: {}", url);
                ApiError::server_error("数据库配置错误")
            }
            DatabaseError::MigrationError(msg) => {
                tracing::error!("Migration error: {}", msg);
                ApiError::server_error("数据库迁移失败")
            }
            DatabaseError::Sqlx(sqlx_err) => {
                // Log the real error but return a generic message
                tracing::error!("SQLx error: {}", sqlx_err);
                ApiError::server_error("数据库错误")
            }
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        DatabaseError::from(err).into()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken(reason) => ApiError::unauthorized(format!("未携带令牌: {reason}")),
            AuthError::Expired => ApiError::unauthorized("令牌已过期"),
            AuthError::Revoked => ApiError::unauthorized("令牌已撤销"),
            AuthError::InvalidToken(reason) => ApiError::unauthorized(format!("无效令牌: {reason}")),
            AuthError::MissingSecret | AuthError::Encoding(_) | AuthError::Hashing(_) => {
                tracing::error!("Token or password primitive failed: {}", err);
                ApiError::server_error(err)
            }
        }
    }
}

// Failures keep transport status 200; the business code lives in the body.
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (StatusCode::OK, Json(self.to_json())).into_response()
    }
}
