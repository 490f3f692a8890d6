use std::borrow::Cow;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

use crate::error::{codes, ApiError};

pub const SUCCESS_MSG: &str = "成功";

/// The canonical `{success, code, msg, data}` body.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    pub code: u16,
    pub msg: Cow<'static, str>,
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T, msg: impl Into<Cow<'static, str>>) -> Self {
        Self {
            success: true,
            code: codes::OK,
            msg: msg.into(),
            data,
        }
    }
}

/// Handler result wrapped in the success envelope.
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub msg: Cow<'static, str>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            data,
            msg: Cow::Borrowed(SUCCESS_MSG),
        }
    }

    /// Success with a custom message, e.g. `已删除`.
    pub fn with_msg(data: T, msg: impl Into<Cow<'static, str>>) -> Self {
        Self {
            data,
            msg: msg.into(),
        }
    }
}

impl ApiResponse<()> {
    /// Success with `data: null`.
    pub fn message(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::with_msg((), msg)
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match serde_json::to_value(&self.data) {
            Ok(data) => (StatusCode::OK, Json(Envelope::ok(data, self.msg))).into_response(),
            Err(e) => {
                tracing::error!("Failed to serialize response data: {}", e);
                ApiError::server_error(e).into_response()
            }
        }
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, ApiError>;
