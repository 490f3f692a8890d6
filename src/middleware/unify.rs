//! Response unification.
//!
//! Every response leaving the router is rewritten into the
//! `{success, code, msg, data}` envelope unless its path is under a skipped
//! prefix, its route opted out with [`skip_envelope`], or its body is
//! streamed. The transport status is never touched, only the body.

use axum::{
    body::{Body, Bytes, HttpBody},
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::{json, Map, Value};
use tracing::error;

use super::response::SUCCESS_MSG;
use crate::error::ApiError;
use crate::AppState;

/// Paths whose responses are never rewritten.
pub const SKIPPED_PREFIXES: [&str; 4] = ["/static", "/swagger", "/docs", "/favicon.ico"];

/// Marker placed on a response by [`skip_envelope`].
#[derive(Debug, Clone, Copy)]
pub struct RawResponse;

/// Route layer that opts a route out of unification.
pub async fn skip_envelope(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.extensions_mut().insert(RawResponse);
    response
}

#[derive(Debug, PartialEq)]
pub enum Unified {
    Unchanged,
    /// Replacement body; `json` asks for the content type to become JSON.
    Replace { body: Vec<u8>, json: bool },
}

fn success_envelope(data: Value) -> Value {
    json!({"success": true, "code": 0, "msg": SUCCESS_MSG, "data": data})
}

fn is_envelope(object: &Map<String, Value>) -> bool {
    ["success", "code", "msg", "data"].iter().all(|key| object.contains_key(*key))
}

/// Every message string under a field's error entry: a string, a list of
/// strings, or a nested object of those.
fn collect_messages(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|item| collect_messages(item, out)),
        Value::Object(map) => map.values().for_each(|item| collect_messages(item, out)),
        Value::Null => {}
        other => out.push(other.to_string()),
    }
}

/// Fold `errors` into `msg`: each field's messages are comma-joined and
/// appended to `msg` with a comma, in field name order.
fn fold_errors(object: &mut Map<String, Value>) -> bool {
    let Some(errors) = object.remove("errors") else {
        return false;
    };

    let mut msg = match object.get("msg") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    let mut fields: Vec<(&String, &Value)> = match &errors {
        Value::Object(map) => map.iter().collect(),
        _ => Vec::new(),
    };
    fields.sort_by(|a, b| a.0.cmp(b.0));

    for (_, messages) in fields {
        let mut collected = Vec::new();
        collect_messages(messages, &mut collected);
        if !msg.is_empty() {
            msg.push(',');
        }
        msg.push_str(&collected.join(","));
    }

    object.insert("msg".to_string(), Value::String(msg));
    true
}

fn text_of(value: Option<&Value>, default: &str) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => default.to_string(),
    }
}

fn unify_json(body: &[u8]) -> Unified {
    let parsed: Value = if body.is_empty() {
        Value::Object(Map::new())
    } else {
        match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(_) => return Unified::Unchanged,
        }
    };

    let rewritten = match parsed {
        Value::Object(mut object) => {
            let folded = fold_errors(&mut object);

            if is_envelope(&object) {
                if !folded {
                    return Unified::Unchanged;
                }
                Value::Object(object)
            } else if object.contains_key("status")
                && (object.contains_key("error") || object.contains_key("message"))
            {
                let code = object.get("status").cloned().unwrap_or(Value::from(400));
                let msg = format!(
                    "{}:{}",
                    text_of(object.get("error"), "error"),
                    text_of(object.get("message"), "")
                );
                json!({"success": false, "code": code, "msg": msg, "data": null})
            } else {
                success_envelope(Value::Object(object))
            }
        }
        other => success_envelope(other),
    };

    match serde_json::to_vec(&rewritten) {
        Ok(body) => Unified::Replace { body, json: false },
        Err(_) => Unified::Unchanged,
    }
}

/// Decide how a body with the given content type is rewritten.
///
/// `content_type` is the media type without parameters, lowercased.
pub fn unify(content_type: &str, body: &[u8]) -> Unified {
    if body.is_empty() && matches!(content_type, "" | "text/plain" | "application/octet-stream") {
        return match serde_json::to_vec(&success_envelope(Value::Null)) {
            Ok(body) => Unified::Replace { body, json: true },
            Err(_) => Unified::Unchanged,
        };
    }

    if content_type == "application/json" {
        return unify_json(body);
    }

    if content_type.starts_with("text/") && !matches!(content_type, "text/csv" | "text/html" | "text/xml") {
        let text = String::from_utf8_lossy(body).into_owned();
        return match serde_json::to_vec(&success_envelope(Value::String(text))) {
            Ok(body) => Unified::Replace { body, json: true },
            Err(_) => Unified::Unchanged,
        };
    }

    Unified::Unchanged
}

fn media_type(value: Option<&HeaderValue>) -> String {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Router-wide middleware applying [`unify`] to every eligible response.
pub async fn unify_response(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let skipped = SKIPPED_PREFIXES
        .iter()
        .any(|prefix| request.uri().path().starts_with(prefix));

    let response = next.run(request).await;
    if skipped || response.extensions().get::<RawResponse>().is_some() {
        return response;
    }

    let (mut parts, body) = response.into_parts();

    // Streamed bodies and bodies over the buffering limit pass through.
    let limit = state.config.api.max_body_bytes;
    match body.size_hint().exact() {
        Some(len) if len <= limit as u64 => {}
        _ => return Response::from_parts(parts, body),
    }

    let bytes: Bytes = match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to buffer response body: {}", e);
            return ApiError::server_error(e).into_response();
        }
    };

    let content_type = media_type(parts.headers.get(header::CONTENT_TYPE));
    match unify(&content_type, &bytes) {
        Unified::Unchanged => Response::from_parts(parts, Body::from(bytes)),
        Unified::Replace { body, json } => {
            parts.headers.remove(header::CONTENT_LENGTH);
            if json {
                parts.headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
            }
            Response::from_parts(parts, Body::from(body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replaced(unified: Unified) -> Value {
        match unified {
            Unified::Replace { body, .. } => serde_json::from_slice(&body).unwrap(),
            Unified::Unchanged => panic!("expected a rewrite"),
        }
    }

    #[test]
    fn empty_body_becomes_success_null() {
        for content_type in ["", "text/plain", "application/octet-stream"] {
            let unified = unify(content_type, b"");
            assert!(matches!(unified, Unified::Replace { json: true, .. }));
            assert_eq!(
                replaced(unified),
                json!({"success": true, "code": 0, "msg": "成功", "data": null})
            );
        }
    }

    #[test]
    fn plain_json_is_wrapped() {
        assert_eq!(
            replaced(unify("application/json", br#"{"id":1}"#)),
            json!({"success": true, "code": 0, "msg": "成功", "data": {"id": 1}})
        );
        assert_eq!(
            replaced(unify("application/json", b"[1,2]")),
            json!({"success": true, "code": 0, "msg": "成功", "data": [1, 2]})
        );
    }

    #[test]
    fn envelope_passes_through_untouched() {
        let body = br#"{"success":false,"code":409,"msg":"x","data":null}"#;
        assert_eq!(unify("application/json", body), Unified::Unchanged);
    }

    #[test]
    fn unparsable_json_is_left_alone() {
        assert_eq!(unify("application/json", b"{not json"), Unified::Unchanged);
    }

    #[test]
    fn empty_json_body_wraps_empty_object() {
        assert_eq!(replaced(unify("application/json", b""))["data"], json!({}));
    }

    #[test]
    fn validation_errors_fold_into_msg() {
        let body = json!({
            "success": false, "code": 400, "msg": "参数校验失败", "data": null,
            "errors": {"name": ["姓名不能为空"], "alias": ["别名为必填项", "太短"]}
        });
        let out = replaced(unify("application/json", &serde_json::to_vec(&body).unwrap()));
        assert_eq!(out["msg"], "参数校验失败,别名为必填项,太短,姓名不能为空");
        assert!(out.get("errors").is_none());
        assert_eq!(out["success"], false);
        assert_eq!(out["code"], 400);
    }

    #[test]
    fn errors_without_msg_have_no_leading_comma() {
        let body = br#"{"errors":{"a":["x"],"b":["y"]}}"#;
        let out = replaced(unify("application/json", body));
        assert_eq!(out["data"], json!({"msg": "x,y"}));
    }

    #[test]
    fn framework_error_pages_become_failures() {
        let out = replaced(unify(
            "application/json",
            br#"{"status":405,"error":"Method Not Allowed","message":"nope"}"#,
        ));
        assert_eq!(
            out,
            json!({"success": false, "code": 405, "msg": "Method Not Allowed:nope", "data": null})
        );

        let out = replaced(unify("application/json", br#"{"status":500,"message":"boom"}"#));
        assert_eq!(out["msg"], "error:boom");
    }

    #[test]
    fn text_is_wrapped_as_json() {
        let unified = unify("text/plain", "请假已取消".as_bytes());
        assert!(matches!(unified, Unified::Replace { json: true, .. }));
        assert_eq!(replaced(unified)["data"], "请假已取消");
    }

    #[test]
    fn other_content_passes_through() {
        assert_eq!(unify("text/csv", b"a,b"), Unified::Unchanged);
        assert_eq!(unify("text/html", b"<p>hi</p>"), Unified::Unchanged);
        assert_eq!(unify("image/png", b"\x89PNG"), Unified::Unchanged);
        assert_eq!(unify("application/octet-stream", b"\x00\x01"), Unified::Unchanged);
    }

    #[test]
    fn media_type_drops_parameters() {
        let value = HeaderValue::from_static("Text/Plain; charset=utf-8");
        assert_eq!(media_type(Some(&value)), "text/plain");
        assert_eq!(media_type(None), "");
    }
}
