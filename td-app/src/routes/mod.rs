pub mod assistant;
pub mod health;
pub mod lists;
pub mod preferences;
pub mod stats;
pub mod tasks;

use axum::Json;
use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use td_store::StoreError;

pub(crate) type ApiResponse = (StatusCode, Json<serde_json::Value>);

pub(crate) const INVALID_BODY: &str = "请求格式无效";

pub fn router() -> Router {
    Router::new()
        .merge(health::router())
        .merge(lists::router())
        .merge(tasks::router())
        .merge(preferences::router())
        .merge(stats::router())
        .merge(assistant::router())
}

pub(crate) fn ok(body: serde_json::Value) -> ApiResponse {
    (StatusCode::OK, Json(body))
}

pub(crate) fn error_response(status: StatusCode, message: &str) -> ApiResponse {
    (status, Json(serde_json::json!({ "error": message })))
}

/// Malformed, mistyped or non-JSON bodies get a JSON `{error}` reply instead
/// of the extractor's plain-text rejection.
pub(crate) fn rejected_body(op: &'static str, rejection: JsonRejection, message: &str) -> ApiResponse {
    tracing::warn!(
        op,
        rejection_status = rejection.status().as_u16(),
        error = %rejection.body_text(),
        "request body rejected"
    );
    error_response(StatusCode::BAD_REQUEST, message)
}

/// Caller mistakes keep their message; storage faults are logged and hidden.
pub(crate) fn store_failure(op: &'static str, e: StoreError) -> ApiResponse {
    match e {
        StoreError::InvalidInput(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
        StoreError::NotFound(msg) => error_response(StatusCode::NOT_FOUND, &msg),
        other => {
            tracing::error!(op, error = %other, "store operation failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "服务器内部错误")
        }
    }
}
