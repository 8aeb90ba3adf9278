use crate::routes::{ApiResponse, INVALID_BODY, error_response, ok, rejected_body, store_failure};
use crate::server::AppState;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Json};
use std::sync::Arc;
use td_store::{PreferencesPatch, StoreError};

pub fn router() -> axum::Router {
    axum::Router::new().route(
        "/api/user_preferences",
        get(get_preferences).put(update_preferences),
    )
}

#[tracing::instrument(level = "debug", skip_all)]
async fn get_preferences(Extension(state): Extension<Arc<AppState>>) -> ApiResponse {
    match state.store.get_preferences().await {
        Ok(prefs) => ok(serde_json::json!(prefs)),
        Err(StoreError::NotFound(_)) => error_response(StatusCode::NOT_FOUND, "用户偏好不存在"),
        Err(e) => store_failure("get_preferences", e),
    }
}

#[tracing::instrument(level = "info", skip_all)]
async fn update_preferences(
    Extension(state): Extension<Arc<AppState>>,
    body: Result<Json<PreferencesPatch>, JsonRejection>,
) -> ApiResponse {
    let patch = match body {
        Ok(Json(patch)) => patch,
        Err(rejection) => return rejected_body("update_preferences", rejection, INVALID_BODY),
    };
    if patch.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "没有要更新的字段");
    }
    match state.store.update_preferences(patch).await {
        Ok(_) => ok(serde_json::json!({ "success": true })),
        Err(e) => store_failure("update_preferences", e),
    }
}

#[cfg(test)]
mod tests {
    use crate::assistant::test_support::Outcome;
    use crate::routes::test_support::test_app;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn preferences_round_trip_through_http() {
        let app = test_app("", Outcome::Fail).await;

        let (status, prefs) = app.call("GET", "/api/user_preferences", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(prefs["theme"], "light");
        assert_eq!(prefs["default_list_id"], serde_json::Value::Null);

        let (status, body) = app
            .call("PUT", "/api/user_preferences", Some(json!({ "theme": "dark", "view_mode": "grid" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (_, prefs) = app.call("GET", "/api/user_preferences", None).await;
        assert_eq!(prefs["theme"], "dark");
        assert_eq!(prefs["view_mode"], "grid");
        assert_eq!(prefs["language"], "zh-CN");

        let (status, body) = app.call("PUT", "/api/user_preferences", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "没有要更新的字段");
    }
}
