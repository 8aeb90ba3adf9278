use crate::routes::{ApiResponse, INVALID_BODY, error_response, ok, rejected_body, store_failure};
use crate::server::AppState;
use axum::extract::Path;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Extension, Json};
use std::sync::Arc;
use td_store::{NewTaskList, TaskListPatch};

pub fn router() -> axum::Router {
    axum::Router::new()
        .route("/api/task_lists", get(list_task_lists).post(create_task_list))
        .route(
            "/api/task_lists/{id}",
            put(update_task_list).delete(delete_task_list),
        )
}

#[tracing::instrument(level = "debug", skip_all)]
async fn list_task_lists(Extension(state): Extension<Arc<AppState>>) -> ApiResponse {
    match state.store.list_task_lists().await {
        Ok(lists) => ok(serde_json::json!(lists)),
        Err(e) => store_failure("list_task_lists", e),
    }
}

#[tracing::instrument(level = "info", skip_all)]
async fn create_task_list(
    Extension(state): Extension<Arc<AppState>>,
    body: Result<Json<NewTaskList>, JsonRejection>,
) -> ApiResponse {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => return rejected_body("create_task_list", rejection, INVALID_BODY),
    };
    if req.name.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "列表名称不能为空");
    }
    match state.store.create_task_list(req).await {
        Ok(id) => ok(serde_json::json!({ "id": id, "success": true })),
        Err(e) => store_failure("create_task_list", e),
    }
}

#[tracing::instrument(level = "info", skip_all, fields(list_id = id))]
async fn update_task_list(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
    body: Result<Json<TaskListPatch>, JsonRejection>,
) -> ApiResponse {
    let patch = match body {
        Ok(Json(patch)) => patch,
        Err(rejection) => return rejected_body("update_task_list", rejection, INVALID_BODY),
    };
    if patch.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "没有要更新的字段");
    }
    if patch.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return error_response(StatusCode::BAD_REQUEST, "列表名称不能为空");
    }
    match state.store.update_task_list(id, patch).await {
        Ok(true) => ok(serde_json::json!({ "success": true })),
        Ok(false) => error_response(StatusCode::NOT_FOUND, "列表不存在"),
        Err(e) => store_failure("update_task_list", e),
    }
}

#[tracing::instrument(level = "info", skip_all, fields(list_id = id))]
async fn delete_task_list(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResponse {
    match state.store.delete_task_list(id).await {
        Ok(true) => ok(serde_json::json!({ "success": true })),
        Ok(false) => error_response(StatusCode::NOT_FOUND, "列表不存在"),
        Err(e) => store_failure("delete_task_list", e),
    }
}

#[cfg(test)]
mod tests {
    use crate::assistant::test_support::Outcome;
    use crate::routes::test_support::test_app;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn list_lifecycle_over_http() {
        let app = test_app("", Outcome::Fail).await;

        let (status, body) = app
            .call("POST", "/api/task_lists", Some(json!({ "name": "工作", "icon": "💼" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        let id = body["id"].as_i64().expect("id");

        let (status, _) = app
            .call("POST", "/api/tasks", Some(json!({ "title": "周报", "list_id": id })))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (_, lists) = app.call("GET", "/api/task_lists", None).await;
        assert_eq!(lists[0]["name"], "工作");
        assert_eq!(lists[0]["icon"], "💼");
        assert_eq!(lists[0]["color"], "#0078d4");
        assert_eq!(lists[0]["total_tasks"], 1);

        let (status, _) = app
            .call("PUT", &format!("/api/task_lists/{id}"), Some(json!({ "color": "#ff0000" })))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app.call("DELETE", &format!("/api/task_lists/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, tasks) = app.call("GET", "/api/tasks", None).await;
        assert_eq!(tasks, json!([]));
    }

    #[tokio::test]
    async fn list_validation_errors() {
        let app = test_app("", Outcome::Fail).await;
        let (status, body) = app
            .call("POST", "/api/task_lists", Some(json!({ "name": "  " })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "列表名称不能为空");

        let (status, body) = app.call("PUT", "/api/task_lists/1", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "没有要更新的字段");

        let (status, _) = app.call("DELETE", "/api/task_lists/99", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
