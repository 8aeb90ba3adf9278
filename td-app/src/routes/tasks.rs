use crate::routes::{ApiResponse, INVALID_BODY, error_response, ok, rejected_body, store_failure};
use crate::server::AppState;
use axum::extract::{Path, Query};
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Json};
use serde::Deserialize;
use std::sync::Arc;
use td_store::{NewTask, TaskFilter, TaskPatch};

const TASK_NOT_FOUND: &str = "任务不存在";

#[derive(Debug, Deserialize)]
struct ListTasksQuery {
    #[serde(default)]
    list_id: Option<i64>,
    #[serde(default)]
    show_completed: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: Option<String>,
}

pub fn router() -> axum::Router {
    axum::Router::new()
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route(
            "/api/tasks/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/api/search", get(search_tasks))
}

#[tracing::instrument(level = "debug", skip_all)]
async fn list_tasks(
    Extension(state): Extension<Arc<AppState>>,
    Query(q): Query<ListTasksQuery>,
) -> ApiResponse {
    let filter = TaskFilter {
        list_id: q.list_id,
        show_completed: q.show_completed.unwrap_or(true),
    };
    match state.store.list_tasks(filter).await {
        Ok(tasks) => ok(serde_json::json!(tasks)),
        Err(e) => store_failure("list_tasks", e),
    }
}

#[tracing::instrument(level = "info", skip_all)]
async fn create_task(
    Extension(state): Extension<Arc<AppState>>,
    body: Result<Json<NewTask>, JsonRejection>,
) -> ApiResponse {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => return rejected_body("create_task", rejection, INVALID_BODY),
    };
    if req.title.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "任务标题不能为空");
    }
    match state.store.create_task(req).await {
        Ok(id) => ok(serde_json::json!({ "id": id, "success": true })),
        Err(e) => store_failure("create_task", e),
    }
}

#[tracing::instrument(level = "debug", skip_all, fields(task_id = id))]
async fn get_task(Extension(state): Extension<Arc<AppState>>, Path(id): Path<i64>) -> ApiResponse {
    match state.store.get_task(id).await {
        Ok(Some(task)) => ok(serde_json::json!(task)),
        Ok(None) => error_response(StatusCode::NOT_FOUND, TASK_NOT_FOUND),
        Err(e) => store_failure("get_task", e),
    }
}

#[tracing::instrument(level = "info", skip_all, fields(task_id = id))]
async fn update_task(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
    body: Result<Json<TaskPatch>, JsonRejection>,
) -> ApiResponse {
    let patch = match body {
        Ok(Json(patch)) => patch,
        Err(rejection) => return rejected_body("update_task", rejection, INVALID_BODY),
    };
    if patch.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "没有要更新的字段");
    }
    if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return error_response(StatusCode::BAD_REQUEST, "任务标题不能为空");
    }
    match state.store.update_task(id, patch).await {
        Ok(Some(_)) => ok(serde_json::json!({ "success": true })),
        Ok(None) => error_response(StatusCode::NOT_FOUND, TASK_NOT_FOUND),
        Err(e) => store_failure("update_task", e),
    }
}

#[tracing::instrument(level = "info", skip_all, fields(task_id = id))]
async fn delete_task(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResponse {
    match state.store.delete_task(id).await {
        Ok(true) => ok(serde_json::json!({ "success": true })),
        Ok(false) => error_response(StatusCode::NOT_FOUND, TASK_NOT_FOUND),
        Err(e) => store_failure("delete_task", e),
    }
}

#[tracing::instrument(level = "debug", skip_all)]
async fn search_tasks(
    Extension(state): Extension<Arc<AppState>>,
    Query(q): Query<SearchQuery>,
) -> ApiResponse {
    let Some(query) = q.q.filter(|q| !q.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "缺少搜索查询");
    };
    match state.store.search_tasks(query.trim()).await {
        Ok(hits) => ok(serde_json::json!(hits)),
        Err(e) => store_failure("search_tasks", e),
    }
}
