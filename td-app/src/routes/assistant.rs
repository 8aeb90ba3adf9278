use crate::assistant::ReplySource;
use crate::assistant::settings::ConfigError;
use crate::routes::{ApiResponse, error_response, ok, rejected_body};
use crate::server::AppState;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json};
use serde::Deserialize;
use std::sync::Arc;

const EMPTY_MESSAGE: &str = "消息不能为空";

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
}

pub fn router() -> axum::Router {
    axum::Router::new()
        .route("/api/ai/config", get(get_config).put(update_config))
        .route("/api/ai/chat", post(chat))
        .route("/api/ai/test", post(test_connection))
}

#[tracing::instrument(level = "debug", skip_all)]
async fn get_config(Extension(state): Extension<Arc<AppState>>) -> ApiResponse {
    let config = state.assistant_config.read_for_client().await;
    ok(serde_json::json!(config))
}

#[tracing::instrument(level = "info", skip_all)]
async fn update_config(
    Extension(state): Extension<Arc<AppState>>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> ApiResponse {
    let partial = match body {
        Ok(Json(partial)) => partial,
        Err(rejection) => return rejected_body("update_assistant_config", rejection, "配置格式无效"),
    };
    match state.assistant_config.update_for_client(&partial).await {
        Ok(()) => ok(serde_json::json!({ "success": true })),
        Err(ConfigError::Invalid(msg)) => {
            tracing::warn!(error = %msg, "assistant config update rejected");
            error_response(StatusCode::BAD_REQUEST, &msg)
        }
        Err(e @ ConfigError::Persistence { .. }) => {
            tracing::error!(error = %e, "assistant config update not saved");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "保存配置失败")
        }
    }
}

#[tracing::instrument(level = "info", skip_all)]
async fn chat(
    Extension(state): Extension<Arc<AppState>>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResponse {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => return rejected_body("chat", rejection, EMPTY_MESSAGE),
    };
    let message = req.message.trim();
    if message.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, EMPTY_MESSAGE);
    }
    let reply = state.assistant.respond(message).await;
    let status = if reply.source == ReplySource::Error {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    (status, Json(serde_json::json!(reply)))
}

#[tracing::instrument(level = "info", skip_all)]
async fn test_connection(Extension(state): Extension<Arc<AppState>>) -> ApiResponse {
    let report = state.assistant.test_connection().await;
    ok(serde_json::json!(report))
}

#[cfg(test)]
mod tests {
    use crate::assistant::settings::REDACTED_API_KEY;
    use crate::assistant::test_support::Outcome;
    use crate::routes::test_support::test_app;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn config_get_redacts_and_put_preserves_credential() {
        let app = test_app("sk-secret", Outcome::Fail).await;

        let (status, cfg) = app.call("GET", "/api/ai/config", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cfg["assistant"]["api_key"], REDACTED_API_KEY);
        assert_eq!(cfg["assistant"]["model"], "gpt-3.5-turbo");
        assert_eq!(cfg["assistant"]["temperature"], json!(0.7));

        let mut edited = cfg.clone();
        edited["assistant"]["temperature"] = json!(0.2);
        let (status, body) = app.call("PUT", "/api/ai/config", Some(edited)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let stored = app.state.assistant_config.load().await;
        assert_eq!(stored.assistant.api_key, "sk-secret");
        assert_eq!(stored.assistant.temperature, 0.2);
        let (_, cfg) = app.call("GET", "/api/ai/config", None).await;
        assert_eq!(cfg["assistant"]["temperature"], json!(0.2));
    }

    #[tokio::test]
    async fn config_put_rejects_ill_typed_fields() {
        let app = test_app("", Outcome::Fail).await;
        let (status, body) = app
            .call("PUT", "/api/ai/config", Some(json!({ "assistant": { "max_tokens": "lots" } })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn chat_requires_message() {
        let app = test_app("", Outcome::Fail).await;
        for body in [json!({}), json!({ "message": "   " })] {
            let (status, resp) = app.call("POST", "/api/ai/chat", Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(resp["error"], "消息不能为空");
        }
    }

    #[tokio::test]
    async fn malformed_chat_bodies_get_json_errors() {
        let app = test_app("", Outcome::Fail).await;
        let bodies = [
            ("application/json", r#"{"message":123}"#),
            ("application/json", "{not json"),
            ("text/plain", "hi"),
        ];
        for (content_type, raw) in bodies {
            let (status, resp) = app
                .call_raw("POST", "/api/ai/chat", Some((content_type, raw.to_string())))
                .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body {raw:?}");
            assert_eq!(resp, json!({ "error": "消息不能为空" }), "body {raw:?}");
        }
        assert_eq!(app.remote.calls(), 0);
    }

    #[tokio::test]
    async fn malformed_config_bodies_get_json_errors() {
        let app = test_app("sk-keep", Outcome::Fail).await;
        for (content_type, raw) in [("application/json", "{oops"), ("text/plain", "x")] {
            let (status, resp) = app
                .call_raw("PUT", "/api/ai/config", Some((content_type, raw.to_string())))
                .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(resp, json!({ "error": "配置格式无效" }));
        }
        assert_eq!(app.state.assistant_config.load().await.assistant.api_key, "sk-keep");
    }

    #[tokio::test]
    async fn chat_reports_reply_source() {
        let local = test_app("", Outcome::Reply("unused".to_string())).await;
        let (status, resp) = local
            .call("POST", "/api/ai/chat", Some(json!({ "message": "帮助" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp["source"], "local");
        assert_eq!(local.remote.calls(), 0);

        let ai = test_app("sk-live", Outcome::Reply("今天有两件事".to_string())).await;
        let (_, resp) = ai
            .call("POST", "/api/ai/chat", Some(json!({ "message": "今天做什么" })))
            .await;
        assert_eq!(resp, json!({ "response": "今天有两件事", "source": "ai" }));

        let down = test_app("sk-live", Outcome::Fail).await;
        let (status, resp) = down
            .call("POST", "/api/ai/chat", Some(json!({ "message": "帮助" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp["source"], "local_fallback");
        assert!(resp["response"].as_str().is_some_and(|r| r.starts_with("我可以帮助你")));

        let broken = test_app("sk-live", Outcome::Panic).await;
        let (status, resp) = broken
            .call("POST", "/api/ai/chat", Some(json!({ "message": "hi" })))
            .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp["source"], "error");
        assert_eq!(resp["response"], "抱歉，我遇到了一些问题。请稍后再试。");
    }

    #[tokio::test]
    async fn test_endpoint_without_credential() {
        let app = test_app("", Outcome::Fail).await;
        let (status, resp) = app.call("POST", "/api/ai/test", Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp, json!({ "success": false, "error": "未配置API密钥" }));
    }
}
