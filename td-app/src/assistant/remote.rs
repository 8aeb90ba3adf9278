use crate::assistant::settings::AssistantSettings;
use std::time::Duration;
use td_llm::{ChatMessage, LlmClient};

/// One completion round trip against the configured model endpoint.
#[async_trait::async_trait]
pub trait RemoteResponder: Send + Sync {
    async fn complete(
        &self,
        settings: &AssistantSettings,
        messages: &[ChatMessage],
    ) -> td_llm::Result<String>;
}

/// Shares one reqwest connection pool across requests; settings are read
/// fresh per call so config edits apply without a restart.
pub struct HttpResponder {
    http: reqwest::Client,
    timeout: Duration,
}

impl HttpResponder {
    pub fn new(timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(%e, "reqwest client build failed; falling back to default client");
                reqwest::Client::new()
            });
        Self { http, timeout }
    }
}

#[async_trait::async_trait]
impl RemoteResponder for HttpResponder {
    async fn complete(
        &self,
        settings: &AssistantSettings,
        messages: &[ChatMessage],
    ) -> td_llm::Result<String> {
        let client = LlmClient::with_http(self.http.clone(), settings.client_settings(self.timeout))?;
        let resp = client.chat(messages).await?;
        Ok(resp.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::routing::post;
    use serde_json::json;
    use td_llm::LlmError;

    async fn spawn_endpoint(router: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("serve test endpoint");
        });
        format!("http://{addr}/v1")
    }

    fn settings(api_base: &str, api_key: &str) -> AssistantSettings {
        AssistantSettings {
            api_base: api_base.to_string(),
            api_key: api_key.to_string(),
            ..AssistantSettings::default()
        }
    }

    #[tokio::test]
    async fn complete_returns_reply_text_and_forwards_settings() {
        let router = axum::Router::new().route(
            "/v1/chat/completions",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["model"], "gpt-3.5-turbo");
                assert_eq!(body["max_tokens"], 500);
                assert_eq!(body["messages"][0]["role"], "system");
                Json(json!({
                    "choices": [{ "message": { "role": "assistant", "content": "已收到" }, "finish_reason": "stop" }]
                }))
            }),
        );
        let base = spawn_endpoint(router).await;
        let responder = HttpResponder::new(Duration::from_secs(5));

        let reply = responder
            .complete(
                &settings(&base, "sk-test"),
                &[ChatMessage::system("sys"), ChatMessage::user("hi")],
            )
            .await
            .expect("complete");
        assert_eq!(reply, "已收到");
    }

    #[tokio::test]
    async fn empty_credential_is_rejected_before_any_request() {
        let responder = HttpResponder::new(Duration::from_secs(5));
        let err = responder
            .complete(&settings("http://127.0.0.1:9/v1", "  "), &[ChatMessage::user("hi")])
            .await
            .expect_err("should reject");
        assert!(matches!(err, LlmError::InvalidInput(_)));
    }
}
