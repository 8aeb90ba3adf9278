use crate::error::{LlmError, Result};
use crate::openai::OpenAiClient;
use crate::types::{ChatMessage, ChatResponse};
use std::time::{Duration, Instant};

/// Upper bound for a single completion round trip.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout: Duration,
}

#[derive(Clone)]
pub struct LlmClient {
    settings: ClientSettings,
    client: reqwest::Client,
}

impl LlmClient {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(settings: ClientSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(%e, "reqwest client build failed; falling back to default client");
                reqwest::Client::new()
            });
        Self::with_http(client, settings)
    }

    /// Reuses an existing connection pool. The per-request timeout still comes
    /// from `settings.timeout`.
    pub fn with_http(client: reqwest::Client, settings: ClientSettings) -> Result<Self> {
        validate_settings(&settings)?;
        Ok(Self { settings, client })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    #[tracing::instrument(level = "info", skip_all)]
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<ChatResponse> {
        if messages.is_empty() {
            return Err(LlmError::InvalidInput(
                "at least one chat message is required".to_string(),
            ));
        }
        let started = Instant::now();
        let c = OpenAiClient::new(self.client.clone(), &self.settings);
        let result = c.chat(messages).await;
        match &result {
            Ok(resp) => tracing::info!(
                model = %self.settings.model,
                latency_ms = started.elapsed().as_millis() as u64,
                content_len = resp.content.len(),
                finish_reason = %resp.finish_reason,
                "chat completion succeeded"
            ),
            Err(e) => tracing::warn!(
                model = %self.settings.model,
                latency_ms = started.elapsed().as_millis() as u64,
                failure = e.kind(),
                error = %e,
                "chat completion failed"
            ),
        }
        result
    }
}

fn validate_settings(settings: &ClientSettings) -> Result<()> {
    if settings.api_key.trim().is_empty() {
        return Err(LlmError::InvalidInput("api_key is required".to_string()));
    }
    let base = settings.api_base.trim();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(LlmError::InvalidInput(format!(
            "api_base must be an http(s) url, got {base:?}"
        )));
    }
    if settings.model.trim().is_empty() {
        return Err(LlmError::InvalidInput("model is required".to_string()));
    }
    if settings.timeout.is_zero() {
        return Err(LlmError::InvalidInput("timeout must be > 0".to_string()));
    }
    Ok(())
}
