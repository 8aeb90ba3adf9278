use crate::client::ClientSettings;
use crate::error::{LlmError, Result};
use crate::types::{ChatMessage, ChatResponse, Role, Usage};
use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
    timeout: std::time::Duration,
}

impl OpenAiClient {
    pub fn new(http: reqwest::Client, settings: &ClientSettings) -> Self {
        Self {
            http,
            url: chat_completions_url(&settings.api_base),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            timeout: settings.timeout,
        }
    }

    #[tracing::instrument(level = "info", skip_all, fields(model = %self.model))]
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<ChatResponse> {
        let req = OpenAiChatRequest::new(&self.model, messages, self.max_tokens, self.temperature);

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&req)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OpenAiChatResponse = serde_json::from_str(&body)?;
        parsed.try_into()
    }
}

pub(crate) fn chat_completions_url(api_base: &str) -> String {
    format!("{}/chat/completions", api_base.trim().trim_end_matches('/'))
}

#[derive(Debug, Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    max_tokens: u32,
    temperature: f64,
}

impl OpenAiChatRequest {
    fn new(model: &str, messages: &[ChatMessage], max_tokens: u32, temperature: f64) -> Self {
        Self {
            model: model.to_string(),
            messages: messages.iter().map(to_openai_message).collect(),
            max_tokens,
            temperature,
        }
    }
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: &'static str,
    content: String,
}

fn to_openai_message(m: &ChatMessage) -> OpenAiMessage {
    let role = match m.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    OpenAiMessage {
        role,
        content: m.content.clone(),
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl TryFrom<OpenAiChatResponse> for ChatResponse {
    type Error = LlmError;

    fn try_from(v: OpenAiChatResponse) -> Result<Self> {
        let choice = v.choices.into_iter().next().ok_or_else(|| {
            LlmError::ResponseFormat("chat completion response missing choices".to_string())
        })?;

        // An empty completion is as useless to the caller as a missing one.
        let content = choice
            .message
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                LlmError::ResponseFormat("first choice has no message content".to_string())
            })?;

        Ok(ChatResponse {
            content,
            usage: v.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            }),
            finish_reason: choice
                .finish_reason
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_carries_model_messages_and_generation_params() {
        let messages = vec![ChatMessage::system("be brief"), ChatMessage::user("hi")];
        let req = OpenAiChatRequest::new("gpt-3.5-turbo", &messages, 500, 0.7);
        let v = serde_json::to_value(&req).expect("serialize request");

        assert_eq!(v["model"], "gpt-3.5-turbo");
        assert_eq!(v["max_tokens"], 500);
        assert_eq!(v["temperature"], 0.7);
        assert_eq!(
            v["messages"],
            json!([
                { "role": "system", "content": "be brief" },
                { "role": "user", "content": "hi" }
            ])
        );
    }

    #[test]
    fn first_choice_content_is_extracted() {
        let parsed: OpenAiChatResponse = serde_json::from_value(json!({
            "choices": [
                { "message": { "role": "assistant", "content": "first" }, "finish_reason": "stop" },
                { "message": { "role": "assistant", "content": "second" } }
            ],
            "usage": { "prompt_tokens": 12, "completion_tokens": 3 }
        }))
        .expect("parse response");

        let resp = ChatResponse::try_from(parsed).expect("convert response");
        assert_eq!(resp.content, "first");
        assert_eq!(resp.finish_reason, "stop");
        assert_eq!(resp.usage.map(|u| u.prompt_tokens), Some(12));
    }

    #[test]
    fn missing_choices_or_content_is_a_format_error() {
        let no_choices: OpenAiChatResponse =
            serde_json::from_value(json!({ "choices": [] })).expect("parse response");
        assert!(matches!(
            ChatResponse::try_from(no_choices),
            Err(LlmError::ResponseFormat(_))
        ));

        let null_content: OpenAiChatResponse = serde_json::from_value(json!({
            "choices": [{ "message": { "content": null } }]
        }))
        .expect("parse response");
        assert!(matches!(
            ChatResponse::try_from(null_content),
            Err(LlmError::ResponseFormat(_))
        ));
    }

    #[test]
    fn completions_url_tolerates_trailing_slash() {
        assert_eq!(
            chat_completions_url("https://api.openai.com/v1/"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            chat_completions_url("http://127.0.0.1:8080/v1"),
            "http://127.0.0.1:8080/v1/chat/completions"
        );
    }
}
