//! Assistant pipeline: pick the remote model when a credential is configured,
//! otherwise (or on any remote failure) answer with keyword-driven local replies.

pub mod context;
pub mod local;
pub mod remote;
pub mod settings;

use crate::assistant::context::build_task_context;
use crate::assistant::local::LocalResponder;
use crate::assistant::remote::RemoteResponder;
use crate::assistant::settings::AssistantConfigStore;
use chrono::Timelike;
use futures_util::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use td_llm::ChatMessage;
use td_store::TaskStore;

pub const ERROR_REPLY: &str = "抱歉，我遇到了一些问题。请稍后再试。";
const CONTEXT_HEADER: &str = "\n\n当前任务数据：\n";
const TEST_SYSTEM_PROMPT: &str = "你是一个AI助手。";
const TEST_USER_MESSAGE: &str = "你好，这是一个连接测试。";
const NO_CREDENTIAL: &str = "未配置API密钥";
const TEST_CALL_FAILED: &str = "API调用失败";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySource {
    Local,
    Ai,
    LocalFallback,
    Error,
}

impl ReplySource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Ai => "ai",
            Self::LocalFallback => "local_fallback",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub source: ReplySource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectivityReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ReplySource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ConnectivityReport {
    fn failed(error: &str, reason: Option<String>) -> Self {
        Self {
            success: false,
            response: None,
            source: None,
            error: Some(error.to_string()),
            reason,
        }
    }
}

pub struct Assistant {
    config: Arc<AssistantConfigStore>,
    store: TaskStore,
    local: LocalResponder,
    remote: Arc<dyn RemoteResponder>,
}

impl Assistant {
    pub fn new(
        config: Arc<AssistantConfigStore>,
        store: TaskStore,
        remote: Arc<dyn RemoteResponder>,
    ) -> Self {
        Self {
            config,
            local: LocalResponder::new(store.clone()),
            store,
            remote,
        }
    }

    pub async fn respond(&self, message: &str) -> ChatReply {
        self.respond_at(message, chrono::Local::now().hour()).await
    }

    /// Never fails: a fault anywhere in the pipeline becomes [`ERROR_REPLY`].
    #[tracing::instrument(level = "info", skip_all, fields(message_len = message.len()))]
    pub async fn respond_at(&self, message: &str, hour: u32) -> ChatReply {
        let started = Instant::now();
        let reply = match AssertUnwindSafe(self.pipeline(message, hour))
            .catch_unwind()
            .await
        {
            Ok(reply) => reply,
            Err(_) => {
                tracing::error!("assistant pipeline panicked");
                ChatReply {
                    response: ERROR_REPLY.to_string(),
                    source: ReplySource::Error,
                }
            }
        };
        tracing::info!(
            source = reply.source.as_str(),
            latency_ms = started.elapsed().as_millis() as u64,
            "assistant reply ready"
        );
        reply
    }

    async fn pipeline(&self, message: &str, hour: u32) -> ChatReply {
        let config = self.config.load().await;
        let settings = &config.assistant;
        if !settings.has_credential() {
            return ChatReply {
                response: self.local.reply(message, hour).await,
                source: ReplySource::Local,
            };
        }

        let context = build_task_context(&self.store).await;
        let messages = [
            ChatMessage::system(format!("{}{CONTEXT_HEADER}{context}", settings.system_prompt)),
            ChatMessage::user(message),
        ];
        match self.remote.complete(settings, &messages).await {
            Ok(text) => ChatReply {
                response: text,
                source: ReplySource::Ai,
            },
            Err(e) => {
                tracing::warn!(failure = e.kind(), error = %e, "remote model unavailable; using local reply");
                ChatReply {
                    response: self.local.reply(message, hour).await,
                    source: ReplySource::LocalFallback,
                }
            }
        }
    }

    /// Single connectivity call with a fixed prompt. No local fallback.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn test_connection(&self) -> ConnectivityReport {
        let config = self.config.load().await;
        if !config.assistant.has_credential() {
            return ConnectivityReport::failed(NO_CREDENTIAL, None);
        }
        let messages = [
            ChatMessage::system(TEST_SYSTEM_PROMPT),
            ChatMessage::user(TEST_USER_MESSAGE),
        ];
        match self.remote.complete(&config.assistant, &messages).await {
            Ok(text) => ConnectivityReport {
                success: true,
                response: Some(text),
                source: Some(ReplySource::Ai),
                error: None,
                reason: None,
            },
            Err(e) => {
                tracing::warn!(failure = e.kind(), error = %e, "connectivity test failed");
                ConnectivityReport::failed(TEST_CALL_FAILED, Some(e.kind().to_string()))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::assistant::settings::{AssistantConfig, AssistantSettings};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use td_llm::LlmError;

    pub enum Outcome {
        Reply(String),
        Fail,
        Panic,
    }

    /// Records every call and answers with a canned outcome.
    pub struct FakeRemote {
        outcome: Outcome,
        calls: AtomicUsize,
        pub last_messages: Mutex<Vec<ChatMessage>>,
    }

    impl FakeRemote {
        pub fn new(outcome: Outcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                calls: AtomicUsize::new(0),
                last_messages: Mutex::new(Vec::new()),
            })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl RemoteResponder for FakeRemote {
        async fn complete(
            &self,
            _settings: &AssistantSettings,
            messages: &[ChatMessage],
        ) -> td_llm::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_messages.lock().expect("lock") = messages.to_vec();
            match &self.outcome {
                Outcome::Reply(text) => Ok(text.clone()),
                Outcome::Fail => Err(LlmError::Status {
                    status: 503,
                    body: "overloaded".to_string(),
                }),
                Outcome::Panic => panic!("remote exploded"),
            }
        }
    }

    pub async fn config_store(dir: &std::path::Path, api_key: &str) -> Arc<AssistantConfigStore> {
        let store = AssistantConfigStore::new(dir.join("ai_config.json"));
        let mut cfg = AssistantConfig::default();
        cfg.assistant.api_key = api_key.to_string();
        store.save(&cfg).await.expect("save assistant config");
        Arc::new(store)
    }
}
