//! Assistant settings document, persisted as a JSON side file.
//!
//! The credential never leaves the process in clear text: client reads see
//! [`REDACTED_API_KEY`], and a client writing that sentinel back keeps the
//! stored credential.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use td_llm::ClientSettings;
use thiserror::Error;
use tokio::sync::Mutex;

pub const REDACTED_API_KEY: &str = "***";

const CLIENT_BLOCKS: [&str; 3] = ["assistant", "features", "ui"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid assistant config: {0}")]
    Invalid(String),

    #[error("failed to persist assistant config {path}: {message}")]
    Persistence { path: String, message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default)]
    pub assistant: AssistantSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<Map<String, Value>>,
    /// Top-level keys other than the three blocks are kept as stored; client
    /// updates never touch them.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantSettings {
    pub name: String,
    pub model: String,
    pub provider: String,
    pub api_key: String,
    pub api_base: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub system_prompt: String,
    pub welcome_message: String,
    pub typing_delay: TypingDelay,
    /// Fields this build does not know about survive a load/save cycle.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            name: "AI助手".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            provider: "openai-compatible".to_string(),
            api_key: String::new(),
            api_base: "https://api.openai.com/v1".to_string(),
            max_tokens: 500,
            temperature: 0.7,
            system_prompt: "你是一个专业的任务管理AI助手。".to_string(),
            welcome_message: "你好！我是你的AI助手。".to_string(),
            typing_delay: TypingDelay::default(),
            extra: Map::new(),
        }
    }
}

impl AssistantSettings {
    pub fn has_credential(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn client_settings(&self, timeout: Duration) -> ClientSettings {
        ClientSettings {
            api_base: self.api_base.clone(),
            api_key: self.api_key.trim().to_string(),
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout,
        }
    }
}

/// Simulated typing delay bounds, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypingDelay {
    pub min: u64,
    pub max: u64,
}

impl Default for TypingDelay {
    fn default() -> Self {
        Self {
            min: 1000,
            max: 2000,
        }
    }
}

pub struct AssistantConfigStore {
    path: PathBuf,
    // Serializes read-modify-write cycles from concurrent client updates.
    write_lock: Mutex<()>,
}

impl AssistantConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Never fails: a missing or unreadable document yields the defaults.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn load(&self) -> AssistantConfig {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "assistant config absent; using defaults");
                return AssistantConfig::default();
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "assistant config unreadable; using defaults"
                );
                return AssistantConfig::default();
            }
        };
        match serde_json::from_str::<AssistantConfig>(&contents) {
            Ok(cfg) => {
                if cfg.assistant.api_key == REDACTED_API_KEY {
                    tracing::warn!(
                        path = %self.path.display(),
                        "stored api_key equals the redaction sentinel and cannot be changed back to itself from clients"
                    );
                }
                cfg
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "assistant config corrupt; using defaults"
                );
                AssistantConfig::default()
            }
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    pub async fn save(&self, config: &AssistantConfig) -> Result<(), ConfigError> {
        let persistence = |message: String| ConfigError::Persistence {
            path: self.path.display().to_string(),
            message,
        };
        let content =
            serde_json::to_string_pretty(config).map_err(|e| persistence(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| persistence(e.to_string()))?;
            }
        }
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| persistence(e.to_string()))?;
        tracing::info!(path = %self.path.display(), "assistant config saved");
        Ok(())
    }

    pub async fn read_for_client(&self) -> AssistantConfig {
        redact(self.load().await)
    }

    /// Shallow merge of the recognized blocks into the persisted document.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn update_for_client(&self, partial: &Value) -> Result<(), ConfigError> {
        let _guard = self.write_lock.lock().await;
        let current = self.load().await;
        let next = merge_client_update(&current, partial)?;
        tracing::info!(
            credential_changed = next.assistant.api_key != current.assistant.api_key,
            model = %next.assistant.model,
            "assistant config update merged"
        );
        self.save(&next).await
    }
}

pub fn redact(mut config: AssistantConfig) -> AssistantConfig {
    if !config.assistant.api_key.is_empty() {
        config.assistant.api_key = REDACTED_API_KEY.to_string();
    }
    config
}

fn merge_client_update(
    current: &AssistantConfig,
    partial: &Value,
) -> Result<AssistantConfig, ConfigError> {
    let Some(patch) = partial.as_object() else {
        return Err(ConfigError::Invalid(
            "update body must be a JSON object".to_string(),
        ));
    };

    let mut doc = serde_json::to_value(current).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    let Some(root) = doc.as_object_mut() else {
        return Err(ConfigError::Invalid(
            "stored config is not an object".to_string(),
        ));
    };
    for block in CLIENT_BLOCKS {
        let Some(incoming) = patch.get(block) else {
            continue;
        };
        let Some(incoming) = incoming.as_object() else {
            return Err(ConfigError::Invalid(format!("{block} must be an object")));
        };
        let target = root
            .entry(block)
            .or_insert_with(|| Value::Object(Map::new()));
        if !target.is_object() {
            *target = Value::Object(Map::new());
        }
        if let Some(target) = target.as_object_mut() {
            for (key, value) in incoming {
                target.insert(key.clone(), value.clone());
            }
        }
    }

    let mut next: AssistantConfig =
        serde_json::from_value(doc).map_err(|e| ConfigError::Invalid(e.to_string()))?;

    let submitted_key = patch
        .get("assistant")
        .and_then(|a| a.get("api_key"))
        .and_then(Value::as_str);
    if submitted_key == Some(REDACTED_API_KEY) {
        next.assistant.api_key = current.assistant.api_key.clone();
    }
    Ok(next)
}
