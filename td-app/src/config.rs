//! TaskDesk server configuration loader.
//!
//! A missing config file is not an error: every section has built-in defaults.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub assistant: AssistantRuntimeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
    #[serde(default = "default_http_max_in_flight")]
    pub http_max_in_flight: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_http_timeout_seconds() -> u64 {
    60
}

fn default_http_max_in_flight() -> usize {
    256
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            http_timeout_seconds: default_http_timeout_seconds(),
            http_max_in_flight: default_http_max_in_flight(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the SQLite database and the assistant side file.
    /// A leading `~/` expands to `$HOME`.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_database_file")]
    pub database_file: String,
    #[serde(default = "default_assistant_config_file")]
    pub assistant_config_file: String,
}

fn default_data_dir() -> String {
    "~/.taskdesk/data".to_string()
}

fn default_database_file() -> String {
    "tasks.db".to_string()
}

fn default_assistant_config_file() -> String {
    "ai_config.json".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_file: default_database_file(),
            assistant_config_file: default_assistant_config_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantRuntimeConfig {
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_request_timeout_seconds() -> u64 {
    td_llm::DEFAULT_TIMEOUT.as_secs()
}

impl Default for AssistantRuntimeConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

impl AppConfig {
    pub async fn load_with_path(path: Option<PathBuf>) -> anyhow::Result<(Self, PathBuf)> {
        let path = match path {
            Some(p) => p,
            None => default_config_path()?,
        };
        let mut cfg = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => toml::from_str::<AppConfig>(&contents)
                .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(config_path = %path.display(), "config file not found; using defaults");
                AppConfig::default()
            }
            Err(e) => return Err(anyhow::anyhow!("read config {}: {e}", path.display())),
        };

        cfg.apply_overrides(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok((cfg, path))
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = non_empty("TASKDESK_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = non_empty("TASKDESK_DATA_DIR") {
            self.storage.data_dir = v;
        }
        if let Some(v) = non_empty("TASKDESK_ASSISTANT_TIMEOUT_SECONDS") {
            match v.trim().parse() {
                Ok(secs) => self.assistant.request_timeout_seconds = secs,
                Err(e) => tracing::warn!(
                    value = %v,
                    error = %e,
                    "ignoring invalid TASKDESK_ASSISTANT_TIMEOUT_SECONDS"
                ),
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.bind_addr()?;
        if self.server.http_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("server.http_timeout_seconds must be > 0"));
        }
        if self.server.http_max_in_flight == 0 {
            return Err(anyhow::anyhow!("server.http_max_in_flight must be > 0"));
        }
        if self.storage.data_dir.trim().is_empty() {
            return Err(anyhow::anyhow!("storage.data_dir is required"));
        }
        if self.storage.database_file.trim().is_empty() {
            return Err(anyhow::anyhow!("storage.database_file is required"));
        }
        if self.storage.assistant_config_file.trim().is_empty() {
            return Err(anyhow::anyhow!("storage.assistant_config_file is required"));
        }
        if self.assistant.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!(
                "assistant.request_timeout_seconds must be > 0"
            ));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        self.server
            .bind_addr
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("server.bind_addr {:?}: {e}", self.server.bind_addr))
    }

    pub fn data_dir(&self) -> anyhow::Result<PathBuf> {
        expand_home(&self.storage.data_dir)
    }

    pub fn database_path(&self) -> anyhow::Result<PathBuf> {
        Ok(self.data_dir()?.join(self.storage.database_file.trim()))
    }

    pub fn assistant_config_path(&self) -> anyhow::Result<PathBuf> {
        Ok(self.data_dir()?.join(self.storage.assistant_config_file.trim()))
    }

    pub fn assistant_timeout(&self) -> Duration {
        Duration::from_secs(self.assistant.request_timeout_seconds)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.server.http_timeout_seconds)
    }
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("HOME is not set"))?;
    Ok(Path::new(&home).join(".taskdesk").join("config.toml"))
}

fn expand_home(path: &str) -> anyhow::Result<PathBuf> {
    let trimmed = path.trim();
    let Some(rest) = trimmed.strip_prefix("~/") else {
        return Ok(PathBuf::from(trimmed));
    };
    let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("HOME is not set"))?;
    Ok(Path::new(&home).join(rest))
}
