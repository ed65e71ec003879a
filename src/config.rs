// Configuration file handling

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = ".stepchainrc.toml";
pub const ENV_STEPCHAIN_BIND: &str = "STEPCHAIN_BIND";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Listen address of the execution service
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionConfig {
    /// Per-step timeout in seconds when a step sets none
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    /// Upper bound on concurrently running requests in a batch
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default)]
    pub user_agent: Option<String>,

    /// Finished reports kept for `GET /api/v1/executions`
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_timeout_secs(),
            max_concurrency: default_max_concurrency(),
            user_agent: None,
            history_capacity: default_history_capacity(),
        }
    }
}

impl ExecutionConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpstreamConfig {
    /// Base URL of the test case service; `test_case_id` requests fail without it
    #[serde(default)]
    pub case_service_url: Option<String>,

    #[serde(default = "default_upstream_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            case_service_url: None,
            timeout_secs: default_upstream_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Filter directive; `RUST_LOG` wins when set
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_level() }
    }
}

pub fn default_bind() -> String {
    String::from("127.0.0.1:8004")
}

pub fn default_timeout_secs() -> u64 {
    30
}

fn default_max_concurrency() -> usize {
    8
}

fn default_history_capacity() -> usize {
    100
}

fn default_upstream_timeout_secs() -> u64 {
    10
}

fn default_level() -> String {
    String::from("info")
}

impl Config {
    /// Loads from `explicit` when given, else the first of
    /// `./.stepchainrc.toml` and `~/.stepchainrc.toml` that exists.
    /// No file at all means defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::discover() {
                Some(path) => Self::load_from_file(&path)?,
                None => Config::default(),
            },
        };
        if let Ok(bind) = std::env::var(ENV_STEPCHAIN_BIND) {
            if !bind.trim().is_empty() {
                config.server.bind = bind.trim().to_string();
            }
        }
        Ok(config)
    }

    fn discover() -> Option<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd.join(CONFIG_FILE_NAME));
        }
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(CONFIG_FILE_NAME));
        }
        paths.into_iter().find(|p| p.exists())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}
