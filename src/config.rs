//! Configuration loader and validator for the publishing queue engine.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub publishing: Publishing,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub tick_interval_ms: u64,
    pub listen_addr: String,
}

/// Publishing engine settings and the receiver endpoint roster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Publishing {
    #[serde(default = "default_max_tries")]
    pub max_tries: i32,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    pub endpoints: Vec<EndpointEntry>,
}

/// One receiving endpoint. Endpoints sharing a `group` are redundant
/// alternatives: one confirmed delivery counts for the whole group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EndpointEntry {
    pub id: String,
    pub group: String,
    pub base_url: String,
}

fn default_max_tries() -> i32 {
    5
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.tick_interval_ms == 0 {
        return Err(ConfigError::Invalid("app.tick_interval_ms must be > 0"));
    }
    if cfg.app.listen_addr.trim().is_empty() {
        return Err(ConfigError::Invalid("app.listen_addr must be non-empty"));
    }

    if cfg.publishing.max_tries <= 0 {
        return Err(ConfigError::Invalid("publishing.max_tries must be > 0"));
    }
    if cfg.publishing.request_timeout_ms == 0 {
        return Err(ConfigError::Invalid(
            "publishing.request_timeout_ms must be > 0",
        ));
    }

    let mut seen_ids = std::collections::HashSet::new();
    for endpoint in &cfg.publishing.endpoints {
        if endpoint.id.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "publishing.endpoints[].id must be non-empty",
            ));
        }
        if endpoint.group.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "publishing.endpoints[].group must be non-empty",
            ));
        }
        if endpoint.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "publishing.endpoints[].base_url must be non-empty",
            ));
        }
        if !seen_ids.insert(endpoint.id.as_str()) {
            return Err(ConfigError::Invalid(
                "publishing.endpoints[].id must be unique",
            ));
        }
    }

    Ok(())
}

/// Example YAML configuration, kept parseable by the tests.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  tick_interval_ms: 60000
  listen_addr: "0.0.0.0:8090"

publishing:
  max_tries: 5
  request_timeout_ms: 10000
  endpoints:
    - id: "receiver-east-1"
      group: "east"
      base_url: "https://east1.example.com"
    - id: "receiver-east-2"
      group: "east"
      base_url: "https://east2.example.com"
    - id: "receiver-west-1"
      group: "west"
      base_url: "https://west1.example.com"
"#
}
