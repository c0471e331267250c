//! Configuration
//!
//! Loaded from a TOML file (`LAUNDRY_CONFIG`, else `laundry.toml` when it
//! exists, else defaults), then overridden by `LAUNDRY_*` environment
//! variables. Every section is optional in the file.

use crate::filter::{PageRequest, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub const CONFIG_ENV: &str = "LAUNDRY_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "laundry.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub query: QueryConfig,
    pub usage_worker: UsageWorkerConfig,
    pub sensor: SensorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: "info".to_string(),
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            query: QueryConfig::default(),
            usage_worker: UsageWorkerConfig::default(),
            sensor: SensorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Shared secret expected in `x-api-key`. The server refuses to start
    /// without one.
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "0.0.0.0:8080".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Lost when the process exits.
    Memory,
    #[default]
    Sqlite,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "sqlite" => Ok(StorageBackend::Sqlite),
            other => bail!("unknown storage backend '{}' (expected memory or sqlite)", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Database file, used by the sqlite backend.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: StorageBackend::Sqlite,
            path: PathBuf::from("laundry.db"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

impl QueryConfig {
    /// Page request with the configured default and cap applied.
    pub fn page(&self, limit: Option<usize>, offset: Option<usize>) -> PageRequest {
        let max = self.max_page_size.max(1);
        let limit = limit.unwrap_or(self.default_page_size).min(max);
        PageRequest::new(limit, offset.unwrap_or(0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageWorkerConfig {
    /// Attempts per usage write, the first one included.
    pub max_attempts: u32,
    /// Backoff grows linearly: attempt n waits n * retry_backoff_ms.
    pub retry_backoff_ms: u64,
}

impl Default for UsageWorkerConfig {
    fn default() -> Self {
        UsageWorkerConfig {
            max_attempts: 5,
            retry_backoff_ms: 200,
        }
    }
}

impl UsageWorkerConfig {
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(attempt as u64))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// How long a signal must stay stable before it counts.
    pub hold_secs: u64,
    /// Running or finishing longer than this is an error.
    pub timeout_secs: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        SensorConfig {
            hold_secs: 3,
            timeout_secs: 3600,
        }
    }
}

impl SensorConfig {
    pub fn hold(&self) -> Duration {
        Duration::from_secs(self.hold_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// File from `LAUNDRY_CONFIG` (must exist) or `laundry.toml` (optional),
    /// then environment overrides.
    pub fn from_env_or_file() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::load(Path::new(&path))?,
            Err(_) if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::load(Path::new(DEFAULT_CONFIG_FILE))?
            }
            Err(_) => Config::default(),
        };

        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply `LAUNDRY_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(key) = lookup("LAUNDRY_API_KEY").filter(|k| !k.is_empty()) {
            self.server.api_key = Some(key);
        }
        if let Some(bind) = lookup("LAUNDRY_BIND") {
            self.server.bind = bind;
        }
        if let Some(path) = lookup("LAUNDRY_DB_PATH") {
            self.storage.path = PathBuf::from(path);
        }
        if let Some(backend) = lookup("LAUNDRY_STORAGE") {
            self.storage.backend = backend.parse()?;
        }
        if let Some(level) = lookup("LAUNDRY_LOG") {
            self.log_level = level;
        }
        Ok(())
    }

    /// The API key, required by the server.
    pub fn require_api_key(&self) -> Result<&str> {
        match self.server.api_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(key),
            _ => bail!("no API key configured (set server.api_key or LAUNDRY_API_KEY)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            log_level = "debug"

            [storage]
            backend = "sqlite"

            [query]
            max_page_size = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.storage.path, PathBuf::from("laundry.db"));
        assert_eq!(config.query.default_page_size, 20);
        assert_eq!(config.query.max_page_size, 50);
        assert_eq!(config.sensor.hold_secs, 3);
    }

    #[test]
    fn test_env_overrides_file() {
        let env: HashMap<&str, &str> = [
            ("LAUNDRY_API_KEY", "s3cret"),
            ("LAUNDRY_STORAGE", "Memory"),
            ("LAUNDRY_DB_PATH", "/tmp/laundry-test.db"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.require_api_key().unwrap(), "s3cret");
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.path, PathBuf::from("/tmp/laundry-test.db"));
        assert_eq!(config.server.bind, "0.0.0.0:8080");
    }

    #[test]
    fn test_default_storage_is_a_database_file() {
        let config = Config::default();
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.storage.path, PathBuf::from("laundry.db"));
    }

    #[test]
    fn test_bad_backend_is_rejected() {
        let mut config = Config::default();
        let result = config.apply_env(|name| {
            (name == "LAUNDRY_STORAGE").then(|| "redis".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_api_key_is_an_error() {
        assert!(Config::default().require_api_key().is_err());
    }

    #[test]
    fn test_page_clamps_to_max() {
        let query = QueryConfig {
            default_page_size: 20,
            max_page_size: 50,
        };

        assert_eq!(query.page(None, None), PageRequest::new(20, 0));
        assert_eq!(query.page(Some(500), Some(40)), PageRequest::new(50, 40));
        assert_eq!(query.page(Some(0), None).limit, 1);
    }

    #[test]
    fn test_linear_backoff() {
        let worker = UsageWorkerConfig {
            max_attempts: 3,
            retry_backoff_ms: 100,
        };
        assert_eq!(worker.backoff(1), Duration::from_millis(100));
        assert_eq!(worker.backoff(3), Duration::from_millis(300));
    }
}
