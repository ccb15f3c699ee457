//! Configuration for the host and its inference executioners

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// How a worker drains the request queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InferenceMode {
    /// One request per model call
    #[default]
    Sequential,
    /// Up to `batch_limit` queued requests per model call
    Batched,
}

/// Worker pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionerConfig {
    /// Number of worker threads
    pub workers: usize,

    /// Maximum requests per model call (BATCHED only)
    pub batch_limit: usize,

    /// Maximum queued, not yet running requests
    pub queue_limit: usize,

    /// Queue draining mode
    pub inference_mode: InferenceMode,

    /// How long a worker waits to fill a batch; 0 submits immediately
    pub batch_timeout_ms: u64,
}

impl Default for ExecutionerConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            batch_limit: 8,
            queue_limit: 64,
            inference_mode: InferenceMode::Sequential,
            batch_timeout_ms: 0,
        }
    }
}

impl ExecutionerConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker count
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the batch limit
    pub fn with_batch_limit(mut self, batch_limit: usize) -> Self {
        self.batch_limit = batch_limit;
        self
    }

    /// Set the queue limit
    pub fn with_queue_limit(mut self, queue_limit: usize) -> Self {
        self.queue_limit = queue_limit;
        self
    }

    /// Set the inference mode
    pub fn with_mode(mut self, mode: InferenceMode) -> Self {
        self.inference_mode = mode;
        self
    }

    /// Set the batch fill timeout
    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Requests a worker may take per model call
    pub fn effective_batch_limit(&self) -> usize {
        match self.inference_mode {
            InferenceMode::Sequential => 1,
            InferenceMode::Batched => self.batch_limit,
        }
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    /// Reject zero-sized pools, batches and queues
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::ConfigError("workers must be at least 1".to_string()));
        }
        if self.batch_limit == 0 {
            return Err(Error::ConfigError(
                "batch_limit must be at least 1".to_string(),
            ));
        }
        if self.queue_limit == 0 {
            return Err(Error::ConfigError(
                "queue_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Host configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// `tracing` filter used when `RUST_LOG` is unset
    pub log_filter: String,

    /// Defaults for model steps that do not set their own pool config
    pub executioner: ExecutionerConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            executioner: ExecutionerConfig::default(),
        }
    }
}

impl HostConfig {
    /// Load from a `.toml`, `.yaml`/`.yml` or `.json` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let text = std::fs::read_to_string(path)?;

        let config: Self = match extension.as_str() {
            "toml" => toml::from_str(&text).map_err(|e| {
                Error::ConfigError(format!("{}: {}", path.display(), e))
            })?,
            "yaml" | "yml" => serde_yaml::from_str(&text).map_err(|e| {
                Error::ConfigError(format!("{}: {}", path.display(), e))
            })?,
            "json" => serde_json::from_str(&text).map_err(|e| {
                Error::ConfigError(format!("{}: {}", path.display(), e))
            })?,
            other => {
                return Err(Error::ConfigError(format!(
                    "{}: unsupported config format '{}'",
                    path.display(),
                    other
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.executioner.validate()
    }
}
