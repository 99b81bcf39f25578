use crate::application::consumer::ConsumerSettings;
use crate::error::{Result, WorkerError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Worker configuration, loaded from YAML. Every field has a default so an
/// empty or partial file is valid.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    pub queue_name: String,
    pub idle_interval_secs: u64,
    pub lock_timeout_secs: u64,
    pub max_delivery_count: u32,
    pub logging: LogConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence when set.
    pub level: String,
    pub json: bool,
    /// When set, logs are also written to a daily-rotated file in this directory.
    pub dir: Option<PathBuf>,
    pub file: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_name: "funds-movements".to_string(),
            idle_interval_secs: 10,
            lock_timeout_secs: 10,
            max_delivery_count: 10,
            logging: LogConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            dir: None,
            file: "funds-worker.log".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Loads the configuration at `path`, or the defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    WorkerError::ConfigError(format!("{}: {e}", path.display()))
                })?;
                Self::from_yaml(&content)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: WorkerConfig = serde_yaml::from_str(content)
            .map_err(|e| WorkerError::ConfigError(format!("invalid YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.lock_timeout_secs == 0 {
            return Err(WorkerError::ConfigError(
                "lock_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.max_delivery_count == 0 {
            return Err(WorkerError::ConfigError(
                "max_delivery_count must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn consumer_settings(&self) -> ConsumerSettings {
        ConsumerSettings {
            idle_interval: Duration::from_secs(self.idle_interval_secs),
            lock_timeout: Duration::from_secs(self.lock_timeout_secs),
            max_delivery_count: self.max_delivery_count,
        }
    }
}
