//! Runtime configuration (`sendlock.toml`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::interceptor::LookupRules;

pub const DEFAULT_DELAY_SECONDS: u32 = 30;
pub const MAX_DELAY_SECONDS: u32 = 86_400;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Every field has a default, so an empty file is a valid config.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendLockConfig {
    /// Hold time for each intercepted send. Read when a task is created.
    pub delay_seconds: u32,
    /// When false, sends are still captured but committed on the next tick.
    pub delay_enabled: bool,
    pub tick_interval_ms: u64,
    /// Repeat activations of one compose session inside this window are
    /// treated as the same gesture.
    pub dedup_window_ms: u64,
    /// How long finished tasks stay visible before they are pruned.
    pub retention_seconds: u64,
    pub max_live_tasks: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,
    pub selectors: LookupRules,
}

impl Default for SendLockConfig {
    fn default() -> Self {
        Self {
            delay_seconds: DEFAULT_DELAY_SECONDS,
            delay_enabled: true,
            tick_interval_ms: 100,
            dedup_window_ms: 750,
            retention_seconds: 3600,
            max_live_tasks: 16,
            store_path: None,
            selectors: LookupRules::default(),
        }
    }
}

impl SendLockConfig {
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: SendLockConfig = toml::from_str(&s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let s = toml::to_string_pretty(self)?;
        std::fs::write(path, s).map_err(write_err)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.delay_seconds > MAX_DELAY_SECONDS {
            return Err(ConfigError::Invalid(format!(
                "delay_seconds must be at most {MAX_DELAY_SECONDS}, got {}",
                self.delay_seconds
            )));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be positive".into()));
        }
        if self.max_live_tasks == 0 {
            return Err(ConfigError::Invalid("max_live_tasks must be positive".into()));
        }
        if self.selectors.is_empty() {
            return Err(ConfigError::Invalid(
                "selectors.send_button and selectors.compose_window must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Delay applied to new tasks.
    pub fn effective_delay_seconds(&self) -> u32 {
        if self.delay_enabled {
            self.delay_seconds
        } else {
            0
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_seconds)
    }
}
