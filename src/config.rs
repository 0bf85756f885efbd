//! Runtime configuration.
//!
//! Process settings come from environment variables (optionally via `.env`);
//! the event schedule and public event info come from a JSON file.

use crate::types::{EventInfo, EventWindow};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid event config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Static event description: public info plus the voting schedule
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventConfig {
    #[serde(default)]
    pub info: EventInfo,
    #[serde(default)]
    pub windows: Vec<EventWindow>,
}

impl EventConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Process-level settings
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Hosted store URL and key; `None` runs against the in-memory store
    pub store_url: Option<String>,
    pub store_key: Option<String>,
    pub store_timeout: Duration,
    pub event_config_path: Option<PathBuf>,
    /// How often the voting window is re-evaluated
    pub window_check_interval: Duration,
    /// How often the shared ranking is re-read from the store
    pub ranking_poll_interval: Duration,
    /// How often unused vote ledgers are evicted from the cache
    pub ledger_sweep_interval: Duration,
    pub static_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            store_url: None,
            store_key: None,
            store_timeout: Duration::from_secs(10),
            event_config_path: None,
            window_check_interval: Duration::from_secs(60),
            ranking_poll_interval: Duration::from_secs(10),
            ledger_sweep_interval: Duration::from_secs(300),
            static_dir: PathBuf::from("static"),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn env_secs(key: &str) -> Option<Duration> {
    env_string(key)
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let store_url = env_string("STORE_URL");
        let store_key = env_string("STORE_KEY");
        if store_url.is_some() != store_key.is_some() {
            tracing::warn!("STORE_URL and STORE_KEY must both be set to use the hosted store");
        }

        Self {
            port: env_string("PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            store_url,
            store_key,
            store_timeout: env_secs("STORE_TIMEOUT").unwrap_or(defaults.store_timeout),
            event_config_path: env_string("EVENT_CONFIG").map(PathBuf::from),
            window_check_interval: env_secs("WINDOW_CHECK_SECS")
                .unwrap_or(defaults.window_check_interval),
            ranking_poll_interval: env_secs("RANKING_POLL_SECS")
                .unwrap_or(defaults.ranking_poll_interval),
            ledger_sweep_interval: env_secs("LEDGER_SWEEP_SECS")
                .unwrap_or(defaults.ledger_sweep_interval),
            static_dir: env_string("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.static_dir),
        }
    }

    /// Both halves of the hosted store configuration, if present
    pub fn hosted_store(&self) -> Option<(String, String)> {
        match (&self.store_url, &self.store_key) {
            (Some(url), Some(key)) => Some((url.clone(), key.clone())),
            _ => None,
        }
    }

    /// Event config from `EVENT_CONFIG`; a missing or broken file yields an
    /// empty schedule (voting then only opens through the override)
    pub fn load_event_config(&self) -> EventConfig {
        let Some(path) = &self.event_config_path else {
            tracing::warn!("EVENT_CONFIG not set, no voting windows configured");
            return EventConfig::default();
        };

        match EventConfig::load(path) {
            Ok(config) => {
                tracing::info!(
                    windows = config.windows.len(),
                    event = %config.info.name,
                    "Event config loaded"
                );
                config
            }
            Err(e) => {
                tracing::error!("{}", e);
                EventConfig::default()
            }
        }
    }
}
