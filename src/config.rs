//! Application-level configuration loading, including the session timer durations.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "PLANNING_POKER_CONFIG_PATH";
/// Inactivity window after which an untouched session starts closing.
pub const AUTO_CLOSE_AFTER: Duration = Duration::from_secs(5 * 60);
/// Grace period between entering `closing` and deleting the session.
pub const CLOSING_DURATION: Duration = Duration::from_secs(60);
const DEFAULT_BROADCAST_CAPACITY: usize = 16;

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Inactivity window before a session is automatically closed.
    pub auto_close_after: Duration,
    /// How long a closing session lingers before deletion.
    pub closing_duration: Duration,
    /// Buffered events per SSE topic.
    pub broadcast_capacity: usize,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        auto_close_after = ?app_config.auto_close_after,
                        closing_duration = ?app_config.closing_duration,
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            auto_close_after: AUTO_CLOSE_AFTER,
            closing_duration: CLOSING_DURATION,
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
        }
    }
}

/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    auto_close_after_ms: Option<u64>,
    closing_duration_ms: Option<u64>,
    broadcast_capacity: Option<usize>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Self::default();
        Self {
            auto_close_after: value
                .auto_close_after_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.auto_close_after),
            closing_duration: value
                .closing_duration_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.closing_duration),
            broadcast_capacity: value
                .broadcast_capacity
                .filter(|capacity| *capacity > 0)
                .unwrap_or(defaults.broadcast_capacity),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
