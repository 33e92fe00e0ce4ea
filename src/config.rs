//! Configuration loaded from a TOML file
//!
//! Every field has a default, so an empty or partial file is valid.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub engine: EngineConfig,
    pub retry: RetryConfig,
}

/// Remote endpoints consumed by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// `GET {token_url}/{trackId}` returns a signed stream token
    pub token_url: String,
    /// `POST` target for play-completion reports
    pub completion_url: String,
    /// Bearer credential sent to both endpoints
    pub bearer_token: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            token_url: "http://127.0.0.1:8080/api/stream-token".to_string(),
            completion_url: "http://127.0.0.1:8080/api/plays".to_string(),
            bearer_token: None,
            request_timeout_secs: 15,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Playback engine tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Stream locators are `<stream_base_url>/<trackId>/?token=<token>`
    pub stream_base_url: String,
    /// UI position sampling cadence
    pub ui_sample_interval_ms: u64,
    /// Minimum spacing of position publications to the media surface
    pub os_publish_interval_ms: u64,
    /// Smallest position change worth republishing, in seconds
    pub position_epsilon: f64,
    /// Media surface position debounce
    pub media_debounce_ms: u64,
    /// Device volume changes smaller than this are treated as echoes
    pub volume_epsilon: f32,
    pub token_refresh_margin_secs: i64,
    /// Token lifetime assumed when the endpoint omits `expirySeconds`
    pub default_token_lifetime_secs: i64,
    /// Opt-in: `previous` restarts the current track past this position
    /// instead of stepping back. 0 (the default) always steps back
    pub previous_restart_threshold_secs: f64,
    /// Upper bound for a single token fetch plus stream load
    pub load_timeout_secs: u64,
    /// How long teardown waits for the final completion report
    pub shutdown_flush_timeout_ms: u64,
    pub initial_volume: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stream_base_url: "http://127.0.0.1:8080/stream".to_string(),
            ui_sample_interval_ms: 250,
            os_publish_interval_ms: 1000,
            position_epsilon: 0.05,
            media_debounce_ms: 200,
            volume_epsilon: 0.01,
            token_refresh_margin_secs: 10,
            default_token_lifetime_secs: 300,
            previous_restart_threshold_secs: 0.0,
            load_timeout_secs: 30,
            shutdown_flush_timeout_ms: 2000,
            initial_volume: 1.0,
        }
    }
}

impl EngineConfig {
    pub fn ui_sample_interval(&self) -> Duration {
        Duration::from_millis(self.ui_sample_interval_ms.max(1))
    }

    pub fn os_publish_interval(&self) -> Duration {
        Duration::from_millis(self.os_publish_interval_ms)
    }

    pub fn media_debounce(&self) -> Duration {
        Duration::from_millis(self.media_debounce_ms)
    }

    pub fn token_refresh_margin(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.token_refresh_margin_secs)
    }

    pub fn default_token_lifetime(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.default_token_lifetime_secs)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }

    pub fn shutdown_flush_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_flush_timeout_ms)
    }
}

/// Backoff for failed stream loads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 8000,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Load `path` when given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                tracing::info!("No config file given, using defaults");
                Ok(Self::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [api]
            token_url = "https://api.example/token"

            [retry]
            max_retries = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.api.token_url, "https://api.example/token");
        assert_eq!(config.api.request_timeout_secs, 15);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine]\nstream_base_url = \"https://cdn.example/s\"\nui_sample_interval_ms = 300").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.engine.stream_base_url, "https://cdn.example/s");
        assert_eq!(config.engine.ui_sample_interval(), Duration::from_millis(300));
    }

    #[test]
    fn load_reports_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine\nbroken").unwrap();
        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("parsing config file"));
    }
}
