//! Configuration for the pipeline client.
//!
//! Layered: built-in defaults → optional `sitepilot.toml` → environment
//! variables (`SITEPILOT_BACKEND_URL`, `SITEPILOT_WS_URL`) → CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! backend_url = "http://localhost:8000/api"
//! ws_url = "ws://localhost:8000"
//! poll_interval_secs = 2
//! reconnect_initial_secs = 1
//! reconnect_max_secs = 30
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::channel::subscriber::Backoff;

pub const ENV_BACKEND_URL: &str = "SITEPILOT_BACKEND_URL";
pub const ENV_WS_URL: &str = "SITEPILOT_WS_URL";

fn default_backend_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_ws_url() -> String {
    "ws://localhost:8000".to_string()
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_reconnect_initial_secs() -> u64 {
    1
}

fn default_reconnect_max_secs() -> u64 {
    30
}

/// Client configuration. All fields have working defaults pointing at a
/// locally-running backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Base URL for the backend REST API
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    /// Base URL for the backend WebSocket endpoint
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Status poll cadence while a phase is running
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// First reconnect delay after a channel drop
    #[serde(default = "default_reconnect_initial_secs")]
    pub reconnect_initial_secs: u64,
    /// Reconnect delay ceiling
    #[serde(default = "default_reconnect_max_secs")]
    pub reconnect_max_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            ws_url: default_ws_url(),
            poll_interval_secs: default_poll_interval_secs(),
            reconnect_initial_secs: default_reconnect_initial_secs(),
            reconnect_max_secs: default_reconnect_max_secs(),
        }
    }
}

impl PipelineConfig {
    /// Load from a toml file, falling back to defaults when the file
    /// does not exist, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("failed to parse config file {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Overlay `SITEPILOT_*` environment variables.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(ENV_BACKEND_URL) {
            self.backend_url = url;
        }
        if let Ok(url) = std::env::var(ENV_WS_URL) {
            self.ws_url = url;
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Reconnect schedule for the channel subscriber.
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_secs(self.reconnect_initial_secs),
            Duration::from_secs(self.reconnect_max_secs),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_backend() {
        let config = PipelineConfig::default();
        assert_eq!(config.backend_url, "http://localhost:8000/api");
        assert_eq!(config.ws_url, "ws://localhost:8000");
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: PipelineConfig =
            toml::from_str(r#"backend_url = "https://dashboard.example.com/api""#).unwrap();
        assert_eq!(config.backend_url, "https://dashboard.example.com/api");
        assert_eq!(config.ws_url, "ws://localhost:8000");
        assert_eq!(config.poll_interval_secs, 2);
    }

    #[test]
    fn load_missing_file_is_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::load(&dir.path().join("sitepilot.toml")).unwrap();
        assert_eq!(config.backend_url, "http://localhost:8000/api");
    }

    #[test]
    fn load_reads_and_parses_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sitepilot.toml");
        std::fs::write(
            &path,
            "ws_url = \"ws://dashboard.example.com\"\npoll_interval_secs = 5\n",
        )
        .unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.ws_url, "ws://dashboard.example.com");
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
    }

    #[test]
    fn load_rejects_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sitepilot.toml");
        std::fs::write(&path, "backend_url = [not toml").unwrap();
        assert!(PipelineConfig::load(&path).is_err());
    }

    #[test]
    fn backoff_uses_configured_bounds() {
        let config: PipelineConfig =
            toml::from_str("reconnect_initial_secs = 2\nreconnect_max_secs = 8\n").unwrap();
        let mut backoff = config.backoff();
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
        assert_eq!(backoff.next_delay(), Duration::from_secs(8));
        assert_eq!(backoff.next_delay(), Duration::from_secs(8));
    }
}
