//! Configuration module for feedline

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::models::FeedType;
use crate::paths;

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the HTTP API (e.g. `https://host/api`)
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Origin of the push channel; defaults to the API origin
    #[serde(default)]
    pub socket_url: Option<String>,

    /// Feed shown by default
    #[serde(default)]
    pub feed_type: FeedType,

    /// Items requested per page
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,

    /// Poll interval in seconds (0 = push only)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Scroll offset at or below which the user counts as "at the top"
    #[serde(default)]
    pub top_threshold: f64,

    /// Age in seconds after which activating the feed triggers a refresh
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,

    /// Fixed delay before the push channel reconnects
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,

    /// Whether the last visible window is cached on disk
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,
}

fn default_api_url() -> String {
    "http://localhost:3000/api".to_string()
}

const fn default_page_limit() -> u32 {
    20
}

const fn default_poll_interval() -> u64 {
    20
}

const fn default_stale_after() -> u64 {
    60
}

const fn default_reconnect_delay() -> u64 {
    2
}

const fn default_cache_enabled() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            socket_url: None,
            feed_type: FeedType::default(),
            page_limit: default_page_limit(),
            poll_interval_secs: default_poll_interval(),
            top_threshold: 0.0,
            stale_after_secs: default_stale_after(),
            reconnect_delay_secs: default_reconnect_delay(),
            cache_enabled: default_cache_enabled(),
        }
    }
}

impl Config {
    /// Load config from the default path or fall back to defaults
    pub fn load() -> Result<Self> {
        let path = paths::config_path()?;
        Self::load_from(&path)
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        let path = paths::config_path()?;
        self.save_to(&path)
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Push channel origin: `socket_url`, or the scheme and host of `api_url`
    pub fn socket_url(&self) -> String {
        if let Some(url) = &self.socket_url {
            return url.trim_end_matches('/').to_string();
        }

        match reqwest::Url::parse(&self.api_url) {
            Ok(url) => url.origin().ascii_serialization(),
            Err(e) => {
                tracing::warn!("Invalid api_url {:?}: {e}", self.api_url);
                self.api_url.trim_end_matches('/').to_string()
            }
        }
    }

    /// Poll interval, `None` when polling is disabled
    pub const fn poll_interval(&self) -> Option<Duration> {
        if self.poll_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.poll_interval_secs))
        }
    }

    /// Staleness window for `on_activate`
    pub const fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    /// Push channel reconnect delay
    pub const fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.page_limit, 20);
        assert_eq!(config.poll_interval(), Some(Duration::from_secs(20)));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "api_url = \"https://feed.example.com/api\"\nfeed_type = \"following\"\npoll_interval_secs = 0\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.feed_type, FeedType::Following);
        assert!(config.poll_interval().is_none());
        assert_eq!(config.stale_after_secs, 60);
        assert!(config.cache_enabled);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config {
            top_threshold: 12.5,
            socket_url: Some("https://push.example.com".to_string()),
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_socket_url_derived_from_api_origin() {
        let config = Config {
            api_url: "https://feed.example.com/api/v1".to_string(),
            ..Config::default()
        };
        assert_eq!(config.socket_url(), "https://feed.example.com");

        let bare = Config {
            api_url: "http://127.0.0.1:3000".to_string(),
            ..Config::default()
        };
        assert_eq!(bare.socket_url(), "http://127.0.0.1:3000");

        let default_port = Config {
            api_url: "https://feed.example.com:443/api?x=1".to_string(),
            ..Config::default()
        };
        assert_eq!(default_port.socket_url(), "https://feed.example.com");

        assert_eq!(Config::default().socket_url(), "http://localhost:3000");
    }
}
