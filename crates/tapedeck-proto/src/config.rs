use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub deck: DeckConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub mpv: MpvConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Timings and rules of the deck mechanism.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckConfig {
    /// Delay between inserting a tape and the door swinging shut.
    #[serde(default = "default_auto_close_ms")]
    pub auto_close_ms: u64,
    /// How long a playback fault stays on the name plate.
    #[serde(default = "default_error_clear_ms")]
    pub error_clear_ms: u64,
    /// Substring identifying a DRM-restricted streaming host.
    #[serde(default = "default_drm_host_marker")]
    pub drm_host_marker: String,
}

/// Remote track lookup used by the mixtape editor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
    /// Input must be stable this long before a search fires.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Queries shorter than this never reach the network.
    #[serde(default = "default_min_query_chars")]
    pub min_query_chars: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpvConfig {
    #[serde(default = "default_volume")]
    pub default_volume: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl DeckConfig {
    pub fn auto_close(&self) -> Duration {
        Duration::from_millis(self.auto_close_ms)
    }

    pub fn error_clear(&self) -> Duration {
        Duration::from_millis(self.error_clear_ms)
    }
}

impl SearchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            auto_close_ms: default_auto_close_ms(),
            error_clear_ms: default_error_clear_ms(),
            drm_host_marker: default_drm_host_marker(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            debounce_ms: default_debounce_ms(),
            min_query_chars: default_min_query_chars(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for MpvConfig {
    fn default() -> Self {
        Self {
            default_volume: default_volume(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_auto_close_ms() -> u64 {
    500
}

fn default_error_clear_ms() -> u64 {
    3000
}

fn default_drm_host_marker() -> String {
    "spotify.com".to_string()
}

fn default_search_endpoint() -> String {
    "https://itunes.apple.com/search".to_string()
}

fn default_debounce_ms() -> u64 {
    600
}

fn default_min_query_chars() -> usize {
    3
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_volume() -> f32 {
    0.5
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
