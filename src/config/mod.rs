use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

pub mod defaults;
pub mod duration;

use defaults::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub epg: EpgConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
}

/// Where the playlist and guide come from.
///
/// Each value is a single URL, a comma-separated list of URLs, or the URL of a
/// list file whose body is itself a newline-separated URL list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "default_playlist_url")]
    pub playlist_url: String,
    /// Explicit guide source. When absent the default declared in the
    /// playlist header is used.
    #[serde(default = "default_epg_url")]
    pub epg_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Catalog age after which it is considered stale
    #[serde(default = "default_cache_update_interval", with = "duration")]
    pub update_interval: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpgConfig {
    #[serde(default = "default_epg_enabled")]
    pub enabled: bool,
    /// Cron expression (with seconds field) for the guide refresh cadence
    #[serde(default = "default_epg_update_cron")]
    pub update_cron: String,
    /// Display offset, `±H:MM` or `±HH:MM`
    #[serde(default = "default_timezone_offset")]
    pub timezone_offset: String,
    /// Number of schedule entries processed per batch
    #[serde(default = "default_epg_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_fetch_timeout", with = "duration")]
    pub fetch_timeout: Duration,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Serve only alternate streams, never the direct one
    #[serde(default)]
    pub force_proxy: bool,
    #[serde(default = "default_proxy_cache_ttl", with = "duration")]
    pub cache_ttl: Duration,
    #[serde(default = "default_proxy_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_playlist_url() -> String {
    DEFAULT_PLAYLIST_URL.to_string()
}

fn default_epg_url() -> Option<String> {
    Some(DEFAULT_EPG_URL.to_string())
}

fn default_cache_update_interval() -> Duration {
    DEFAULT_CACHE_UPDATE_INTERVAL
}

fn default_epg_enabled() -> bool {
    DEFAULT_EPG_ENABLED
}

fn default_epg_update_cron() -> String {
    DEFAULT_EPG_UPDATE_CRON.to_string()
}

fn default_timezone_offset() -> String {
    DEFAULT_TIMEZONE_OFFSET.to_string()
}

fn default_epg_batch_size() -> usize {
    DEFAULT_EPG_BATCH_SIZE
}

fn default_fetch_timeout() -> Duration {
    DEFAULT_FETCH_TIMEOUT
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_proxy_cache_ttl() -> Duration {
    DEFAULT_PROXY_CACHE_TTL
}

fn default_proxy_cache_capacity() -> usize {
    DEFAULT_PROXY_CACHE_CAPACITY
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            playlist_url: default_playlist_url(),
            epg_url: default_epg_url(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            update_interval: default_cache_update_interval(),
        }
    }
}

impl Default for EpgConfig {
    fn default() -> Self {
        Self {
            enabled: default_epg_enabled(),
            update_cron: default_epg_update_cron(),
            timezone_offset: default_timezone_offset(),
            batch_size: default_epg_batch_size(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: default_fetch_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            force_proxy: false,
            cache_ttl: default_proxy_cache_ttl(),
            cache_capacity: default_proxy_cache_capacity(),
        }
    }
}

impl Config {
    pub fn load_from_file(config_file: &str) -> Result<Self> {
        let mut config = if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(config_file)
                .with_context(|| format!("Failed to read config file {config_file}"))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {config_file}"))?
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file);
            default_config
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `M3U_URL`, `EPG_URL`, `TIMEZONE_OFFSET` and `ENABLE_EPG` on top of
    /// the file values. The lookup is injected so tests never touch the real
    /// process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("M3U_URL").filter(|v| !v.trim().is_empty()) {
            self.sources.playlist_url = url;
        }
        if let Some(url) = lookup("EPG_URL") {
            let url = url.trim().to_string();
            self.sources.epg_url = (!url.is_empty()).then_some(url);
        }
        if let Some(offset) = lookup("TIMEZONE_OFFSET") {
            self.epg.timezone_offset = offset;
        }
        if let Some(enabled) = lookup("ENABLE_EPG") {
            match enabled.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.epg.enabled = true,
                "0" | "false" | "no" => self.epg.enabled = false,
                other => warn!("Ignoring invalid ENABLE_EPG value '{}'", other),
            }
        }
    }
}
