//! Configuration for dealfeed.
//!
//! A config file (discovered with `prefer`, or passed with `--config`) is
//! deserialized into [`Config`], whose every field is optional. It is then
//! applied over [`Settings::default`], and environment variables win last.

mod catalog;

pub use catalog::builtin_sources;

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::models::SourceDescriptor;
use crate::pipeline::DEFAULT_TTL;
use crate::scrapers::BrowserEngineConfig;
use crate::throttle::ThrottleConfig;

/// Default listen address.
pub const DEFAULT_BIND: &str = "127.0.0.1:3000";

/// Resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Address the HTTP service listens on.
    pub bind: String,
    /// Freshness window of cached results.
    pub cache_ttl: Duration,
    pub throttle: ThrottleConfig,
    /// Default pagination cap.
    pub max_pages: u32,
    /// Default delay between page fetches of one walk.
    pub page_delay: Duration,
    /// Timeout for each markup request.
    pub request_timeout: Duration,
    /// User agent config (`None`, `"impersonate"`, or a literal string).
    pub user_agent: Option<String>,
    /// Proxy for markup requests.
    pub proxy: Option<String>,
    pub browser: BrowserEngineConfig,
    /// Configured sources in display order.
    pub sources: Vec<SourceDescriptor>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            cache_ttl: DEFAULT_TTL,
            throttle: ThrottleConfig::default(),
            max_pages: 50,
            page_delay: Duration::from_millis(250),
            request_timeout: Duration::from_secs(30),
            user_agent: None,
            proxy: None,
            browser: BrowserEngineConfig::default(),
            sources: builtin_sources(),
        }
    }
}

impl Settings {
    /// Apply environment overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(bind) = get("DEALFEED_BIND") {
            debug!("Using DEALFEED_BIND from environment: {}", bind);
            self.bind = bind;
        }
        if let Some(secs) = parse_env::<u64>("DEALFEED_CACHE_TTL_SECS", get("DEALFEED_CACHE_TTL_SECS")) {
            self.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env(
            "DEALFEED_THROTTLE_WINDOW_SECS",
            get("DEALFEED_THROTTLE_WINDOW_SECS"),
        ) {
            self.throttle.window_secs = secs;
        }
        if let Some(max) = parse_env(
            "DEALFEED_THROTTLE_MAX_REQUESTS",
            get("DEALFEED_THROTTLE_MAX_REQUESTS"),
        ) {
            self.throttle.max_requests = max;
        }
        if let Some(trust) = parse_env(
            "DEALFEED_TRUST_FORWARDED_FOR",
            get("DEALFEED_TRUST_FORWARDED_FOR"),
        ) {
            self.throttle.trust_forwarded_for = trust;
        }
        if let Some(pages) = parse_env("DEALFEED_MAX_PAGES", get("DEALFEED_MAX_PAGES")) {
            self.max_pages = pages;
        }
        if let Some(url) = get("BROWSER_URL") {
            debug!("Using BROWSER_URL from environment: {}", url);
            self.browser.remote_url = Some(url);
        }
        if let Some(proxy) = get("SOCKS_PROXY") {
            debug!("Using SOCKS_PROXY from environment: {}", proxy);
            self.browser.proxy = Some(proxy.clone());
            self.proxy = Some(proxy);
        }
    }

    pub fn source(&self, id: &str) -> Option<&SourceDescriptor> {
        self.sources.iter().find(|s| s.id == id)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: Option<String>) -> Option<T> {
    let value = value?;
    match value.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring invalid {}={:?}", key, value);
            None
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_ttl_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throttle: Option<ThrottleConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<BrowserEngineConfig>,
    /// Source id → descriptor. Replaces the built-in catalog when non-empty.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sources: BTreeMap<String, SourceDescriptor>,
}

impl Config {
    /// Discover a `dealfeed.*` config file in the standard locations.
    ///
    /// A missing file yields the default config; a file that fails to parse
    /// is an error.
    pub async fn load() -> Result<Self, ConfigError> {
        match prefer::load("dealfeed").await {
            Ok(discovered) => match discovered.source_path() {
                Some(path) => Self::load_from_path(path).await,
                None => Ok(Self::default()),
            },
            Err(e) => {
                debug!("No config file discovered: {:?}", e);
                Ok(Self::default())
            }
        }
    }

    /// Load a config file, choosing the format from its extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path).await?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let config = Self::parse(&contents, ext)?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse config text in the format named by `ext`.
    pub fn parse(contents: &str, ext: &str) -> Result<Self, ConfigError> {
        let mut config: Config = match ext {
            "toml" => toml::from_str(contents)
                .map_err(|e| ConfigError::Parse(format!("TOML: {}", e)))?,
            "yaml" | "yml" => serde_yaml::from_str(contents)
                .map_err(|e| ConfigError::Parse(format!("YAML: {}", e)))?,
            _ => serde_json::from_str(contents)
                .map_err(|e| ConfigError::Parse(format!("JSON: {}", e)))?,
        };

        for (key, source) in config.sources.iter_mut() {
            if source.id.is_empty() {
                source.id = key.clone();
            } else if source.id != *key {
                return Err(ConfigError::InvalidSource {
                    source_id: key.clone(),
                    reason: format!("id '{}' does not match its key", source.id),
                });
            }
        }
        Ok(config)
    }

    /// Apply this config over `settings`.
    pub fn apply_to_settings(&self, settings: &mut Settings) {
        if let Some(ref bind) = self.bind {
            settings.bind = bind.clone();
        }
        if let Some(secs) = self.cache_ttl_secs {
            settings.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(throttle) = self.throttle {
            settings.throttle = throttle;
        }
        if let Some(pages) = self.max_pages {
            settings.max_pages = pages;
        }
        if let Some(ms) = self.page_delay_ms {
            settings.page_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = self.request_timeout_secs {
            settings.request_timeout = Duration::from_secs(secs);
        }
        if let Some(ref ua) = self.user_agent {
            settings.user_agent = Some(ua.clone());
        }
        if let Some(ref proxy) = self.proxy {
            settings.proxy = Some(proxy.clone());
        }
        if let Some(ref browser) = self.browser {
            settings.browser = browser.clone();
        }
        if !self.sources.is_empty() {
            settings.sources = self.sources.values().cloned().collect();
        }
    }
}

/// Resolve settings from an explicit path or discovery, then the environment.
pub async fn load_settings(config_path: Option<&Path>) -> Result<Settings, ConfigError> {
    let config = match config_path {
        Some(path) => {
            let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
            Config::load_from_path(Path::new(&expanded)).await?
        }
        None => Config::load().await?,
    };

    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings);
    settings.apply_env(|key| std::env::var(key).ok());

    for source in &settings.sources {
        source.validate()?;
    }
    Ok(settings)
}
