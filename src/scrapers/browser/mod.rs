//! Rendering sessions for script-heavy listings.
//!
//! One Chrome instance (launched locally or reached over DevTools) serves
//! the whole process. Each acquisition opens its own tab, waits for the
//! source's readiness selector, snapshots the DOM and closes the tab.

mod config;
#[cfg(feature = "browser")]
mod render;
#[cfg(feature = "browser")]
mod stealth;

pub use config::{BrowserEngineConfig, BrowserEngineType};

#[cfg(feature = "browser")]
use std::path::PathBuf;
#[cfg(feature = "browser")]
use std::sync::Arc;

#[cfg(feature = "browser")]
use anyhow::{Context, Result};
use async_trait::async_trait;
#[cfg(feature = "browser")]
use tokio::sync::Mutex;
#[cfg(feature = "browser")]
use tracing::{debug, info};

#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig};
#[cfg(feature = "browser")]
use futures::StreamExt;

use crate::error::AcquisitionError;

/// Produces the serialized DOM of a page once it has rendered.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Load `url`, wait until `ready_selector` matches, return the document HTML.
    async fn render(&self, url: &str, ready_selector: &str) -> Result<String, AcquisitionError>;
}

/// Chrome-backed renderer with optional stealth patches.
#[cfg(feature = "browser")]
pub struct BrowserFetcher {
    pub(crate) config: BrowserEngineConfig,
    pub(crate) user_agent: String,
    browser: Mutex<Option<Arc<Mutex<Browser>>>>,
}

#[cfg(feature = "browser")]
impl BrowserFetcher {
    const CHROME_PATHS: &'static [&'static str] = &[
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/opt/google/chrome/google-chrome",
    ];

    const CHROME_COMMANDS: &'static [&'static str] = &[
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
    ];

    /// Create a fetcher. The browser itself starts on first use.
    pub fn new(config: BrowserEngineConfig, user_agent: impl Into<String>) -> Self {
        Self {
            config,
            user_agent: user_agent.into(),
            browser: Mutex::new(None),
        }
    }

    /// Well-known install locations first, then `PATH`.
    fn find_chrome() -> Result<PathBuf> {
        let installed = Self::CHROME_PATHS.iter().map(PathBuf::from);
        let on_path = std::env::var_os("PATH")
            .map(|paths| std::env::split_paths(&paths).collect::<Vec<_>>())
            .unwrap_or_default()
            .into_iter()
            .flat_map(|dir| Self::CHROME_COMMANDS.iter().map(move |cmd| dir.join(cmd)));

        installed
            .chain(on_path)
            .find(|candidate| candidate.is_file())
            .inspect(|path| info!("Using Chrome at {}", path.display()))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Chrome/Chromium not found. Install it or set BROWSER_URL to a running DevTools endpoint"
                )
            })
    }

    /// Shared browser handle, launching or connecting on first use.
    pub(crate) async fn browser(&self) -> Result<Arc<Mutex<Browser>>, AcquisitionError> {
        let mut slot = self.browser.lock().await;
        if let Some(browser) = slot.as_ref() {
            return Ok(browser.clone());
        }

        let browser = match self.config.remote_url.clone() {
            Some(remote_url) => self.connect_remote(&remote_url).await,
            None => self.launch().await,
        }
        .map_err(|e| AcquisitionError::BrowserUnavailable(format!("{:#}", e)))?;

        let browser = Arc::new(Mutex::new(browser));
        *slot = Some(browser.clone());
        Ok(browser)
    }

    /// Forget the current browser so the next render starts a fresh one.
    pub(crate) async fn discard(&self) {
        self.browser.lock().await.take();
    }

    async fn launch(&self) -> Result<Browser> {
        info!("Launching browser (headless={})", self.config.headless);

        let chrome_path = Self::find_chrome()?;
        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .request_timeout(self.config.timeout());

        if !self.config.headless {
            builder = builder.with_head();
        }

        if let Some(ref proxy) = self.config.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        let extra = self.config.chrome_args.iter().map(String::as_str);
        for arg in LAUNCH_ARGS.iter().copied().chain(extra) {
            builder = builder.arg(arg);
        }

        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {}", e))?;

        let (browser, handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;

        drive(handler);
        Ok(browser)
    }

    async fn connect_remote(&self, url: &str) -> Result<Browser> {
        info!(
            "Connecting to remote browser at {} (timeout: {}s)",
            url, self.config.timeout
        );

        let http_url = url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let resp: serde_json::Value = reqwest::Client::new()
            .get(&version_url)
            .send()
            .await
            .context("Failed to reach remote browser")?
            .json()
            .await
            .context("Failed to parse browser version info")?;

        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("No webSocketDebuggerUrl in response"))?;

        let handler_config = chromiumoxide::handler::HandlerConfig {
            request_timeout: self.config.timeout(),
            ..Default::default()
        };

        let (browser, handler) = Browser::connect_with_config(ws_url, handler_config)
            .await
            .context("Failed to connect to remote browser")?;

        drive(handler);
        Ok(browser)
    }
}

/// Flags applied to every locally launched browser, before user-supplied ones.
#[cfg(feature = "browser")]
const LAUNCH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-dev-shm-usage",
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-background-networking",
    "--no-sandbox",
    "--disable-gpu",
];

/// Pump CDP events until the connection drops.
#[cfg(feature = "browser")]
fn drive(mut handler: chromiumoxide::Handler) {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                debug!("Browser connection closed: {}", e);
                break;
            }
        }
    });
}

// Stand-in when compiled without Chrome support
#[cfg(not(feature = "browser"))]
pub struct BrowserFetcher;

#[cfg(not(feature = "browser"))]
impl BrowserFetcher {
    pub fn new(_config: BrowserEngineConfig, _user_agent: impl Into<String>) -> Self {
        Self
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl PageRenderer for BrowserFetcher {
    async fn render(&self, url: &str, _ready_selector: &str) -> Result<String, AcquisitionError> {
        Err(AcquisitionError::BrowserUnavailable(format!(
            "cannot render {}: built without the `browser` feature",
            url
        )))
    }
}

#[cfg(all(test, not(feature = "browser")))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_render_without_browser_feature() {
        let fetcher = BrowserFetcher::new(BrowserEngineConfig::default(), "ua");
        let err = fetcher
            .render("https://shop.example.ge", ".card")
            .await
            .unwrap_err();
        assert!(matches!(err, AcquisitionError::BrowserUnavailable(_)));
    }
}
