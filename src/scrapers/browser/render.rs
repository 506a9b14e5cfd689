//! Tab lifecycle for a single render.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, NavigateParams,
};
use chromiumoxide::Page;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::stealth::STEALTH_SCRIPTS;
use super::{BrowserEngineType, BrowserFetcher, PageRenderer};
use crate::error::AcquisitionError;

/// Interval between readiness checks.
const READY_POLL: Duration = Duration::from_millis(250);

fn render_error(e: impl std::fmt::Display) -> AcquisitionError {
    AcquisitionError::Render(e.to_string())
}

impl BrowserFetcher {
    async fn render_in(
        &self,
        page: &Page,
        url: &str,
        ready_selector: &str,
        deadline: Instant,
    ) -> Result<String, AcquisitionError> {
        page.execute(SetUserAgentOverrideParams::new(self.user_agent.clone()))
            .await
            .map_err(render_error)?;

        if self.config.engine == BrowserEngineType::Stealth {
            for script in STEALTH_SCRIPTS {
                let params = AddScriptToEvaluateOnNewDocumentParams::new(script.to_string());
                if let Err(e) = page.execute(params).await {
                    debug!("Stealth script injection skipped: {}", e);
                }
            }
        }

        let nav = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| AcquisitionError::Render(format!("invalid url {}: {}", url, e)))?;

        debug!("Navigating to {}", url);
        page.execute(nav).await.map_err(render_error)?;

        wait_for_selector(page, ready_selector, deadline, self.config.timeout).await?;

        page.content().await.map_err(render_error)
    }
}

/// Poll until `selector` matches an element or `deadline` passes.
async fn wait_for_selector(
    page: &Page,
    selector: &str,
    deadline: Instant,
    timeout_secs: u64,
) -> Result<(), AcquisitionError> {
    debug!("Waiting for selector: {}", selector);
    let poll = async {
        loop {
            if page.find_element(selector).await.is_ok() {
                return;
            }
            tokio::time::sleep(READY_POLL).await;
        }
    };

    tokio::time::timeout_at(deadline, poll)
        .await
        .map_err(|_| AcquisitionError::ReadinessTimeout {
            selector: selector.to_string(),
            timeout_secs,
        })
}

/// Run `render` to completion or fail once `deadline` passes.
async fn within<T>(
    deadline: Instant,
    url: &str,
    render: impl Future<Output = Result<T, AcquisitionError>>,
) -> Result<T, AcquisitionError> {
    tokio::time::timeout_at(deadline, render)
        .await
        .map_err(|_| AcquisitionError::Render(format!("rendering {} timed out", url)))?
}

#[async_trait]
impl PageRenderer for BrowserFetcher {
    async fn render(&self, url: &str, ready_selector: &str) -> Result<String, AcquisitionError> {
        let browser = self.browser().await?;

        let opened = {
            let browser = browser.lock().await;
            browser.new_page("about:blank").await
        };
        let page = match opened {
            Ok(page) => page,
            Err(e) => {
                warn!("Failed to open tab, browser will be relaunched: {}", e);
                self.discard().await;
                return Err(render_error(e));
            }
        };

        let deadline = Instant::now() + self.config.timeout();
        let result = within(
            deadline,
            url,
            self.render_in(&page, url, ready_selector, deadline),
        )
        .await;

        if let Err(e) = page.close().await {
            debug!("Failed to close tab for {}: {}", url, e);
        }

        result
    }
}
