//! HTTP client for fetching listing markup.

mod user_agent;

pub use user_agent::{browser_user_agent, resolve_user_agent, USER_AGENT};

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::AcquisitionError;

/// Source of raw page text, one URL at a time.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch a page body. Non-success statuses are errors.
    async fn get_text(&self, url: &str) -> Result<String, AcquisitionError>;
}

/// reqwest-backed page fetcher shared by all markup sources.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    user_agent: String,
}

impl HttpClient {
    /// Create a client.
    ///
    /// `user_agent` follows [`resolve_user_agent`]; `proxy` accepts any URL
    /// reqwest understands, including `socks5://`.
    pub fn new(
        timeout: Duration,
        user_agent: Option<&str>,
        proxy: Option<&str>,
    ) -> Result<Self, reqwest::Error> {
        let user_agent = resolve_user_agent(user_agent);
        let mut builder = Client::builder()
            .user_agent(&user_agent)
            .timeout(timeout)
            .gzip(true)
            .brotli(true);

        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(Self {
            client: builder.build()?,
            user_agent,
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn get_text(&self, url: &str) -> Result<String, AcquisitionError> {
        let start = Instant::now();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AcquisitionError::network(url, &e))?;

        let status = response.status();
        debug!("GET {} -> {} in {:?}", url, status.as_u16(), start.elapsed());

        if !status.is_success() {
            return Err(AcquisitionError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| AcquisitionError::network(url, &e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_resolves_user_agent() {
        let client = HttpClient::new(Duration::from_secs(5), Some("PriceBot/2.0"), None).unwrap();
        assert_eq!(client.user_agent(), "PriceBot/2.0");
    }

    #[test]
    fn test_socks_proxy_accepted() {
        let client = HttpClient::new(
            Duration::from_secs(5),
            None,
            Some("socks5://127.0.0.1:9050"),
        );
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let client = HttpClient::new(Duration::from_secs(2), None, None).unwrap();
        let err = client.get_text("http://127.0.0.1:9/sale").await.unwrap_err();
        assert!(matches!(err, AcquisitionError::Network { .. }));
    }
}
