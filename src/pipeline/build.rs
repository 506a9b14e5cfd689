//! Wiring a pipeline from resolved settings.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use super::{Pipeline, TtlCache};
use crate::config::Settings;
use crate::scrapers::{
    AdapterContext, BrowserFetcher, ConfigurableAdapter, HttpClient, PageRenderer, SourceAdapter,
};

impl Pipeline {
    /// Build adapters for every configured source behind a fresh cache.
    ///
    /// All selectors are compiled here, so a broken descriptor fails startup
    /// rather than the first request for it.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let http = HttpClient::new(
            settings.request_timeout,
            settings.user_agent.as_deref(),
            settings.proxy.as_deref(),
        )
        .context("Failed to create HTTP client")?;

        let renderer: Arc<dyn PageRenderer> = Arc::new(BrowserFetcher::new(
            settings.browser.clone(),
            http.user_agent(),
        ));

        let ctx = AdapterContext {
            fetcher: Arc::new(http),
            renderer,
            max_pages: settings.max_pages,
            page_delay: settings.page_delay,
        };

        let adapters = settings
            .sources
            .iter()
            .map(|descriptor| {
                ConfigurableAdapter::new(descriptor.clone(), &ctx)
                    .map(|adapter| Arc::new(adapter) as Arc<dyn SourceAdapter>)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let pipeline = Pipeline::with_adapters(Arc::new(TtlCache::new(settings.cache_ttl)), adapters)?;
        info!(
            "Pipeline ready with {} sources (cache ttl {:?})",
            pipeline.source_ids().len(),
            settings.cache_ttl
        );
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_builds() {
        let pipeline = Pipeline::from_settings(&Settings::default()).unwrap();
        assert_eq!(pipeline.source_ids(), ["2nabiji", "nikora", "libre"]);
        assert_eq!(pipeline.cache().ttl(), Settings::default().cache_ttl);
    }

    #[test]
    fn test_duplicate_source_ids_fail() {
        let mut settings = Settings::default();
        let dup = settings.sources[1].clone();
        settings.sources.push(dup);

        let err = Pipeline::from_settings(&settings).err().unwrap();
        assert!(err.to_string().contains("Duplicate source id"));
    }
}
