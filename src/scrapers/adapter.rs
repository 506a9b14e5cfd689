//! Source adapters: one uniform `fetch() -> records` contract per source.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::browser::PageRenderer;
use super::extract::RecordExtractor;
use super::http_client::PageFetcher;
use super::pagination::PaginationWalker;
use crate::error::{AcquisitionError, ConfigError};
use crate::models::{Record, SourceDescriptor, Strategy};

/// Acquires the current listings of one source.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Source identifier.
    fn id(&self) -> &str;

    /// Fetch and extract every record the source currently lists.
    async fn fetch(&self) -> Result<Vec<Record>, AcquisitionError>;
}

/// Shared collaborators and defaults used to build adapters.
#[derive(Clone)]
pub struct AdapterContext {
    pub fetcher: Arc<dyn PageFetcher>,
    pub renderer: Arc<dyn PageRenderer>,
    /// Pagination cap for sources that don't set their own.
    pub max_pages: u32,
    /// Delay between page fetches for sources that don't set their own.
    pub page_delay: Duration,
}

/// Adapter driven entirely by a [`SourceDescriptor`].
pub struct ConfigurableAdapter {
    descriptor: SourceDescriptor,
    extractor: RecordExtractor,
    fetcher: Arc<dyn PageFetcher>,
    renderer: Arc<dyn PageRenderer>,
    walker: PaginationWalker,
}

impl ConfigurableAdapter {
    /// Validate the descriptor and compile its selectors.
    pub fn new(descriptor: SourceDescriptor, ctx: &AdapterContext) -> Result<Self, ConfigError> {
        descriptor.validate()?;
        let extractor = RecordExtractor::new(&descriptor)?;

        let walker = match descriptor.strategy {
            Strategy::PaginatedMarkup {
                max_pages,
                page_delay_ms,
                ..
            } => PaginationWalker::new(
                max_pages.unwrap_or(ctx.max_pages),
                page_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(ctx.page_delay),
            ),
            Strategy::RenderedSingle { .. } => PaginationWalker::new(1, Duration::ZERO),
        };

        Ok(Self {
            descriptor,
            extractor,
            fetcher: ctx.fetcher.clone(),
            renderer: ctx.renderer.clone(),
            walker,
        })
    }

    async fn fetch_rendered(
        &self,
        url: &str,
        ready_selector: &str,
    ) -> Result<Vec<Record>, AcquisitionError> {
        let html = self.renderer.render(url, ready_selector).await?;
        let records = self.extractor.extract(&html);
        debug!("{}: rendered page yielded {} records", self.descriptor.id, records.len());
        Ok(records)
    }

    async fn fetch_paginated(&self, template: &str) -> Result<Vec<Record>, AcquisitionError> {
        let fetcher = &self.fetcher;
        let extractor = &self.extractor;

        self.walker
            .walk(&self.descriptor.id, template, move |_, url| async move {
                let html = fetcher.get_text(&url).await?;
                Ok(extractor.extract(&html))
            })
            .await
    }
}

#[async_trait]
impl SourceAdapter for ConfigurableAdapter {
    fn id(&self) -> &str {
        &self.descriptor.id
    }

    async fn fetch(&self) -> Result<Vec<Record>, AcquisitionError> {
        match &self.descriptor.strategy {
            Strategy::RenderedSingle {
                url,
                ready_selector,
            } => self.fetch_rendered(url, ready_selector).await,
            Strategy::PaginatedMarkup {
                page_url_template, ..
            } => self.fetch_paginated(page_url_template).await,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{ExtractRules, FieldRule, PriceRule};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned pages and records which URLs were requested.
    #[derive(Default)]
    pub(crate) struct FakeFetcher {
        pub pages: HashMap<String, Result<String, AcquisitionError>>,
        pub requested: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        pub fn with_page(mut self, url: &str, html: String) -> Self {
            self.pages.insert(url.to_string(), Ok(html));
            self
        }

        pub fn with_error(mut self, url: &str, err: AcquisitionError) -> Self {
            self.pages.insert(url.to_string(), Err(err));
            self
        }

        pub fn requested(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn get_text(&self, url: &str) -> Result<String, AcquisitionError> {
            self.requested.lock().unwrap().push(url.to_string());
            self.pages
                .get(url)
                .cloned()
                .unwrap_or_else(|| Ok("<html><body></body></html>".to_string()))
        }
    }

    /// Renders a fixed document, or times out when the selector is absent.
    pub(crate) struct FakeRenderer {
        pub html: String,
        pub renders: Mutex<u32>,
    }

    impl FakeRenderer {
        pub fn new(html: String) -> Self {
            Self {
                html,
                renders: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl PageRenderer for FakeRenderer {
        async fn render(&self, _url: &str, ready_selector: &str) -> Result<String, AcquisitionError> {
            *self.renders.lock().unwrap() += 1;
            let ready = scraper::Selector::parse(ready_selector)
                .map(|s| scraper::Html::parse_document(&self.html).select(&s).next().is_some())
                .unwrap_or(false);
            if ready {
                Ok(self.html.clone())
            } else {
                Err(AcquisitionError::ReadinessTimeout {
                    selector: ready_selector.to_string(),
                    timeout_secs: 30,
                })
            }
        }
    }

    pub(crate) fn card_page(titles: &[&str]) -> String {
        let cards: String = titles
            .iter()
            .map(|t| {
                format!(
                    r#"<div class="card"><h3>{}</h3><span class="int">9</span><span class="dec">99</span></div>"#,
                    t
                )
            })
            .collect();
        format!("<html><body>{}</body></html>", cards)
    }

    pub(crate) fn card_rules() -> ExtractRules {
        ExtractRules {
            item: ".card".to_string(),
            title: FieldRule::text("h3"),
            image_url: None,
            current_price: Some(PriceRule::Split {
                integer: FieldRule::text(".int"),
                fraction: FieldRule::text(".dec"),
                unit: Some("₾".to_string()),
                separator: ".".to_string(),
            }),
            previous_price: None,
            discount_label: None,
            detail_url: None,
        }
    }

    pub(crate) fn paginated(id: &str) -> SourceDescriptor {
        SourceDescriptor {
            id: id.to_string(),
            name: None,
            base_url: "https://shop.example.ge".to_string(),
            strategy: Strategy::PaginatedMarkup {
                page_url_template: "https://shop.example.ge/sale?page={page}".to_string(),
                max_pages: None,
                page_delay_ms: Some(0),
            },
            extract: card_rules(),
        }
    }

    pub(crate) fn rendered(id: &str) -> SourceDescriptor {
        SourceDescriptor {
            id: id.to_string(),
            name: None,
            base_url: "https://render.example.ge".to_string(),
            strategy: Strategy::RenderedSingle {
                url: "https://render.example.ge/deals".to_string(),
                ready_selector: ".card".to_string(),
            },
            extract: card_rules(),
        }
    }

    fn context(fetcher: Arc<FakeFetcher>, renderer: Arc<FakeRenderer>) -> AdapterContext {
        AdapterContext {
            fetcher,
            renderer,
            max_pages: 50,
            page_delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_paginated_adapter_walks_until_empty() {
        let fetcher = Arc::new(
            FakeFetcher::default()
                .with_page("https://shop.example.ge/sale?page=1", card_page(&["a", "b"]))
                .with_page("https://shop.example.ge/sale?page=2", card_page(&["c"])),
        );
        let renderer = Arc::new(FakeRenderer::new(String::new()));
        let adapter =
            ConfigurableAdapter::new(paginated("shop"), &context(fetcher.clone(), renderer)).unwrap();

        let records = adapter.fetch().await.unwrap();

        let titles: Vec<_> = records.iter().filter_map(|r| r.title.as_deref()).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
        assert_eq!(records[0].current_price.as_deref(), Some("9.99 ₾"));
        assert_eq!(fetcher.requested().len(), 3);
    }

    #[tokio::test]
    async fn test_per_source_cap_overrides_default() {
        let mut desc = paginated("shop");
        desc.strategy = Strategy::PaginatedMarkup {
            page_url_template: "https://shop.example.ge/all?p={page}".to_string(),
            max_pages: Some(2),
            page_delay_ms: Some(0),
        };
        let fetcher = Arc::new(
            FakeFetcher::default()
                .with_page("https://shop.example.ge/all?p=1", card_page(&["a"]))
                .with_page("https://shop.example.ge/all?p=2", card_page(&["b"]))
                .with_page("https://shop.example.ge/all?p=3", card_page(&["c"])),
        );
        let renderer = Arc::new(FakeRenderer::new(String::new()));
        let adapter = ConfigurableAdapter::new(desc, &context(fetcher.clone(), renderer)).unwrap();

        assert_eq!(adapter.fetch().await.unwrap().len(), 2);
        assert_eq!(fetcher.requested().len(), 2);
    }

    #[tokio::test]
    async fn test_paginated_status_error_fails_acquisition() {
        let fetcher = Arc::new(
            FakeFetcher::default()
                .with_page("https://shop.example.ge/sale?page=1", card_page(&["a"]))
                .with_error(
                    "https://shop.example.ge/sale?page=2",
                    AcquisitionError::Status {
                        url: "https://shop.example.ge/sale?page=2".to_string(),
                        status: 503,
                    },
                ),
        );
        let renderer = Arc::new(FakeRenderer::new(String::new()));
        let adapter =
            ConfigurableAdapter::new(paginated("shop"), &context(fetcher, renderer)).unwrap();

        let err = adapter.fetch().await.unwrap_err();
        assert!(matches!(err, AcquisitionError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_rendered_adapter_extracts_from_snapshot() {
        let fetcher = Arc::new(FakeFetcher::default());
        let renderer = Arc::new(FakeRenderer::new(card_page(&["x", "y"])));
        let adapter = ConfigurableAdapter::new(
            rendered("render"),
            &context(fetcher.clone(), renderer.clone()),
        )
        .unwrap();

        let records = adapter.fetch().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(*renderer.renders.lock().unwrap(), 1);
        assert!(fetcher.requested().is_empty());
    }

    #[tokio::test]
    async fn test_rendered_readiness_timeout_is_error() {
        let fetcher = Arc::new(FakeFetcher::default());
        let renderer = Arc::new(FakeRenderer::new(
            "<html><body><p>loading</p></body></html>".to_string(),
        ));
        let adapter =
            ConfigurableAdapter::new(rendered("render"), &context(fetcher, renderer)).unwrap();

        let err = adapter.fetch().await.unwrap_err();
        assert!(matches!(err, AcquisitionError::ReadinessTimeout { .. }));
    }

    #[test]
    fn test_invalid_selector_rejected_at_construction() {
        let mut desc = paginated("shop");
        desc.extract.title = FieldRule::text("h3[");
        let ctx = context(
            Arc::new(FakeFetcher::default()),
            Arc::new(FakeRenderer::new(String::new())),
        );

        let err = ConfigurableAdapter::new(desc, &ctx).err().unwrap();
        assert!(matches!(err, ConfigError::InvalidSelector { .. }));
    }
}
