//! Walking paginated listings.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::AcquisitionError;
use crate::models::{Record, PAGE_PLACEHOLDER};

/// Walks a 1-based page sequence until a page comes back empty.
#[derive(Debug, Clone, Copy)]
pub struct PaginationWalker {
    max_pages: u32,
    page_delay: Duration,
}

impl PaginationWalker {
    /// Create a walker capped at `max_pages` pages (minimum 1).
    pub fn new(max_pages: u32, page_delay: Duration) -> Self {
        Self {
            max_pages: max_pages.max(1),
            page_delay,
        }
    }

    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }

    /// Fetch and extract pages in order, concatenating their records.
    ///
    /// `fetch_page` receives the page number and its URL. The walk ends at
    /// the first page that yields no records. Reaching the page cap ends the
    /// walk with whatever was gathered; a fetch error aborts it.
    pub async fn walk<F, Fut>(
        &self,
        source_id: &str,
        template: &str,
        mut fetch_page: F,
    ) -> Result<Vec<Record>, AcquisitionError>
    where
        F: FnMut(u32, String) -> Fut,
        Fut: Future<Output = Result<Vec<Record>, AcquisitionError>>,
    {
        let mut records = Vec::new();

        for page in 1..=self.max_pages {
            if page > 1 && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }

            let url = page_url(template, page);
            let batch = fetch_page(page, url).await?;

            if batch.is_empty() {
                debug!(
                    "{}: page {} is empty, {} records over {} pages",
                    source_id,
                    page,
                    records.len(),
                    page - 1
                );
                return Ok(records);
            }

            debug!("{}: page {} yielded {} records", source_id, page, batch.len());
            records.extend(batch);
        }

        warn!(
            "{}: stopped at page cap ({}) with {} records",
            source_id,
            self.max_pages,
            records.len()
        );
        Ok(records)
    }
}

/// Substitute the page number into a page URL template.
pub fn page_url(template: &str, page: u32) -> String {
    template.replace(PAGE_PLACEHOLDER, &page.to_string())
}
