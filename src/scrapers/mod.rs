//! Acquisition of listings from external retail sites.

pub mod adapter;
pub mod browser;
pub mod extract;
pub mod http_client;
pub mod pagination;

pub use adapter::{AdapterContext, ConfigurableAdapter, SourceAdapter};
pub use browser::{BrowserEngineConfig, BrowserEngineType, BrowserFetcher, PageRenderer};
pub use extract::RecordExtractor;
pub use http_client::{HttpClient, PageFetcher};
pub use pagination::PaginationWalker;
