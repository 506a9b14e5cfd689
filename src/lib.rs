//! dealfeed - discounted product feed aggregated from retail sites.
//!
//! Each configured source is acquired either by rendering a single listing
//! page in a headless browser or by walking paginated markup. Results are
//! normalized into [`models::Record`]s, cached per source for a short TTL and
//! served over HTTP behind a per-client throttle.

pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod scrapers;
pub mod server;
pub mod throttle;
