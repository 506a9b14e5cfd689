//! Acquisition pipeline: TTL cache in front of the source adapters.

mod build;
pub mod cache;
mod orchestrator;

pub use cache::{CacheStats, TtlCache, DEFAULT_TTL};
pub use orchestrator::{Pipeline, Resolved};

#[cfg(test)]
pub(crate) use orchestrator::tests::{pipeline as fake_pipeline, FakeAdapter};
