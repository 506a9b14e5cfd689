//! Data models for dealfeed.

mod record;
mod source;

pub use record::Record;
pub use source::{ExtractRules, FieldRule, PriceRule, SourceDescriptor, Strategy, PAGE_PLACEHOLDER};
