//! Normalized product observation.

use serde::{Deserialize, Serialize};

/// One discounted product extracted from a source page.
///
/// Every field is optional because sources expose different subsets of
/// information. Prices stay in the source's own text format ("12.50 ₾");
/// parsing them into numbers is left to consumers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail_url: Option<String>,
}

impl Record {
    /// Create a record carrying only its identifying title.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    /// Whether the record has enough text to tell it apart from others.
    pub fn is_identifiable(&self) -> bool {
        self.title
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty())
    }
}
