//! Source descriptors.
//!
//! A descriptor declares everything needed to acquire one retail site:
//! where its listings live, how they are acquired (rendered in a browser or
//! fetched as paginated markup), and which selectors pull each record field
//! out of a listing item. Descriptors are built once at startup and never
//! mutated afterwards.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

/// Placeholder substituted with the 1-based page number in page templates.
pub const PAGE_PLACEHOLDER: &str = "{page}";

/// Immutable configuration for one external source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Source identifier (taken from the config map key when omitted).
    #[serde(default)]
    pub id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Base URL used to resolve relative links and images.
    pub base_url: String,
    #[serde(flatten)]
    pub strategy: Strategy,
    /// Selector rules for turning listing items into records.
    pub extract: ExtractRules,
}

impl SourceDescriptor {
    /// Display name, falling back to the identifier.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Check structural invariants that selectors alone can't catch.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::InvalidSource {
                source_id: self.id.clone(),
                reason: "source id must not be empty".to_string(),
            });
        }

        Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidSource {
            source_id: self.id.clone(),
            reason: format!("invalid base_url '{}': {}", self.base_url, e),
        })?;

        match &self.strategy {
            Strategy::RenderedSingle { url, ready_selector } => {
                Url::parse(url).map_err(|e| ConfigError::InvalidSource {
                    source_id: self.id.clone(),
                    reason: format!("invalid url '{}': {}", url, e),
                })?;
                if ready_selector.trim().is_empty() {
                    return Err(ConfigError::InvalidSource {
                        source_id: self.id.clone(),
                        reason: "ready_selector must not be empty".to_string(),
                    });
                }
            }
            Strategy::PaginatedMarkup {
                page_url_template,
                max_pages,
                ..
            } => {
                if !page_url_template.contains(PAGE_PLACEHOLDER) {
                    return Err(ConfigError::InvalidSource {
                        source_id: self.id.clone(),
                        reason: format!(
                            "page_url_template '{}' has no {} placeholder",
                            page_url_template, PAGE_PLACEHOLDER
                        ),
                    });
                }
                if *max_pages == Some(0) {
                    return Err(ConfigError::InvalidSource {
                        source_id: self.id.clone(),
                        reason: "max_pages must be at least 1".to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Acquisition strategy for a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum Strategy {
    /// Load one script-heavy page in a browser and extract from the live DOM.
    RenderedSingle {
        /// Page to render.
        url: String,
        /// Selector whose presence means the listing has rendered.
        ready_selector: String,
    },
    /// Fetch raw markup page by page until a page yields no records.
    PaginatedMarkup {
        /// Page URL with a `{page}` placeholder (1-based).
        page_url_template: String,
        /// Per-source pagination cap (falls back to the global setting).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_pages: Option<u32>,
        /// Delay between page fetches in milliseconds (falls back to the global setting).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        page_delay_ms: Option<u64>,
    },
}

impl Strategy {
    /// Tag name as written in configuration.
    pub fn kind(&self) -> &'static str {
        match self {
            Strategy::RenderedSingle { .. } => "rendered-single",
            Strategy::PaginatedMarkup { .. } => "paginated-markup",
        }
    }
}

/// Selector rules for one source's listing items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractRules {
    /// Selector matching each listing item.
    pub item: String,
    /// Identifying field; items without it are dropped.
    pub title: FieldRule,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<FieldRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_price: Option<PriceRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_price: Option<PriceRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_label: Option<FieldRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail_url: Option<FieldRule>,
}

/// How to read one field from a listing item.
///
/// Selectors are tried in order and the first one that yields a non-empty
/// value wins. An empty selector list reads the item element itself. When
/// `attr` is set the attribute value is used, otherwise the element text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "FieldRuleRepr")]
pub struct FieldRule {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub selectors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attr: Option<String>,
}

impl FieldRule {
    /// Text of the first element matching `selector`.
    pub fn text(selector: &str) -> Self {
        Self {
            selectors: vec![selector.to_string()],
            attr: None,
        }
    }

    /// Attribute of the first element matching `selector`.
    pub fn attr(selector: &str, attr: &str) -> Self {
        Self {
            selectors: vec![selector.to_string()],
            attr: Some(attr.to_string()),
        }
    }

    /// Attribute of the item element itself.
    pub fn own_attr(attr: &str) -> Self {
        Self {
            selectors: Vec::new(),
            attr: Some(attr.to_string()),
        }
    }
}

/// Accepts either a bare selector string or the full rule table.
#[derive(Deserialize)]
#[serde(untagged)]
enum FieldRuleRepr {
    Selector(String),
    Full {
        #[serde(default)]
        selector: Option<String>,
        #[serde(default)]
        selectors: Vec<String>,
        #[serde(default)]
        attr: Option<String>,
    },
}

impl From<FieldRuleRepr> for FieldRule {
    fn from(repr: FieldRuleRepr) -> Self {
        match repr {
            FieldRuleRepr::Selector(s) => FieldRule::text(&s),
            FieldRuleRepr::Full {
                selector,
                mut selectors,
                attr,
            } => {
                if let Some(s) = selector {
                    selectors.insert(0, s);
                }
                FieldRule { selectors, attr }
            }
        }
    }
}

/// How to read a price field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PriceRule {
    /// Integer and fractional parts rendered in separate elements.
    Split {
        integer: FieldRule,
        fraction: FieldRule,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unit: Option<String>,
        #[serde(default = "default_separator")]
        separator: String,
    },
    /// Price already rendered as a single text node.
    Plain(FieldRule),
}

fn default_separator() -> String {
    ".".to_string()
}
