//! Selector-driven record extraction.
//!
//! One engine serves every source: a descriptor's [`ExtractRules`] are
//! compiled once into CSS selectors, then applied to each page's markup.
//! Rendered sources hand over a snapshot of the live DOM, paginated sources
//! hand over raw response text; both end up here.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::ConfigError;
use crate::models::{ExtractRules, FieldRule, PriceRule, Record, SourceDescriptor};

/// Compiled extraction rules for one source.
#[derive(Debug)]
pub struct RecordExtractor {
    base_url: Option<Url>,
    item: Selector,
    title: CompiledField,
    image_url: Option<CompiledField>,
    current_price: Option<CompiledPrice>,
    previous_price: Option<CompiledPrice>,
    discount_label: Option<CompiledField>,
    detail_url: Option<CompiledField>,
}

#[derive(Debug)]
struct CompiledField {
    selectors: Vec<Selector>,
    attr: Option<String>,
}

#[derive(Debug)]
enum CompiledPrice {
    Plain(CompiledField),
    Split {
        integer: CompiledField,
        fraction: CompiledField,
        unit: Option<String>,
        separator: String,
    },
}

/// Compile a selector, attributing failures to the owning source.
fn compile(source_id: &str, selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
        source_id: source_id.to_string(),
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

impl CompiledField {
    fn new(source_id: &str, rule: &FieldRule) -> Result<Self, ConfigError> {
        let selectors = rule
            .selectors
            .iter()
            .map(|s| compile(source_id, s))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            selectors,
            attr: rule.attr.clone(),
        })
    }

    /// Read the field from an item; `None` when nothing non-empty matched.
    fn read(&self, item: ElementRef<'_>) -> Option<String> {
        if self.selectors.is_empty() {
            return self.value_of(item);
        }
        self.selectors.iter().find_map(|selector| {
            item.select(selector)
                .next()
                .and_then(|el| self.value_of(el))
        })
    }

    fn value_of(&self, el: ElementRef<'_>) -> Option<String> {
        let raw = match self.attr {
            Some(ref attr) => el.value().attr(attr)?.to_string(),
            None => el.text().collect::<String>(),
        };
        let text = normalize_text(&raw);
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

impl CompiledPrice {
    fn new(source_id: &str, rule: &PriceRule) -> Result<Self, ConfigError> {
        Ok(match rule {
            PriceRule::Plain(field) => CompiledPrice::Plain(CompiledField::new(source_id, field)?),
            PriceRule::Split {
                integer,
                fraction,
                unit,
                separator,
            } => CompiledPrice::Split {
                integer: CompiledField::new(source_id, integer)?,
                fraction: CompiledField::new(source_id, fraction)?,
                unit: unit.clone(),
                separator: separator.clone(),
            },
        })
    }

    fn read(&self, item: ElementRef<'_>) -> Option<String> {
        match self {
            CompiledPrice::Plain(field) => field.read(item),
            CompiledPrice::Split {
                integer,
                fraction,
                unit,
                separator,
            } => {
                let integer = integer.read(item)?;
                let fraction = fraction.read(item);
                Some(join_price_parts(
                    &integer,
                    fraction.as_deref(),
                    separator,
                    unit.as_deref(),
                ))
            }
        }
    }
}

impl RecordExtractor {
    /// Compile a descriptor's extraction rules.
    pub fn new(descriptor: &SourceDescriptor) -> Result<Self, ConfigError> {
        let base_url = Url::parse(&descriptor.base_url).ok();
        Self::from_rules(&descriptor.id, &descriptor.extract, base_url)
    }

    /// Compile extraction rules directly.
    pub fn from_rules(
        source_id: &str,
        rules: &ExtractRules,
        base_url: Option<Url>,
    ) -> Result<Self, ConfigError> {
        let field = |rule: &Option<FieldRule>| {
            rule.as_ref()
                .map(|r| CompiledField::new(source_id, r))
                .transpose()
        };
        let price = |rule: &Option<PriceRule>| {
            rule.as_ref()
                .map(|r| CompiledPrice::new(source_id, r))
                .transpose()
        };

        Ok(Self {
            base_url,
            item: compile(source_id, &rules.item)?,
            title: CompiledField::new(source_id, &rules.title)?,
            image_url: field(&rules.image_url)?,
            current_price: price(&rules.current_price)?,
            previous_price: price(&rules.previous_price)?,
            discount_label: field(&rules.discount_label)?,
            detail_url: field(&rules.detail_url)?,
        })
    }

    /// Extract records from a page, in document order.
    ///
    /// Items without an identifying title are skipped. An empty result is not
    /// an error; for paginated sources it marks the end of the listing.
    pub fn extract(&self, html: &str) -> Vec<Record> {
        let document = Html::parse_document(html);
        document
            .select(&self.item)
            .filter_map(|item| self.extract_item(item))
            .collect()
    }

    fn extract_item(&self, item: ElementRef<'_>) -> Option<Record> {
        let title = self.title.read(item)?;

        let record = Record {
            title: Some(title),
            image_url: self
                .image_url
                .as_ref()
                .and_then(|f| f.read(item))
                .map(|u| self.resolve(&u)),
            current_price: self.current_price.as_ref().and_then(|p| p.read(item)),
            previous_price: self.previous_price.as_ref().and_then(|p| p.read(item)),
            discount_label: self.discount_label.as_ref().and_then(|f| f.read(item)),
            detail_url: self
                .detail_url
                .as_ref()
                .and_then(|f| f.read(item))
                .map(|u| self.resolve(&u)),
        };

        record.is_identifiable().then_some(record)
    }

    /// Resolve a possibly relative link against the source base URL.
    fn resolve(&self, link: &str) -> String {
        if link.starts_with("http://") || link.starts_with("https://") || link.starts_with("data:")
        {
            return link.to_string();
        }
        self.base_url
            .as_ref()
            .and_then(|base| base.join(link).ok())
            .map(|u| u.to_string())
            .unwrap_or_else(|| link.to_string())
    }
}

/// Trim and collapse runs of whitespace into single spaces.
pub fn normalize_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Join separately rendered price fragments into one text price.
///
/// `("12", Some("50"), ".", Some("₾"))` becomes `"12.50 ₾"`.
pub fn join_price_parts(
    integer: &str,
    fraction: Option<&str>,
    separator: &str,
    unit: Option<&str>,
) -> String {
    let integer = integer.trim().trim_end_matches(['.', ',']);
    let fraction = fraction
        .map(|f| f.trim().trim_start_matches(['.', ',']))
        .filter(|f| !f.is_empty());

    let mut price = match fraction {
        Some(frac) => format!("{}{}{}", integer, separator, frac),
        None => integer.to_string(),
    };
    if let Some(unit) = unit.filter(|u| !u.is_empty()) {
        price.push(' ');
        price.push_str(unit);
    }
    price
}
