//! Built-in source descriptors used when the config file declares none.

use crate::models::{ExtractRules, FieldRule, PriceRule, SourceDescriptor, Strategy};

const LARI: &str = "₾";

/// Descriptors for the supported stores, in display order.
pub fn builtin_sources() -> Vec<SourceDescriptor> {
    vec![two_nabiji(), nikora(), libre()]
}

fn two_nabiji() -> SourceDescriptor {
    SourceDescriptor {
        id: "2nabiji".to_string(),
        name: Some("2 Nabiji".to_string()),
        base_url: "https://www.2nabiji.ge".to_string(),
        strategy: Strategy::RenderedSingle {
            url: "https://www.2nabiji.ge/ge/search?searchId=64c19575b3118b3676d26898".to_string(),
            ready_selector: ".ProductCard_container__7IE0M".to_string(),
        },
        extract: ExtractRules {
            item: ".ProductCard_container__7IE0M".to_string(),
            title: FieldRule::attr(".ProductCard_title__Rpp75 span", "title"),
            image_url: Some(FieldRule::attr("img", "src")),
            current_price: Some(PriceRule::Plain(FieldRule::text(
                ".ProductCard_productInfo__price__NyCJR span",
            ))),
            previous_price: Some(PriceRule::Plain(FieldRule::text(
                ".ProductCard_productInfo__price_discount__CXdp2 span",
            ))),
            discount_label: Some(FieldRule::text(".Label_label__EnQXP")),
            detail_url: Some(FieldRule::attr("a", "href")),
        },
    }
}

fn nikora() -> SourceDescriptor {
    SourceDescriptor {
        id: "nikora".to_string(),
        name: Some("Nikora".to_string()),
        base_url: "https://nikorasupermarket.ge".to_string(),
        strategy: Strategy::PaginatedMarkup {
            page_url_template: "https://nikorasupermarket.ge/ka/aqciebi?page={page}".to_string(),
            max_pages: None,
            page_delay_ms: None,
        },
        extract: ExtractRules {
            item: ".product-card".to_string(),
            title: FieldRule {
                selectors: vec![
                    ".product-card__title".to_string(),
                    ".product-card__name".to_string(),
                ],
                attr: None,
            },
            image_url: Some(FieldRule {
                selectors: vec!["img".to_string()],
                attr: Some("src".to_string()),
            }),
            current_price: Some(PriceRule::Split {
                integer: FieldRule::text(".product-card__price-int"),
                fraction: FieldRule::text(".product-card__price-dec"),
                unit: Some(LARI.to_string()),
                separator: ".".to_string(),
            }),
            previous_price: Some(PriceRule::Plain(FieldRule::text(
                ".product-card__price--old",
            ))),
            discount_label: Some(FieldRule::text(".product-card__badge")),
            detail_url: Some(FieldRule::attr("a", "href")),
        },
    }
}

fn libre() -> SourceDescriptor {
    SourceDescriptor {
        id: "libre".to_string(),
        name: Some("Libre".to_string()),
        base_url: "https://libre.ge".to_string(),
        strategy: Strategy::PaginatedMarkup {
            page_url_template: "https://libre.ge/ka/sale?page={page}".to_string(),
            max_pages: None,
            page_delay_ms: None,
        },
        extract: ExtractRules {
            item: ".product-item".to_string(),
            title: FieldRule::text(".product-item__title"),
            image_url: Some(FieldRule::attr(".product-item__image img", "src")),
            current_price: Some(PriceRule::Split {
                integer: FieldRule::text(".price-new .price-lari"),
                fraction: FieldRule::text(".price-new .price-tetri"),
                unit: Some(LARI.to_string()),
                separator: ".".to_string(),
            }),
            previous_price: Some(PriceRule::Split {
                integer: FieldRule::text(".price-old .price-lari"),
                fraction: FieldRule::text(".price-old .price-tetri"),
                unit: Some(LARI.to_string()),
                separator: ".".to_string(),
            }),
            discount_label: Some(FieldRule::text(".product-item__discount")),
            detail_url: Some(FieldRule::attr("a.product-item__link", "href")),
        },
    }
}
