//! Product record extraction.
//!
//! Applies a [`RuleSet`] to a parsed document and produces structured
//! product records. Extraction fails loudly — [`NoContainerMatch`] when
//! the item selector finds nothing, [`EmptyResult`] when no container
//! yields a usable name — so the self-heal loop has a clear signal to act
//! on. Price parsing failures, by contrast, degrade to a null price with
//! the raw text retained.
//!
//! [`NoContainerMatch`]: crate::PricewatchError::NoContainerMatch
//! [`EmptyResult`]: crate::PricewatchError::EmptyResult

use serde::{Deserialize, Serialize};
use url::Url;

use crate::dom::Document;
use crate::rules::RuleSet;
use crate::scoring::Field;
use crate::selector::select_alternatives;
use crate::{PricewatchError, Result};

/// One extracted product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    /// Product name, non-empty after trimming.
    pub name: String,
    /// Absolute product URL; the page URL itself when no link was found.
    pub url: String,
    /// Parsed numeric price. `None` when the price text was missing or
    /// unparsable — never a reason to drop the record.
    pub price: Option<f64>,
    /// Original price text, retained for audit.
    pub raw_price: Option<String>,
    /// Absolute image URLs found inside the container.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

/// Normalizes a price string to a number.
///
/// Strips everything except digits, comma, and period, then treats comma
/// as a decimal separator. `"1 299,00 грн"` parses to `1299.0`; text with
/// a thousands separator like `"1,299.00"` does not parse and yields
/// `None` — this mirrors the established normalization downstream
/// consumers already compensate for.
pub fn parse_price(text: &str) -> Option<f64> {
    let normalized: String =
        text.chars().filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.').collect();
    normalized.replace(',', ".").parse::<f64>().ok()
}

/// Text of the first alternative whose match has non-empty trimmed text.
fn first_text(doc: &Document, scope: usize, alternatives: &str) -> Result<String> {
    for alt in alternatives.split(',') {
        if alt.trim().is_empty() {
            continue;
        }
        if let Some(id) = doc.select_first_in(scope, alt)? {
            let text = doc.all_text(id).trim().to_string();
            if !text.is_empty() {
                return Ok(text);
            }
        }
    }
    Ok(String::new())
}

/// Href of the first alternative whose match carries one.
fn first_href(doc: &Document, scope: usize, alternatives: &str) -> Result<Option<String>> {
    for alt in alternatives.split(',') {
        if alt.trim().is_empty() {
            continue;
        }
        if let Some(id) = doc.select_first_in(scope, alt)?
            && let Some(href) = doc.node(id).attr("href")
            && !href.is_empty()
        {
            return Ok(Some(href.to_string()));
        }
    }
    Ok(None)
}

/// Resolves a possibly-relative link against the page URL.
fn absolutize(page_url: &Url, href: &str) -> String {
    page_url.join(href).map(|u| u.to_string()).unwrap_or_else(|_| page_url.to_string())
}

/// Extracts product records from a parsed category page.
///
/// # Errors
///
/// - [`PricewatchError::NoContainerMatch`] when no alternative of the item
///   selector matches anything.
/// - [`PricewatchError::EmptyResult`] when containers matched but none
///   yielded a record with a usable name.
/// - [`PricewatchError::InvalidSelector`] when a rule is malformed.
pub fn extract_products(
    doc: &Document, rules: &RuleSet, page_url: &Url,
) -> Result<Vec<ProductRecord>> {
    let item_selector = rules.effective(Field::Item);
    let containers = select_alternatives(doc, doc.root(), item_selector)?;
    if containers.is_empty() {
        return Err(PricewatchError::NoContainerMatch(item_selector.to_string()));
    }

    let mut records = Vec::new();
    for container in containers {
        let name = first_text(doc, container, rules.effective(Field::Name))?;
        if name.is_empty() {
            continue;
        }

        let raw_price = first_text(doc, container, rules.effective(Field::Price))?;
        let price = parse_price(&raw_price);

        let link = first_href(doc, container, rules.effective(Field::Url))?;
        let url = match link {
            Some(href) => absolutize(page_url, &href),
            None => page_url.to_string(),
        };

        let images = doc
            .select_in(container, "img")?
            .into_iter()
            .filter_map(|id| doc.node(id).attr("src"))
            .filter(|src| !src.is_empty())
            .map(|src| absolutize(page_url, src))
            .collect();

        records.push(ProductRecord {
            name,
            url,
            price,
            raw_price: if raw_price.is_empty() { None } else { Some(raw_price) },
            images,
        });
    }

    if records.is_empty() {
        return Err(PricewatchError::EmptyResult);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn page_url() -> Url {
        Url::parse("https://shop.example/ua/tools").unwrap()
    }

    const CATALOG_HTML: &str = r#"
        <div class="catalog">
            <div class="product-card">
                <h2>Cordless Drill X20</h2>
                <span class="price">1 299,00 грн</span>
                <a href="/p/drill-x20">details</a>
                <img src="/img/drill.jpg" />
            </div>
            <div class="product-card">
                <h2>Hammer Pro</h2>
                <span class="price">call for price</span>
            </div>
        </div>
    "#;

    #[test]
    fn test_extract_with_default_rules() {
        let doc = Document::parse(CATALOG_HTML);
        let records = extract_products(&doc, &RuleSet::new(), &page_url()).unwrap();
        assert_eq!(records.len(), 2);

        let drill = &records[0];
        assert_eq!(drill.name, "Cordless Drill X20");
        assert_eq!(drill.price, Some(1299.0));
        assert_eq!(drill.raw_price.as_deref(), Some("1 299,00 грн"));
        assert_eq!(drill.url, "https://shop.example/p/drill-x20");
        assert_eq!(drill.images, vec!["https://shop.example/img/drill.jpg"]);
    }

    #[test]
    fn test_unparsable_price_keeps_record() {
        let doc = Document::parse(CATALOG_HTML);
        let records = extract_products(&doc, &RuleSet::new(), &page_url()).unwrap();

        let hammer = &records[1];
        assert_eq!(hammer.name, "Hammer Pro");
        assert_eq!(hammer.price, None);
        assert_eq!(hammer.raw_price.as_deref(), Some("call for price"));
        // No link in the card: the record points back at the page itself.
        assert_eq!(hammer.url, page_url().to_string());
    }

    #[test]
    fn test_no_container_match_is_loud() {
        let doc = Document::parse("<div class='totally-different'>nothing here</div>");
        let err = extract_products(&doc, &RuleSet::new(), &page_url()).unwrap_err();
        assert!(matches!(err, PricewatchError::NoContainerMatch(_)));
    }

    #[test]
    fn test_containers_without_names_is_empty_result() {
        let html = r#"<div class="product-card"><span class="price">10</span></div>"#;
        let doc = Document::parse(html);
        let err = extract_products(&doc, &RuleSet::new(), &page_url()).unwrap_err();
        assert!(matches!(err, PricewatchError::EmptyResult));
    }

    #[rstest]
    #[case("1 299,00 грн", Some(1299.0))]
    #[case("$10.00", Some(10.0))]
    #[case("999", Some(999.0))]
    #[case("від 45,5", Some(45.5))]
    #[case("call for price", None)]
    #[case("", None)]
    // Thousands separators misparse by design: both comma and period
    // survive stripping, and comma becomes a second decimal point.
    #[case("1,299.00", None)]
    fn test_parse_price(#[case] text: &str, #[case] expected: Option<f64>) {
        assert_eq!(parse_price(text), expected);
    }

    #[test]
    fn test_custom_rules_override_defaults() {
        let html = r#"
            <ul class="grid">
                <li class="cell"><p class="label">Saw</p><b class="cost">50</b></li>
            </ul>
        "#;
        let doc = Document::parse(html);
        let rules = RuleSet::new()
            .with_field(Field::Item, "li.cell")
            .with_field(Field::Name, ".label")
            .with_field(Field::Price, ".cost");

        let records = extract_products(&doc, &rules, &page_url()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Saw");
        assert_eq!(records[0].price, Some(50.0));
    }
}
