//! Selector rule sets for product and category extraction.
//!
//! A [`RuleSet`] holds one selector string per semantic field. Fields are
//! optional; unset or empty fields fall back to built-in defaults, so an
//! empty rule set is already usable against conventionally-marked-up shops.
//! Selector strings may hold comma-separated alternatives which are tried
//! in order — the first alternative with a non-empty match wins.
//!
//! Rule sets are value objects: extraction never mutates one, and the
//! self-heal step produces a replacement instead of editing in place.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::scoring::Field;

/// Default selector for the product item container.
pub const DEFAULT_ITEM: &str = ".product, .product-card, .product-item";
/// Default selector alternatives for the product name.
pub const DEFAULT_NAME: &str = ".product-title,.title,h2,h3";
/// Default selector alternatives for the price text.
pub const DEFAULT_PRICE: &str = ".price,.product-price";
/// Default selector for the product link.
pub const DEFAULT_URL: &str = "a";
/// Default selector for category navigation links.
pub const DEFAULT_CATEGORY_LINK: &str = "nav a";

/// The closed set of rule fields, in wire order.
pub const RULE_FIELDS: [Field; 5] =
    [Field::Item, Field::Name, Field::Price, Field::Url, Field::CategoryLink];

/// One selector string per semantic field.
///
/// Serialized field names are the wire names understood by the repair
/// oracle: `product_item`, `name_selector`, `price_selector`,
/// `url_selector`, `category_link`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Selector for the repeated product container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_item: Option<String>,
    /// Selector for the product name inside a container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_selector: Option<String>,
    /// Selector for the price text inside a container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_selector: Option<String>,
    /// Selector for the product link inside a container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_selector: Option<String>,
    /// Selector for category links on a landing page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_link: Option<String>,
}

impl RuleSet {
    /// A rule set with no explicit fields — every accessor serves defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored selector for a field, if any non-empty value is set.
    pub fn get(&self, field: Field) -> Option<&str> {
        let stored = match field {
            Field::Item => self.product_item.as_deref(),
            Field::Name => self.name_selector.as_deref(),
            Field::Price => self.price_selector.as_deref(),
            Field::Url => self.url_selector.as_deref(),
            Field::CategoryLink => self.category_link.as_deref(),
            Field::Images => None,
        };
        stored.map(str::trim).filter(|s| !s.is_empty())
    }

    /// Effective selector for a field: the stored value or the built-in
    /// default.
    pub fn effective(&self, field: Field) -> &str {
        self.get(field).unwrap_or(match field {
            Field::Item => DEFAULT_ITEM,
            Field::Name => DEFAULT_NAME,
            Field::Price => DEFAULT_PRICE,
            Field::Url => DEFAULT_URL,
            Field::CategoryLink => DEFAULT_CATEGORY_LINK,
            Field::Images => "img",
        })
    }

    /// Returns a copy with one field replaced.
    pub fn with_field(&self, field: Field, selector: impl Into<String>) -> Self {
        let mut next = self.clone();
        let slot = match field {
            Field::Item => &mut next.product_item,
            Field::Name => &mut next.name_selector,
            Field::Price => &mut next.price_selector,
            Field::Url => &mut next.url_selector,
            Field::CategoryLink => &mut next.category_link,
            Field::Images => return next,
        };
        *slot = Some(selector.into());
        next
    }

    /// Field-wise merge: self's set fields win, `base` fills the gaps.
    pub fn merged_over(&self, base: &RuleSet) -> Self {
        let pick = |ours: &Option<String>, theirs: &Option<String>| {
            ours.clone().filter(|s| !s.trim().is_empty()).or_else(|| theirs.clone())
        };
        Self {
            product_item: pick(&self.product_item, &base.product_item),
            name_selector: pick(&self.name_selector, &base.name_selector),
            price_selector: pick(&self.price_selector, &base.price_selector),
            url_selector: pick(&self.url_selector, &base.url_selector),
            category_link: pick(&self.category_link, &base.category_link),
        }
    }

    /// Validates a repair-oracle reply.
    ///
    /// The reply must parse to a JSON object; only the five known field
    /// keys are accepted, and only string values are kept. Returns `None`
    /// when the reply is not an object or nothing usable remains — the
    /// caller falls back to the heuristic result in that case.
    pub fn from_suggestion_json(raw: &str) -> Option<RuleSet> {
        let value: Value = serde_json::from_str(raw.trim()).ok()?;
        let object = value.as_object()?;

        let mut rules = RuleSet::new();
        let mut usable = false;
        for (key, value) in object {
            let Some(selector) = value.as_str() else { continue };
            if selector.trim().is_empty() {
                continue;
            }
            let field = match key.as_str() {
                "product_item" => Field::Item,
                "name_selector" => Field::Name,
                "price_selector" => Field::Price,
                "url_selector" => Field::Url,
                "category_link" => Field::CategoryLink,
                _ => continue,
            };
            rules = rules.with_field(field, selector);
            usable = true;
        }
        usable.then_some(rules)
    }
}
