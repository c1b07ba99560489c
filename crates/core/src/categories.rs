//! Category link discovery and hierarchy grouping.
//!
//! Finds navigational links on a landing page — through the configured
//! category-link rule, then a fixed ladder of generic fallbacks — and
//! folds them into a hierarchy derived from URL path segments. A known
//! leading locale segment is stripped before grouping so localized and
//! non-localized paths land in the same group.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::dom::Document;
use crate::rules::RuleSet;
use crate::scoring::Field;

/// Leading path segments recognized as locale markers.
pub const LOCALE_SEGMENTS: &[&str] = &["ru", "ua", "uk"];

/// Generic selectors tried, in order, when the configured rule finds
/// nothing. The href-substring fallbacks live in code below because the
/// reduced selector grammar has no substring operator.
const FALLBACK_SELECTORS: &[&str] = &["nav a", "ul a", "header a"];

/// Href substrings probed as the last fallback tier.
const HREF_HINTS: &[&str] = &["catalog", "category"];

/// Minimum length of a usable link text, in characters.
const MIN_LINK_TEXT: usize = 3;

/// A discovered category link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    /// Absolute URL.
    pub url: String,
}

/// One node of the grouped category tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryNode {
    pub name: String,
    /// Absolute URL for leaves; `None` for intermediate path nodes.
    pub url: Option<String>,
    #[serde(default)]
    pub children: Vec<CategoryNode>,
}

/// A top-level group keyed by the first URL path segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryGroup {
    pub group_name: String,
    pub items: Vec<CategoryNode>,
}

/// Collects links for one selector, skipping short link texts.
fn harvest(doc: &Document, base_url: &Url, selector: &str, links: &mut LinkSet) {
    let Ok(hits) = doc.select(selector) else {
        debug!(selector, "category selector unusable, skipping");
        return;
    };
    for id in hits {
        let node = doc.node(id);
        let Some(href) = node.attr("href") else { continue };
        if href.is_empty() {
            continue;
        }
        let name = doc.all_text(id).trim().to_string();
        if name.chars().count() < MIN_LINK_TEXT {
            continue;
        }
        if let Ok(url) = base_url.join(href) {
            links.insert(url.to_string(), name);
        }
    }
}

/// Order-preserving URL-to-name set; re-inserting a URL replaces the name.
#[derive(Default)]
struct LinkSet {
    order: Vec<String>,
    names: HashMap<String, String>,
}

impl LinkSet {
    fn insert(&mut self, url: String, name: String) {
        if !self.names.contains_key(&url) {
            self.order.push(url.clone());
        }
        self.names.insert(url, name);
    }

    fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn into_categories(mut self) -> Vec<Category> {
        self.order
            .drain(..)
            .map(|url| {
                let name = self.names.remove(&url).unwrap_or_default();
                Category { name, url }
            })
            .collect()
    }
}

/// Finds category links on a parsed landing page.
///
/// The configured category-link selector is tried first, then each
/// generic fallback; the first tier that yields any link wins.
/// Duplicate URLs collapse with the last seen name.
pub fn discover_categories(doc: &Document, base_url: &Url, rules: &RuleSet) -> Vec<Category> {
    let mut links = LinkSet::default();

    let configured = rules.effective(Field::CategoryLink);
    for selector in std::iter::once(configured).chain(FALLBACK_SELECTORS.iter().copied()) {
        harvest(doc, base_url, selector, &mut links);
        if !links.is_empty() {
            return links.into_categories();
        }
    }

    // Last tier: any anchor whose href mentions a catalog-ish path.
    for hint in HREF_HINTS {
        if let Ok(anchors) = doc.select("a") {
            for id in anchors {
                let node = doc.node(id);
                let Some(href) = node.attr("href") else { continue };
                if !href.contains(hint) {
                    continue;
                }
                let name = doc.all_text(id).trim().to_string();
                if name.chars().count() < MIN_LINK_TEXT {
                    continue;
                }
                if let Ok(url) = base_url.join(href) {
                    links.insert(url.to_string(), name);
                }
            }
        }
        if !links.is_empty() {
            break;
        }
    }

    links.into_categories()
}

fn find_or_create(nodes: &mut Vec<CategoryNode>, name: &str) -> usize {
    if let Some(index) = nodes.iter().position(|n| n.name == name) {
        return index;
    }
    nodes.push(CategoryNode { name: name.to_string(), url: None, children: Vec::new() });
    nodes.len() - 1
}

/// Groups flat category links into a tree by URL path segments.
///
/// Each path segment becomes one tree level; a recognized leading locale
/// segment is stripped first. The link itself terminates its path as a
/// leaf named from the link text. Groups come out sorted by name.
pub fn build_category_groups(categories: &[Category]) -> Vec<CategoryGroup> {
    let mut groups: BTreeMap<String, Vec<CategoryNode>> = BTreeMap::new();

    for category in categories {
        let name = category.name.trim();
        let Ok(url) = Url::parse(&category.url) else { continue };
        if name.is_empty() {
            continue;
        }

        let mut segments: Vec<&str> =
            url.path().trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();
        if let Some(first) = segments.first()
            && LOCALE_SEGMENTS.contains(first)
        {
            segments.remove(0);
        }

        let group_key = segments.first().map(|s| s.to_string()).unwrap_or_else(|| "other".into());
        let rest = if segments.is_empty() { &[][..] } else { &segments[1..] };

        let mut level = groups.entry(group_key).or_default();
        for part in rest {
            let index = find_or_create(level, part);
            level = &mut level[index].children;
        }
        level.push(CategoryNode {
            name: name.to_string(),
            url: Some(category.url.clone()),
            children: Vec::new(),
        });
    }

    groups
        .into_iter()
        .map(|(group_name, items)| CategoryGroup { group_name, items })
        .collect()
}

/// Fetches a landing page and returns its grouped category tree.
#[cfg(feature = "fetch")]
pub async fn discover(
    fetcher: &crate::fetch::Fetcher, root_url: &str, rules: &RuleSet,
) -> crate::Result<Vec<CategoryGroup>> {
    let base_url = Url::parse(root_url)
        .map_err(|e| crate::PricewatchError::InvalidUrl(e.to_string()))?;
    let html = fetcher.fetch(root_url).await?;
    let doc = Document::parse(&html);
    let categories = discover_categories(&doc, &base_url, rules);
    Ok(build_category_groups(&categories))
}
