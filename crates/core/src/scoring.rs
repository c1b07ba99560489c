//! Heuristic field scoring for selector recovery.
//!
//! When no rule exists for a semantic field — or the existing rule stopped
//! matching — the scorer walks the document and guesses which node most
//! likely represents the field, then renders a single-node selector token
//! for it. The result is advisory: it seeds initial rule generation and
//! post-failure repair, and never overrides a rule that still matches.

use crate::dom::{Document, Node};

/// Semantic fields the scorer knows how to locate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Product item container.
    Item,
    /// Product name / title.
    Name,
    /// Price text.
    Price,
    /// Product link.
    Url,
    /// Category navigation link.
    CategoryLink,
    /// Product imagery.
    Images,
}

impl Field {
    /// Keywords whose presence in class, tag, or id hints at this field.
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Field::Item => &["product", "item", "card", "goods"],
            Field::Name => &["title", "name", "product-title", "product_name", "product-name"],
            Field::Price => &["price", "amount", "cost", "value"],
            Field::Url => &["link", "url", "product"],
            Field::CategoryLink => &["category", "catalog", "menu", "nav"],
            Field::Images => &["image", "photo", "gallery", "product-image"],
        }
    }
}

/// Weights for the field-scoring heuristic.
#[derive(Debug, Clone)]
pub struct ScoreConfig {
    /// Points per keyword found in the class attribute.
    pub class_weight: i32,
    /// Points per keyword found in the tag name.
    pub tag_weight: i32,
    /// Points per keyword found in the id attribute.
    pub id_weight: i32,
    /// Bonus for heading tags when scoring [`Field::Name`].
    pub heading_bonus: i32,
    /// Bonus for digit-bearing text when scoring [`Field::Price`].
    pub digit_bonus: i32,
    /// Bonus for `img` nodes with a `src` when scoring [`Field::Images`].
    pub image_bonus: i32,
    /// Bonus for `a` nodes with an `href` when scoring link fields.
    pub href_bonus: i32,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            class_weight: 3,
            tag_weight: 2,
            id_weight: 4,
            heading_bonus: 1,
            digit_bonus: 2,
            image_bonus: 4,
            href_bonus: 2,
        }
    }
}

/// Scores a single node for a field.
pub fn score_node(doc: &Document, id: usize, field: Field, config: &ScoreConfig) -> i32 {
    let node = doc.node(id);
    let class_attr = node.attr("class").unwrap_or("");
    let id_attr = node.attr("id").unwrap_or("");

    let mut score = 0;
    for kw in field.keywords() {
        if class_attr.contains(kw) {
            score += config.class_weight;
        }
        if node.tag.contains(kw) {
            score += config.tag_weight;
        }
        if id_attr.contains(kw) {
            score += config.id_weight;
        }
    }

    if field == Field::Name && is_heading(node) {
        score += config.heading_bonus;
    }
    if field == Field::Price && doc.all_text(id).chars().any(|c| c.is_ascii_digit()) {
        score += config.digit_bonus;
    }
    if field == Field::Images && node.tag == "img" && node.attr("src").is_some() {
        score += config.image_bonus;
    }
    if matches!(field, Field::Url | Field::CategoryLink)
        && node.tag == "a"
        && node.attr("href").is_some()
    {
        score += config.href_bonus;
    }

    score
}

fn is_heading(node: &Node) -> bool {
    let mut chars = node.tag.chars();
    chars.next() == Some('h') && chars.as_str().chars().all(|c| c.is_ascii_digit())
        && node.tag.len() > 1
}

/// Renders a single-node selector token for a node: id first, then
/// tag+classes, then the bare tag.
pub fn selector_token(node: &Node) -> String {
    if let Some(id) = node.attr("id")
        && !id.is_empty()
    {
        return format!("#{}", id);
    }
    let classes = node.classes();
    if classes.is_empty() { node.tag.clone() } else { format!("{}.{}", node.tag, classes.join(".")) }
}

/// Finds the best selector token for a field.
///
/// The highest-scoring node wins; ties resolve to the first node in
/// preorder. Returns an empty string when no node scores above zero.
pub fn best_selector(doc: &Document, field: Field, config: &ScoreConfig) -> String {
    let mut best: Option<(i32, usize)> = None;
    for id in doc.descendants(doc.root()) {
        let score = score_node(doc, id, field, config);
        if score > 0 && best.map_or(true, |(top, _)| score > top) {
            best = Some((score, id));
        }
    }
    best.map(|(_, id)| selector_token(doc.node(id))).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const CARD_HTML: &str = r#"
        <div class="product-card">
            <h2 class="title">Cordless Drill</h2>
            <div class="price">1 299</div>
            <a href="/p/1" class="product-link">view</a>
            <img src="/img/1.jpg" class="gallery" />
        </div>
    "#;

    #[test]
    fn test_class_keyword_scores() {
        let doc = Document::parse(CARD_HTML);
        let price = doc.select_first(".price").unwrap().unwrap();
        let config = ScoreConfig::default();
        // "price" in class (+3) plus digit text (+2).
        assert_eq!(score_node(&doc, price, Field::Price, &config), 5);
    }

    #[test]
    fn test_heading_bonus_applies_to_name_only() {
        let doc = Document::parse("<h2>Plain heading</h2>");
        let h2 = doc.select_first("h2").unwrap().unwrap();
        let config = ScoreConfig::default();
        assert_eq!(score_node(&doc, h2, Field::Name, &config), 1);
        assert_eq!(score_node(&doc, h2, Field::Price, &config), 0);
    }

    #[test]
    fn test_image_bonus_requires_src() {
        let doc = Document::parse(r#"<img src="/a.jpg" /><img alt="no source" />"#);
        let config = ScoreConfig::default();
        let root = doc.root();
        let with_src = doc.node(root).children[0];
        let without = doc.node(root).children[1];
        assert!(score_node(&doc, with_src, Field::Images, &config) >= config.image_bonus);
        assert_eq!(score_node(&doc, without, Field::Images, &config), 0);
    }

    #[rstest]
    #[case(Field::Name, "h2.title")]
    #[case(Field::Price, "div.price")]
    #[case(Field::Item, "div.product-card")]
    #[case(Field::Images, "img.gallery")]
    fn test_best_selector_per_field(#[case] field: Field, #[case] expected: &str) {
        let doc = Document::parse(CARD_HTML);
        assert_eq!(best_selector(&doc, field, &ScoreConfig::default()), expected);
    }

    #[test]
    fn test_id_takes_precedence_in_token() {
        let doc = Document::parse(r#"<div id="main-price" class="price">99</div>"#);
        assert_eq!(best_selector(&doc, Field::Price, &ScoreConfig::default()), "#main-price");
    }

    #[test]
    fn test_no_candidate_yields_empty_string() {
        let doc = Document::parse("<div><span>nothing relevant</span></div>");
        assert_eq!(best_selector(&doc, Field::Images, &ScoreConfig::default()), "");
    }

    #[test]
    fn test_tie_resolves_to_first_in_preorder() {
        let doc = Document::parse(r#"<span class="price">1</span><em class="price">2</em>"#);
        assert_eq!(best_selector(&doc, Field::Price, &ScoreConfig::default()), "span.price");
    }
}
