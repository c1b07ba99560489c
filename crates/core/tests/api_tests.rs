//! Library API integration tests
use pricewatch_core::*;
use url::Url;

const CATALOG_PAGE: &str = r#"
    <html>
      <body>
        <nav class="main-menu">
          <a href="/ua/tools">Інструменти</a>
          <a href="/ua/garden">Садова техніка</a>
        </nav>
        <div class="listing">
          <div class="product-card">
            <h2>Дриль акумуляторний X20</h2>
            <span class="price">1 299,00 грн</span>
            <a href="/p/drill-x20">детальніше</a>
            <img src="/img/drill.jpg" />
          </div>
          <div class="product-card">
            <h2>Hammer Pro</h2>
            <span class="price">449 грн</span>
            <a href="/p/hammer-pro">детальніше</a>
          </div>
        </div>
      </body>
    </html>
"#;

fn page_url() -> Url {
    Url::parse("https://shop.example/ua/tools").unwrap()
}

#[test]
fn test_parse_and_select_round_trip() {
    let doc = Document::parse(CATALOG_PAGE);
    let hit = doc.select_first("div.listing h2").unwrap().expect("injected node found");
    assert_eq!(doc.all_text(hit), "Дриль акумуляторний X20");
}

#[test]
fn test_default_rules_extract_catalog_page() {
    let doc = Document::parse(CATALOG_PAGE);
    let records = extract_products(&doc, &RuleSet::new(), &page_url()).expect("should extract");

    assert_eq!(records.len(), 2);
    let drill = &records[0];
    assert_eq!(drill.name, "Дриль акумуляторний X20");
    assert!((drill.price.unwrap() - 1299.0).abs() < 1e-9);
    assert!(drill.raw_price.as_deref().unwrap().contains("1 299,00"));
    assert_eq!(drill.url, "https://shop.example/p/drill-x20");
}

#[test]
fn test_no_container_match_never_silently_empty() {
    let doc = Document::parse("<main><p>an article, not a shop</p></main>");
    let err = extract_products(&doc, &RuleSet::new(), &page_url()).unwrap_err();
    assert!(matches!(err, PricewatchError::NoContainerMatch(_)));
}

#[test]
fn test_repair_is_idempotent_on_working_rules() {
    let doc = Document::parse(CATALOG_PAGE);
    let rules = RuleSet::new()
        .with_field(Field::Item, ".product-card")
        .with_field(Field::Name, "h2");
    assert!(extract_products(&doc, &rules, &page_url()).is_ok());

    let repair = repair_rules(&doc, &rules, &HealConfig::default());
    assert_eq!(repair.rules, rules);
}

#[test]
fn test_broken_container_repairs_to_different_selector() {
    let doc = Document::parse(CATALOG_PAGE);
    let broken = RuleSet::new().with_field(Field::Item, ".layout-from-last-year");
    assert!(extract_products(&doc, &broken, &page_url()).is_err());

    let repair = repair_rules(&doc, &broken, &HealConfig::default());
    assert_ne!(repair.rules.get(Field::Item), Some(".layout-from-last-year"));

    let records = extract_products(&doc, &repair.rules, &page_url()).expect("retry succeeds");
    assert_eq!(records.len(), 2);
}

#[test]
fn test_confidence_stays_bounded_for_any_unresolved_count() {
    let config = HealConfig::default();
    let mut previous = f64::INFINITY;
    for unresolved in 0..=5 {
        let confidence = confidence_after(unresolved, &config);
        assert!((0.3..=1.0).contains(&confidence));
        assert!(confidence <= previous);
        previous = confidence;
    }
}

#[test]
fn test_similarity_contract() {
    assert_eq!(similarity("Drill X20", "X20 drill"), similarity("X20 drill", "Drill X20"));
    assert_eq!(similarity("", "x"), 0.0);
    assert_eq!(similarity("x", ""), 0.0);
}

#[test]
fn test_category_discovery_and_locale_grouping() {
    let doc = Document::parse(CATALOG_PAGE);
    let base = Url::parse("https://shop.example/").unwrap();
    let categories = discover_categories(&doc, &base, &RuleSet::new());
    assert_eq!(categories.len(), 2);

    let mut categories = categories;
    categories.push(Category {
        name: "Tools (no locale)".into(),
        url: "https://shop.example/tools".into(),
    });

    let groups = build_category_groups(&categories);
    let tools = groups.iter().find(|g| g.group_name == "tools").expect("tools group");
    // The /ua/tools and /tools paths share one group.
    assert_eq!(tools.items.len(), 2);
}

#[test]
fn test_records_serialize_to_wire_shape() {
    let doc = Document::parse(CATALOG_PAGE);
    let records = extract_products(&doc, &RuleSet::new(), &page_url()).unwrap();
    let json = serde_json::to_value(&records).unwrap();

    let first = &json[0];
    assert!(first.get("name").is_some());
    assert!(first.get("url").is_some());
    assert!(first.get("price").is_some());
    assert!(first.get("raw_price").is_some());
}

#[test]
fn test_match_catalog_against_extracted_records() {
    let doc = Document::parse(CATALOG_PAGE);
    let competitors = extract_products(&doc, &RuleSet::new(), &page_url()).unwrap();

    let ours = vec![CatalogEntry { code: "DRL-20".into(), name: "Дриль X20".into() }];
    let matches = match_catalog(&ours, &competitors);

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].competitor_url, "https://shop.example/p/drill-x20");
    assert!(matches[0].confidence > 0.0 && matches[0].confidence <= 1.0);
}

#[test]
fn test_malformed_markup_still_extracts() {
    let html = r#"
        <div class="product-card">
            <h2>Unclosed product
            <span class="price">10,00</span>
    "#;
    let doc = Document::parse(html);
    let records = extract_products(&doc, &RuleSet::new(), &page_url()).unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].name.contains("Unclosed product"));
}
