//! Closed-loop rule repair around extraction.
//!
//! The coordinator runs extraction with the current rule set and, when it
//! fails with an extraction-level error, re-fetches the page, repairs the
//! dead fields, and retries exactly once. Fields whose selectors still
//! match are never discarded; a retry failure surfaces the underlying
//! extraction error so fundamentally incompatible pages (JS-rendered
//! catalogs, for instance) cannot trap the loop.
//!
//! Every heuristic outcome carries a confidence in a bounded range: more
//! unresolved fields mean less confidence, but repeated repairs can
//! neither collapse it to zero nor saturate it to certainty.

use tracing::debug;

use crate::dom::Document;
use crate::extract::ProductRecord;
use crate::rules::{RULE_FIELDS, RuleSet};
use crate::scoring::{ScoreConfig, best_selector};
use crate::selector::select_alternatives;

/// Tuning for the self-heal loop.
#[derive(Debug, Clone)]
pub struct HealConfig {
    /// Lower bound for repair confidence.
    pub confidence_floor: f64,
    /// Upper bound for confidence; also the value of an untouched success.
    pub confidence_ceiling: f64,
    /// Confidence cost per field left unresolved after a repair.
    pub field_penalty: f64,
    /// Scoring weights used when proposing replacement selectors.
    pub scoring: ScoreConfig,
}

impl Default for HealConfig {
    fn default() -> Self {
        Self {
            confidence_floor: 0.3,
            confidence_ceiling: 1.0,
            field_penalty: 0.15,
            scoring: ScoreConfig::default(),
        }
    }
}

/// Result of a rule repair pass.
#[derive(Debug, Clone)]
pub struct RepairedRules {
    /// The candidate rule set: working fields kept, dead fields replaced.
    pub rules: RuleSet,
    /// Fields whose selector still matches nothing after the repair.
    pub unresolved: usize,
}

/// Whether any alternative of a selector matches in the document.
///
/// An unparsable selector counts as dead — it is a repair target.
pub fn field_still_matches(doc: &Document, selector: &str) -> bool {
    select_alternatives(doc, doc.root(), selector).map(|hits| !hits.is_empty()).unwrap_or(false)
}

/// Repairs a rule set against a freshly parsed page.
///
/// Every field whose effective selector still matches is kept untouched;
/// dead fields are replaced by the field scorer's best candidate. A dead
/// field with no candidate keeps its old selector and counts as
/// unresolved.
pub fn repair_rules(doc: &Document, rules: &RuleSet, config: &HealConfig) -> RepairedRules {
    let mut repaired = rules.clone();

    for field in RULE_FIELDS {
        if field_still_matches(doc, rules.effective(field)) {
            continue;
        }
        let candidate = best_selector(doc, field, &config.scoring);
        if candidate.is_empty() {
            debug!(?field, "no replacement candidate for dead selector");
        } else {
            debug!(?field, candidate, "repairing dead selector");
            repaired = repaired.with_field(field, candidate);
        }
    }

    let unresolved = RULE_FIELDS
        .iter()
        .filter(|field| !field_still_matches(doc, repaired.effective(**field)))
        .count();

    RepairedRules { rules: repaired, unresolved }
}

/// Confidence after a repair with the given number of unresolved fields.
pub fn confidence_after(unresolved: usize, config: &HealConfig) -> f64 {
    (config.confidence_ceiling - config.field_penalty * unresolved as f64)
        .clamp(config.confidence_floor, config.confidence_ceiling)
}

/// Outcome of one extraction cycle.
#[derive(Debug, Clone)]
pub struct ScrapeOutcome {
    pub records: Vec<ProductRecord>,
    /// The rule set that produced the records. When `repaired` is true the
    /// caller should persist it so the next run starts from the fix.
    pub rules: RuleSet,
    pub repaired: bool,
    /// Confidence in [floor, ceiling]; the ceiling for untouched successes.
    pub confidence: f64,
}

/// Per-category result of a concurrent scrape.
///
/// A failed category keeps its failure reason for operator visibility and
/// yields zero records; it never aborts sibling categories.
#[derive(Debug, Clone)]
pub struct CategoryScrape {
    pub url: String,
    pub records: Vec<ProductRecord>,
    pub rules: RuleSet,
    pub repaired: bool,
    pub confidence: f64,
    pub failure: Option<String>,
}

#[cfg(feature = "fetch")]
pub use self::coordinator::SelfHealer;

#[cfg(feature = "fetch")]
mod coordinator {
    use super::*;
    use crate::extract::extract_products;
    use crate::fetch::Fetcher;
    use crate::oracle::{RuleOracle, bounded_markup};
    use crate::{PricewatchError, Result};
    use futures::stream::{self, StreamExt};
    use tracing::{info, warn};
    use url::Url;

    /// Orchestrates fetch, extraction, and rule repair for target pages.
    pub struct SelfHealer {
        fetcher: Fetcher,
        config: HealConfig,
        oracle: Option<Box<dyn RuleOracle>>,
    }

    impl SelfHealer {
        /// Creates a coordinator with default heal configuration.
        pub fn new(fetcher: Fetcher) -> Self {
            Self::with_config(fetcher, HealConfig::default())
        }

        /// Creates a coordinator with custom heal configuration.
        pub fn with_config(fetcher: Fetcher, config: HealConfig) -> Self {
            Self { fetcher, config, oracle: None }
        }

        /// Attaches a rule-suggestion oracle consulted during repair.
        pub fn with_oracle(mut self, oracle: Box<dyn RuleOracle>) -> Self {
            self.oracle = Some(oracle);
            self
        }

        /// Runs one extraction cycle with self-healing.
        ///
        /// Success with the current rules returns them unchanged — healing
        /// is idempotent on a working rule set. An extraction-level
        /// failure triggers one repair and one retry; the retry's failure
        /// is surfaced as-is. Fetch-level failures are never repaired
        /// here, the fetcher's own bounded retry already handled them.
        pub async fn scrape_category(&self, url: &str, rules: &RuleSet) -> Result<ScrapeOutcome> {
            let page_url =
                Url::parse(url).map_err(|e| PricewatchError::InvalidUrl(e.to_string()))?;

            let html = self.fetcher.fetch(url).await?;
            let doc = Document::parse(&html);

            match extract_products(&doc, rules, &page_url) {
                Ok(records) => Ok(ScrapeOutcome {
                    records,
                    rules: rules.clone(),
                    repaired: false,
                    confidence: self.config.confidence_ceiling,
                }),
                Err(error) if error.is_extraction_failure() => {
                    info!(url, %error, "extraction failed, repairing rules");
                    self.repair_and_retry(url, rules).await
                }
                Err(error) => Err(error),
            }
        }

        async fn repair_and_retry(&self, url: &str, rules: &RuleSet) -> Result<ScrapeOutcome> {
            let page_url =
                Url::parse(url).map_err(|e| PricewatchError::InvalidUrl(e.to_string()))?;

            // The site may have changed mid-cycle; repair against a fresh
            // copy of the page.
            let html = self.fetcher.fetch(url).await?;
            let doc = Document::parse(&html);

            let mut repair = repair_rules(&doc, rules, &self.config);

            if let Some(oracle) = &self.oracle
                && let Some(raw) = oracle.suggest_rules(bounded_markup(&html), rules).await
            {
                match RuleSet::from_suggestion_json(&raw) {
                    Some(suggested) => {
                        debug!(url, "merging oracle rule suggestion");
                        repair.rules = suggested.merged_over(&repair.rules);
                        repair.unresolved = RULE_FIELDS
                            .iter()
                            .filter(|f| !field_still_matches(&doc, repair.rules.effective(**f)))
                            .count();
                    }
                    None => debug!(url, "oracle rule suggestion unusable, keeping heuristic"),
                }
            }

            let records = extract_products(&doc, &repair.rules, &page_url)?;
            info!(url, unresolved = repair.unresolved, "repair succeeded");
            Ok(ScrapeOutcome {
                records,
                rules: repair.rules,
                repaired: true,
                confidence: confidence_after(repair.unresolved, &self.config),
            })
        }

        /// Scrapes many category pages with bounded concurrency.
        ///
        /// Results come back in input order. Each page fails or succeeds
        /// on its own; a failure is captured as the category's `failure`
        /// reason instead of cancelling the rest.
        pub async fn scrape_categories(
            &self, urls: &[String], rules: &RuleSet, concurrency: usize,
        ) -> Vec<CategoryScrape> {
            stream::iter(urls.iter().cloned())
                .map(|url| async move {
                    match self.scrape_category(&url, rules).await {
                        Ok(outcome) => CategoryScrape {
                            url,
                            records: outcome.records,
                            rules: outcome.rules,
                            repaired: outcome.repaired,
                            confidence: outcome.confidence,
                            failure: None,
                        },
                        Err(error) => {
                            warn!(url, %error, "category scrape failed");
                            CategoryScrape {
                                url,
                                records: Vec::new(),
                                rules: rules.clone(),
                                repaired: false,
                                confidence: 0.0,
                                failure: Some(error.to_string()),
                            }
                        }
                    }
                })
                .buffered(concurrency.max(1))
                .collect()
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_products;
    use crate::scoring::Field;
    use rstest::rstest;
    use url::Url;

    const CATALOG_HTML: &str = r#"
        <div class="goods-grid">
            <div class="product-card">
                <h2 class="title">Cordless Drill X20</h2>
                <span class="price">1 299,00</span>
                <a href="/p/drill">view</a>
            </div>
        </div>
    "#;

    fn page_url() -> Url {
        Url::parse("https://shop.example/tools").unwrap()
    }

    #[test]
    fn test_repair_replaces_only_dead_fields() {
        let doc = Document::parse(CATALOG_HTML);
        let rules = RuleSet::new()
            .with_field(Field::Item, ".long-gone-wrapper")
            .with_field(Field::Name, ".title");

        let repair = repair_rules(&doc, &rules, &HealConfig::default());

        // The container was dead and got replaced with something live.
        let item = repair.rules.get(Field::Item).unwrap();
        assert_ne!(item, ".long-gone-wrapper");
        assert!(field_still_matches(&doc, item));
        // The name selector still matched and must survive untouched.
        assert_eq!(repair.rules.get(Field::Name), Some(".title"));
    }

    #[test]
    fn test_repair_then_extract_succeeds() {
        let doc = Document::parse(CATALOG_HTML);
        let broken = RuleSet::new().with_field(Field::Item, ".definitely-wrong");
        assert!(extract_products(&doc, &broken, &page_url()).is_err());

        let repair = repair_rules(&doc, &broken, &HealConfig::default());
        let records = extract_products(&doc, &repair.rules, &page_url()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Cordless Drill X20");
        assert_eq!(records[0].price, Some(1299.0));
    }

    #[test]
    fn test_repair_keeps_old_selector_when_no_candidate() {
        // Nothing on this page scores for the price field.
        let doc = Document::parse("<div class='product-card'><h2>Thing</h2></div>");
        let rules = RuleSet::new().with_field(Field::Price, ".gone-price");

        let repair = repair_rules(&doc, &rules, &HealConfig::default());
        assert_eq!(repair.rules.get(Field::Price), Some(".gone-price"));
        assert!(repair.unresolved > 0);
    }

    #[rstest]
    #[case(0, 1.0)]
    #[case(1, 0.85)]
    #[case(2, 0.7)]
    #[case(3, 0.55)]
    #[case(4, 0.4)]
    #[case(5, 0.3)]
    fn test_confidence_monotone_and_bounded(#[case] unresolved: usize, #[case] expected: f64) {
        let config = HealConfig::default();
        let confidence = confidence_after(unresolved, &config);
        assert!((confidence - expected).abs() < 1e-9);
        assert!(confidence >= config.confidence_floor);
        assert!(confidence <= config.confidence_ceiling);
        if unresolved > 0 {
            assert!(confidence <= confidence_after(unresolved - 1, &config));
        }
    }

    #[test]
    fn test_invalid_selector_counts_as_dead() {
        let doc = Document::parse(CATALOG_HTML);
        assert!(!field_still_matches(&doc, "a[href"));
        assert!(field_still_matches(&doc, ".product-card"));
    }

    #[cfg(feature = "fetch")]
    mod coordinator_tests {
        use super::*;
        use crate::PricewatchError;
        use crate::fetch::Fetcher;
        use crate::oracle::RuleOracle;
        use async_trait::async_trait;
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        async fn spawn_page_server(body: &'static str) -> (String, Arc<AtomicUsize>) {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let hits = Arc::new(AtomicUsize::new(0));
            let seen = hits.clone();

            tokio::spawn(async move {
                loop {
                    let Ok((mut socket, _)) = listener.accept().await else { break };
                    seen.fetch_add(1, Ordering::SeqCst);
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let mut buf = [0u8; 2048];
                    let _ = socket.read(&mut buf).await;
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                }
            });

            (format!("http://{}/tools", addr), hits)
        }

        #[tokio::test]
        async fn test_working_rules_pass_through_unchanged() {
            let (url, hits) = spawn_page_server(CATALOG_HTML).await;
            let healer = SelfHealer::new(Fetcher::new().unwrap());

            let rules = RuleSet::new();
            let outcome = healer.scrape_category(&url, &rules).await.unwrap();

            assert!(!outcome.repaired);
            assert_eq!(outcome.rules, rules);
            assert_eq!(outcome.confidence, 1.0);
            assert_eq!(outcome.records.len(), 1);
            // No repair fetch happened.
            assert_eq!(hits.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn test_broken_container_heals_and_differs() {
            let (url, hits) = spawn_page_server(CATALOG_HTML).await;
            let healer = SelfHealer::new(Fetcher::new().unwrap());

            let broken = RuleSet::new().with_field(Field::Item, ".stale-wrapper");
            let outcome = healer.scrape_category(&url, &broken).await.unwrap();

            assert!(outcome.repaired);
            assert_ne!(outcome.rules.get(Field::Item), Some(".stale-wrapper"));
            assert_eq!(outcome.records[0].name, "Cordless Drill X20");
            assert!(outcome.confidence >= 0.3 && outcome.confidence <= 1.0);
            // Original fetch plus the repair re-fetch.
            assert_eq!(hits.load(Ordering::SeqCst), 2);
        }

        #[tokio::test]
        async fn test_incompatible_page_surfaces_extraction_error() {
            let (url, _hits) = spawn_page_server("<html><body>rendered by js</body></html>").await;
            let healer = SelfHealer::new(Fetcher::new().unwrap());

            let result = healer.scrape_category(&url, &RuleSet::new()).await;
            assert!(matches!(result, Err(PricewatchError::NoContainerMatch(_))));
        }

        struct CannedRuleOracle(&'static str);

        #[async_trait]
        impl RuleOracle for CannedRuleOracle {
            async fn suggest_rules(&self, _html: &str, _previous: &RuleSet) -> Option<String> {
                Some(self.0.to_string())
            }
        }

        #[tokio::test]
        async fn test_valid_oracle_suggestion_is_merged() {
            let (url, _hits) = spawn_page_server(CATALOG_HTML).await;
            let healer = SelfHealer::new(Fetcher::new().unwrap())
                .with_oracle(Box::new(CannedRuleOracle(r#"{"product_item": ".goods-grid .product-card"}"#)));

            let broken = RuleSet::new().with_field(Field::Item, ".stale-wrapper");
            let outcome = healer.scrape_category(&url, &broken).await.unwrap();

            assert!(outcome.repaired);
            assert_eq!(outcome.rules.get(Field::Item), Some(".goods-grid .product-card"));
            assert_eq!(outcome.records.len(), 1);
        }

        #[tokio::test]
        async fn test_garbage_oracle_suggestion_is_discarded() {
            let (url, _hits) = spawn_page_server(CATALOG_HTML).await;
            let healer = SelfHealer::new(Fetcher::new().unwrap())
                .with_oracle(Box::new(CannedRuleOracle("sorry, here are some thoughts...")));

            let broken = RuleSet::new().with_field(Field::Item, ".stale-wrapper");
            let outcome = healer.scrape_category(&url, &broken).await.unwrap();

            // Heuristic repair still wins.
            assert!(outcome.repaired);
            assert_eq!(outcome.records.len(), 1);
        }

        #[tokio::test]
        async fn test_concurrent_categories_partial_failure() {
            let (good_url, _good_hits) = spawn_page_server(CATALOG_HTML).await;
            let (bad_url, _bad_hits) =
                spawn_page_server("<html>please complete the captcha</html>").await;

            let healer = SelfHealer::new(Fetcher::new().unwrap());
            let urls = vec![good_url.clone(), bad_url.clone()];
            let results = healer.scrape_categories(&urls, &RuleSet::new(), 4).await;

            assert_eq!(results.len(), 2);
            assert_eq!(results[0].url, good_url);
            assert_eq!(results[0].records.len(), 1);
            assert!(results[0].failure.is_none());

            assert_eq!(results[1].url, bad_url);
            assert!(results[1].records.is_empty());
            let reason = results[1].failure.as_deref().unwrap();
            assert!(reason.contains("blocked") || reason.contains("captcha"));
        }
    }
}
