pub mod categories;
pub mod dom;
pub mod error;
pub mod extract;
#[cfg(feature = "fetch")]
pub mod fetch;
pub mod heal;
pub mod matching;
pub mod oracle;
pub mod rules;
pub mod scoring;
pub mod selector;

pub use categories::{
    Category, CategoryGroup, CategoryNode, build_category_groups, discover_categories,
};
#[cfg(feature = "fetch")]
pub use categories::discover;
pub use dom::{Document, Node};
pub use error::{PricewatchError, Result};
pub use extract::{ProductRecord, extract_products, parse_price};
#[cfg(feature = "fetch")]
pub use fetch::{FetchConfig, Fetcher};
#[cfg(feature = "fetch")]
pub use heal::SelfHealer;
pub use heal::{
    CategoryScrape, HealConfig, RepairedRules, ScrapeOutcome, confidence_after, repair_rules,
};
pub use matching::{
    CatalogEntry, MatchRecord, RankedMatch, match_catalog, match_catalog_with_oracle,
    parse_match_response, rank, similarity,
};
pub use oracle::{MatchOracle, ORACLE_HTML_LIMIT, RuleOracle};
pub use rules::RuleSet;
pub use scoring::{Field, ScoreConfig, best_selector};
pub use selector::{TokenSpec, parse_selector, select_alternatives, select_first_alternative};
