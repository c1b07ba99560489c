//! Seams for the external suggestion oracles.
//!
//! Rule repair and product matching can both be delegated to an opaque
//! external capability that, given context, returns a best-effort JSON
//! suggestion. The oracle may be absent, slow, or return garbage; replies
//! are raw strings, and nothing here is trusted until it passes shape
//! validation on the library side ([`RuleSet::from_suggestion_json`],
//! [`parse_match_response`]). An unusable reply is always discarded in
//! favor of the heuristic result, never surfaced as an error.
//!
//! [`RuleSet::from_suggestion_json`]: crate::rules::RuleSet::from_suggestion_json
//! [`parse_match_response`]: crate::matching::parse_match_response

use async_trait::async_trait;

use crate::extract::ProductRecord;
use crate::matching::CatalogEntry;
use crate::rules::RuleSet;

/// Upper bound on markup shipped to a rule oracle, in characters.
pub const ORACLE_HTML_LIMIT: usize = 6000;

/// Suggests replacement selector rules for a page.
#[async_trait]
pub trait RuleOracle: Send + Sync {
    /// Returns a raw reply expected to be a JSON object keyed by the five
    /// rule field names. `None` means the oracle is unavailable.
    async fn suggest_rules(&self, html: &str, previous: &RuleSet) -> Option<String>;
}

/// Matches competitor products against an owned catalog.
#[async_trait]
pub trait MatchOracle: Send + Sync {
    /// Returns a raw reply expected to be a JSON array of match objects.
    /// `None` means the oracle is unavailable.
    async fn match_products(
        &self, ours: &[CatalogEntry], competitors: &[ProductRecord],
    ) -> Option<String>;
}

/// Truncates markup to the oracle input bound at a character boundary.
pub fn bounded_markup(html: &str) -> &str {
    if html.len() <= ORACLE_HTML_LIMIT {
        return html;
    }
    let mut end = ORACLE_HTML_LIMIT;
    while !html.is_char_boundary(end) {
        end -= 1;
    }
    &html[..end]
}
