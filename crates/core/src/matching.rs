//! Cross-catalog product matching.
//!
//! Ranks competitor records against an owned catalog entry by token-set
//! similarity. This is the fallback path used whenever the external match
//! oracle is absent or returns unusable output; it is deliberately simple
//! and fully deterministic.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::extract::ProductRecord;
use crate::oracle::MatchOracle;

/// Competitor entries offered to the match oracle, at most.
pub const MATCH_ORACLE_TOP_N: usize = 30;

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\w-]+").expect("token pattern is valid"));

/// One entry of the operator's own catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Internal product code.
    pub code: String,
    /// Product name used for matching.
    pub name: String,
}

/// A catalog entry paired with its best competitor candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub our_code: String,
    pub our_name: String,
    pub competitor_name: String,
    pub competitor_url: String,
    pub competitor_price: Option<f64>,
    /// Similarity in [0, 1], rounded to three decimals.
    pub confidence: f64,
}

/// The best candidate for a query, with its similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedMatch<'a> {
    pub record: &'a ProductRecord,
    pub score: f64,
}

fn tokenize(text: &str) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for token in TOKEN_RE.find_iter(&text.to_lowercase()) {
        *counts.entry(token.as_str().to_string()).or_insert(0) += 1;
    }
    counts
}

/// Token-multiset similarity between two names.
///
/// Shared token count divided by total token count, case-folded. The
/// measure is symmetric and returns 0.0 when either side has no tokens.
pub fn similarity(a: &str, b: &str) -> f64 {
    let ca = tokenize(a);
    let cb = tokenize(b);
    if ca.is_empty() || cb.is_empty() {
        return 0.0;
    }

    let mut intersection = 0usize;
    let mut union = 0usize;
    for (token, &count_a) in &ca {
        let count_b = cb.get(token).copied().unwrap_or(0);
        intersection += count_a.min(count_b);
        union += count_a.max(count_b);
    }
    for (token, &count_b) in &cb {
        if !ca.contains_key(token) {
            union += count_b;
        }
    }

    if union == 0 { 0.0 } else { intersection as f64 / union as f64 }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Picks the candidate most similar to the query name.
///
/// Returns `None` when no candidate shares any token with the query.
pub fn rank<'a>(query: &str, candidates: &'a [ProductRecord]) -> Option<RankedMatch<'a>> {
    let mut best: Option<RankedMatch<'a>> = None;
    for candidate in candidates {
        let score = similarity(query, &candidate.name);
        if score > 0.0 && best.as_ref().map_or(true, |b| score > b.score) {
            best = Some(RankedMatch { record: candidate, score });
        }
    }
    best
}

/// Matches every catalog entry against the competitor records.
///
/// Entries with no similar competitor produce a record with empty
/// competitor fields and zero confidence, so the operator sees the gap.
pub fn match_catalog(ours: &[CatalogEntry], competitors: &[ProductRecord]) -> Vec<MatchRecord> {
    ours.iter()
        .map(|entry| match rank(&entry.name, competitors) {
            Some(ranked) => MatchRecord {
                our_code: entry.code.clone(),
                our_name: entry.name.clone(),
                competitor_name: ranked.record.name.clone(),
                competitor_url: ranked.record.url.clone(),
                competitor_price: ranked.record.price,
                confidence: round3(ranked.score),
            },
            None => MatchRecord {
                our_code: entry.code.clone(),
                our_name: entry.name.clone(),
                competitor_name: String::new(),
                competitor_url: String::new(),
                competitor_price: None,
                confidence: 0.0,
            },
        })
        .collect()
}

/// Parses a match-oracle reply into records.
///
/// Accepts a bare JSON array; when the reply carries surrounding prose,
/// the first `[` .. last `]` slice is tried before giving up. Array
/// entries that are not objects are skipped. Returns `None` when no array
/// shape can be recovered at all.
pub fn parse_match_response(raw: &str) -> Option<Vec<MatchRecord>> {
    let value = serde_json::from_str::<Value>(raw.trim()).ok().or_else(|| {
        let start = raw.find('[')?;
        let end = raw.rfind(']')?;
        if end <= start {
            return None;
        }
        serde_json::from_str(&raw[start..=end]).ok()
    })?;

    let entries = value.as_array()?;
    let records = entries
        .iter()
        .filter_map(|entry| {
            let object = entry.as_object()?;
            let text = |key: &str| {
                object.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
            };
            Some(MatchRecord {
                our_code: text("our_code"),
                our_name: text("our_name"),
                competitor_name: text("competitor_name"),
                competitor_url: text("competitor_url"),
                competitor_price: object.get("competitor_price").and_then(Value::as_f64),
                confidence: object.get("confidence").and_then(Value::as_f64).unwrap_or(0.0),
            })
        })
        .collect();
    Some(records)
}

/// Matches through the oracle when possible, falling back to the
/// heuristic on absence or an unusable reply.
pub async fn match_catalog_with_oracle(
    oracle: Option<&dyn MatchOracle>, ours: &[CatalogEntry], competitors: &[ProductRecord],
) -> Vec<MatchRecord> {
    if let Some(oracle) = oracle {
        let top = &competitors[..competitors.len().min(MATCH_ORACLE_TOP_N)];
        if let Some(raw) = oracle.match_products(ours, top).await {
            match parse_match_response(&raw) {
                Some(records) if !records.is_empty() => return records,
                _ => debug!("match oracle reply unusable, falling back to heuristic"),
            }
        }
    }
    match_catalog(ours, competitors)
}
