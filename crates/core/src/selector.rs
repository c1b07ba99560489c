//! Reduced-grammar CSS selector matching over the document arena.
//!
//! The supported grammar is deliberately small — it covers exactly what
//! selector rule sets use:
//!
//! ```text
//! selector  = token (whitespace token)*      descendant chain
//! token     = tag?(.class)*(#id)?([attr=value])*
//! ```
//!
//! There are no combinators beyond descendant: no child (`>`), sibling,
//! or pseudo-class support. Matching is deterministic: the first full
//! chain in preorder wins, leftmost-shallowest first.

use crate::dom::{Document, Node};
use crate::{PricewatchError, Result};

/// One parsed selector token.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenSpec {
    /// Required tag name, lowercased.
    pub tag: Option<String>,
    /// Classes that must all appear in the node's class attribute.
    pub classes: Vec<String>,
    /// Required id attribute value.
    pub id: Option<String>,
    /// Attribute equality requirements.
    pub attrs: Vec<(String, String)>,
}

impl TokenSpec {
    /// Whether a node satisfies every requirement of this token.
    ///
    /// The synthetic document root never matches.
    pub fn matches(&self, node: &Node) -> bool {
        if node.tag == crate::dom::ROOT_TAG {
            return false;
        }
        if let Some(tag) = &self.tag
            && node.tag != *tag
        {
            return false;
        }
        if let Some(id) = &self.id
            && node.attr("id") != Some(id.as_str())
        {
            return false;
        }
        if !self.classes.is_empty() {
            let node_classes = node.classes();
            if !self.classes.iter().all(|c| node_classes.contains(&c.as_str())) {
                return false;
            }
        }
        self.attrs.iter().all(|(name, value)| node.attr(name) == Some(value.as_str()))
    }
}

/// Parses a whitespace-separated descendant chain of tokens.
///
/// # Errors
///
/// Returns [`PricewatchError::InvalidSelector`] for blank selectors and for
/// malformed tokens (empty class/id names, unterminated attribute
/// brackets).
pub fn parse_selector(selector: &str) -> Result<Vec<TokenSpec>> {
    let trimmed = selector.trim();
    if trimmed.is_empty() {
        return Err(PricewatchError::InvalidSelector(selector.to_string()));
    }
    trimmed.split_whitespace().map(parse_token).collect()
}

fn parse_token(token: &str) -> Result<TokenSpec> {
    let invalid = || PricewatchError::InvalidSelector(token.to_string());

    let mut spec = TokenSpec::default();
    let mut rest = token;

    let tag_len = rest.find(['.', '#', '[']).unwrap_or(rest.len());
    if tag_len > 0 {
        spec.tag = Some(rest[..tag_len].to_lowercase());
        rest = &rest[tag_len..];
    }

    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix('.') {
            let len = tail.find(['.', '#', '[']).unwrap_or(tail.len());
            if len == 0 {
                return Err(invalid());
            }
            spec.classes.push(tail[..len].to_string());
            rest = &tail[len..];
        } else if let Some(tail) = rest.strip_prefix('#') {
            let len = tail.find(['.', '#', '[']).unwrap_or(tail.len());
            if len == 0 {
                return Err(invalid());
            }
            spec.id = Some(tail[..len].to_string());
            rest = &tail[len..];
        } else if let Some(tail) = rest.strip_prefix('[') {
            let end = tail.find(']').ok_or_else(invalid)?;
            let body = &tail[..end];
            let eq = body.find('=').ok_or_else(invalid)?;
            let name = body[..eq].trim();
            let value = body[eq + 1..].trim().trim_matches(['"', '\'']);
            if name.is_empty() {
                return Err(invalid());
            }
            spec.attrs.push((name.to_lowercase(), value.to_string()));
            rest = &tail[end + 1..];
        } else {
            return Err(invalid());
        }
    }

    Ok(spec)
}

fn find_first(doc: &Document, scope: usize, tokens: &[TokenSpec]) -> Option<usize> {
    for id in doc.descendants(scope) {
        if tokens[0].matches(doc.node(id)) {
            if tokens.len() == 1 {
                return Some(id);
            }
            if let Some(hit) = find_first(doc, id, &tokens[1..]) {
                return Some(hit);
            }
        }
    }
    None
}

fn find_all(doc: &Document, scope: usize, tokens: &[TokenSpec], out: &mut Vec<usize>) {
    for id in doc.descendants(scope) {
        if tokens[0].matches(doc.node(id)) {
            if tokens.len() == 1 {
                out.push(id);
            } else {
                find_all(doc, id, &tokens[1..], out);
            }
        }
    }
}

impl Document {
    /// All nodes under `scope` matching the full descendant chain, in
    /// preorder, deduplicated.
    pub fn select_in(&self, scope: usize, selector: &str) -> Result<Vec<usize>> {
        let tokens = parse_selector(selector)?;
        let mut raw = Vec::new();
        find_all(self, scope, &tokens, &mut raw);

        let mut seen = std::collections::HashSet::new();
        raw.retain(|id| seen.insert(*id));
        Ok(raw)
    }

    /// All matches anywhere in the document.
    pub fn select(&self, selector: &str) -> Result<Vec<usize>> {
        self.select_in(self.root(), selector)
    }

    /// First full-chain match under `scope`, or `None`.
    pub fn select_first_in(&self, scope: usize, selector: &str) -> Result<Option<usize>> {
        let tokens = parse_selector(selector)?;
        Ok(find_first(self, scope, &tokens))
    }

    /// First match anywhere in the document.
    pub fn select_first(&self, selector: &str) -> Result<Option<usize>> {
        self.select_first_in(self.root(), selector)
    }
}

/// Tries comma-separated alternatives in order; the first alternative with
/// any match decides the result. Blank alternatives are skipped.
pub fn select_alternatives(doc: &Document, scope: usize, alternatives: &str) -> Result<Vec<usize>> {
    let mut tried_any = false;
    for alt in alternatives.split(',') {
        if alt.trim().is_empty() {
            continue;
        }
        tried_any = true;
        let found = doc.select_in(scope, alt)?;
        if !found.is_empty() {
            return Ok(found);
        }
    }
    if tried_any {
        Ok(Vec::new())
    } else {
        Err(PricewatchError::InvalidSelector(alternatives.to_string()))
    }
}

/// First match across comma-separated alternatives, tried in order.
pub fn select_first_alternative(
    doc: &Document, scope: usize, alternatives: &str,
) -> Result<Option<usize>> {
    Ok(select_alternatives(doc, scope, alternatives)?.into_iter().next())
}
