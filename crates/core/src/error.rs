//! Error types for pricewatch operations.
//!
//! This module defines the main error type [`PricewatchError`] which
//! represents all possible failures during fetching, selector evaluation,
//! and record extraction.
//!
//! # Example
//!
//! ```rust
//! use pricewatch_core::{PricewatchError, Result};
//!
//! fn require_markup(html: &str) -> Result<()> {
//!     if html.is_empty() {
//!         return Err(PricewatchError::EmptyResult);
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Main error type for extraction operations.
///
/// Extraction-level variants ([`PricewatchError::InvalidSelector`],
/// [`PricewatchError::NoContainerMatch`], [`PricewatchError::EmptyResult`])
/// are recoverable through the self-heal loop; fetch-level variants are
/// retried once and then surfaced.
#[derive(Error, Debug)]
pub enum PricewatchError {
    /// Malformed selector syntax.
    ///
    /// Returned when a selector is blank or contains an unterminated
    /// attribute bracket. This is a repair target for the self-heal loop,
    /// never a user-facing fatal error on its own.
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    /// The item container selector matched zero nodes.
    ///
    /// The message carries the selector that failed so the repair step can
    /// report what it replaced.
    #[error("Container selector matched no elements: {0}")]
    NoContainerMatch(String),

    /// Every matched container yielded no usable record name.
    #[error("Extraction produced no records with a usable name")]
    EmptyResult,

    /// The response signalled rate-limiting, blocking, or a bot challenge.
    ///
    /// Raised for 429/403/503 status codes and for bodies carrying a
    /// challenge-page marker. The fetcher retries once before surfacing
    /// this variant.
    #[error("Fetch blocked for {url}: {reason}")]
    FetchBlocked { url: String, reason: String },

    /// Request timeout.
    ///
    /// Returned when an HTTP request exceeds the configured timeout
    /// duration. Subject to the same bounded retry as a blocked fetch.
    #[error("Request timed out after {timeout} seconds")]
    Timeout { timeout: u64 },

    /// Invalid URL provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// HTTP request errors from reqwest.
    ///
    /// Wraps network errors, DNS failures, connection issues, and other
    /// HTTP-level problems that are not block signals.
    #[cfg(feature = "fetch")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// File I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An oracle reply failed shape validation.
    ///
    /// This variant never crosses the public API boundary: invalid oracle
    /// output is always discarded in favor of the heuristic result.
    #[error("Oracle returned an unusable response: {0}")]
    InvalidOracleResponse(String),
}

impl PricewatchError {
    /// Whether this failure belongs to the extraction layer and should
    /// trigger a rule repair instead of being surfaced immediately.
    pub fn is_extraction_failure(&self) -> bool {
        matches!(
            self,
            PricewatchError::InvalidSelector(_)
                | PricewatchError::NoContainerMatch(_)
                | PricewatchError::EmptyResult
        )
    }
}

/// Result type alias for PricewatchError.
pub type Result<T> = std::result::Result<T, PricewatchError>;
