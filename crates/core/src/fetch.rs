//! Resilient page fetching.
//!
//! This module retrieves raw markup over HTTP with basic anti-automation
//! mitigation: a rotating client-identity header, detection of blocking
//! status codes and challenge pages, and a single bounded retry. The
//! rotation is best-effort evasion against trivial fingerprinting, not a
//! security boundary.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use crate::{PricewatchError, Result};

/// Browser-like identity strings rotated across requests.
const USER_AGENT_POOL: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.3 Safari/605.1.15",
];

/// Case-insensitive substrings that mark a bot-challenge page.
const CHALLENGE_MARKERS: &[&str] = &["captcha", "cloudflare", "are you human"];

/// HTTP client configuration for fetching pages.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Request timeout in seconds.
    pub timeout: u64,
    /// Extra attempts after a blocked or timed-out request. Bounded by
    /// design: repair loops must never turn into unbounded retry storms.
    pub max_retries: u32,
    /// Optional bypass cookies: either a raw `Cookie` header value or a
    /// JSON object of cookie name to value pairs.
    pub bypass_cookies: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { timeout: 20, max_retries: 1, bypass_cookies: None }
    }
}

/// Whether a status code signals rate-limiting or blocking.
pub fn is_blocking_status(status: u16) -> bool {
    matches!(status, 429 | 403 | 503)
}

/// Scans a response body for challenge-page markers.
///
/// Returns the marker found, if any.
pub fn detect_challenge(body: &str) -> Option<&'static str> {
    let lower = body.to_lowercase();
    CHALLENGE_MARKERS.iter().find(|marker| lower.contains(**marker)).copied()
}

/// Normalizes the opaque bypass-cookie input to a `Cookie` header value.
///
/// A JSON object becomes `name=value; ...` pairs; anything else is passed
/// through as-is.
pub fn cookie_header(raw: &str) -> String {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(raw.trim()) {
        let pairs: Vec<String> = map
            .iter()
            .filter_map(|(name, value)| value.as_str().map(|v| format!("{}={}", name, v)))
            .collect();
        if !pairs.is_empty() {
            return pairs.join("; ");
        }
    }
    raw.trim().to_string()
}

/// Fetches markup with identity rotation and bounded retry.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
    rotation: AtomicUsize,
}

impl Fetcher {
    /// Creates a fetcher with default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(FetchConfig::default())
    }

    /// Creates a fetcher with custom configuration.
    pub fn with_config(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .map_err(PricewatchError::Http)?;
        Ok(Self { client, config, rotation: AtomicUsize::new(0) })
    }

    fn next_user_agent(&self) -> &'static str {
        let index = self.rotation.fetch_add(1, Ordering::Relaxed);
        USER_AGENT_POOL[index % USER_AGENT_POOL.len()]
    }

    /// Fetches a page, retrying once when blocked or timed out.
    ///
    /// # Errors
    ///
    /// [`PricewatchError::FetchBlocked`] for blocking status codes and
    /// challenge pages (after the retry budget is spent),
    /// [`PricewatchError::Timeout`] for timeouts,
    /// [`PricewatchError::InvalidUrl`] for unparsable URLs.
    pub async fn fetch(&self, url: &str) -> Result<String> {
        let parsed = Url::parse(url).map_err(|e| PricewatchError::InvalidUrl(e.to_string()))?;

        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            match self.attempt(&parsed).await {
                Ok(body) => return Ok(body),
                Err(e) if is_retryable(&e) && attempt < self.config.max_retries => {
                    warn!(url, attempt, error = %e, "fetch blocked, retrying");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or(PricewatchError::Timeout { timeout: self.config.timeout }))
    }

    async fn attempt(&self, url: &Url) -> Result<String> {
        let user_agent = self.next_user_agent();
        debug!(%url, user_agent, "fetching");

        let mut request = self
            .client
            .get(url.clone())
            .header("User-Agent", user_agent)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.9,uk;q=0.8");

        if let Some(cookies) = &self.config.bypass_cookies {
            request = request.header("Cookie", cookie_header(cookies));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                PricewatchError::Timeout { timeout: self.config.timeout }
            } else {
                PricewatchError::Http(e)
            }
        })?;

        let status = response.status().as_u16();
        if is_blocking_status(status) {
            return Err(PricewatchError::FetchBlocked {
                url: url.to_string(),
                reason: format!("status {}", status),
            });
        }

        let body = response.text().await?;
        if let Some(marker) = detect_challenge(&body) {
            return Err(PricewatchError::FetchBlocked {
                url: url.to_string(),
                reason: format!("challenge page marker \"{}\"", marker),
            });
        }

        Ok(body)
    }
}

fn is_retryable(error: &PricewatchError) -> bool {
    matches!(error, PricewatchError::FetchBlocked { .. } | PricewatchError::Timeout { .. })
}
