//! Shared, per-domain robots.txt cache
//!
//! Every worker consults the same cache. The first worker to need a domain
//! fetches its robots.txt; the lock is not held during the fetch, so two
//! workers racing on the same domain may both fetch it and the last write wins.

use crate::robots::RobotsRules;
use crate::url::netloc;
use crate::SweepError;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::collections::HashMap;
use std::io::{self, Read};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use url::Url;

/// Largest robots.txt body accepted, in bytes
pub const MAX_ROBOTS_BYTES: usize = 500 * 1024;

/// Connect and read timeout for robots.txt requests
const ROBOTS_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-domain robots.txt rules, shared across worker threads
pub struct RobotsCache {
    client: Client,
    product_token: String,
    entries: Mutex<HashMap<String, Arc<RobotsRules>>>,
}

impl RobotsCache {
    /// Creates an empty cache
    ///
    /// `user_agent` is sent with every robots.txt request; `product_token` is
    /// the name matched against the `User-agent` groups of each file.
    pub fn new(user_agent: &str, product_token: &str) -> Result<Self, SweepError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(ROBOTS_TIMEOUT)
            .connect_timeout(ROBOTS_TIMEOUT)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            product_token: product_token.to_string(),
            entries: Mutex::new(HashMap::new()),
        })
    }

    /// Number of domains with cached rules
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the cached rules for a domain, if any
    pub fn cached(&self, domain: &str) -> Option<Arc<RobotsRules>> {
        self.lock().get(domain).cloned()
    }

    /// Checks whether `url` may be crawled
    ///
    /// Rules are looked up by network location. On a cache miss the domain's
    /// robots.txt is fetched; if that fails for any reason the domain is cached
    /// as permissive and the URL is allowed.
    pub fn is_url_allowed(&self, url: &Url) -> bool {
        let Some(domain) = netloc(url) else {
            return true;
        };

        if let Some(rules) = self.cached(&domain) {
            tracing::debug!("Using cached robots.txt for {}", domain);
            return self.decide(&rules, url);
        }

        let robots_url = format!("{}://{}/robots.txt", url.scheme(), domain);
        let rules = match self.fetch_robots_txt(&robots_url) {
            Ok(body) => RobotsRules::parse(body),
            Err(e) => {
                tracing::warn!(
                    "Failed to fetch or parse robots.txt, defaulting to allow: {} ({})",
                    robots_url,
                    e
                );
                RobotsRules::permissive()
            }
        };

        let rules = Arc::new(rules);
        self.lock().insert(domain, Arc::clone(&rules));
        self.decide(&rules, url)
    }

    fn decide(&self, rules: &RobotsRules, url: &Url) -> bool {
        let allowed = rules.can_fetch(&self.product_token, url.as_str());
        tracing::debug!(
            "robots.txt result for {} was {}",
            url,
            if allowed { "allow" } else { "disallow" }
        );
        allowed
    }

    /// Fetches a robots.txt body
    ///
    /// Fails on a non-success status, on a Content-Type other than
    /// `text/plain` (when the header is present), and on bodies over 500 KB.
    /// Invalid UTF-8 sequences are dropped from the returned text.
    pub fn fetch_robots_txt(&self, robots_url: &str) -> Result<String, SweepError> {
        tracing::info!("Fetching robots.txt {}", robots_url);

        let http_err = |source| SweepError::Http {
            url: robots_url.to_string(),
            source,
        };

        let response = self
            .client
            .get(robots_url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(http_err)?;

        if let Some(content_type) = response.headers().get(CONTENT_TYPE) {
            let content_type = content_type.to_str().unwrap_or_default();
            if !is_plain_text(content_type) {
                return Err(SweepError::Robots(format!(
                    "robots.txt has invalid Content-Type {} {}",
                    robots_url, content_type
                )));
            }
        }

        let too_large = || {
            SweepError::Robots(format!(
                "robots.txt file is too large (>500 KB) on {}",
                robots_url
            ))
        };
        if response
            .content_length()
            .map_or(false, |len| len > MAX_ROBOTS_BYTES as u64)
        {
            return Err(too_large());
        }

        let bytes = read_capped(response, MAX_ROBOTS_BYTES)?.ok_or_else(too_large)?;

        Ok(String::from_utf8_lossy(&bytes).replace('\u{FFFD}', ""))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<RobotsRules>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reads at most `limit` bytes; `None` when the reader holds more than that
fn read_capped<R: Read>(reader: R, limit: usize) -> io::Result<Option<Vec<u8>>> {
    let mut bytes = Vec::new();
    reader.take(limit as u64 + 1).read_to_end(&mut bytes)?;
    if bytes.len() > limit {
        return Ok(None);
    }
    Ok(Some(bytes))
}

/// Matches `text/plain` optionally followed by parameters, ignoring case
fn is_plain_text(content_type: &str) -> bool {
    let lower = content_type.trim().to_ascii_lowercase();
    lower == "text/plain" || lower.starts_with("text/plain;")
}
