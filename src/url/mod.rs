//! URL handling module for Access-Sweep
//!
//! This module provides URL sanitation, scope checks, domain helpers and the
//! [`UrlFilter`] registry that decides whether a URL may be audited at all.

mod domain;
mod sanitize;
mod scope;

use std::collections::HashSet;
use url::Url;

// Re-export main functions
pub use domain::{extract_domain, netloc, origin_url, same_domain, same_scheme, strip_www};
pub use sanitize::sanitize_url;
pub use scope::{is_within_scope, scope_prefix};

/// File extensions that never lead to an auditable HTML page
pub const DISALLOWED_EXTENSIONS: &[&str] = &[
    ".xml", ".gif", ".csv", ".xls", ".xlsx", ".dmg", ".exe", ".wmv", ".wma", ".flv", ".ppt",
    ".py", ".pptx", ".jpg", ".jpeg", ".png", ".avi", ".mov", ".m4a", ".m4v", ".mp3", ".mp4",
    ".doc", ".docx", ".pdf", ".swf", ".jar", ".tar.gz", ".zip", ".iso", ".crt", ".crl", ".pem",
    ".key", ".pfx", ".p12", ".der", ".cer", ".psd", ".ai", ".eps", ".ttf", ".otf", ".woff",
    ".woff2", ".eot", ".svg", ".srt", ".wav", ".brf", ".txt",
];

/// A named URL predicate; returning `false` rejects the URL
pub type FilterFn = Box<dyn Fn(&Url) -> bool + Send + Sync>;

/// An ordered registry of named URL predicates
///
/// Filters run in registration order and the first rejection wins. The
/// standard set is built by [`UrlFilter::standard`]; callers may register
/// additional predicates without touching the call sites that run them.
///
/// # Examples
///
/// ```
/// use access_sweep::url::UrlFilter;
///
/// let mut filter = UrlFilter::standard(false, ["example.gov"]);
/// filter.register("No query strings", |url| url.query().is_none());
///
/// assert!(filter.run_filters("https://www.example.gov/about"));
/// assert!(!filter.run_filters("https://example.gov/search?q=x"));
/// assert!(!filter.run_filters("https://other.gov/"));
/// ```
pub struct UrlFilter {
    filters: Vec<(String, FilterFn)>,
}

impl UrlFilter {
    /// Creates an empty registry that accepts every parseable URL
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    /// Creates the standard registry
    ///
    /// The allow-list check is registered last so the cheap structural checks
    /// reject most junk before it.
    pub fn standard<I, S>(only_allow_https: bool, allowed_netlocs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed: HashSet<String> = allowed_netlocs
            .into_iter()
            .map(|n| strip_www(&n.as_ref().to_lowercase()).to_string())
            .collect();

        let mut filter = Self::new();
        filter.register("Non-empty fragment", |url| {
            url.fragment().map_or(true, str::is_empty)
        });
        filter.register("HTTPS only", move |url| {
            !only_allow_https || url.scheme() == "https"
        });
        filter.register("Non-http/s path", |url| {
            matches!(url.scheme(), "http" | "https")
        });
        filter.register("Non-allowed file extension", |url| {
            let path = url.path().to_lowercase();
            !DISALLOWED_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
        });
        filter.register("Whitelist", move |url| {
            netloc(url).map_or(false, |n| allowed.contains(strip_www(&n)))
        });
        filter
    }

    /// Adds a predicate to the end of the chain
    pub fn register<F>(&mut self, name: impl Into<String>, predicate: F)
    where
        F: Fn(&Url) -> bool + Send + Sync + 'static,
    {
        self.filters.push((name.into(), Box::new(predicate)));
    }

    /// Names of the registered filters, in run order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.filters.iter().map(|(name, _)| name.as_str())
    }

    /// Returns the name of the first filter rejecting `url`
    ///
    /// Unparseable URLs are rejected with the name `"Unparseable URL"`.
    pub fn rejecting_filter(&self, url: &str) -> Option<&str> {
        let Ok(parsed) = Url::parse(url) else {
            return Some("Unparseable URL");
        };
        self.filters
            .iter()
            .find(|(_, predicate)| !predicate(&parsed))
            .map(|(name, _)| name.as_str())
    }

    /// Runs every filter; `true` means the URL may be audited
    pub fn run_filters(&self, url: &str) -> bool {
        match self.rejecting_filter(url) {
            Some(name) => {
                tracing::debug!("URL filtered out by '{}': {}", name, url);
                false
            }
            None => true,
        }
    }
}

impl Default for UrlFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_filter() -> UrlFilter {
        UrlFilter::standard(false, ["example.gov", "www.parks.gov", "127.0.0.1:8080"])
    }

    #[test]
    fn test_standard_filter_order() {
        let filter = create_test_filter();
        let names: Vec<&str> = filter.names().collect();
        assert_eq!(
            names,
            vec![
                "Non-empty fragment",
                "HTTPS only",
                "Non-http/s path",
                "Non-allowed file extension",
                "Whitelist"
            ]
        );
    }

    #[test]
    fn test_accepts_plain_page() {
        let filter = create_test_filter();
        assert!(filter.run_filters("https://example.gov/about"));
        assert!(filter.run_filters("http://example.gov/about/"));
        assert!(filter.run_filters("https://example.gov/report.html"));
    }

    #[test]
    fn test_rejects_fragment() {
        let filter = create_test_filter();
        assert_eq!(
            filter.rejecting_filter("https://example.gov/page#section"),
            Some("Non-empty fragment")
        );
        assert!(filter.run_filters("https://example.gov/page#"));
    }

    #[test]
    fn test_https_only() {
        let filter = UrlFilter::standard(true, ["example.gov"]);
        assert_eq!(
            filter.rejecting_filter("http://example.gov/"),
            Some("HTTPS only")
        );
        assert!(filter.run_filters("https://example.gov/"));
    }

    #[test]
    fn test_rejects_other_schemes() {
        let filter = create_test_filter();
        assert_eq!(
            filter.rejecting_filter("ftp://example.gov/file"),
            Some("Non-http/s path")
        );
        assert_eq!(
            filter.rejecting_filter("mailto:someone@example.gov"),
            Some("Non-http/s path")
        );
    }

    #[test]
    fn test_rejects_file_extensions() {
        let filter = create_test_filter();
        for url in [
            "https://example.gov/annual-report.PDF",
            "https://example.gov/logo.png",
            "https://example.gov/archive.tar.gz",
            "https://example.gov/robots.txt",
        ] {
            assert_eq!(
                filter.rejecting_filter(url),
                Some("Non-allowed file extension"),
                "{}",
                url
            );
        }
    }

    #[test]
    fn test_whitelist_with_and_without_www() {
        let filter = create_test_filter();
        assert!(filter.run_filters("https://www.example.gov/"));
        assert!(filter.run_filters("https://parks.gov/"));
        assert!(filter.run_filters("https://WWW.PARKS.GOV/"));
        assert!(filter.run_filters("http://127.0.0.1:8080/x"));
        assert_eq!(
            filter.rejecting_filter("https://evil.gov/"),
            Some("Whitelist")
        );
        assert_eq!(
            filter.rejecting_filter("http://127.0.0.1:9090/x"),
            Some("Whitelist")
        );
    }

    #[test]
    fn test_fails_closed_on_parse_error() {
        let filter = create_test_filter();
        assert!(!filter.run_filters("not a url"));
        assert!(!filter.run_filters(""));
        assert!(!UrlFilter::new().run_filters("::"));
    }

    #[test]
    fn test_registered_filter_runs_last() {
        let mut filter = create_test_filter();
        filter.register("No login pages", |url| !url.path().starts_with("/login"));

        assert_eq!(
            filter.rejecting_filter("https://example.gov/login"),
            Some("No login pages")
        );
        assert_eq!(
            filter.rejecting_filter("https://other.gov/login"),
            Some("Whitelist")
        );
    }
}
