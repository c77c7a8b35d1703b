use url::Url;

/// Extracts the domain from a URL
///
/// Returns the lowercase host, or `None` for URLs without one.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use access_sweep::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.gov/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.gov".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the lowercase network location (`host` or `host:port`)
///
/// This is the key robots.txt rules and allow-list entries are stored under.
pub fn netloc(url: &Url) -> Option<String> {
    let host = extract_domain(url)?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

/// Strips a single leading `www.` label
pub fn strip_www(netloc: &str) -> &str {
    netloc.strip_prefix("www.").unwrap_or(netloc)
}

/// True when both URLs share a network location, ignoring case and `www.`
pub fn same_domain(a: &Url, b: &Url) -> bool {
    match (netloc(a), netloc(b)) {
        (Some(a), Some(b)) => strip_www(&a) == strip_www(&b),
        _ => false,
    }
}

/// True when both URLs use the same scheme
pub fn same_scheme(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
}

/// Reduces a URL to `scheme://netloc`
pub fn origin_url(url: &Url) -> String {
    match netloc(url) {
        Some(netloc) => format!("{}://{}", url.scheme(), netloc),
        None => url.as_str().to_string(),
    }
}
