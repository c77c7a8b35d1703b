//! Site scope checks
//!
//! Two seeds may live on the same host with different path prefixes
//! (`https://example.gov/` and `https://example.gov/parks/`). Each page must be
//! audited under exactly one of them: the most specific prefix wins.

use crate::url::domain::netloc;
use url::Url;

/// Normalizes a URL into the prefix used for scope comparison
///
/// Scheme and host are lowercased, the query and fragment are dropped, and a
/// trailing file name is removed so that `https://a.gov/x/page.html` becomes
/// `https://a.gov/x/`.
pub fn scope_prefix(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let full = format!("{}://{}{}", parsed.scheme(), netloc(&parsed)?, parsed.path());
    Some(remove_file_from_path(&full).to_string())
}

fn remove_file_from_path(url: &str) -> &str {
    if url.ends_with('/') {
        return url;
    }
    match url.rfind('/') {
        Some(idx) => &url[..=idx],
        None => url,
    }
}

/// Decides whether `url` belongs to the site seeded at `base_url`
///
/// `url` must fall under the seed's prefix and must not fall under a longer
/// prefix belonging to any other seed in `all_base_urls`. Seeds with identical
/// prefixes do not exclude each other; whichever site reaches a page first
/// audits it.
pub fn is_within_scope<'a, I>(base_url: &str, url: &str, all_base_urls: I) -> bool
where
    I: IntoIterator<Item = &'a String>,
{
    let (Some(current_base), Some(current_url)) = (scope_prefix(base_url), scope_prefix(url)) else {
        return false;
    };

    if !current_url.starts_with(&current_base) {
        tracing::debug!(
            "URL filtered out due to not starting with base_url {} {}",
            current_base,
            current_url
        );
        return false;
    }

    for other in all_base_urls {
        let Some(other) = scope_prefix(other) else {
            continue;
        };
        if other.len() > current_base.len() && current_url.starts_with(&other) {
            tracing::debug!(
                "URL filtered out due to being within the scope of another base_url {} {}",
                other,
                current_url
            );
            return false;
        }
    }

    true
}
