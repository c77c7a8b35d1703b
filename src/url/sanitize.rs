use crate::UrlError;
use url::Url;

/// Sanitizes a URL before it is checked or loaded
///
/// # Sanitation Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Reject any scheme other than http and https
/// 3. Percent-encode the path (done by the parser for anything unsafe)
/// 4. Remove dot segments (`.` and `..`) without climbing above the root,
///    and collapse repeated slashes
/// 5. Keep a trailing slash if the path had one
///
/// Query and fragment are left untouched. The operation is idempotent:
/// sanitizing an already sanitized URL returns it unchanged.
///
/// # Examples
///
/// ```
/// use access_sweep::url::sanitize_url;
///
/// let url = sanitize_url("https://example.gov/a/../b/./c/").unwrap();
/// assert_eq!(url.as_str(), "https://example.gov/b/c/");
/// ```
pub fn sanitize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingDomain);
    }

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    Ok(url)
}

/// Removes dot segments and empty segments, preserving a trailing slash
fn normalize_path(path: &str) -> String {
    let trailing_slash = path.ends_with('/');
    let mut normalized_segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                normalized_segments.pop();
            }
            _ => normalized_segments.push(segment),
        }
    }

    if normalized_segments.is_empty() {
        return "/".to_string();
    }

    let mut result = format!("/{}", normalized_segments.join("/"));
    if trailing_slash {
        result.push('/');
    }
    result
}
