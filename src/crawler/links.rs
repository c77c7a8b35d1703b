//! Link extraction from the rendered DOM

use crate::browser::Browser;
use crate::url::{same_domain, same_scheme, UrlFilter};
use scraper::{Html, Selector};
use url::Url;

/// Returns the auditable links on the page loaded at `url`
///
/// Links are read from the DOM as the browser rendered it, resolved against
/// the effective base URI and kept only when they pass `filter` and stay on
/// the domain of `base_url`. Reading the page source failing yields no links.
pub fn get_links(browser: &mut Browser, filter: &UrlFilter, base_url: &str, url: &str) -> Vec<String> {
    let source = match browser.page_source() {
        Ok(source) => source,
        Err(e) => {
            tracing::error!("Failed to get page source for links on {}: {}", url, e);
            return Vec::new();
        }
    };
    let base_uri = effective_base_uri(browser, url);
    extract_links(&source, &base_uri, filter, base_url)
}

/// The URI relative links on `url` resolve against
///
/// A `<base>` element only counts when it keeps the page's domain and
/// scheme; otherwise the page URL itself is used.
pub fn effective_base_uri(browser: &mut Browser, url: &str) -> String {
    let base_uri = match browser.base_uri() {
        Ok(base_uri) => base_uri,
        Err(e) => {
            tracing::warn!("Could not read base URI of {}, using the page URL: {}", url, e);
            return url.to_string();
        }
    };
    if base_uri == url {
        return base_uri;
    }

    match (Url::parse(&base_uri), Url::parse(url)) {
        (Ok(base), Ok(page)) if same_domain(&base, &page) && same_scheme(&base, &page) => {
            tracing::info!("Using <base> element {} for links on {}", base_uri, url);
            base_uri
        }
        _ => {
            tracing::warn!(
                "Ignoring <base> element {} on {}: different domain or scheme",
                base_uri,
                url
            );
            url.to_string()
        }
    }
}

/// Extracts, resolves and filters every `a[href]` in `html`
pub fn extract_links(html: &str, base_uri: &str, filter: &UrlFilter, base_url: &str) -> Vec<String> {
    let (Ok(join_base), Ok(site)) = (Url::parse(base_uri), Url::parse(base_url)) else {
        tracing::error!("Cannot resolve links against {} for {}", base_uri, base_url);
        return Vec::new();
    };
    let Ok(anchors) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let mut links = Vec::new();

    for element in document.select(&anchors) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let href = match join_base.join(href.trim()) {
            Ok(joined) => joined,
            Err(e) => {
                tracing::debug!("Failed to join URL {} {}: {}", base_uri, href, e);
                continue;
            }
        };

        if !filter.run_filters(href.as_str()) {
            continue;
        }
        if !same_domain(&href, &site) {
            tracing::debug!("URL filtered out for leaving {}: {}", base_url, href);
            continue;
        }

        let href = href.to_string();
        if href.len() > 2 && base_url == &href[..href.len() - 1] {
            tracing::info!("Skipped link equal to the base URL: {} {}", base_url, href);
            continue;
        }
        links.push(href);
    }

    links
}
