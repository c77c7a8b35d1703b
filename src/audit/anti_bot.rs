//! Detection of pages served by a bot-blocking service instead of the site

use crate::audit::viewport_label;
use crate::browser::Browser;
use crate::output::{ResultSink, Row};
use crate::state::SiteAssignment;
use crate::url::netloc;
use std::collections::HashMap;
use std::fmt;
use url::Url;

/// A known bot-blocking vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AntiBotVendor {
    Imperva,
    Cloudflare,
    AzureFrontDoor,
}

impl AntiBotVendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Imperva => "Imperva",
            Self::Cloudflare => "Cloudflare",
            Self::AzureFrontDoor => "Azure Front Door",
        }
    }
}

impl fmt::Display for AntiBotVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Checked in order; a later match overrides an earlier one
const SIGNATURES: [(&str, AntiBotVendor); 3] = [
    ("Incapsula incident ID", AntiBotVendor::Imperva),
    ("Cloudflare Ray ID", AntiBotVendor::Cloudflare),
    (
        r#"The request is blocked.</h2></div><div id="errorref">"#,
        AntiBotVendor::AzureFrontDoor,
    ),
];

/// Finds a blocking-vendor fingerprint in a page's source
pub fn detect_anti_bot(page_source: &str) -> Option<AntiBotVendor> {
    SIGNATURES
        .iter()
        .filter(|(signature, _)| page_source.contains(signature))
        .map(|(_, vendor)| *vendor)
        .last()
}

/// Checks loaded pages for blocking and remembers the URLs found blocked
#[derive(Debug, Default)]
pub struct AntiBotDetector {
    discarded: HashMap<String, AntiBotVendor>,
}

impl AntiBotDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The vendor a URL was found blocked by earlier in this run
    pub fn discarded(&self, url: &str) -> Option<AntiBotVendor> {
        self.discarded.get(url).copied()
    }

    /// Inspects the page currently loaded in `browser`
    ///
    /// A newly blocked page gets a screenshot under `anti_bot_ss/` and a row in
    /// `anti_bot.csv`. Errors reading the page count as not blocked.
    pub fn check(
        &mut self,
        browser: &mut Browser,
        site: &SiteAssignment,
        sink: &dyn ResultSink,
    ) -> Option<AntiBotVendor> {
        let url = match browser.current_url() {
            Ok(url) => url,
            Err(e) => {
                tracing::error!("Could not read current URL for anti-bot check: {}", e);
                return None;
            }
        };
        if let Some(vendor) = self.discarded(&url) {
            return Some(vendor);
        }

        let source = match browser.raw_page_source() {
            Ok(source) => source,
            Err(e) => {
                tracing::error!("Could not read page source for anti-bot check on {}: {}", url, e);
                return None;
            }
        };
        let vendor = detect_anti_bot(&source)?;
        tracing::error!("{} detected on {}", vendor, url);

        let domain = Url::parse(&url)
            .ok()
            .and_then(|u| netloc(&u))
            .unwrap_or_else(|| "unknown".to_string());

        match browser.screenshot_png() {
            Ok(png) => {
                if let Err(e) = sink.write_artifact(&format!("anti_bot_ss/{}.png", domain), &png) {
                    tracing::warn!("Could not save anti-bot screenshot for {}: {}", url, e);
                }
            }
            Err(e) => tracing::warn!("Could not take anti-bot screenshot of {}: {}", url, e),
        }

        let row = Row::new()
            .with("organisation", &site.organisation)
            .with("domain", &domain)
            .with("url", &url)
            .with("anti_bot_check", vendor)
            .with("viewport_size", viewport_label(browser.viewport()));
        if let Err(e) = sink.append_rows("anti_bot.csv", &[row]) {
            tracing::warn!("Could not write anti_bot.csv: {}", e);
        }

        self.discarded.insert(url, vendor);
        Some(vendor)
    }
}
