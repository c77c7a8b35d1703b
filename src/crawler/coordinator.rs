//! Per-site crawl loop
//!
//! A [`Crawler`] audits one site at a time. Each popped URL passes through:
//! - sanitising
//! - the robots.txt check
//! - the header pre-check (adopting the redirect-resolved URL)
//! - the URL filters and the cross-site scope check
//! - the cross-thread "already scanned" check
//!
//! before it is audited. Links found on audited pages are queued for the
//! same site. The crawl ends when the frontier runs dry, the page cap is hit
//! or three audits in a row fail.

use crate::audit::{AuditManager, AuditResult, PluginRegistry};
use crate::browser::Browser;
use crate::config::Config;
use crate::crawler::frontier::Frontier;
use crate::crawler::headers::{record_unexpected_status, HeaderChecker};
use crate::crawler::links::get_links;
use crate::output::{ResultSink, Row};
use crate::robots::RobotsCache;
use crate::state::{Analytics, CrawlState, SiteAssignment};
use crate::url::{is_within_scope, sanitize_url, UrlFilter};
use crate::SweepError;
use std::sync::Arc;
use std::thread;

/// Consecutive failed page audits after which a site is abandoned
pub const MAX_CONSECUTIVE_FAILURES: usize = 3;

/// Everything the workers of one run share
#[derive(Clone)]
pub struct CrawlContext {
    pub config: Arc<Config>,
    pub analytics: Arc<Analytics>,
    pub robots: Arc<RobotsCache>,
    pub headers: Arc<HeaderChecker>,
    pub url_filter: Arc<UrlFilter>,
    pub sinks: Arc<dyn ResultSink>,
    pub registry: Arc<PluginRegistry>,
}

impl CrawlContext {
    /// Builds the shared context with the built-in plugins
    pub fn new(
        config: Arc<Config>,
        analytics: Arc<Analytics>,
        url_filter: UrlFilter,
        sinks: Arc<dyn ResultSink>,
    ) -> Result<Self, SweepError> {
        let robots = RobotsCache::new(
            &config.browser.user_agent,
            &config.browser.user_agent_product_token,
        )?;
        let headers = HeaderChecker::new(&config.browser.user_agent)?;

        Ok(Self {
            config,
            analytics,
            robots: Arc::new(robots),
            headers: Arc::new(headers),
            url_filter: Arc::new(url_filter),
            sinks,
            registry: Arc::new(PluginRegistry::builtin()),
        })
    }

    /// Replaces the plugin registry
    pub fn with_registry(mut self, registry: PluginRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }
}

/// How one site crawl ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlReport {
    pub pages_scanned: usize,
    pub state: CrawlState,
}

/// Crawls and audits sites one at a time; owned by a single worker
pub struct Crawler {
    ctx: CrawlContext,
    audits: AuditManager,
}

impl Crawler {
    /// Creates a crawler and instantiates its plugins
    ///
    /// Fails with [`crate::audit::AuditError::Fatal`] when a plugin cannot
    /// be built from its configuration.
    pub fn new(ctx: CrawlContext) -> AuditResult<Self> {
        let audits = AuditManager::new(
            Arc::clone(&ctx.config),
            &ctx.registry,
            Arc::clone(&ctx.analytics),
            Arc::clone(&ctx.sinks),
        )?;
        Ok(Self { ctx, audits })
    }

    /// Crawls and audits one site
    ///
    /// Only a configuration-fatal plugin error is returned as `Err`; every
    /// other failure ends in a report. The site's page count is written to
    /// `pages_scanned.csv` and the run's page estimate adjusted exactly once,
    /// however the crawl ends.
    pub fn crawl(&mut self, browser: &mut Browser, site: &SiteAssignment) -> AuditResult<CrawlReport> {
        let config = Arc::clone(&self.ctx.config);
        let base_url = site.url.as_str();
        let cap = config.audit.max_links_per_domain;
        let single_page = config.single_page_mode();

        tracing::info!(
            "Starting {} of {}",
            if single_page { "visit" } else { "crawl" },
            base_url
        );

        if !self.ctx.url_filter.run_filters(base_url) {
            tracing::error!("base_url was filtered out! {}", base_url);
            return Ok(self.finish(site, 0, CrawlState::Failed));
        }

        let all_base_urls = self.ctx.analytics.base_urls();
        let mut frontier = Frontier::seeded(base_url);
        let mut rng = rand::thread_rng();
        let mut pages_scanned = 0;
        let mut failures = 0;
        let mut phase = CrawlState::Seeded;

        let state = loop {
            if pages_scanned >= cap {
                tracing::info!("Max pages scanned reached {}", base_url);
                break CrawlState::Capped;
            }
            let Some(entry) = frontier.pop(&mut rng) else {
                if !single_page {
                    tracing::info!("Crawl exhausted all links {}", base_url);
                }
                break CrawlState::Exhausted;
            };
            if phase == CrawlState::Seeded {
                phase = CrawlState::Discovering;
                tracing::debug!("{} is now {}", base_url, phase);
            }

            thread::sleep(config.crawler.delay_between_page_loads());

            let Some(url) = self.accept(site, &entry.parent, &entry.url, &all_base_urls) else {
                continue;
            };

            self.log_audit(site, &url);

            if self.audits.run_audits(browser, &url, site)? {
                self.ctx.analytics.add_page_scanned(base_url, &url);
                failures = 0;
                pages_scanned += 1;
            } else {
                failures += 1;
                tracing::warn!("Audit failed on {} ({} in a row)", url, failures);
                if failures >= MAX_CONSECUTIVE_FAILURES {
                    tracing::error!("Too many sequential test failures, skipping {}", base_url);
                    break CrawlState::Failed;
                }
            }

            if single_page {
                break if pages_scanned >= cap {
                    CrawlState::Capped
                } else {
                    CrawlState::Failed
                };
            }

            for link in get_links(browser, &self.ctx.url_filter, base_url, &url) {
                frontier.push(&url, &link, entry.depth + 1);
            }
        };

        Ok(self.finish(site, pages_scanned, state))
    }

    /// Runs the pre-audit checks on a popped URL
    ///
    /// Returns the URL to audit (possibly redirect-resolved), or `None` to
    /// discard it.
    fn accept(
        &self,
        site: &SiteAssignment,
        parent_url: &str,
        url: &str,
        all_base_urls: &[String],
    ) -> Option<String> {
        let crawler = &self.ctx.config.crawler;
        let base_url = site.url.as_str();

        let sanitized = match sanitize_url(url) {
            Ok(sanitized) => sanitized,
            Err(e) => {
                tracing::debug!("Discarding unsanitisable URL {}: {}", url, e);
                return None;
            }
        };

        if crawler.follow_robots_txt && !self.ctx.robots.is_url_allowed(&sanitized) {
            tracing::info!("URL disallowed by robots.txt {}", sanitized);
            return None;
        }

        let mut url = sanitized.to_string();

        if crawler.perform_header_check {
            let check = self.ctx.headers.check(&url, site.supports_head);
            url = check.final_url.clone();
            if !check.is_acceptable() {
                tracing::info!("URL filtered out due to bad http status_code: {} {}", url, check.status);
                if crawler.record_unexpected_response_codes {
                    record_unexpected_status(
                        self.ctx.sinks.as_ref(),
                        base_url,
                        parent_url,
                        &url,
                        check.status,
                    );
                }
                return None;
            }
        }

        if !self.ctx.url_filter.run_filters(&url) {
            return None;
        }

        if !is_within_scope(base_url, &url, all_base_urls) {
            return None;
        }

        if self.ctx.analytics.is_url_in_pages_scanned(base_url, &url) {
            tracing::info!("URL has been scanned before {} for {}", url, base_url);
            return None;
        }

        Some(url)
    }

    fn log_audit(&self, site: &SiteAssignment, url: &str) {
        let row = Row::new()
            .with("organisation", &site.organisation)
            .with("base_url", &site.url)
            .with("url", url)
            .with("sector", &site.sector);
        if let Err(e) = self.ctx.sinks.append_rows("audit_log.csv", &[row]) {
            tracing::error!("Could not write audit log entry for {}: {}", url, e);
        }
    }

    /// Records the end of a site crawl
    fn finish(&self, site: &SiteAssignment, pages_scanned: usize, state: CrawlState) -> CrawlReport {
        debug_assert!(state.is_terminal());
        self.ctx.analytics.record_test_failure(&site.url);

        let row = Row::new()
            .with("organisation", &site.organisation)
            .with("base_url", &site.url)
            .with("number_of_pages", pages_scanned)
            .with("sector", &site.sector);
        if let Err(e) = self.ctx.sinks.append_rows("pages_scanned.csv", &[row]) {
            tracing::error!("Could not record pages scanned for {}: {}", site.url, e);
        }

        tracing::info!(
            "Finished {} with {} pages scanned ({})",
            site.url,
            pages_scanned,
            state
        );
        CrawlReport {
            pages_scanned,
            state,
        }
    }
}
