use crate::audit::{
    AntiBotDetector, AuditContext, AuditError, AuditOutcome, AuditResult, PluginRegistry,
    RegisteredAudit,
};
use crate::browser::Browser;
use crate::config::{Config, ViewportSize};
use crate::output::ResultSink;
use crate::state::{Analytics, SiteAssignment};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

const OPEN_DETAILS_SCRIPT: &str = r#"
    var details = document.querySelectorAll('details');
    var opened = 0;
    details.forEach(function(d) { if (!d.open) { d.setAttribute('open', ''); opened++; } });
    return [details.length, opened];
"#;

const COUNT_DETAILS_SCRIPT: &str = "return document.querySelectorAll('details').length;";

/// Runs the enabled plugins against one page at every viewport
///
/// Owned by one worker. Plugin failures and browser crashes are absorbed
/// here and reported through the returned success flag; only a fatal
/// configuration error escapes.
pub struct AuditManager {
    config: Arc<Config>,
    analytics: Arc<Analytics>,
    sink: Arc<dyn ResultSink>,
    audits: Vec<RegisteredAudit>,
    anti_bot: AntiBotDetector,
}

impl AuditManager {
    pub fn new(
        config: Arc<Config>,
        registry: &PluginRegistry,
        analytics: Arc<Analytics>,
        sink: Arc<dyn ResultSink>,
    ) -> AuditResult<Self> {
        let audits = registry.instantiate(&config)?;
        Ok(Self {
            config,
            analytics,
            sink,
            audits,
            anti_bot: AntiBotDetector::new(),
        })
    }

    pub fn plugin_names(&self) -> impl Iterator<Item = &str> {
        self.audits.iter().map(|a| a.name())
    }

    /// Audits `url` at every configured viewport
    ///
    /// Returns `Ok(true)` only when every plugin at every viewport either
    /// produced results or was cleanly skipped. A page found behind a
    /// bot-blocking service returns `Ok(false)` immediately.
    pub fn run_audits(
        &mut self,
        browser: &mut Browser,
        url: &str,
        site: &SiteAssignment,
    ) -> AuditResult<bool> {
        let page_id = self.analytics.next_page_id();
        let viewports = self.config.viewports.clone();
        let mut all_successful = true;

        for (index, viewport) in viewports.iter().enumerate() {
            let audit_id = format!("{}_{}", page_id, viewport.name);
            browser.set_window_size(viewport.width, viewport.height);

            for audit in self.audits.iter_mut() {
                if !audit.runs_at(viewport) {
                    continue;
                }
                let name = audit.entry.name.clone();
                tracing::info!("Starting audit {} on {}", name, url);

                let loaded = browser.get_if_necessary(url);

                if let Some(vendor) = self.anti_bot.check(browser, site, self.sink.as_ref()) {
                    tracing::warn!("Skipping {} on {}: blocked by {}", name, url, vendor);
                    return Ok(false);
                }

                if !loaded {
                    tracing::warn!("Skipping {} on {}: page failed to load", name, url);
                    continue;
                }

                if self.config.crawler.force_open_details_elements {
                    open_details_elements(browser);
                } else {
                    log_details_elements(browser);
                }

                let started = Instant::now();
                let mut ctx = AuditContext {
                    browser: &mut *browser,
                    config: &self.config,
                    url,
                    site,
                    audit_id: &audit_id,
                    page_id,
                    viewport,
                    entry: &audit.entry,
                    sink: self.sink.as_ref(),
                };
                let result = audit.plugin.run(&mut ctx);

                match result {
                    Err(AuditError::Fatal(message)) => {
                        tracing::error!("Fatal error in {} on {}: {}", name, url, message);
                        return Err(AuditError::Fatal(message));
                    }
                    Err(AuditError::Browser(fault)) if fault.is_session_dead() => {
                        tracing::error!(
                            "Browser crashed; {} skipped at {} for {}: {}",
                            name,
                            viewport.name,
                            url,
                            fault
                        );
                        all_successful = false;
                        recover_session(browser, viewport, url, &name);
                    }
                    Err(e) => {
                        tracing::error!("Unhandled error in {} on {}: {}", name, url, e);
                        all_successful = false;
                    }
                    Ok(AuditOutcome::Skipped) => {
                        tracing::info!("Skipping audit {}, {}", name, url);
                    }
                    Ok(AuditOutcome::Failed) => {
                        tracing::error!("Test failed {}, {}", name, url);
                        all_successful = false;
                    }
                    Ok(AuditOutcome::EmptyOk) => {
                        tracing::error!("Test gave empty response {}, {}", name, url);
                    }
                    Ok(AuditOutcome::Rows(rows)) if rows.is_empty() => {
                        tracing::error!("Test gave empty response {}, {}", name, url);
                    }
                    Ok(AuditOutcome::Rows(rows)) => {
                        tracing::info!(
                            "Test time {} {} {:.5}",
                            name,
                            url,
                            started.elapsed().as_secs_f64()
                        );
                        if let Err(e) = self.sink.append_rows(&format!("{}.csv", name), &rows) {
                            tracing::error!("Could not write {} results for {}: {}", name, url, e);
                        }
                    }
                }
            }

            if index + 1 < viewports.len() {
                match browser.refresh() {
                    Ok(()) => thread::sleep(self.config.browser.delay_between_viewports()),
                    Err(e) => {
                        tracing::warn!("Failed to refresh {}: {}", url, e);
                        browser.safe_restart();
                        break;
                    }
                }
            }
        }

        Ok(all_successful)
    }
}

/// Respawns the browser after a crash and reloads the page at `viewport`
fn recover_session(browser: &mut Browser, viewport: &ViewportSize, url: &str, audit: &str) {
    browser.safe_restart();
    browser.set_window_size(viewport.width, viewport.height);
    if !browser.get_if_necessary(url) {
        tracing::error!("After a browser crash, reloading {} failed ({})", url, audit);
    }
}

fn open_details_elements(browser: &mut Browser) {
    match browser.execute_script(OPEN_DETAILS_SCRIPT) {
        Ok(counts) => {
            let opened = counts.get(1).and_then(|v| v.as_u64()).unwrap_or(0);
            if opened > 0 {
                tracing::info!("opening {} <details> element(s)", opened);
            }
        }
        Err(e) => tracing::warn!("Could not open <details> elements: {}", e),
    }
}

fn log_details_elements(browser: &mut Browser) {
    if let Ok(count) = browser.execute_script(COUNT_DETAILS_SCRIPT) {
        let count = count.as_u64().unwrap_or(0);
        if count > 0 {
            tracing::info!("ignoring {} <details> element(s)", count);
        }
    }
}
