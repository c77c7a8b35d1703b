//! Worker pool
//!
//! Sites are pre-enumerated into one shared queue before any worker starts.
//! Each worker owns one [`Browser`] and one [`Crawler`] for its whole life and
//! pulls sites until the queue is empty. A configuration-fatal plugin error
//! raises a shared stop flag: no worker starts another site after that.

use crate::audit::AuditResult;
use crate::browser::{Browser, DriverFactory};
use crate::crawler::coordinator::{CrawlContext, Crawler};
use crate::state::SiteAssignment;
use crate::SweepError;
use crossbeam_channel::Receiver;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Totals over every site the pool crawled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSummary {
    pub sites_crawled: usize,
    /// Sites that ended in [`crate::state::CrawlState::Failed`]
    pub sites_failed: usize,
    pub pages_scanned: usize,
}

impl PoolSummary {
    fn merge(&mut self, other: PoolSummary) {
        self.sites_crawled += other.sites_crawled;
        self.sites_failed += other.sites_failed;
        self.pages_scanned += other.pages_scanned;
    }
}

/// Crawls every site with `config.audit.thread_count` workers
///
/// A thread count of 1 runs the single worker on the calling thread.
/// Returns the first configuration-fatal error any worker hit.
pub fn run_workers(
    ctx: &CrawlContext,
    factory: Arc<dyn DriverFactory>,
    sites: Vec<SiteAssignment>,
) -> Result<PoolSummary, SweepError> {
    let thread_count = ctx.config.audit.thread_count.max(1);
    tracing::info!("Auditing {} sites with {} workers", sites.len(), thread_count);

    let (tx_site, rx_site) = crossbeam_channel::unbounded::<SiteAssignment>();
    for site in sites {
        // the receiver is alive, so this cannot fail
        let _ = tx_site.send(site);
    }
    drop(tx_site);

    let stop = Arc::new(AtomicBool::new(false));

    if thread_count == 1 {
        return Ok(run_worker(0, ctx.clone(), factory, rx_site, &stop)?);
    }

    let mut workers = Vec::with_capacity(thread_count);
    for index in 0..thread_count {
        let ctx = ctx.clone();
        let factory = Arc::clone(&factory);
        let rx_site = rx_site.clone();
        let stop = Arc::clone(&stop);
        let worker = thread::Builder::new()
            .name(format!("worker-{}", index))
            .spawn(move || run_worker(index, ctx, factory, rx_site, &stop))?;
        workers.push(worker);
    }

    let mut summary = PoolSummary::default();
    let mut fatal = None;
    for (index, worker) in workers.into_iter().enumerate() {
        match worker.join() {
            Ok(Ok(worker_summary)) => summary.merge(worker_summary),
            Ok(Err(e)) => {
                fatal.get_or_insert(e);
            }
            Err(_) => tracing::error!("Worker {} panicked", index),
        }
    }

    match fatal {
        Some(e) => Err(e.into()),
        None => Ok(summary),
    }
}

fn run_worker(
    index: usize,
    ctx: CrawlContext,
    factory: Arc<dyn DriverFactory>,
    rx_site: Receiver<SiteAssignment>,
    stop: &AtomicBool,
) -> AuditResult<PoolSummary> {
    let mut crawler = match Crawler::new(ctx.clone()) {
        Ok(crawler) => crawler,
        Err(e) => {
            stop.store(true, Ordering::SeqCst);
            return Err(e);
        }
    };
    let mut browser = Browser::new(index, factory, &ctx.config);
    let mut summary = PoolSummary::default();

    for site in rx_site.iter() {
        if stop.load(Ordering::SeqCst) {
            tracing::warn!("Worker {} stopping before {}", index, site.url);
            break;
        }

        match crawler.crawl(&mut browser, &site) {
            Ok(report) => {
                summary.sites_crawled += 1;
                summary.pages_scanned += report.pages_scanned;
                if !report.state.is_success() {
                    summary.sites_failed += 1;
                }
            }
            Err(e) => {
                tracing::error!("Worker {} hit a fatal error on {}: {}", index, site.url, e);
                stop.store(true, Ordering::SeqCst);
                browser.close();
                return Err(e);
            }
        }

        browser.safe_restart();
    }

    browser.close();
    tracing::info!("Worker {} finished", index);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditContext, AuditError, AuditOutcome, AuditPlugin, PluginRegistry};
    use crate::browser::fake::FakeFactory;
    use crate::config::{create_test_config, Config, PluginEntry};
    use crate::output::CsvSinks;
    use crate::state::Analytics;
    use crate::url::UrlFilter;

    fn context(config: Config, sites: &[SiteAssignment], dir: &std::path::Path) -> CrawlContext {
        let config = Arc::new(config);
        let analytics = Arc::new(Analytics::new(config.audit.max_links_per_domain));
        for site in sites {
            analytics.add_base_url(&site.url);
        }
        CrawlContext::new(
            config,
            analytics,
            UrlFilter::standard(false, ["a.gov", "b.gov", "c.gov", "d.gov"]),
            Arc::new(CsvSinks::new(dir)),
        )
        .unwrap()
    }

    fn sites() -> Vec<SiteAssignment> {
        ["a.gov", "b.gov", "c.gov", "d.gov"]
            .iter()
            .map(|host| SiteAssignment::new(*host, format!("https://{}/", host), "Central"))
            .collect()
    }

    fn pages() -> FakeFactory {
        let mut fake = FakeFactory::new();
        for host in ["a.gov", "b.gov", "c.gov", "d.gov"] {
            fake = fake.with_page(&format!("https://{}/", host), "<title>Home</title>");
        }
        fake
    }

    #[test]
    fn test_single_worker_runs_inline() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = create_test_config();
        config.audit.max_links_per_domain = 1;
        let sites = sites();
        let ctx = context(config, &sites, dir.path());
        let fake = pages();

        let summary = run_workers(&ctx, fake.arc(), sites).unwrap();

        assert_eq!(summary.sites_crawled, 4);
        assert_eq!(summary.pages_scanned, 4);
        assert_eq!(summary.sites_failed, 0);
        assert_eq!(ctx.analytics.total_pages_scanned(), 4);
    }

    #[test]
    fn test_every_site_crawled_once_across_workers() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = create_test_config();
        config.audit.max_links_per_domain = 1;
        config.audit.thread_count = 3;
        let sites = sites();
        let ctx = context(config, &sites, dir.path());
        let fake = pages();

        let summary = run_workers(&ctx, fake.arc(), sites).unwrap();

        assert_eq!(summary.sites_crawled, 4);
        let mut navigations = fake.web().navigations.clone();
        navigations.sort();
        assert_eq!(
            navigations,
            vec![
                "https://a.gov/",
                "https://b.gov/",
                "https://c.gov/",
                "https://d.gov/"
            ]
        );
        let pages_scanned = std::fs::read_to_string(dir.path().join("pages_scanned.csv")).unwrap();
        assert_eq!(pages_scanned.lines().count(), 5);
    }

    #[test]
    fn test_browser_restarted_after_each_site() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = create_test_config();
        config.audit.max_links_per_domain = 1;
        let sites = sites();
        let ctx = context(config, &sites, dir.path());
        let fake = pages();

        run_workers(&ctx, fake.arc(), sites).unwrap();

        let web = fake.web();
        // one spawn for the first page, then one per safe restart
        assert_eq!(web.spawned.len(), 5);
        assert_eq!(web.quits, 5);
    }

    #[test]
    fn test_fatal_error_stops_the_pool() {
        fn fatal(_entry: &PluginEntry, _config: &Config) -> AuditResult<Box<dyn AuditPlugin>> {
            struct Fatal;
            impl AuditPlugin for Fatal {
                fn run(&mut self, _ctx: &mut AuditContext<'_>) -> AuditResult<AuditOutcome> {
                    Err(AuditError::Fatal("bad settings".to_string()))
                }
            }
            Ok(Box::new(Fatal))
        }

        let dir = tempfile::tempdir().unwrap();
        let mut config = create_test_config();
        config.plugins[0].name = "fatal".to_string();
        let sites = sites();
        let mut registry = PluginRegistry::new();
        registry.register("fatal", fatal);
        let ctx = context(config, &sites, dir.path()).with_registry(registry);
        let fake = pages();

        let result = run_workers(&ctx, fake.arc(), sites);

        assert!(matches!(result, Err(SweepError::Audit(AuditError::Fatal(_)))));
        assert_eq!(fake.web().navigations.len(), 1);
    }

    #[test]
    fn test_unknown_plugin_is_fatal_before_any_site() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = create_test_config();
        config.plugins[0].name = "does_not_exist".to_string();
        let sites = sites();
        let ctx = context(config, &sites, dir.path());
        let fake = pages();

        let result = run_workers(&ctx, fake.arc(), sites);

        assert!(matches!(result, Err(SweepError::Audit(AuditError::Fatal(_)))));
        assert!(fake.web().navigations.is_empty());
    }
}
