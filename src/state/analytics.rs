//! Shared scan progress
//!
//! Every worker reports into one [`Analytics`] value. All of its state sits
//! behind a single mutex, and progress is emitted while that mutex is held so
//! progress lines are never interleaved or computed from a stale total.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A snapshot of run progress handed to a [`ProgressSink`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressUpdate {
    /// Pages audited so far across all sites
    pub iteration: usize,
    /// Current estimate of the pages the whole run will audit
    pub total: usize,
    /// Time since the run started
    pub elapsed: Duration,
}

/// Receives progress updates; called with the analytics lock held
pub trait ProgressSink: Send + Sync {
    fn emit(&self, update: &ProgressUpdate);
}

#[derive(Debug, Default)]
struct AnalyticsState {
    total_pages_scanned: usize,
    est_num_pages_in_test: usize,
    pages_scanned: HashMap<String, HashSet<String>>,
    base_urls: Vec<String>,
    last_page_id: u64,
}

/// Cross-thread scan counters and per-site scanned-page sets
pub struct Analytics {
    max_links_per_domain: usize,
    start_time: Instant,
    state: Mutex<AnalyticsState>,
    sink: Option<Arc<dyn ProgressSink>>,
}

impl Analytics {
    /// Creates empty analytics for a run auditing up to `max_links_per_domain`
    /// pages per site
    pub fn new(max_links_per_domain: usize) -> Self {
        Self {
            max_links_per_domain,
            start_time: Instant::now(),
            state: Mutex::new(AnalyticsState::default()),
            sink: None,
        }
    }

    /// Attaches a progress sink
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Registers a site before it is crawled
    ///
    /// Each new site adds a full page cap to the estimated total.
    pub fn add_base_url(&self, base_url: &str) {
        let mut state = self.lock();
        if state.pages_scanned.contains_key(base_url) {
            return;
        }
        state
            .pages_scanned
            .insert(base_url.to_string(), HashSet::new());
        state.base_urls.push(base_url.to_string());
        state.est_num_pages_in_test += self.max_links_per_domain;
        self.emit(&state);
    }

    /// True when `url` was already audited for the site `base_url`
    pub fn is_url_in_pages_scanned(&self, base_url: &str, url: &str) -> bool {
        self.lock()
            .pages_scanned
            .get(base_url)
            .map_or(false, |set| set.contains(url))
    }

    /// Records a successfully audited page
    ///
    /// Returns false (and counts nothing) when the page was already recorded
    /// for this site.
    pub fn add_page_scanned(&self, base_url: &str, url: &str) -> bool {
        let mut state = self.lock();
        let inserted = state
            .pages_scanned
            .entry(base_url.to_string())
            .or_default()
            .insert(url.to_string());
        if inserted {
            state.total_pages_scanned += 1;
            self.emit(&state);
        }
        inserted
    }

    /// Shrinks the estimated total by the pages a site will never reach
    ///
    /// Called once per site when its crawl ends, whatever the reason.
    pub fn record_test_failure(&self, base_url: &str) {
        let mut state = self.lock();
        let scanned = state.pages_scanned.get(base_url).map_or(0, HashSet::len);
        let missing = self.max_links_per_domain.saturating_sub(scanned);
        state.est_num_pages_in_test = state.est_num_pages_in_test.saturating_sub(missing);
        self.emit(&state);
    }

    /// Hands out the next process-unique page identifier (starting at 1)
    pub fn next_page_id(&self) -> u64 {
        let mut state = self.lock();
        state.last_page_id += 1;
        state.last_page_id
    }

    /// All registered site seed URLs, in registration order
    pub fn base_urls(&self) -> Vec<String> {
        self.lock().base_urls.clone()
    }

    pub fn total_pages_scanned(&self) -> usize {
        self.lock().total_pages_scanned
    }

    pub fn est_num_pages_in_test(&self) -> usize {
        self.lock().est_num_pages_in_test
    }

    /// Number of pages audited for one site
    pub fn pages_scanned_for(&self, base_url: &str) -> usize {
        self.lock().pages_scanned.get(base_url).map_or(0, HashSet::len)
    }

    /// Page counts for every registered site, in registration order
    pub fn scanned_counts(&self) -> Vec<(String, usize)> {
        let state = self.lock();
        state
            .base_urls
            .iter()
            .map(|b| (b.clone(), state.pages_scanned.get(b).map_or(0, HashSet::len)))
            .collect()
    }

    pub fn max_links_per_domain(&self) -> usize {
        self.max_links_per_domain
    }

    fn emit(&self, state: &AnalyticsState) {
        if let Some(sink) = &self.sink {
            sink.emit(&ProgressUpdate {
                iteration: state.total_pages_scanned,
                total: state.est_num_pages_in_test,
                elapsed: self.start_time.elapsed(),
            });
        }
    }

    fn lock(&self) -> MutexGuard<'_, AnalyticsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
