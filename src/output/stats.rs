//! End-of-run statistics and verification
//!
//! After all workers finish, every site is expected to have reached the page
//! cap. Sites that did not are reported as warnings; this is informational,
//! since small sites legitimately run out of pages.

use crate::state::Analytics;

/// Run statistics summary
#[derive(Debug, Clone)]
pub struct RunStatistics {
    /// Number of sites registered for the run
    pub total_sites: usize,

    /// Pages audited across all sites
    pub total_pages: usize,

    /// Page cap each site was expected to reach
    pub expected_per_site: usize,

    /// Sites whose page count differs from the cap, with their count
    pub short_sites: Vec<(String, usize)>,
}

impl RunStatistics {
    /// Sites that reached the page cap
    pub fn complete_sites(&self) -> usize {
        self.total_sites - self.short_sites.len()
    }
}

/// Collects statistics from the shared analytics
pub fn collect_statistics(analytics: &Analytics) -> RunStatistics {
    let expected = analytics.max_links_per_domain();
    let counts = analytics.scanned_counts();

    RunStatistics {
        total_sites: counts.len(),
        total_pages: analytics.total_pages_scanned(),
        expected_per_site: expected,
        short_sites: counts.into_iter().filter(|(_, n)| *n != expected).collect(),
    }
}

/// Logs a warning for every site whose page count differs from the cap
pub fn verify_pages_scanned(stats: &RunStatistics) {
    for (site, count) in &stats.short_sites {
        tracing::warn!(
            "VERIFY: {} had {} pages scanned, not {}",
            site,
            count,
            stats.expected_per_site
        );
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &RunStatistics) {
    println!("=== Audit Statistics ===\n");
    println!("  Sites: {}", stats.total_sites);
    println!("  Pages audited: {}", stats.total_pages);
    println!(
        "  Sites at the {}-page cap: {} / {}",
        stats.expected_per_site,
        stats.complete_sites(),
        stats.total_sites
    );

    if !stats.short_sites.is_empty() {
        println!("\nSites below the cap ({}):", stats.short_sites.len());
        for (site, count) in &stats.short_sites {
            println!("  - {} ({} pages)", site, count);
        }
    }
}
