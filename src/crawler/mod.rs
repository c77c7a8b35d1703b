//! Crawler module: page discovery and work distribution
//!
//! This module contains:
//! - The biased-random frontier each site crawl pops from
//! - The HTTP header pre-check run before a page is loaded
//! - Link extraction from the rendered DOM
//! - The per-site crawl loop
//! - The worker pool that spreads sites over browsers

mod coordinator;
mod frontier;
mod headers;
mod links;
mod pool;

pub use coordinator::{CrawlContext, CrawlReport, Crawler, MAX_CONSECUTIVE_FAILURES};
pub use frontier::{Frontier, FrontierEntry};
pub use headers::{
    record_unexpected_status, HeaderCheck, HeaderChecker, HEADER_CHECK_ATTEMPTS, NO_STATUS,
    OK_STATUS_CODES,
};
pub use links::{effective_base_uri, extract_links, get_links};
pub use pool::{run_workers, PoolSummary};
