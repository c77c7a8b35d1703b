//! State module for tracking audit progress
//!
//! # Components
//!
//! - `Analytics`: lock-guarded, cross-thread scan counters and scanned-page sets
//! - `CrawlState`: the lifecycle of a single site crawl
//! - `SiteAssignment`: one audit target handed to a worker

mod analytics;
mod crawl_state;
mod site;

// Re-export main types
pub use analytics::{Analytics, ProgressSink, ProgressUpdate};
pub use crawl_state::CrawlState;
pub use site::SiteAssignment;
