//! Output module for audit results
//!
//! This module handles:
//! - Appending result rows to per-file-locked CSV sinks
//! - Progress reporting (terminal bar and progress.csv)
//! - Reading the site lists a run starts from
//! - End-of-run statistics and verification

mod csv_sink;
mod progress;
mod row;
mod sites;
pub mod stats;
mod traits;

pub use csv_sink::CsvSinks;
pub use progress::{format_duration, ProgressBar, ProgressLine};
pub use row::Row;
pub use sites::{import_sites, lowercase_url, shuffle_sites, spread_same_host};
pub use stats::{collect_statistics, print_statistics, verify_pages_scanned, RunStatistics};
pub use traits::{OutputError, OutputResult, ResultSink};
