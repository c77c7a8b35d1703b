//! Robots.txt handling module
//!
//! This module fetches, parses and caches robots.txt files. A file that cannot
//! be fetched is treated as allowing everything.

mod cache;
mod parser;

pub use cache::{RobotsCache, MAX_ROBOTS_BYTES};
pub use parser::RobotsRules;
