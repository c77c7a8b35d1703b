//! Configuration module for Access-Sweep
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use access_sweep::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Auditing {} viewports per page", config.viewports.len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AuditConfig, BrowserConfig, BrowserFamily, Config, CrawlerConfig, PluginEntry, ViewportSize,
};
pub use validation::REFLOW_WIDTH;

// Re-export parser functions
pub use parser::{
    compute_config_hash, load_config, load_config_with_hash, sanitise_audit_name,
    stamp_audit_name,
};

/// Small, valid configuration used by unit tests across the crate
#[cfg(test)]
pub(crate) fn create_test_config() -> Config {
    Config {
        audit: AuditConfig {
            audit_name: "test_audit".to_string(),
            results_path: std::env::temp_dir(),
            max_links_per_domain: 10,
            thread_count: 1,
            base_urls_visit_path: std::env::temp_dir(),
            base_urls_nohead_path: None,
            filter_to_organisations: vec![],
            filter_to_urls: vec![],
            shuffle_base_urls: false,
        },
        browser: BrowserConfig {
            family: BrowserFamily::Chrome,
            headless: true,
            chrome_binary_location: None,
            chrome_driver_location: None,
            firefox_binary_location: None,
            geckodriver_location: None,
            user_agent: "AccessSweep/1.0 (+https://example.gov/bot)".to_string(),
            user_agent_product_token: "AccessSweep".to_string(),
            script_timeout: 30,
            page_load_timeout: 30,
            delay_after_page_load: 0.0,
            delay_between_viewports: 0.0,
        },
        crawler: CrawlerConfig {
            delay_between_page_loads: 0.0,
            follow_robots_txt: false,
            only_allow_https: false,
            perform_header_check: false,
            record_unexpected_response_codes: false,
            force_open_details_elements: false,
        },
        viewports: vec![ViewportSize {
            name: "medium".to_string(),
            width: 1280,
            height: 800,
        }],
        plugins: vec![PluginEntry {
            name: "default".to_string(),
            enabled: true,
            viewport_to_test: None,
            settings: toml::Table::new(),
        }],
    }
}
