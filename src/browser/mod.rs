//! Browser session management
//!
//! Each worker owns one [`Browser`], a resilient wrapper around a [`Driver`]
//! that retries navigation and respawns the browser when it crashes. Two
//! backends implement [`DriverFactory`]: [`ChromeFactory`] drives Chrome or
//! Chromium over the DevTools protocol, and [`FirefoxFactory`] drives Firefox
//! through geckodriver.

mod chrome;
mod driver;
#[cfg(test)]
pub(crate) mod fake;
mod session;
mod webdriver;

pub use chrome::{ChromeDriver, ChromeFactory};
pub use driver::{
    window_position_for, BrowserFault, BrowserResult, Driver, DriverFactory, SpawnOptions, WindowSize,
};
pub use session::{Browser, SessionState, DEFAULT_VIEWPORT, NAVIGATION_ATTEMPTS};
pub use webdriver::{capabilities, error_fault, FirefoxFactory, WebDriverSession};

use crate::config::{BrowserConfig, BrowserFamily};
use std::path::Path;
use std::sync::Arc;

/// The factory for the configured browser family
///
/// Firefox driver logs go to `geckodriver.log` in `results_dir`.
pub fn driver_factory(config: &BrowserConfig, results_dir: &Path) -> Arc<dyn DriverFactory> {
    match config.family {
        BrowserFamily::Chrome => Arc::new(ChromeFactory::new(config.clone())),
        BrowserFamily::Firefox => Arc::new(
            FirefoxFactory::new(config.clone()).with_log_file(results_dir.join("geckodriver.log")),
        ),
    }
}
