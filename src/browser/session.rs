//! Resilient browser session owned by one worker
//!
//! Browser crashes are routine. Every operation here either recovers
//! (retry or respawn) or hands the fault to the caller so it can abandon the
//! current page; nothing panics or takes the worker down.

use crate::browser::{BrowserFault, BrowserResult, Driver, DriverFactory, SpawnOptions, WindowSize};
use crate::config::Config;
use serde_json::Value;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Attempts made by [`Browser::navigate`]
pub const NAVIGATION_ATTEMPTS: usize = 2;

/// Used when the config has no viewports to take the initial size from
pub const DEFAULT_VIEWPORT: WindowSize = (320, 450);

const DOCTYPE_SCRIPT: &str = r#"
    var d = document.doctype;
    if (!d) { return null; }
    return "<!DOCTYPE " + d.name
        + (d.publicId ? ' PUBLIC "' + d.publicId + '"' : '')
        + (!d.publicId && d.systemId ? ' SYSTEM' : '')
        + (d.systemId ? ' "' + d.systemId + '"' : '')
        + '>';
"#;

/// Lifecycle of the underlying driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not spawned yet, or the last respawn failed
    NoDriver,
    Live,
    /// The last call reported the session dead; a restart is pending
    Crashed,
}

/// One worker's browser and the URL it last loaded
pub struct Browser {
    worker_index: usize,
    factory: Arc<dyn DriverFactory>,
    driver: Option<Box<dyn Driver>>,
    crashed: bool,
    last_url: Option<String>,
    viewport: WindowSize,
    only_allow_https: bool,
    delay_after_page_load: Duration,
}

impl Browser {
    /// Creates the session; the browser itself is spawned on first use
    pub fn new(worker_index: usize, factory: Arc<dyn DriverFactory>, config: &Config) -> Self {
        let viewport = config
            .viewports
            .first()
            .map(|v| (v.width, v.height))
            .unwrap_or(DEFAULT_VIEWPORT);

        Self {
            worker_index,
            factory,
            driver: None,
            crashed: false,
            last_url: None,
            viewport,
            only_allow_https: config.crawler.only_allow_https,
            delay_after_page_load: config.browser.delay_after_page_load(),
        }
    }

    pub fn state(&self) -> SessionState {
        match (&self.driver, self.crashed) {
            (None, _) => SessionState::NoDriver,
            (Some(_), true) => SessionState::Crashed,
            (Some(_), false) => SessionState::Live,
        }
    }

    pub fn worker_index(&self) -> usize {
        self.worker_index
    }

    /// The last URL loaded successfully
    pub fn last_url(&self) -> Option<&str> {
        self.last_url.as_deref()
    }

    /// The most recently requested window size
    pub fn viewport(&self) -> WindowSize {
        self.viewport
    }

    fn spawn(&mut self, size: WindowSize) -> BrowserResult<()> {
        let options = SpawnOptions::for_worker(self.worker_index, size);
        let mut driver = self.factory.spawn(&options)?;
        driver.set_window_position(options.position)?;
        driver.set_window_size(size)?;
        self.driver = Some(driver);
        self.crashed = false;
        Ok(())
    }

    /// Runs `op` against the live driver, spawning one first if needed
    fn with_driver<T>(
        &mut self,
        op: impl FnOnce(&mut dyn Driver) -> BrowserResult<T>,
    ) -> BrowserResult<T> {
        if self.driver.is_none() {
            self.spawn(self.viewport)?;
        }
        let driver = self
            .driver
            .as_mut()
            .ok_or_else(|| BrowserFault::Launch("no browser session".to_string()))?;

        let result = op(driver.as_mut());
        if let Err(fault) = &result {
            if fault.is_session_dead() {
                self.crashed = true;
            }
        }
        result
    }

    /// Loads `url` unless it is already the loaded page
    pub fn get_if_necessary(&mut self, url: &str) -> bool {
        if self.last_url.as_deref() == Some(url) {
            return true;
        }
        self.navigate(url)
    }

    /// Loads `url`, retrying and respawning the browser on failure
    ///
    /// Returns false when the URL is not https while only https is allowed,
    /// or when every attempt failed.
    pub fn navigate(&mut self, url: &str) -> bool {
        if self.only_allow_https && !url.starts_with("https://") {
            tracing::info!("Skipping {} as only-allow-https is set", url);
            return false;
        }

        for attempt in 1..=NAVIGATION_ATTEMPTS {
            tracing::info!("Loading {} (attempt {})", url, attempt);
            match self.with_driver(|d| d.navigate(url)) {
                Ok(()) => {
                    self.last_url = Some(url.to_string());
                    thread::sleep(self.delay_after_page_load);
                    return true;
                }
                Err(fault) if fault.is_session_dead() => {
                    tracing::warn!("Browser failed loading {} (attempt {}): {}", url, attempt, fault);
                    self.safe_restart();
                }
                Err(fault) => {
                    tracing::warn!("Could not load {} (attempt {}): {}", url, attempt, fault);
                }
            }
        }

        tracing::info!("{} attempts failed to load {}", NAVIGATION_ATTEMPTS, url);
        false
    }

    /// Tears the browser down and spawns a new one at the stored viewport
    ///
    /// Safe to call on a crashed or missing session. If the respawn fails the
    /// session is left without a driver and the next call tries again.
    pub fn safe_restart(&mut self) {
        self.quit_driver();
        if let Err(e) = self.spawn(self.viewport) {
            tracing::error!("Worker {} could not respawn its browser: {}", self.worker_index, e);
        }
    }

    /// Restarts the browser keeping its current window position and size
    pub fn restart(&mut self) {
        let geometry = self.with_driver(|d| Ok((d.window_position()?, d.window_size()?)));
        let (position, size) = match geometry {
            Ok(geometry) => geometry,
            Err(e) => {
                tracing::warn!("Could not read window geometry before restart: {}", e);
                return self.safe_restart();
            }
        };

        self.quit_driver();
        if let Err(e) = self.respawn_at(position, size) {
            tracing::warn!("Restart failed, falling back to a clean respawn: {}", e);
            self.safe_restart();
        }
    }

    fn respawn_at(&mut self, position: (i32, i32), size: WindowSize) -> BrowserResult<()> {
        self.spawn(size)?;
        self.with_driver(|d| d.set_window_position(position))
    }

    fn quit_driver(&mut self) {
        if let Some(mut driver) = self.driver.take() {
            if let Err(e) = driver.quit() {
                tracing::warn!(
                    "Browser probably crashed (last url {}): {}",
                    self.last_url.as_deref().unwrap_or("none"),
                    e
                );
            }
        }
        self.crashed = false;
        self.last_url = None;
    }

    /// Resizes the window, respawning at the new size if that fails
    pub fn set_window_size(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
        if let Err(e) = self.with_driver(|d| d.set_window_size((width, height))) {
            tracing::warn!("Could not resize browser to {}x{}: {}", width, height, e);
            self.safe_restart();
        }
    }

    /// Current window size; falls back to the stored viewport
    pub fn get_window_size(&mut self) -> WindowSize {
        match self.with_driver(|d| d.window_size()) {
            Ok(size) => size,
            Err(e) => {
                tracing::warn!("Could not read window size: {}", e);
                self.safe_restart();
                let fallback = self.viewport;
                self.with_driver(|d| d.window_size()).unwrap_or(fallback)
            }
        }
    }

    /// Page source prefixed with the document's doctype
    ///
    /// On a timeout or dead session the browser is respawned and the fault
    /// is still returned, so the caller abandons this page.
    pub fn page_source(&mut self) -> BrowserResult<String> {
        let doctype = self.doctype();
        match self.with_driver(|d| d.page_source()) {
            Ok(source) if source.trim_start().to_lowercase().starts_with("<!doctype") => Ok(source),
            Ok(source) => Ok(format!("{}\n{}", doctype, source)),
            Err(fault) => {
                tracing::warn!("Could not read page source: {}", fault);
                if fault.is_timeout() || fault.is_session_dead() {
                    self.safe_restart();
                }
                Err(fault)
            }
        }
    }

    /// The serialized DOM as the driver returns it, without recovery
    pub fn raw_page_source(&mut self) -> BrowserResult<String> {
        self.with_driver(|d| d.page_source())
    }

    fn doctype(&mut self) -> String {
        match self.with_driver(|d| d.execute_script(DOCTYPE_SCRIPT)) {
            Ok(Value::String(doctype)) => doctype,
            _ => "<!DOCTYPE html>".to_string(),
        }
    }

    /// `document.baseURI` of the loaded page
    pub fn base_uri(&mut self) -> BrowserResult<String> {
        match self.with_driver(|d| d.execute_script("return document.baseURI;")) {
            Ok(Value::String(uri)) => Ok(uri),
            Ok(other) => Err(BrowserFault::Script(format!("document.baseURI returned {}", other))),
            Err(fault) => {
                tracing::warn!("Could not read base URI: {}", fault);
                self.safe_restart();
                Err(fault)
            }
        }
    }

    pub fn title(&mut self) -> BrowserResult<String> {
        self.with_driver(|d| d.title())
    }

    pub fn current_url(&mut self) -> BrowserResult<String> {
        self.with_driver(|d| d.current_url())
    }

    pub fn execute_script(&mut self, script: &str) -> BrowserResult<Value> {
        self.with_driver(|d| d.execute_script(script))
    }

    pub fn execute_async_script(&mut self, script: &str) -> BrowserResult<Value> {
        self.with_driver(|d| d.execute_async_script(script))
    }

    pub fn screenshot_png(&mut self) -> BrowserResult<Vec<u8>> {
        self.with_driver(|d| d.screenshot_png())
    }

    pub fn refresh(&mut self) -> BrowserResult<()> {
        tracing::debug!("Refreshing browser");
        self.with_driver(|d| d.refresh())
    }

    /// Quits the browser for good
    pub fn close(&mut self) {
        tracing::info!("Quitting browser for worker {}", self.worker_index);
        self.quit_driver();
    }
}

impl Drop for Browser {
    fn drop(&mut self) {
        if let Some(mut driver) = self.driver.take() {
            let _ = driver.quit();
        }
    }
}
