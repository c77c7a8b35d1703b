//! The capability a browser backend has to provide
//!
//! Every call can fail, and a failure says whether the session is still
//! usable. Callers switch on [`BrowserFault::is_session_dead`] to decide
//! between retrying and respawning the browser.

use serde_json::Value;
use thiserror::Error;

/// Errors raised by browser operations
#[derive(Debug, Clone, Error)]
pub enum BrowserFault {
    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Browser driver error: {0}")]
    Driver(String),

    #[error("Browser disconnected: {0}")]
    Disconnected(String),

    #[error("Script error: {0}")]
    Script(String),

    #[error("Browser failed to start: {0}")]
    Launch(String),
}

impl BrowserFault {
    /// A page or script did not finish in time; the session is still alive
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// The session can no longer be used and must be respawned
    pub fn is_session_dead(&self) -> bool {
        matches!(self, Self::Driver(_) | Self::Disconnected(_) | Self::Launch(_))
    }

    /// Classifies a backend error message
    ///
    /// Timeouts and lost connections are recognised by their message; anything
    /// else becomes the fault built by `otherwise`.
    pub fn classify(message: String, otherwise: fn(String) -> Self) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("timeout") || lower.contains("timed out") {
            Self::Timeout(message)
        } else if ["connection", "disconnected", "closed", "channel", "no such", "crashed"]
            .iter()
            .any(|needle| lower.contains(needle))
        {
            Self::Disconnected(message)
        } else {
            otherwise(message)
        }
    }
}

/// Result type for browser operations
pub type BrowserResult<T> = Result<T, BrowserFault>;

/// Window width and height in CSS pixels
pub type WindowSize = (u32, u32);

/// One live browser session
///
/// Scripts are function bodies: they may `return` a value, which comes back
/// as JSON. Async scripts may `await` and their returned promise is resolved
/// before the value is handed back.
pub trait Driver: Send {
    /// Loads `url` and waits for the page load event
    fn navigate(&mut self, url: &str) -> BrowserResult<()>;

    fn current_url(&mut self) -> BrowserResult<String>;

    /// The serialized DOM of the current page
    fn page_source(&mut self) -> BrowserResult<String>;

    fn title(&mut self) -> BrowserResult<String>;

    fn execute_script(&mut self, script: &str) -> BrowserResult<Value>;

    fn execute_async_script(&mut self, script: &str) -> BrowserResult<Value>;

    /// PNG screenshot of the viewport
    fn screenshot_png(&mut self) -> BrowserResult<Vec<u8>>;

    fn window_size(&mut self) -> BrowserResult<WindowSize>;

    fn set_window_size(&mut self, size: WindowSize) -> BrowserResult<()>;

    fn window_position(&mut self) -> BrowserResult<(i32, i32)>;

    fn set_window_position(&mut self, position: (i32, i32)) -> BrowserResult<()>;

    /// Reloads the current page
    fn refresh(&mut self) -> BrowserResult<()>;

    /// Closes the browser; fails if it is already gone
    fn quit(&mut self) -> BrowserResult<()>;
}

/// Everything a factory needs to start a session for one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnOptions {
    pub worker_index: usize,
    pub size: WindowSize,
    pub position: (i32, i32),
}

impl SpawnOptions {
    /// Spawn options with the fixed on-screen position of `worker_index`
    pub fn for_worker(worker_index: usize, size: WindowSize) -> Self {
        Self {
            worker_index,
            size,
            position: window_position_for(worker_index),
        }
    }
}

/// Starts browser sessions; shared by all workers
pub trait DriverFactory: Send + Sync {
    fn spawn(&self, options: &SpawnOptions) -> BrowserResult<Box<dyn Driver>>;
}

/// Grid position for a worker's window, so visible windows do not overlap
///
/// Four columns 400px apart; workers 0-3 on the top row, the rest below.
pub fn window_position_for(worker_index: usize) -> (i32, i32) {
    let x = 100 + 400 * (worker_index % 4) as i32;
    let y = if worker_index < 4 { 0 } else { 400 };
    (x, y)
}
