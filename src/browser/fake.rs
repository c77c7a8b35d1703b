//! Scripted in-memory browser for unit tests

use crate::browser::{BrowserFault, BrowserResult, Driver, DriverFactory, SpawnOptions, WindowSize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared record of what every driver spawned by a [`FakeFactory`] did
#[derive(Default)]
pub struct FakeWeb {
    pub pages: HashMap<String, String>,
    /// Canned replies for scripts containing the key
    pub scripts: Vec<(String, Value)>,
    /// Faults handed out by the next calls to `navigate`
    pub navigate_faults: VecDeque<BrowserFault>,
    pub script_faults: VecDeque<BrowserFault>,
    pub refresh_faults: VecDeque<BrowserFault>,
    pub spawn_faults: VecDeque<BrowserFault>,

    pub spawned: Vec<SpawnOptions>,
    pub navigations: Vec<String>,
    pub executed: Vec<String>,
    pub screenshots: usize,
    pub refreshes: usize,
    pub quits: usize,
    pub sizes: Vec<WindowSize>,
}

#[derive(Clone, Default)]
pub struct FakeFactory {
    web: Arc<Mutex<FakeWeb>>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, html: &str) -> Self {
        self.web().pages.insert(url.to_string(), html.to_string());
        self
    }

    pub fn with_script(self, needle: &str, reply: Value) -> Self {
        self.web().scripts.push((needle.to_string(), reply));
        self
    }

    pub fn web(&self) -> MutexGuard<'_, FakeWeb> {
        self.web.lock().unwrap()
    }

    pub fn arc(&self) -> Arc<dyn DriverFactory> {
        Arc::new(self.clone())
    }
}

impl DriverFactory for FakeFactory {
    fn spawn(&self, options: &SpawnOptions) -> BrowserResult<Box<dyn Driver>> {
        let mut web = self.web();
        if let Some(fault) = web.spawn_faults.pop_front() {
            return Err(fault);
        }
        web.spawned.push(*options);
        Ok(Box::new(FakeDriver {
            web: Arc::clone(&self.web),
            current: None,
            size: options.size,
            position: options.position,
            closed: false,
        }))
    }
}

pub struct FakeDriver {
    web: Arc<Mutex<FakeWeb>>,
    current: Option<String>,
    size: WindowSize,
    position: (i32, i32),
    closed: bool,
}

impl FakeDriver {
    fn web(&self) -> BrowserResult<MutexGuard<'_, FakeWeb>> {
        if self.closed {
            return Err(BrowserFault::Disconnected("session closed".to_string()));
        }
        Ok(self.web.lock().unwrap())
    }

    fn html(&self) -> BrowserResult<String> {
        let web = self.web()?;
        let url = self.current.clone().unwrap_or_default();
        Ok(web
            .pages
            .get(&url)
            .cloned()
            .unwrap_or_else(|| "<html><head><title>Not Found</title></head><body></body></html>".to_string()))
    }
}

impl Driver for FakeDriver {
    fn navigate(&mut self, url: &str) -> BrowserResult<()> {
        let mut web = self.web()?;
        if let Some(fault) = web.navigate_faults.pop_front() {
            return Err(fault);
        }
        web.navigations.push(url.to_string());
        drop(web);
        self.current = Some(url.to_string());
        Ok(())
    }

    fn current_url(&mut self) -> BrowserResult<String> {
        self.web()?;
        Ok(self.current.clone().unwrap_or_else(|| "about:blank".to_string()))
    }

    fn page_source(&mut self) -> BrowserResult<String> {
        self.html()
    }

    fn title(&mut self) -> BrowserResult<String> {
        let html = self.html()?;
        Ok(html
            .split_once("<title>")
            .and_then(|(_, rest)| rest.split_once("</title>"))
            .map(|(title, _)| title.to_string())
            .unwrap_or_default())
    }

    fn execute_script(&mut self, script: &str) -> BrowserResult<Value> {
        let current = self.current.clone();
        let mut web = self.web()?;
        web.executed.push(script.to_string());
        if let Some(fault) = web.script_faults.pop_front() {
            return Err(fault);
        }
        if let Some((_, reply)) = web.scripts.iter().find(|(needle, _)| script.contains(needle.as_str())) {
            return Ok(reply.clone());
        }
        if script.contains("document.baseURI") {
            return Ok(current.map(Value::String).unwrap_or(Value::Null));
        }
        if script.contains("document.doctype") {
            return Ok(Value::String("<!DOCTYPE html>".to_string()));
        }
        Ok(Value::Null)
    }

    fn execute_async_script(&mut self, script: &str) -> BrowserResult<Value> {
        self.execute_script(script)
    }

    fn screenshot_png(&mut self) -> BrowserResult<Vec<u8>> {
        self.web()?.screenshots += 1;
        Ok(b"\x89PNG\r\n\x1a\nfake".to_vec())
    }

    fn window_size(&mut self) -> BrowserResult<WindowSize> {
        self.web()?;
        Ok(self.size)
    }

    fn set_window_size(&mut self, size: WindowSize) -> BrowserResult<()> {
        self.web()?.sizes.push(size);
        self.size = size;
        Ok(())
    }

    fn window_position(&mut self) -> BrowserResult<(i32, i32)> {
        self.web()?;
        Ok(self.position)
    }

    fn set_window_position(&mut self, position: (i32, i32)) -> BrowserResult<()> {
        self.web()?;
        self.position = position;
        Ok(())
    }

    fn refresh(&mut self) -> BrowserResult<()> {
        let mut web = self.web()?;
        if let Some(fault) = web.refresh_faults.pop_front() {
            return Err(fault);
        }
        web.refreshes += 1;
        Ok(())
    }

    fn quit(&mut self) -> BrowserResult<()> {
        let mut web = self.web()?;
        web.quits += 1;
        drop(web);
        self.closed = true;
        Ok(())
    }
}
