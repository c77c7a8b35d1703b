//! Chrome/Chromium backend over the DevTools protocol

use crate::browser::{BrowserFault, BrowserResult, Driver, DriverFactory, SpawnOptions, WindowSize};
use crate::config::BrowserConfig;
use headless_chrome::protocol::cdp::Browser::{SetDownloadBehavior, SetDownloadBehaviorBehaviorOption};
use headless_chrome::protocol::cdp::Page;
use headless_chrome::util::Timeout;
use headless_chrome::types::Bounds;
use headless_chrome::{Browser as ChromeProcess, LaunchOptions, Tab};
use serde_json::Value;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Spawns one Chrome process per session
pub struct ChromeFactory {
    config: BrowserConfig,
}

impl ChromeFactory {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }

    /// The configured binary; `None` lets the launcher find one on the system
    fn binary(&self) -> Option<PathBuf> {
        self.config.chrome_binary_location.clone()
    }
}

/// Refuses every download for the whole browser
fn deny_downloads() -> SetDownloadBehavior {
    SetDownloadBehavior {
        behavior: SetDownloadBehaviorBehaviorOption::Deny,
        browser_context_id: None,
        download_path: None,
        events_enabled: None,
    }
}

impl DriverFactory for ChromeFactory {
    fn spawn(&self, options: &SpawnOptions) -> BrowserResult<Box<dyn Driver>> {
        let config = &self.config;
        let user_agent_arg = format!("--user-agent={}", config.user_agent);
        let position_arg = format!("--window-position={},{}", options.position.0, options.position.1);

        let args: Vec<&OsStr> = vec![
            OsStr::new("--disable-notifications"),
            OsStr::new("--block-new-web-contents"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--log-level=3"),
            OsStr::new(&user_agent_arg),
            OsStr::new(&position_arg),
        ];

        // The process is killed when idle for this long; audits can run long scripts
        let idle = config.page_load_timeout().max(config.script_timeout()) + Duration::from_secs(60);

        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .window_size(Some(options.size))
            .path(self.binary())
            .idle_browser_timeout(idle)
            .args(args)
            .build()
            .map_err(|e| BrowserFault::Launch(e.to_string()))?;

        let process = ChromeProcess::new(launch_options)
            .map_err(|e| BrowserFault::Launch(e.to_string()))?;
        let tab = process
            .new_tab()
            .map_err(|e| BrowserFault::Launch(e.to_string()))?;
        tab.call_method(deny_downloads())
            .map_err(|e| BrowserFault::Launch(e.to_string()))?;
        tab.set_default_timeout(config.page_load_timeout());

        tracing::debug!(
            "Spawned browser for worker {} at {:?} size {:?}",
            options.worker_index,
            options.position,
            options.size
        );

        Ok(Box::new(ChromeDriver {
            process: Some(process),
            tab,
            script_timeout: config.script_timeout(),
        }))
    }
}

/// One Chrome process and the tab all navigation happens in
pub struct ChromeDriver {
    process: Option<ChromeProcess>,
    tab: Arc<Tab>,
    script_timeout: Duration,
}

fn driver_fault(e: anyhow::Error) -> BrowserFault {
    classify_error(e, BrowserFault::Driver)
}

fn script_fault(e: anyhow::Error) -> BrowserFault {
    classify_error(e, BrowserFault::Script)
}

/// Waits that never see their event are plain timeouts, whatever the message
fn classify_error(e: anyhow::Error, otherwise: fn(String) -> BrowserFault) -> BrowserFault {
    if e.downcast_ref::<Timeout>().is_some() {
        return BrowserFault::Timeout(e.to_string());
    }
    BrowserFault::classify(e.to_string(), otherwise)
}

impl ChromeDriver {
    fn alive(&self) -> BrowserResult<&Arc<Tab>> {
        match self.process {
            Some(_) => Ok(&self.tab),
            None => Err(BrowserFault::Disconnected("browser already closed".to_string())),
        }
    }

    /// Evaluates an expression that resolves to a JSON string
    fn evaluate_json(&self, expression: &str, await_promise: bool) -> BrowserResult<Value> {
        let object = self
            .alive()?
            .evaluate(expression, await_promise)
            .map_err(script_fault)?;

        match (object.value, object.description) {
            (Some(Value::String(json)), _) => {
                serde_json::from_str(&json).map_err(|e| BrowserFault::Script(e.to_string()))
            }
            // A thrown error comes back as the error object itself
            (_, Some(description)) => Err(BrowserFault::classify(description, BrowserFault::Script)),
            _ => Ok(Value::Null),
        }
    }

    fn bounds(&self, bounds: Bounds) -> BrowserResult<()> {
        self.alive()?.set_bounds(bounds).map_err(driver_fault)?;
        Ok(())
    }
}

impl Driver for ChromeDriver {
    fn navigate(&mut self, url: &str) -> BrowserResult<()> {
        self.alive()?
            .navigate_to(url)
            .map_err(driver_fault)?
            .wait_until_navigated()
            .map_err(driver_fault)?;
        Ok(())
    }

    fn current_url(&mut self) -> BrowserResult<String> {
        Ok(self.alive()?.get_url())
    }

    fn page_source(&mut self) -> BrowserResult<String> {
        self.alive()?.get_content().map_err(driver_fault)
    }

    fn title(&mut self) -> BrowserResult<String> {
        self.alive()?.get_title().map_err(driver_fault)
    }

    fn execute_script(&mut self, script: &str) -> BrowserResult<Value> {
        let expression = format!("JSON.stringify((function() {{ {} }})())", script);
        self.evaluate_json(&expression, false)
    }

    fn execute_async_script(&mut self, script: &str) -> BrowserResult<Value> {
        let millis = self.script_timeout.as_millis();
        let expression = format!(
            "Promise.race([\
               (async function() {{ {} }})(),\
               new Promise((_, reject) => setTimeout(\
                 () => reject(new Error('Script timed out after {} ms')), {}))\
             ]).then(result => JSON.stringify(result))",
            script, millis, millis
        );
        self.evaluate_json(&expression, true)
    }

    fn screenshot_png(&mut self) -> BrowserResult<Vec<u8>> {
        self.alive()?
            .capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(driver_fault)
    }

    fn window_size(&mut self) -> BrowserResult<WindowSize> {
        let value = self.execute_script(
            "return [window.outerWidth || window.innerWidth, window.outerHeight || window.innerHeight];",
        )?;
        pair(&value)
            .map(|(w, h)| (w.max(0) as u32, h.max(0) as u32))
            .ok_or_else(|| BrowserFault::Script(format!("unexpected window size {}", value)))
    }

    fn set_window_size(&mut self, size: WindowSize) -> BrowserResult<()> {
        self.bounds(Bounds::Normal {
            left: None,
            top: None,
            width: Some(size.0 as f64),
            height: Some(size.1 as f64),
        })
    }

    fn window_position(&mut self) -> BrowserResult<(i32, i32)> {
        let value = self.execute_script("return [window.screenX, window.screenY];")?;
        pair(&value)
            .map(|(x, y)| (x as i32, y as i32))
            .ok_or_else(|| BrowserFault::Script(format!("unexpected window position {}", value)))
    }

    fn set_window_position(&mut self, position: (i32, i32)) -> BrowserResult<()> {
        self.bounds(Bounds::Normal {
            left: position.0.try_into().ok(),
            top: position.1.try_into().ok(),
            width: None,
            height: None,
        })
    }

    fn refresh(&mut self) -> BrowserResult<()> {
        self.alive()?
            .reload(false, None)
            .map_err(driver_fault)?
            .wait_until_navigated()
            .map_err(driver_fault)?;
        Ok(())
    }

    fn quit(&mut self) -> BrowserResult<()> {
        match self.process.take() {
            Some(process) => {
                // Dropping the handle kills the process
                drop(process);
                Ok(())
            }
            None => Err(BrowserFault::Disconnected("browser already closed".to_string())),
        }
    }
}

fn pair(value: &Value) -> Option<(i64, i64)> {
    let items = value.as_array()?;
    let number = |v: &Value| v.as_f64().map(|f| f as i64);
    Some((number(items.first()?)?, number(items.get(1)?)?))
}
