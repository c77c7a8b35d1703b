//! Firefox backend over the W3C WebDriver protocol
//!
//! Each session starts its own `geckodriver` on a free local port and talks
//! to it over HTTP. WebDriver error codes are mapped onto [`BrowserFault`] so
//! the session manager can tell a slow page from a dead browser.

use crate::browser::{BrowserFault, BrowserResult, Driver, DriverFactory, SpawnOptions, WindowSize};
use crate::config::BrowserConfig;
use base64::Engine;
use reqwest::blocking::{Client, Response};
use reqwest::Method;
use serde_json::{json, Value};
use std::fs::OpenOptions;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

/// How often, and how many times, a fresh geckodriver is polled for readiness
const DRIVER_POLL_INTERVAL: Duration = Duration::from_millis(200);
const DRIVER_POLL_ATTEMPTS: usize = 50;

/// Extra time the HTTP client waits beyond the browser's own timeouts
const HTTP_GRACE: Duration = Duration::from_secs(30);

#[cfg(windows)]
const NULL_PATH: &str = "NUL";
#[cfg(not(windows))]
const NULL_PATH: &str = "/dev/null";

/// Spawns one geckodriver and Firefox per session
pub struct FirefoxFactory {
    config: BrowserConfig,
    log_file: Option<PathBuf>,
}

impl FirefoxFactory {
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            log_file: None,
        }
    }

    /// Appends geckodriver output to `path` instead of discarding it
    pub fn with_log_file(mut self, path: PathBuf) -> Self {
        self.log_file = Some(path);
        self
    }

    fn driver_binary(&self) -> PathBuf {
        self.config
            .geckodriver_location
            .clone()
            .unwrap_or_else(|| PathBuf::from("geckodriver"))
    }

    fn output(&self) -> Stdio {
        let Some(path) = &self.log_file else {
            return Stdio::null();
        };
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Stdio::from(file),
            Err(e) => {
                tracing::warn!("Could not open {}: {}", path.display(), e);
                Stdio::null()
            }
        }
    }

    fn start_driver(&self) -> BrowserResult<(Child, String)> {
        let port = free_port().map_err(|e| BrowserFault::Launch(format!("no free port: {}", e)))?;
        let binary = self.driver_binary();

        let mut command = Command::new(&binary);
        command
            .arg("--port")
            .arg(port.to_string())
            .stdin(Stdio::null())
            .stdout(self.output())
            .stderr(self.output());
        let mut child = command.spawn().map_err(|e| {
            BrowserFault::Launch(format!("failed to spawn {}: {}", binary.display(), e))
        })?;

        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        for _ in 0..DRIVER_POLL_ATTEMPTS {
            if TcpStream::connect_timeout(&addr, DRIVER_POLL_INTERVAL).is_ok() {
                return Ok((child, format!("http://{}", addr)));
            }
            if let Ok(Some(status)) = child.try_wait() {
                return Err(BrowserFault::Launch(format!(
                    "{} exited early with {}",
                    binary.display(),
                    status
                )));
            }
            thread::sleep(DRIVER_POLL_INTERVAL);
        }

        stop_process(&mut child);
        Err(BrowserFault::Launch(format!(
            "{} did not listen on port {} in time",
            binary.display(),
            port
        )))
    }
}

impl DriverFactory for FirefoxFactory {
    fn spawn(&self, options: &SpawnOptions) -> BrowserResult<Box<dyn Driver>> {
        let (mut child, endpoint) = self.start_driver()?;

        let http_timeout = self.config.page_load_timeout().max(self.config.script_timeout()) + HTTP_GRACE;
        let session = WebDriverSession::create(
            &endpoint,
            capabilities(&self.config, options.size),
            http_timeout,
        );
        let mut session = match session {
            Ok(session) => session,
            Err(e) => {
                stop_process(&mut child);
                return Err(e);
            }
        };
        session.process = Some(child);

        session.set_rect(json!({
            "x": options.position.0,
            "y": options.position.1,
            "width": options.size.0,
            "height": options.size.1,
        }))?;

        tracing::debug!(
            "Spawned Firefox for worker {} at {:?} size {:?}",
            options.worker_index,
            options.position,
            options.size
        );
        Ok(Box::new(session))
    }
}

/// New-session capabilities: user agent, timeouts, no downloads, no popups
pub fn capabilities(config: &BrowserConfig, size: WindowSize) -> Value {
    let mut args = vec![format!("--width={}", size.0), format!("--height={}", size.1)];
    if config.headless {
        args.push("-headless".to_string());
    }

    let mut firefox_options = json!({
        "args": args,
        "prefs": {
            "general.useragent.override": config.user_agent,
            "browser.download.folderList": 2,
            "browser.download.dir": NULL_PATH,
            "browser.download.useDownloadDir": true,
            "browser.download.manager.showWhenStarting": false,
            "dom.disable_open_during_load": true,
        }
    });
    if let Some(binary) = &config.firefox_binary_location {
        firefox_options["binary"] = json!(binary.to_string_lossy());
    }

    json!({
        "browserName": "firefox",
        "unhandledPromptBehavior": "dismiss",
        "timeouts": {
            "script": config.script_timeout().as_millis() as u64,
            "pageLoad": config.page_load_timeout().as_millis() as u64,
        },
        "moz:firefoxOptions": firefox_options,
    })
}

/// One WebDriver session, optionally owning the geckodriver serving it
pub struct WebDriverSession {
    client: Client,
    endpoint: String,
    session_id: String,
    process: Option<Child>,
    closed: bool,
}

impl WebDriverSession {
    /// Opens a session on a running WebDriver server
    pub fn create(endpoint: &str, capabilities: Value, http_timeout: Duration) -> BrowserResult<Self> {
        let client = Client::builder()
            .timeout(http_timeout)
            .build()
            .map_err(|e| BrowserFault::Launch(e.to_string()))?;
        let endpoint = endpoint.trim_end_matches('/').to_string();

        let response = client
            .post(format!("{}/session", endpoint))
            .json(&json!({ "capabilities": { "alwaysMatch": capabilities } }))
            .send()
            .map_err(|e| BrowserFault::Launch(format!("session create request failed: {}", e)))?;
        let value = read_reply(response)
            .map_err(|e| BrowserFault::Launch(format!("session create failed: {}", e)))?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserFault::Launch(format!("session create missing sessionId: {}", value)))?
            .to_string();

        Ok(Self {
            client,
            endpoint,
            session_id,
            process: None,
            closed: false,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Sends one session command and returns the reply's `value`
    fn command(&self, method: Method, path: &str, body: Option<Value>) -> BrowserResult<Value> {
        if self.closed {
            return Err(BrowserFault::Disconnected("session already closed".to_string()));
        }
        let url = format!("{}/session/{}{}", self.endpoint, self.session_id, path);
        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().map_err(transport_fault)?;
        read_reply(response)
    }

    fn get(&self, path: &str) -> BrowserResult<Value> {
        self.command(Method::GET, path, None)
    }

    fn post(&self, path: &str, body: Value) -> BrowserResult<Value> {
        self.command(Method::POST, path, Some(body))
    }

    fn get_string(&self, path: &str) -> BrowserResult<String> {
        match self.get(path)? {
            Value::String(s) => Ok(s),
            other => Err(BrowserFault::Driver(format!("expected a string from {}, got {}", path, other))),
        }
    }

    fn rect(&self) -> BrowserResult<Value> {
        self.get("/window/rect")
    }

    fn set_rect(&self, rect: Value) -> BrowserResult<()> {
        self.post("/window/rect", rect)?;
        Ok(())
    }
}

impl Driver for WebDriverSession {
    fn navigate(&mut self, url: &str) -> BrowserResult<()> {
        self.post("/url", json!({ "url": url }))?;
        Ok(())
    }

    fn current_url(&mut self) -> BrowserResult<String> {
        self.get_string("/url")
    }

    fn page_source(&mut self) -> BrowserResult<String> {
        self.get_string("/source")
    }

    fn title(&mut self) -> BrowserResult<String> {
        self.get_string("/title")
    }

    fn execute_script(&mut self, script: &str) -> BrowserResult<Value> {
        self.post("/execute/sync", json!({ "script": script, "args": [] }))
    }

    fn execute_async_script(&mut self, script: &str) -> BrowserResult<Value> {
        let wrapped = format!(
            "const done = arguments[arguments.length - 1];\
             (async function() {{ {} }})().then(\
               value => done({{ ok: value === undefined ? null : value }}),\
               error => done({{ error: String(error) }}));",
            script
        );
        let mut reply = self.post("/execute/async", json!({ "script": wrapped, "args": [] }))?;
        if let Some(error) = reply.get("error").and_then(Value::as_str) {
            return Err(BrowserFault::Script(error.to_string()));
        }
        Ok(reply.get_mut("ok").map(Value::take).unwrap_or(Value::Null))
    }

    fn screenshot_png(&mut self) -> BrowserResult<Vec<u8>> {
        let encoded = self.get_string("/screenshot")?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| BrowserFault::Driver(format!("invalid screenshot data: {}", e)))
    }

    fn window_size(&mut self) -> BrowserResult<WindowSize> {
        let rect = self.rect()?;
        rect_pair(&rect, "width", "height")
            .map(|(w, h)| (w.max(0) as u32, h.max(0) as u32))
            .ok_or_else(|| BrowserFault::Driver(format!("unexpected window rect {}", rect)))
    }

    fn set_window_size(&mut self, size: WindowSize) -> BrowserResult<()> {
        self.set_rect(json!({ "width": size.0, "height": size.1 }))
    }

    fn window_position(&mut self) -> BrowserResult<(i32, i32)> {
        let rect = self.rect()?;
        rect_pair(&rect, "x", "y")
            .map(|(x, y)| (x as i32, y as i32))
            .ok_or_else(|| BrowserFault::Driver(format!("unexpected window rect {}", rect)))
    }

    fn set_window_position(&mut self, position: (i32, i32)) -> BrowserResult<()> {
        self.set_rect(json!({ "x": position.0, "y": position.1 }))
    }

    fn refresh(&mut self) -> BrowserResult<()> {
        self.post("/refresh", json!({}))?;
        Ok(())
    }

    fn quit(&mut self) -> BrowserResult<()> {
        if self.closed {
            return Err(BrowserFault::Disconnected("session already closed".to_string()));
        }
        let deleted = self.command(Method::DELETE, "", None);
        self.closed = true;
        if let Some(mut process) = self.process.take() {
            stop_process(&mut process);
        }
        if let Err(e) = deleted {
            tracing::debug!("Deleting WebDriver session {} failed: {}", self.session_id, e);
        }
        Ok(())
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if let Some(mut process) = self.process.take() {
            stop_process(&mut process);
        }
    }
}

/// Unwraps a WebDriver reply, turning its error object into a fault
fn read_reply(response: Response) -> BrowserResult<Value> {
    let status = response.status();
    let body = response.text().map_err(transport_fault)?;
    let mut reply: Value = serde_json::from_str(&body).map_err(|e| {
        BrowserFault::Driver(format!("HTTP {} with unreadable body ({}): {:.200}", status, e, body))
    })?;

    if let Some(code) = reply.pointer("/value/error").and_then(Value::as_str) {
        let message = reply
            .pointer("/value/message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        return Err(error_fault(code, message));
    }
    if !status.is_success() {
        return Err(BrowserFault::Driver(format!("HTTP {}: {:.200}", status, body)));
    }

    Ok(reply.get_mut("value").map(Value::take).unwrap_or(Value::Null))
}

/// Maps a WebDriver error code onto a fault
pub fn error_fault(code: &str, message: &str) -> BrowserFault {
    let text = format!("{}: {}", code, message);
    match code {
        "timeout" | "script timeout" => BrowserFault::Timeout(text),
        "invalid session id" | "no such window" | "session not created" => BrowserFault::Disconnected(text),
        "javascript error" => BrowserFault::Script(text),
        _ => BrowserFault::Driver(text),
    }
}

fn transport_fault(e: reqwest::Error) -> BrowserFault {
    if e.is_timeout() {
        BrowserFault::Timeout(e.to_string())
    } else {
        BrowserFault::Disconnected(e.to_string())
    }
}

fn rect_pair(rect: &Value, first: &str, second: &str) -> Option<(i64, i64)> {
    let number = |key: &str| rect.get(key).and_then(Value::as_f64).map(|f| f as i64);
    Some((number(first)?, number(second)?))
}

fn free_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

fn stop_process(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
