use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Access-Sweep
///
/// Loaded once at startup and shared read-only by every worker.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub audit: AuditConfig,
    pub browser: BrowserConfig,
    pub crawler: CrawlerConfig,
    #[serde(rename = "viewport")]
    pub viewports: Vec<ViewportSize>,
    #[serde(rename = "plugin", default)]
    pub plugins: Vec<PluginEntry>,
}

/// Audit run configuration: what to audit and where results go
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuditConfig {
    /// Human-readable audit name, sanitised and timestamped at startup
    pub audit_name: String,

    /// Directory under which the per-audit results directory is created
    #[serde(default = "default_results_path")]
    pub results_path: PathBuf,

    /// Maximum number of pages audited per site (1 = seed page only)
    pub max_links_per_domain: usize,

    /// Number of worker threads, each owning one browser
    pub thread_count: usize,

    /// Directory of CSV files listing the sites to audit
    pub base_urls_visit_path: PathBuf,

    /// Directory of CSV files listing hosts that reject HEAD requests
    #[serde(default)]
    pub base_urls_nohead_path: Option<PathBuf>,

    /// Restrict the run to these organisations (empty = no restriction)
    #[serde(default)]
    pub filter_to_organisations: Vec<String>,

    /// Restrict the run to these seed URLs (empty = no restriction)
    #[serde(default)]
    pub filter_to_urls: Vec<String>,

    /// Shuffle the site queue before workers start
    #[serde(default)]
    pub shuffle_base_urls: bool,
}

/// Browser backend configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BrowserConfig {
    /// Browser family to drive
    #[serde(default)]
    pub family: BrowserFamily,

    /// Run without a visible window
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Path to the Chrome binary; found on the system when unset
    #[serde(default)]
    pub chrome_binary_location: Option<PathBuf>,

    /// Path to a standalone driver binary; the CDP backend talks to the
    /// browser directly and only logs this value
    #[serde(default)]
    pub chrome_driver_location: Option<PathBuf>,

    /// Path to the Firefox binary; geckodriver finds one when unset
    #[serde(default)]
    pub firefox_binary_location: Option<PathBuf>,

    /// Path to geckodriver; `geckodriver` on the PATH when unset
    #[serde(default)]
    pub geckodriver_location: Option<PathBuf>,

    /// Full user-agent string sent by the browser and HTTP checks
    pub user_agent: String,

    /// Product token matched against robots.txt user-agent groups
    pub user_agent_product_token: String,

    /// Script execution timeout in seconds
    pub script_timeout: u64,

    /// Page load timeout in seconds
    pub page_load_timeout: u64,

    /// Seconds to wait after each successful navigation
    #[serde(default)]
    pub delay_after_page_load: f64,

    /// Seconds to wait between viewports of the same page
    #[serde(default)]
    pub delay_between_viewports: f64,
}

/// Crawl behaviour configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Seconds to wait before loading each page
    #[serde(default)]
    pub delay_between_page_loads: f64,

    /// Honour robots.txt rules
    #[serde(default = "default_true")]
    pub follow_robots_txt: bool,

    /// Reject plain-http URLs
    #[serde(default)]
    pub only_allow_https: bool,

    /// Issue a HEAD/GET pre-check before loading a page in the browser
    #[serde(default = "default_true")]
    pub perform_header_check: bool,

    /// Write rejected status codes to unexpected_response_codes.csv
    #[serde(default)]
    pub record_unexpected_response_codes: bool,

    /// Open every `<details>` element before running plugins
    #[serde(default)]
    pub force_open_details_elements: bool,
}

/// Supported browser families
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserFamily {
    /// Chrome or Chromium over the DevTools protocol
    #[default]
    Chrome,
    /// Firefox through geckodriver
    Firefox,
}

/// A named viewport size audited for every page
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ViewportSize {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

/// An audit plugin entry; unknown keys are passed to the plugin as settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PluginEntry {
    pub name: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Only run this plugin at the viewport with this name
    #[serde(default)]
    pub viewport_to_test: Option<String>,

    #[serde(flatten)]
    pub settings: toml::Table,
}

impl PluginEntry {
    /// Reads a string setting
    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(|v| v.as_str())
    }

    /// Reads a boolean setting, falling back to `default`
    pub fn setting_bool(&self, key: &str, default: bool) -> bool {
        self.settings
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }
}

impl Config {
    /// Directory all result files of this run are written to
    pub fn results_dir(&self) -> PathBuf {
        self.audit.results_path.join(&self.audit.audit_name)
    }

    /// Enabled plugins in configuration order
    pub fn enabled_plugins(&self) -> impl Iterator<Item = &PluginEntry> {
        self.plugins.iter().filter(|p| p.enabled)
    }

    /// True when the run audits only the seed page of each site
    pub fn single_page_mode(&self) -> bool {
        self.audit.max_links_per_domain == 1
    }
}

impl CrawlerConfig {
    pub fn delay_between_page_loads(&self) -> Duration {
        seconds(self.delay_between_page_loads)
    }
}

impl BrowserConfig {
    pub fn delay_after_page_load(&self) -> Duration {
        seconds(self.delay_after_page_load)
    }

    pub fn delay_between_viewports(&self) -> Duration {
        seconds(self.delay_between_viewports)
    }

    pub fn script_timeout(&self) -> Duration {
        Duration::from_secs(self.script_timeout)
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout)
    }
}

/// Converts validated fractional seconds; out-of-range values become zero
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}

fn default_true() -> bool {
    true
}

fn default_results_path() -> PathBuf {
    PathBuf::from("./results")
}
