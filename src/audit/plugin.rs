//! The audit plugin interface and the registry plugins are looked up in

use crate::browser::{Browser, BrowserFault, WindowSize};
use crate::config::{Config, PluginEntry, ViewportSize};
use crate::output::{ResultSink, Row};
use crate::state::SiteAssignment;
use thiserror::Error;
use url::Url;

/// Errors an audit plugin can raise
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserFault),

    #[error("Plugin failed: {0}")]
    Plugin(String),

    /// The run cannot continue; the process exits nonzero
    #[error("Fatal audit configuration error: {0}")]
    Fatal(String),
}

/// Result type for audit operations
pub type AuditResult<T> = Result<T, AuditError>;

/// What one plugin invocation produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditOutcome {
    /// Not applicable to this page
    Skipped,
    /// The plugin ran and failed; counts against the page
    Failed,
    /// Ran, but produced nothing (logged as an anomaly)
    EmptyOk,
    Rows(Vec<Row>),
}

/// Everything a plugin gets to look at for one page and viewport
pub struct AuditContext<'a> {
    pub browser: &'a mut Browser,
    pub config: &'a Config,
    pub url: &'a str,
    pub site: &'a SiteAssignment,
    /// `{page_id}_{viewport name}`
    pub audit_id: &'a str,
    pub page_id: u64,
    pub viewport: &'a ViewportSize,
    pub entry: &'a PluginEntry,
    pub sink: &'a dyn ResultSink,
}

impl AuditContext<'_> {
    /// The base URL reported in result rows
    ///
    /// Without crawling (a cap of one page) the seed is reduced to
    /// `scheme://host` so rows group by site rather than by seed path.
    pub fn reported_base_url(&self) -> String {
        if !self.config.single_page_mode() {
            return self.site.url.clone();
        }
        match Url::parse(&self.site.url) {
            Ok(seed) => crate::url::origin_url(&seed),
            Err(_) => self.site.url.clone(),
        }
    }

    /// The columns every plugin row starts with
    pub fn base_row(&mut self) -> Row {
        let title = self.browser.title().unwrap_or_default();
        let size = self.browser.get_window_size();

        Row::new()
            .with("organisation", &self.site.organisation)
            .with("sector", &self.site.sector)
            .with("page_title", title)
            .with("base_url", self.reported_base_url())
            .with("url", self.url)
            .with("viewport_size", viewport_label(size))
            .with("audit_id", self.audit_id)
            .with("page_id", self.page_id)
    }
}

/// `{'width': 1280, 'height': 800}`
pub fn viewport_label(size: WindowSize) -> String {
    format!("{{'width': {}, 'height': {}}}", size.0, size.1)
}

/// A page-level check run by the audit manager
///
/// Plugins are created once per worker from their config entry and then run
/// against every page and viewport that worker audits.
pub trait AuditPlugin: Send {
    fn run(&mut self, ctx: &mut AuditContext<'_>) -> AuditResult<AuditOutcome>;
}

/// Builds a plugin from its config entry
pub type PluginFactory = fn(&PluginEntry, &Config) -> AuditResult<Box<dyn AuditPlugin>>;

/// A plugin instance together with the config entry it came from
pub struct RegisteredAudit {
    pub entry: PluginEntry,
    pub plugin: Box<dyn AuditPlugin>,
}

impl RegisteredAudit {
    pub fn name(&self) -> &str {
        &self.entry.name
    }

    /// Whether the plugin runs at this viewport
    pub fn runs_at(&self, viewport: &ViewportSize) -> bool {
        self.entry
            .viewport_to_test
            .as_deref()
            .map_or(true, |only| only == viewport.name)
    }
}

/// Name to factory mapping for every plugin a config may enable
#[derive(Default, Clone)]
pub struct PluginRegistry {
    factories: Vec<(String, PluginFactory)>,
}

impl PluginRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a plugin under `name`
    pub fn register(&mut self, name: impl Into<String>, factory: PluginFactory) {
        let name = name.into();
        match self.factories.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = factory,
            None => self.factories.push((name, factory)),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.iter().any(|(n, _)| n == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.iter().map(|(n, _)| n.as_str())
    }

    /// Creates every enabled plugin, in config order
    ///
    /// An enabled plugin with no registered factory is a fatal error.
    pub fn instantiate(&self, config: &Config) -> AuditResult<Vec<RegisteredAudit>> {
        config
            .enabled_plugins()
            .map(|entry| {
                let factory = self
                    .factories
                    .iter()
                    .find(|(n, _)| *n == entry.name)
                    .map(|(_, f)| *f)
                    .ok_or_else(|| AuditError::Fatal(format!("unknown audit plugin '{}'", entry.name)))?;
                Ok(RegisteredAudit {
                    entry: entry.clone(),
                    plugin: factory(entry, config)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::create_test_config;

    struct Nothing;

    impl AuditPlugin for Nothing {
        fn run(&mut self, _ctx: &mut AuditContext<'_>) -> AuditResult<AuditOutcome> {
            Ok(AuditOutcome::Skipped)
        }
    }

    fn nothing(_entry: &PluginEntry, _config: &Config) -> AuditResult<Box<dyn AuditPlugin>> {
        Ok(Box::new(Nothing))
    }

    #[test]
    fn test_registry_instantiates_enabled_plugins_in_order() {
        let mut config = create_test_config();
        let mut second = config.plugins[0].clone();
        second.name = "nothing".to_string();
        let mut disabled = second.clone();
        disabled.name = "disabled".to_string();
        disabled.enabled = false;
        config.plugins.push(second);
        config.plugins.push(disabled);

        let mut registry = PluginRegistry::new();
        registry.register("nothing", nothing);
        registry.register("default", nothing);
        registry.register("disabled", nothing);

        let audits = registry.instantiate(&config).unwrap();
        let names: Vec<&str> = audits.iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["default", "nothing"]);
    }

    #[test]
    fn test_unknown_plugin_is_fatal() {
        let config = create_test_config();
        let registry = PluginRegistry::new();
        assert!(matches!(
            registry.instantiate(&config),
            Err(AuditError::Fatal(_))
        ));
    }

    #[test]
    fn test_runs_at_viewport() {
        let mut entry = create_test_config().plugins[0].clone();
        let small = ViewportSize {
            name: "small".into(),
            width: 320,
            height: 450,
        };
        let audit = |entry: PluginEntry| RegisteredAudit {
            entry,
            plugin: Box::new(Nothing),
        };

        assert!(audit(entry.clone()).runs_at(&small));
        entry.viewport_to_test = Some("medium".into());
        assert!(!audit(entry.clone()).runs_at(&small));
        entry.viewport_to_test = Some("small".into());
        assert!(audit(entry).runs_at(&small));
    }

    #[test]
    fn test_viewport_label() {
        assert_eq!(viewport_label((320, 450)), "{'width': 320, 'height': 450}");
    }
}
