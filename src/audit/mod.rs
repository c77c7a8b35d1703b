//! Page audits
//!
//! The [`AuditManager`] runs every enabled [`AuditPlugin`] against a loaded
//! page at each configured viewport, after checking the page was not served
//! by a bot-blocking service. Plugins are looked up by name in a
//! [`PluginRegistry`].

mod anti_bot;
mod manager;
mod plugin;
pub mod plugins;

pub use anti_bot::{detect_anti_bot, AntiBotDetector, AntiBotVendor};
pub use manager::AuditManager;
pub use plugin::{
    viewport_label, AuditContext, AuditError, AuditOutcome, AuditPlugin, AuditResult,
    PluginFactory, PluginRegistry, RegisteredAudit,
};

/// Names of the plugins [`PluginRegistry::builtin`] provides
pub const BUILTIN_PLUGINS: &[&str] = &["default", "screenshot", "element", "reflow", "axe_core"];
