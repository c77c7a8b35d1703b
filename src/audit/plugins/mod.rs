//! Built-in audit plugins

mod axe_core;
mod default;
mod element;
mod reflow;
mod screenshot;

pub use axe_core::{issue_id, AxeCoreAudit, AXE_PATH_SETTING, DEFAULT_AXE_PATH};
pub use default::DefaultAudit;
pub use element::{ElementAudit, TARGET_SELECTOR_SETTING};
pub use reflow::ReflowAudit;
pub use screenshot::ScreenshotAudit;

use crate::audit::PluginRegistry;

impl PluginRegistry {
    /// A registry holding every built-in plugin
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("default", DefaultAudit::create);
        registry.register("screenshot", ScreenshotAudit::create);
        registry.register("element", ElementAudit::create);
        registry.register("reflow", ReflowAudit::create);
        registry.register("axe_core", AxeCoreAudit::create);
        registry
    }
}
