use crate::audit::{AuditContext, AuditError, AuditOutcome, AuditPlugin, AuditResult};
use crate::config::{Config, PluginEntry};
use scraper::{Html, Selector};

/// Setting holding the CSS selector to look for
pub const TARGET_SELECTOR_SETTING: &str = "target-element-css-selector";

/// Reports every element matching a configured CSS selector, one row each
pub struct ElementAudit {
    selector: Selector,
}

impl ElementAudit {
    pub fn create(entry: &PluginEntry, _config: &Config) -> AuditResult<Box<dyn AuditPlugin>> {
        let raw = entry.setting_str(TARGET_SELECTOR_SETTING).ok_or_else(|| {
            AuditError::Fatal(format!(
                "plugin '{}' needs a '{}' setting",
                entry.name, TARGET_SELECTOR_SETTING
            ))
        })?;
        let selector = Selector::parse(raw).map_err(|e| {
            AuditError::Fatal(format!("invalid CSS selector '{}': {:?}", raw, e))
        })?;
        Ok(Box::new(ElementAudit { selector }))
    }

    /// Outer HTML of every matching element, in document order
    pub fn find_elements(&self, page_source: &str) -> Vec<String> {
        Html::parse_document(page_source)
            .select(&self.selector)
            .map(|element| element.html())
            .collect()
    }
}

impl AuditPlugin for ElementAudit {
    fn run(&mut self, ctx: &mut AuditContext<'_>) -> AuditResult<AuditOutcome> {
        let source = match ctx.browser.page_source() {
            Ok(source) => source,
            Err(fault) if fault.is_session_dead() => return Err(fault.into()),
            Err(fault) => {
                tracing::error!("Error getting page source of {}: {}", ctx.url, fault);
                return Ok(AuditOutcome::Failed);
            }
        };

        let elements = self.find_elements(&source);
        if elements.is_empty() {
            return Ok(AuditOutcome::EmptyOk);
        }

        let base = ctx.base_row();
        let rows = elements
            .into_iter()
            .map(|html| base.clone().with("element_html", html))
            .collect();
        Ok(AuditOutcome::Rows(rows))
    }
}
