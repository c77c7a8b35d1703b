use crate::audit::{AuditContext, AuditError, AuditOutcome, AuditPlugin, AuditResult};
use crate::config::{Config, PluginEntry};

/// Saves a PNG of the viewport to `screenshots/<audit_id>.png`
pub struct ScreenshotAudit;

impl ScreenshotAudit {
    pub const AUDIT_TYPE: &'static str = "ScreenshotAudit";

    pub fn create(_entry: &PluginEntry, _config: &Config) -> AuditResult<Box<dyn AuditPlugin>> {
        Ok(Box::new(ScreenshotAudit))
    }
}

/// Writes a screenshot of the current viewport and returns its file name
pub(crate) fn save_screenshot(ctx: &mut AuditContext<'_>) -> AuditResult<String> {
    let png = ctx.browser.screenshot_png()?;
    let file = format!("{}.png", ctx.audit_id);
    ctx.sink
        .write_artifact(&format!("screenshots/{}", file), &png)
        .map_err(|e| AuditError::Plugin(e.to_string()))?;
    Ok(file)
}

impl AuditPlugin for ScreenshotAudit {
    fn run(&mut self, ctx: &mut AuditContext<'_>) -> AuditResult<AuditOutcome> {
        let file = match save_screenshot(ctx) {
            Ok(file) => file,
            Err(AuditError::Browser(fault)) if fault.is_session_dead() => {
                return Err(AuditError::Browser(fault))
            }
            Err(e) => {
                tracing::error!("Failed to save screenshot of {}: {}", ctx.url, e);
                return Ok(AuditOutcome::Failed);
            }
        };

        let row = ctx
            .base_row()
            .with("audit_type", Self::AUDIT_TYPE)
            .with("screenshot", file);
        Ok(AuditOutcome::Rows(vec![row]))
    }
}
