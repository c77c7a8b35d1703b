//! WCAG 1.4.10 Reflow, approximated
//!
//! At a 320px wide window a page that reflows properly has nothing to scroll
//! horizontally. The audit scrolls right by 100px and reads back how far the
//! page actually moved; anything above zero is horizontal overflow. This is
//! an indication only, not a full test of the success criterion.

use crate::audit::plugins::screenshot::save_screenshot;
use crate::audit::{AuditContext, AuditError, AuditOutcome, AuditPlugin, AuditResult};
use crate::config::{Config, PluginEntry, REFLOW_WIDTH};
use std::thread;
use std::time::Duration;

const RENDER_SETTLE: Duration = Duration::from_millis(300);

pub struct ReflowAudit {
    screenshot_failures: bool,
}

impl ReflowAudit {
    pub const AUDIT_TYPE: &'static str = "ReflowAudit";

    pub fn create(entry: &PluginEntry, config: &Config) -> AuditResult<Box<dyn AuditPlugin>> {
        if !config.browser.headless {
            return Err(AuditError::Fatal(
                "headless mode must be enabled for the reflow audit".to_string(),
            ));
        }
        Ok(Box::new(ReflowAudit {
            screenshot_failures: entry.setting_bool("screenshot-failures", false),
        }))
    }

    fn scroll_overflow(ctx: &mut AuditContext<'_>) -> AuditResult<f64> {
        ctx.browser.execute_script("window.scrollTo(100, 0);")?;
        let scrolled = ctx.browser.execute_script("return window.scrollX;")?;
        Ok(scrolled.as_f64().unwrap_or(0.0))
    }
}

impl AuditPlugin for ReflowAudit {
    fn run(&mut self, ctx: &mut AuditContext<'_>) -> AuditResult<AuditOutcome> {
        let (width, _) = ctx.browser.get_window_size();
        if width != REFLOW_WIDTH {
            return Err(AuditError::Fatal(format!(
                "the reflow audit must only run at {}px wide, width was {}",
                REFLOW_WIDTH, width
            )));
        }

        ctx.browser.get_if_necessary(ctx.url);
        thread::sleep(RENDER_SETTLE);

        let overflow = match Self::scroll_overflow(ctx) {
            Ok(overflow) => overflow,
            Err(AuditError::Browser(fault)) if fault.is_session_dead() => {
                return Err(AuditError::Browser(fault))
            }
            Err(e) => {
                tracing::error!("Failed to scroll {} by 100px: {}", ctx.url, e);
                return Ok(AuditOutcome::Failed);
            }
        };
        let overflows = overflow > 0.0;

        if self.screenshot_failures && overflows {
            if let Err(e) = save_screenshot(ctx) {
                tracing::warn!("Could not screenshot reflow failure on {}: {}", ctx.url, e);
            }
        }

        if let Err(e) = ctx.browser.execute_script("window.scrollTo(0, 0);") {
            tracing::warn!("Failed to reset scroll position on {}: {}", ctx.url, e);
        }

        let row = ctx
            .base_row()
            .with("audit_type", Self::AUDIT_TYPE)
            .with("overflows", overflows)
            .with("num_issues", u8::from(overflows))
            .with("overflow_amount_px", overflow);
        Ok(AuditOutcome::Rows(vec![row]))
    }
}
