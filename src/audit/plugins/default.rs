use crate::audit::{AuditContext, AuditOutcome, AuditPlugin, AuditResult};
use crate::config::{Config, PluginEntry};

/// Basic page information: one base row per page and viewport
pub struct DefaultAudit;

impl DefaultAudit {
    pub fn create(_entry: &PluginEntry, _config: &Config) -> AuditResult<Box<dyn AuditPlugin>> {
        Ok(Box::new(DefaultAudit))
    }
}

impl AuditPlugin for DefaultAudit {
    fn run(&mut self, ctx: &mut AuditContext<'_>) -> AuditResult<AuditOutcome> {
        Ok(AuditOutcome::Rows(vec![ctx.base_row()]))
    }
}
