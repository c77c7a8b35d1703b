//! axe-core rule audit
//!
//! Injects axe-core into the page, runs it for violations only and turns each
//! violating node into one row.

use crate::audit::{AuditContext, AuditError, AuditOutcome, AuditPlugin, AuditResult};
use crate::config::{Config, PluginEntry};
use crate::output::Row;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fs;

/// Setting holding the path to `axe.min.js`
pub const AXE_PATH_SETTING: &str = "axe-core-path";

pub const DEFAULT_AXE_PATH: &str = "./node_modules/axe-core/axe.min.js";

const RUN_AXE: &str = "return await axe.run({ xpath: true, resultTypes: ['violations'] });";

#[derive(Debug, Deserialize)]
struct AxeResults {
    #[serde(default)]
    violations: Vec<Violation>,
}

#[derive(Debug, Deserialize)]
struct Violation {
    id: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    help: String,
    #[serde(rename = "helpUrl", default)]
    help_url: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    nodes: Vec<ViolationNode>,
}

#[derive(Debug, Deserialize)]
struct ViolationNode {
    #[serde(default)]
    html: String,
    #[serde(default)]
    impact: Option<String>,
    #[serde(default)]
    xpath: Vec<String>,
}

pub struct AxeCoreAudit {
    script: String,
    best_practice: bool,
}

impl AxeCoreAudit {
    pub const AUDIT_TYPE: &'static str = "AxeCoreAudit";

    pub fn create(entry: &PluginEntry, _config: &Config) -> AuditResult<Box<dyn AuditPlugin>> {
        let path = entry.setting_str(AXE_PATH_SETTING).unwrap_or(DEFAULT_AXE_PATH);
        tracing::info!("Reading axe-core from {}", path);
        let axe_source = fs::read_to_string(path).map_err(|e| {
            AuditError::Fatal(format!(
                "could not read axe-core from {} (run `npm install`?): {}",
                path, e
            ))
        })?;

        Ok(Box::new(Self::with_source(
            &axe_source,
            entry.setting_bool("best-practice", false),
        )))
    }

    fn with_source(axe_source: &str, best_practice: bool) -> Self {
        Self {
            script: format!("{}\n{}", axe_source, RUN_AXE),
            best_practice,
        }
    }

    fn expand_violations(&self, results: &AxeResults, url: &str) -> Vec<Row> {
        let mut rows = Vec::new();

        for violation in &results.violations {
            let is_best_practice = violation.tags.iter().any(|t| t == "best-practice");
            if is_best_practice && !self.best_practice {
                continue;
            }

            for node in &violation.nodes {
                let target = node.xpath.first().map(String::as_str).unwrap_or("");
                rows.push(
                    Row::new()
                        .with("audit_type", Self::AUDIT_TYPE)
                        .with("issue_id", issue_id(&violation.id, target, url))
                        .with("description", &violation.description)
                        .with("target", target)
                        .with("num_issues", 1)
                        .with("help", &violation.help)
                        .with("helpUrl", &violation.help_url)
                        .with("id", &violation.id)
                        .with("impact", node.impact.as_deref().unwrap_or(""))
                        .with("html", node.html.chars().take(100).collect::<String>())
                        .with("tags", violation.tags.join(","))
                        .with("best-practice", if is_best_practice { "Yes" } else { "No" }),
                );
            }
        }

        if rows.is_empty() {
            rows.push(
                Row::new()
                    .with("audit_type", Self::AUDIT_TYPE)
                    .with("issue_id", "")
                    .with("description", "No issues found")
                    .with("target", "")
                    .with("num_issues", 0)
                    .with("help", "")
                    .with("helpUrl", "")
                    .with("id", "")
                    .with("impact", "")
                    .with("html", "")
                    .with("tags", "")
                    .with("best-practice", "No"),
            );
        }
        rows
    }
}

/// Stable identifier for one issue: rule, element and page
pub fn issue_id(rule_id: &str, target: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(rule_id.as_bytes());
    hasher.update(target.as_bytes());
    hasher.update(url.as_bytes());
    let mut id = hex::encode(hasher.finalize());
    id.truncate(16);
    id
}

impl AuditPlugin for AxeCoreAudit {
    fn run(&mut self, ctx: &mut AuditContext<'_>) -> AuditResult<AuditOutcome> {
        tracing::info!("Injecting axe {}", ctx.url);
        let value = match ctx.browser.execute_async_script(&self.script) {
            Ok(value) => value,
            Err(fault) if fault.is_session_dead() => return Err(fault.into()),
            Err(fault) => {
                tracing::error!("axe-core failed on {}: {}", ctx.url, fault);
                return Ok(AuditOutcome::Failed);
            }
        };
        tracing::info!("axe-core has returned results {}", ctx.url);

        let results: AxeResults = match serde_json::from_value(value) {
            Ok(results) => results,
            Err(e) => {
                tracing::error!("Unexpected axe-core result on {}: {}", ctx.url, e);
                return Ok(AuditOutcome::Failed);
            }
        };

        let base = ctx.base_row();
        let rows = self
            .expand_violations(&results, ctx.url)
            .into_iter()
            .map(|issue| {
                let mut row = base.clone();
                row.extend(&issue);
                row
            })
            .collect();
        Ok(AuditOutcome::Rows(rows))
    }
}
