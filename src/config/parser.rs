use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use chrono::{DateTime, TimeZone};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Longest audit name kept after sanitising (before the timestamp prefix)
const MAX_AUDIT_NAME_LEN: usize = 50;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use access_sweep::config::load_config;
///
/// let config = load_config(Path::new("config.toml")).unwrap();
/// println!("Pages per site: {}", config.audit.max_links_per_domain);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so a results directory can be traced back to the exact
/// configuration that produced it.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

/// Makes an audit name safe to use as a directory name
///
/// Anything outside `[A-Za-z0-9_.-]` becomes `_`, runs of `_` collapse to one,
/// and the result is cut to 50 characters.
pub fn sanitise_audit_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
            c
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    out.chars().take(MAX_AUDIT_NAME_LEN).collect()
}

/// Builds the run name: a start timestamp followed by the sanitised audit name
pub fn stamp_audit_name<Tz: TimeZone>(raw: &str, now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{}_{}",
        now.format("%Y-%m-%d_%H-%M-%S"),
        sanitise_audit_name(raw)
    )
}
