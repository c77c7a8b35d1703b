use crate::audit::BUILTIN_PLUGINS;
use crate::config::types::{AuditConfig, BrowserConfig, Config, CrawlerConfig, PluginEntry, ViewportSize};
use crate::ConfigError;

/// Width the reflow check must be run at
pub const REFLOW_WIDTH: u32 = 320;

/// Longest accepted delay, in seconds
pub const MAX_DELAY_SECONDS: f64 = 3600.0;

/// Longest accepted script or page-load timeout, in seconds
pub const MAX_TIMEOUT_SECONDS: u64 = 3600;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_audit_config(&config.audit)?;
    validate_browser_config(&config.browser)?;
    validate_crawler_config(&config.crawler)?;
    validate_viewports(&config.viewports)?;
    validate_plugins(config)?;
    Ok(())
}

/// Validates audit run configuration
fn validate_audit_config(config: &AuditConfig) -> Result<(), ConfigError> {
    if config.audit_name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "audit_name cannot be empty".to_string(),
        ));
    }

    if config.max_links_per_domain < 1 {
        return Err(ConfigError::Validation(format!(
            "max_links_per_domain must be >= 1, got {}",
            config.max_links_per_domain
        )));
    }

    if config.thread_count < 1 || config.thread_count > 64 {
        return Err(ConfigError::Validation(format!(
            "thread_count must be between 1 and 64, got {}",
            config.thread_count
        )));
    }

    if !config.base_urls_visit_path.is_dir() {
        return Err(ConfigError::Validation(format!(
            "base_urls_visit_path '{}' is not a readable directory",
            config.base_urls_visit_path.display()
        )));
    }

    for url in &config.filter_to_urls {
        url::Url::parse(url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid filter_to_urls entry '{}': {}", url, e))
        })?;
    }

    Ok(())
}

/// Validates browser configuration
fn validate_browser_config(config: &BrowserConfig) -> Result<(), ConfigError> {
    if config.user_agent.is_empty() || config.user_agent_product_token.is_empty() {
        return Err(ConfigError::Validation(
            "user_agent and user_agent_product_token cannot be empty".to_string(),
        ));
    }

    for (name, timeout) in [
        ("script_timeout", config.script_timeout),
        ("page_load_timeout", config.page_load_timeout),
    ] {
        if timeout == 0 || timeout > MAX_TIMEOUT_SECONDS {
            return Err(ConfigError::Validation(format!(
                "{} must be between 1 and {} seconds, got {}",
                name, MAX_TIMEOUT_SECONDS, timeout
            )));
        }
    }

    validate_delay("delay_after_page_load", config.delay_after_page_load)?;
    validate_delay("delay_between_viewports", config.delay_between_viewports)?;

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    validate_delay("delay_between_page_loads", config.delay_between_page_loads)
}

fn validate_delay(name: &str, seconds: f64) -> Result<(), ConfigError> {
    if !seconds.is_finite() || !(0.0..=MAX_DELAY_SECONDS).contains(&seconds) {
        return Err(ConfigError::Validation(format!(
            "{} must be between 0 and {} seconds, got {}",
            name, MAX_DELAY_SECONDS, seconds
        )));
    }
    Ok(())
}

/// Validates the viewport list
fn validate_viewports(viewports: &[ViewportSize]) -> Result<(), ConfigError> {
    if viewports.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[viewport]] is required".to_string(),
        ));
    }

    for (i, viewport) in viewports.iter().enumerate() {
        if viewport.width == 0 || viewport.height == 0 {
            return Err(ConfigError::Validation(format!(
                "viewport '{}' must have positive dimensions",
                viewport.name
            )));
        }
        if viewports[..i].iter().any(|v| v.name == viewport.name) {
            return Err(ConfigError::Validation(format!(
                "duplicate viewport name '{}'",
                viewport.name
            )));
        }
    }

    Ok(())
}

/// Validates the plugin list against the built-in registry
fn validate_plugins(config: &Config) -> Result<(), ConfigError> {
    if config.enabled_plugins().next().is_none() {
        return Err(ConfigError::Validation(
            "at least one [[plugin]] must be enabled".to_string(),
        ));
    }

    for plugin in config.enabled_plugins() {
        if !BUILTIN_PLUGINS.contains(&plugin.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "unknown audit plugin '{}'",
                plugin.name
            )));
        }

        if let Some(name) = &plugin.viewport_to_test {
            if !config.viewports.iter().any(|v| &v.name == name) {
                return Err(ConfigError::Validation(format!(
                    "plugin '{}' targets unknown viewport '{}'",
                    plugin.name, name
                )));
            }
        }

        if plugin.name == "reflow" {
            validate_reflow(config, plugin)?;
        }
    }

    Ok(())
}

/// The reflow check is only meaningful headless at 320px wide
fn validate_reflow(config: &Config, plugin: &PluginEntry) -> Result<(), ConfigError> {
    if !config.browser.headless {
        return Err(ConfigError::Validation(
            "the reflow plugin requires headless = true".to_string(),
        ));
    }

    let has_width = config
        .viewports
        .iter()
        .filter(|v| match &plugin.viewport_to_test {
            Some(name) => &v.name == name,
            None => true,
        })
        .any(|v| v.width == REFLOW_WIDTH);

    if !has_width {
        return Err(ConfigError::Validation(format!(
            "the reflow plugin requires a viewport {} pixels wide",
            REFLOW_WIDTH
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::create_test_config;

    #[test]
    fn test_valid_config_passes() {
        let config = create_test_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_links_rejected() {
        let mut config = create_test_config();
        config.audit.max_links_per_domain = 0;
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_negative_delay_rejected() {
        let mut config = create_test_config();
        config.crawler.delay_between_page_loads = -1.0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_huge_delay_rejected() {
        let mut config = create_test_config();
        config.browser.delay_after_page_load = 1e300;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("delay_after_page_load"));

        let mut config = create_test_config();
        config.crawler.delay_between_page_loads = MAX_DELAY_SECONDS;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_timeout_bounds() {
        let mut config = create_test_config();
        config.browser.page_load_timeout = 0;
        assert!(validate(&config).is_err());

        config.browser.page_load_timeout = u64::MAX;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("page_load_timeout"));
    }

    #[test]
    fn test_unknown_plugin_rejected() {
        let mut config = create_test_config();
        config.plugins[0].name = "sparkles".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("sparkles"));
    }

    #[test]
    fn test_disabled_unknown_plugin_ignored() {
        let mut config = create_test_config();
        let mut extra = config.plugins[0].clone();
        extra.name = "focus_indicator".to_string();
        extra.enabled = false;
        config.plugins.push(extra);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_reflow_requires_headless() {
        let mut config = create_test_config();
        config.viewports[0].width = REFLOW_WIDTH;
        let mut reflow = config.plugins[0].clone();
        reflow.name = "reflow".to_string();
        config.plugins.push(reflow);
        assert!(validate(&config).is_ok());

        config.browser.headless = false;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("headless"));
    }

    #[test]
    fn test_reflow_requires_small_viewport() {
        let mut config = create_test_config();
        let mut reflow = config.plugins[0].clone();
        reflow.name = "reflow".to_string();
        config.plugins.push(reflow);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_duplicate_viewport_rejected() {
        let mut config = create_test_config();
        let dup = config.viewports[0].clone();
        config.viewports.push(dup);
        assert!(validate(&config).is_err());
    }
}
