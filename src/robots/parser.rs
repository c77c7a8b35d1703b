//! Robots.txt rule matching backed by the robotstxt crate

use robotstxt::DefaultMatcher;

/// Rules read from one domain's robots.txt
///
/// A rule set without a body is permissive: it is what gets cached when the
/// file could not be fetched, so that the domain is not fetched again.
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    body: Option<String>,
}

impl RobotsRules {
    /// Rules parsed from a robots.txt body
    pub fn parse(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
        }
    }

    /// Rules that allow every URL
    pub fn permissive() -> Self {
        Self { body: None }
    }

    /// True when these rules came from a failed fetch (or an empty file)
    pub fn is_permissive(&self) -> bool {
        self.body.as_deref().map_or(true, |b| b.trim().is_empty())
    }

    /// Checks whether `product_token` may fetch the absolute `url`
    pub fn can_fetch(&self, product_token: &str, url: &str) -> bool {
        match self.body.as_deref() {
            None => true,
            Some(body) => {
                let mut matcher = DefaultMatcher::default();
                matcher.one_agent_allowed_by_robots(body, product_token, url)
            }
        }
    }
}
