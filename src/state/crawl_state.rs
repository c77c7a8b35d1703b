/// Crawl state definitions for one site
///
/// A site crawl starts `Seeded`, moves to `Discovering` once the first URL is
/// popped, and ends in exactly one of the terminal states.
use std::fmt;

/// Represents the current state of a site crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlState {
    // ===== Active States =====
    /// Frontier holds only the seed URL
    Seeded,

    /// Pages are being popped, audited and mined for links
    Discovering,

    // ===== Terminal States =====
    /// The frontier ran dry
    Exhausted,

    /// The per-site page cap was reached
    Capped,

    /// Too many consecutive audit failures, or the seed itself was rejected
    Failed,
}

impl CrawlState {
    /// Returns true if this is a terminal state (the crawl is over)
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Returns true if the crawl may still pop URLs
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Seeded | Self::Discovering)
    }

    /// Returns true if the crawl ended without hitting the failure threshold
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Exhausted | Self::Capped)
    }

    /// Short lowercase name used in log lines
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seeded => "seeded",
            Self::Discovering => "discovering",
            Self::Exhausted => "exhausted",
            Self::Capped => "capped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
