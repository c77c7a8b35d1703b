use serde::Serialize;

/// One audit target, as read from the site lists
///
/// Created at startup and handed to exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteAssignment {
    pub organisation: String,
    pub sector: String,
    /// Seed URL; also the key the site's progress is tracked under
    pub url: String,
    /// False when the site answers HEAD requests badly and needs GET instead
    pub supports_head: bool,
}

impl SiteAssignment {
    pub fn new(
        organisation: impl Into<String>,
        url: impl Into<String>,
        sector: impl Into<String>,
    ) -> Self {
        Self {
            organisation: organisation.into(),
            sector: sector.into(),
            url: url.into(),
            supports_head: true,
        }
    }
}
