use std::time::Duration;

use crate::poll::PollSettings;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Settings for one run of the auction suite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    /// How the suite waits for the service to close an auction.
    pub poll: PollSettings,
    /// Lifetime of the listing that is expected to close during the run.
    pub closing_offset: Duration,
    /// Lifetime of the listings that must stay open for the whole run.
    pub open_listing_lifetime: Duration,
}

impl RunConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(10),
            poll: PollSettings::default(),
            closing_offset: Duration::from_secs(20),
            open_listing_lifetime: Duration::from_secs(24 * 60 * 60),
        }
    }
}
