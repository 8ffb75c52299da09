//! Usage-limit polling for Codex and Claude.
//!
//! Each provider reads its locally cached OAuth credentials, calls the
//! provider's usage endpoint with a blocking request and returns a
//! [`UsageReport`]. Failures are returned as [`UsageError`] so the caller can
//! still render a payload.

pub mod claude;
pub mod codex;
pub mod http;
pub mod types;

use chrono::{DateTime, Utc};
use tracing::debug;
use ureq::Agent;

pub use claude::ClaudeSource;
pub use codex::CodexSource;
pub use types::{Provider, UsageError, UsageReport, UsageWindow};

/// A service whose usage limits can be fetched
pub trait UsageSource {
    /// Which provider this source reports for
    fn provider(&self) -> Provider;

    /// Fetch current usage, refreshing credentials if needed
    fn fetch(&self, agent: &Agent, now: DateTime<Utc>) -> Result<UsageReport, UsageError>;
}

/// Fetch every source in order, keeping failures alongside successes
pub fn collect(
    sources: &[Box<dyn UsageSource>],
    agent: &Agent,
    now: DateTime<Utc>,
) -> Vec<(Provider, Result<UsageReport, UsageError>)> {
    sources
        .iter()
        .map(|source| {
            let result = source.fetch(agent, now);
            if let Err(ref e) = result {
                debug!("{} usage unavailable: {}", source.provider(), e);
            }
            (source.provider(), result)
        })
        .collect()
}

/// Parse an RFC 3339 timestamp (`Z` or numeric offset)
pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
