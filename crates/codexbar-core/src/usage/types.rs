//! Usage data shared by all providers.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Service whose limits are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Codex,
    Claude,
}

impl Provider {
    /// Lowercase slug used for payload `alt` values
    pub fn slug(&self) -> &'static str {
        match self {
            Provider::Codex => "codex",
            Provider::Claude => "claude",
        }
    }

    /// Command that creates the provider's credentials
    pub fn login_hint(&self) -> &'static str {
        match self {
            Provider::Codex => "codex login",
            Provider::Claude => "claude login",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Codex => write!(f, "Codex"),
            Provider::Claude => write!(f, "Claude"),
        }
    }
}

/// One rate-limit window (5-hour session or weekly)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct UsageWindow {
    /// Percentage used (0-100)
    pub percent: Option<f64>,
    /// When the window resets
    pub resets_at: Option<DateTime<Utc>>,
}

/// Usage figures for one provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageReport {
    pub provider: Provider,
    /// Short rolling window (5 hours)
    pub session: UsageWindow,
    /// Weekly window
    pub weekly: UsageWindow,
}

impl UsageReport {
    /// Highest percentage across both windows
    pub fn top_percent(&self) -> Option<f64> {
        [self.session.percent, self.weekly.percent]
            .into_iter()
            .flatten()
            .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.max(p))))
    }
}

/// Errors while obtaining usage data
#[derive(Debug, Error)]
pub enum UsageError {
    /// Credentials file does not exist
    #[error("credentials not found at {} (run `{login}`)", path.display())]
    CredentialsNotFound { path: PathBuf, login: &'static str },

    /// Credentials file could not be read
    #[error("failed to read {}: {source}", path.display())]
    CredentialsRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Credentials file is not valid JSON
    #[error("invalid credentials in {}: {source}", path.display())]
    CredentialsParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Refreshed credentials could not be persisted
    #[error("failed to write {}: {source}", path.display())]
    CredentialsWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Credentials are present but unusable (missing token, scope, expired)
    #[error("{0}")]
    Credentials(String),

    /// Endpoint answered with a non-success status
    #[error("HTTP error: {0}")]
    Status(u16),

    /// Connection, TLS or timeout failure
    #[error("request failed: {0}")]
    Transport(String),

    /// Response body was not the expected JSON
    #[error("invalid response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Response carried no usage figures
    #[error("usage unavailable")]
    NoData,
}

impl From<ureq::Error> for UsageError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => UsageError::Status(code),
            other => UsageError::Transport(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_percent() {
        let report = UsageReport {
            provider: Provider::Codex,
            session: UsageWindow {
                percent: Some(12.0),
                resets_at: None,
            },
            weekly: UsageWindow {
                percent: Some(64.5),
                resets_at: None,
            },
        };
        assert_eq!(report.top_percent(), Some(64.5));
    }

    #[test]
    fn test_top_percent_partial() {
        let report = UsageReport {
            provider: Provider::Claude,
            session: UsageWindow::default(),
            weekly: UsageWindow {
                percent: Some(3.0),
                resets_at: None,
            },
        };
        assert_eq!(report.top_percent(), Some(3.0));

        let empty = UsageReport {
            provider: Provider::Claude,
            session: UsageWindow::default(),
            weekly: UsageWindow::default(),
        };
        assert_eq!(empty.top_percent(), None);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(UsageError::Status(401).to_string(), "HTTP error: 401");
        let err = UsageError::CredentialsNotFound {
            path: PathBuf::from("/home/u/.codex/auth.json"),
            login: Provider::Codex.login_hint(),
        };
        assert_eq!(
            err.to_string(),
            "credentials not found at /home/u/.codex/auth.json (run `codex login`)"
        );
    }

    #[test]
    fn test_provider_display() {
        assert_eq!(Provider::Codex.to_string(), "Codex");
        assert_eq!(Provider::Claude.slug(), "claude");
    }
}
