//! Claude (Anthropic OAuth) usage provider.
//!
//! Reads the OAuth token that `claude login` stores in
//! `~/.claude/.credentials.json`. The file is never written.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use ureq::Agent;

use super::http::read_json;
use super::types::{Provider, UsageError, UsageReport, UsageWindow};
use super::{parse_timestamp, UsageSource};

/// OAuth usage endpoint
pub const DEFAULT_USAGE_URL: &str = "https://api.anthropic.com/api/oauth/usage";
/// Beta header value required by the usage endpoint
const OAUTH_BETA: &str = "oauth-2025-04-20";
/// Scope needed to read usage
const PROFILE_SCOPE: &str = "user:profile";

/// Path to the Claude credentials file
pub fn default_credentials_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".claude").join(".credentials.json"))
}

/// OAuth section of the credentials file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaudeOauth {
    pub access_token: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Expiry in Unix milliseconds
    pub expires_at: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct CredentialsFile {
    #[serde(default, rename = "claudeAiOauth")]
    claude_ai_oauth: Option<ClaudeOauth>,
}

impl ClaudeOauth {
    /// Load the OAuth section from `path`
    pub fn load(path: &Path) -> Result<Self, UsageError> {
        let content = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                UsageError::CredentialsNotFound {
                    path: path.to_path_buf(),
                    login: Provider::Claude.login_hint(),
                }
            } else {
                UsageError::CredentialsRead {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        let file: CredentialsFile =
            serde_json::from_str(&content).map_err(|source| UsageError::CredentialsParse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(file.claude_ai_oauth.unwrap_or_default())
    }

    /// Access token, if present, in scope and unexpired
    pub fn usable_token(&self, now: DateTime<Utc>) -> Result<&str, UsageError> {
        let token = self
            .access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| UsageError::Credentials("Claude access token missing".into()))?;

        if !self.scopes.iter().any(|s| s == PROFILE_SCOPE) {
            return Err(UsageError::Credentials(format!(
                "Claude token missing {} scope",
                PROFILE_SCOPE
            )));
        }

        if let Some(expires_ms) = self.expires_at.filter(|ms| *ms > 0.0) {
            let expired = Utc
                .timestamp_millis_opt(expires_ms as i64)
                .single()
                .is_some_and(|exp| now >= exp);
            if expired {
                return Err(UsageError::Credentials(
                    "Claude token expired (run `claude login`)".into(),
                ));
            }
        }

        Ok(token)
    }
}

#[derive(Debug, Default, Deserialize)]
struct UsageResponse {
    #[serde(default)]
    five_hour: Option<UsageBucket>,
    #[serde(default)]
    seven_day: Option<UsageBucket>,
}

#[derive(Debug, Default, Deserialize)]
struct UsageBucket {
    #[serde(default)]
    utilization: Option<f64>,
    #[serde(default)]
    resets_at: Option<String>,
}

impl From<Option<UsageBucket>> for UsageWindow {
    fn from(bucket: Option<UsageBucket>) -> Self {
        let bucket = bucket.unwrap_or_default();
        UsageWindow {
            percent: bucket.utilization.map(utilization_percent),
            resets_at: bucket.resets_at.as_deref().and_then(parse_timestamp),
        }
    }
}

/// Utilization is reported either as a fraction (<= 1.0) or a percentage
pub fn utilization_percent(value: f64) -> f64 {
    if value <= 1.0 {
        (value * 100.0).round()
    } else {
        value.round()
    }
}

/// Claude usage source
#[derive(Debug, Clone)]
pub struct ClaudeSource {
    pub credentials_path: PathBuf,
    pub usage_url: String,
}

impl ClaudeSource {
    pub fn new(credentials_path: PathBuf) -> Self {
        Self {
            credentials_path,
            usage_url: DEFAULT_USAGE_URL.to_string(),
        }
    }
}

impl UsageSource for ClaudeSource {
    fn provider(&self) -> Provider {
        Provider::Claude
    }

    fn fetch(&self, agent: &Agent, now: DateTime<Utc>) -> Result<UsageReport, UsageError> {
        let oauth = ClaudeOauth::load(&self.credentials_path)?;
        let token = oauth.usable_token(now)?;

        let response = agent
            .get(&self.usage_url)
            .header("Authorization", format!("Bearer {}", token))
            .header("anthropic-beta", OAUTH_BETA)
            .call()?;
        let usage: UsageResponse = read_json(response)?;

        let report = UsageReport {
            provider: Provider::Claude,
            session: usage.five_hour.into(),
            weekly: usage.seven_day.into(),
        };
        if report.session.percent.is_none() && report.weekly.percent.is_none() {
            return Err(UsageError::NoData);
        }
        Ok(report)
    }
}
