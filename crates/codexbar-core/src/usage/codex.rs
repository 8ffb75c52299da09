//! Codex (ChatGPT OAuth) usage provider.
//!
//! Credentials live in `$CODEX_HOME/auth.json` (default `~/.codex/auth.json`),
//! owned by `codex login`. The poller only rewrites that file after a
//! successful token refresh, and does so atomically.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use ureq::Agent;

use super::http::read_json;
use super::types::{Provider, UsageError, UsageReport, UsageWindow};
use super::{parse_timestamp, UsageSource};

/// Usage endpoint
pub const DEFAULT_USAGE_URL: &str = "https://chatgpt.com/backend-api/wham/usage";
/// OAuth token endpoint
pub const DEFAULT_REFRESH_URL: &str = "https://auth.openai.com/oauth/token";
/// OAuth client id of the Codex CLI
pub const DEFAULT_CLIENT_ID: &str = "app_EMoamEEZ73f0CkXaXp7hrann";
/// Tokens older than this are refreshed before use
pub const DEFAULT_REFRESH_INTERVAL_DAYS: i64 = 8;

/// Path to `auth.json`, honoring `CODEX_HOME`
pub fn default_auth_path() -> Option<PathBuf> {
    if let Ok(home) = std::env::var("CODEX_HOME") {
        if !home.is_empty() {
            return Some(PathBuf::from(home).join("auth.json"));
        }
    }
    dirs::home_dir().map(|h| h.join(".codex").join("auth.json"))
}

/// Usage URL override from `CODEX_USAGE_URL`
pub fn usage_url_from_env() -> Option<String> {
    std::env::var("CODEX_USAGE_URL")
        .ok()
        .filter(|v| !v.is_empty())
}

/// Token set inside `auth.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodexTokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Fields we do not interpret, written back untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Contents of `auth.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodexAuth {
    #[serde(default)]
    pub tokens: Option<CodexTokens>,
    /// RFC 3339 timestamp of the last token refresh
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refresh: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CodexAuth {
    /// Load credentials from `path`
    pub fn load(path: &Path) -> Result<Self, UsageError> {
        let content = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                UsageError::CredentialsNotFound {
                    path: path.to_path_buf(),
                    login: Provider::Codex.login_hint(),
                }
            } else {
                UsageError::CredentialsRead {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        serde_json::from_str(&content).map_err(|source| UsageError::CredentialsParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write credentials via a temp file and rename
    pub fn save(&self, path: &Path) -> Result<(), UsageError> {
        let write_err = |source: std::io::Error| UsageError::CredentialsWrite {
            path: path.to_path_buf(),
            source,
        };

        let mut tmp = path.as_os_str().to_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&tmp, json).map_err(write_err)?;
        restrict_permissions(&tmp).map_err(write_err)?;
        std::fs::rename(&tmp, path).map_err(write_err)
    }

    /// Whether the tokens are older than `max_age` (or of unknown age)
    pub fn needs_refresh(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        match self.last_refresh.as_deref().and_then(parse_timestamp) {
            Some(last) => now - last > max_age,
            None => true,
        }
    }

    /// Store a refresh response, keeping old values for fields it omits
    pub fn apply_refresh(&mut self, refreshed: RefreshResponse, now: DateTime<Utc>) {
        let tokens = self.tokens.get_or_insert_with(CodexTokens::default);
        if let Some(access) = refreshed.access_token {
            tokens.access_token = Some(access);
        }
        if let Some(refresh) = refreshed.refresh_token {
            tokens.refresh_token = Some(refresh);
        }
        if let Some(id) = refreshed.id_token {
            tokens.id_token = Some(id);
        }
        self.last_refresh = Some(now.to_rfc3339_opts(SecondsFormat::Secs, true));
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    client_id: &'a str,
    grant_type: &'static str,
    refresh_token: &'a str,
    scope: &'static str,
}

/// Token endpoint response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefreshResponse {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UsageResponse {
    #[serde(default)]
    rate_limit: Option<RateLimit>,
}

#[derive(Debug, Default, Deserialize)]
struct RateLimit {
    #[serde(default)]
    primary_window: Option<RateWindow>,
    #[serde(default)]
    secondary_window: Option<RateWindow>,
}

#[derive(Debug, Default, Deserialize)]
struct RateWindow {
    #[serde(default)]
    used_percent: Option<f64>,
    /// Unix seconds
    #[serde(default)]
    reset_at: Option<f64>,
}

impl From<Option<RateWindow>> for UsageWindow {
    fn from(window: Option<RateWindow>) -> Self {
        let window = window.unwrap_or_default();
        UsageWindow {
            percent: window.used_percent,
            resets_at: window
                .reset_at
                .and_then(|ts| Utc.timestamp_opt(ts as i64, 0).single()),
        }
    }
}

/// Codex usage source
#[derive(Debug, Clone)]
pub struct CodexSource {
    pub auth_path: PathBuf,
    pub usage_url: String,
    pub refresh_url: String,
    pub client_id: String,
    pub refresh_interval: chrono::Duration,
}

impl CodexSource {
    /// Source reading `auth_path` and talking to the public endpoints
    pub fn new(auth_path: PathBuf) -> Self {
        Self {
            auth_path,
            usage_url: DEFAULT_USAGE_URL.to_string(),
            refresh_url: DEFAULT_REFRESH_URL.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            refresh_interval: chrono::Duration::days(DEFAULT_REFRESH_INTERVAL_DAYS),
        }
    }

    /// Exchange the refresh token for a new token set
    pub fn refresh(&self, agent: &Agent, refresh_token: &str) -> Result<RefreshResponse, UsageError> {
        let request = RefreshRequest {
            client_id: &self.client_id,
            grant_type: "refresh_token",
            refresh_token,
            scope: "openid profile email",
        };
        let response = agent.post(&self.refresh_url).send_json(&request)?;
        read_json(response)
    }

    /// Refresh stale tokens in place, falling back to the cached token on failure.
    ///
    /// Returns the access token to use.
    fn ensure_fresh(&self, agent: &Agent, auth: &mut CodexAuth, now: DateTime<Utc>) -> Option<String> {
        let tokens = auth.tokens.as_ref()?;
        let access = tokens.access_token.clone()?;
        let refresh_token = match tokens.refresh_token.clone() {
            Some(rt) if auth.needs_refresh(now, self.refresh_interval) => rt,
            _ => return Some(access),
        };

        debug!("Codex tokens are stale, refreshing");
        match self.refresh(agent, &refresh_token) {
            Ok(refreshed) => {
                auth.apply_refresh(refreshed, now);
                if let Err(e) = auth.save(&self.auth_path) {
                    warn!("Failed to persist refreshed Codex tokens: {}", e);
                } else {
                    info!("Refreshed Codex tokens in {}", self.auth_path.display());
                }
                auth.tokens
                    .as_ref()
                    .and_then(|t| t.access_token.clone())
                    .or(Some(access))
            }
            Err(e) => {
                warn!("Codex token refresh failed, using cached token: {}", e);
                Some(access)
            }
        }
    }

    fn fetch_usage(
        &self,
        agent: &Agent,
        access_token: &str,
        account_id: Option<&str>,
    ) -> Result<UsageReport, UsageError> {
        let mut request = agent
            .get(&self.usage_url)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("User-Agent", "codex-cli")
            .header("Accept", "application/json");
        if let Some(account) = account_id {
            request = request.header("ChatGPT-Account-Id", account);
        }

        let usage: UsageResponse = read_json(request.call()?)?;
        let rate_limit = usage.rate_limit.unwrap_or_default();
        Ok(UsageReport {
            provider: Provider::Codex,
            session: rate_limit.primary_window.into(),
            weekly: rate_limit.secondary_window.into(),
        })
    }
}

impl UsageSource for CodexSource {
    fn provider(&self) -> Provider {
        Provider::Codex
    }

    fn fetch(&self, agent: &Agent, now: DateTime<Utc>) -> Result<UsageReport, UsageError> {
        let mut auth = CodexAuth::load(&self.auth_path)?;
        let access = self
            .ensure_fresh(agent, &mut auth, now)
            .ok_or_else(|| UsageError::Credentials("Codex auth.json missing access token".into()))?;
        let account_id = auth.tokens.as_ref().and_then(|t| t.account_id.clone());

        self.fetch_usage(agent, &access, account_id.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::super::http::test_agent;
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    const USAGE_BODY: &str = r#"{
        "plan_type": "plus",
        "rate_limit": {
            "primary_window": {"used_percent": 42, "reset_at": 1792300000},
            "secondary_window": {"used_percent": 13.5, "reset_at": 1792800000}
        }
    }"#;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
    }

    fn write_auth(dir: &Path, last_refresh: &str) -> PathBuf {
        let path = dir.join("auth.json");
        let json = format!(
            r#"{{
                "OPENAI_API_KEY": null,
                "tokens": {{
                    "access_token": "old-access",
                    "refresh_token": "old-refresh",
                    "account_id": "acct-1",
                    "id_token": "old-id"
                }},
                "last_refresh": "{}"
            }}"#,
            last_refresh
        );
        std::fs::write(&path, json).unwrap();
        path
    }

    fn source(auth_path: PathBuf, usage_url: &str, refresh_url: &str) -> CodexSource {
        CodexSource {
            usage_url: usage_url.to_string(),
            refresh_url: refresh_url.to_string(),
            ..CodexSource::new(auth_path)
        }
    }

    #[test]
    fn test_default_auth_path_codex_home() {
        temp_env::with_var("CODEX_HOME", Some("/opt/codex"), || {
            assert_eq!(
                default_auth_path(),
                Some(PathBuf::from("/opt/codex/auth.json"))
            );
        });
    }

    #[test]
    fn test_default_auth_path_home() {
        temp_env::with_vars(
            [("CODEX_HOME", None), ("HOME", Some("/home/tester"))],
            || {
                assert_eq!(
                    default_auth_path(),
                    Some(PathBuf::from("/home/tester/.codex/auth.json"))
                );
            },
        );
    }

    #[test]
    fn test_usage_url_from_env() {
        temp_env::with_var("CODEX_USAGE_URL", Some("http://localhost/u"), || {
            assert_eq!(usage_url_from_env().as_deref(), Some("http://localhost/u"));
        });
        temp_env::with_var("CODEX_USAGE_URL", Some(""), || {
            assert_eq!(usage_url_from_env(), None);
        });
    }

    #[test]
    fn test_needs_refresh() {
        let max_age = chrono::Duration::days(8);
        let mut auth = CodexAuth::default();
        assert!(auth.needs_refresh(now(), max_age));

        auth.last_refresh = Some("2026-10-15T08:00:00Z".to_string());
        assert!(!auth.needs_refresh(now(), max_age));

        auth.last_refresh = Some("2026-10-01T08:00:00.123456+00:00".to_string());
        assert!(auth.needs_refresh(now(), max_age));

        auth.last_refresh = Some("yesterday".to_string());
        assert!(auth.needs_refresh(now(), max_age));
    }

    #[test]
    fn test_apply_refresh_keeps_missing_fields() {
        let mut auth = CodexAuth {
            tokens: Some(CodexTokens {
                access_token: Some("a".into()),
                refresh_token: Some("r".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        auth.apply_refresh(
            RefreshResponse {
                access_token: Some("a2".into()),
                refresh_token: None,
                id_token: Some("i2".into()),
            },
            now(),
        );
        let tokens = auth.tokens.unwrap();
        assert_eq!(tokens.access_token.as_deref(), Some("a2"));
        assert_eq!(tokens.refresh_token.as_deref(), Some("r"));
        assert_eq!(tokens.id_token.as_deref(), Some("i2"));
        assert_eq!(auth.last_refresh.as_deref(), Some("2026-10-18T12:00:00Z"));
    }

    #[test]
    fn test_save_preserves_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_auth(dir.path(), "2026-10-17T00:00:00Z");

        let mut auth = CodexAuth::load(&path).unwrap();
        auth.last_refresh = Some("2026-10-18T12:00:00Z".into());
        auth.save(&path).unwrap();

        let value: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(value.as_object().unwrap().contains_key("OPENAI_API_KEY"));
        assert_eq!(value["tokens"]["account_id"], "acct-1");
        assert_eq!(value["last_refresh"], "2026-10-18T12:00:00Z");
        assert!(!dir.path().join("auth.json.tmp").exists());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = CodexAuth::load(&dir.path().join("auth.json")).unwrap_err();
        assert!(matches!(err, UsageError::CredentialsNotFound { .. }));
    }

    fn mock_usage<'a>(
        server: &'a MockServer,
        token: &str,
        status: u16,
        body: &str,
    ) -> httpmock::Mock<'a> {
        server.mock(|when, then| {
            when.method(GET)
                .path("/usage")
                .header("authorization", format!("Bearer {}", token))
                .header("chatgpt-account-id", "acct-1")
                .header("user-agent", "codex-cli");
            then.status(status)
                .header("content-type", "application/json")
                .body(body);
        })
    }

    #[test]
    fn test_fetch_fresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let auth_path = write_auth(dir.path(), "2026-10-17T00:00:00Z");
        let server = MockServer::start();
        let usage = mock_usage(&server, "old-access", 200, USAGE_BODY);
        let refresh = server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(500);
        });

        let src = source(auth_path, &server.url("/usage"), &server.url("/token"));
        let report = src.fetch(&test_agent(), now()).unwrap();

        assert_eq!(report.provider, Provider::Codex);
        assert_eq!(report.session.percent, Some(42.0));
        assert_eq!(report.weekly.percent, Some(13.5));
        assert_eq!(
            report.session.resets_at,
            Utc.timestamp_opt(1792300000, 0).single()
        );
        usage.assert();
        refresh.assert_hits(0);
    }

    #[test]
    fn test_fetch_refreshes_stale_token() {
        let dir = tempfile::tempdir().unwrap();
        let auth_path = write_auth(dir.path(), "2026-09-01T00:00:00Z");
        let server = MockServer::start();
        let refresh = server.mock(|when, then| {
            when.method(POST).path("/token").json_body(json!({
                "client_id": DEFAULT_CLIENT_ID,
                "grant_type": "refresh_token",
                "refresh_token": "old-refresh",
                "scope": "openid profile email"
            }));
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"access_token": "new-access", "refresh_token": "new-refresh"}"#);
        });
        let usage = mock_usage(&server, "new-access", 200, USAGE_BODY);

        let src = source(auth_path.clone(), &server.url("/usage"), &server.url("/token"));
        src.fetch(&test_agent(), now()).unwrap();

        refresh.assert();
        usage.assert();

        let saved = CodexAuth::load(&auth_path).unwrap();
        let tokens = saved.tokens.unwrap();
        assert_eq!(tokens.access_token.as_deref(), Some("new-access"));
        assert_eq!(tokens.refresh_token.as_deref(), Some("new-refresh"));
        assert_eq!(tokens.id_token.as_deref(), Some("old-id"));
        assert_eq!(saved.last_refresh.as_deref(), Some("2026-10-18T12:00:00Z"));
    }

    #[test]
    fn test_refresh_failure_falls_back_to_cached_token() {
        let dir = tempfile::tempdir().unwrap();
        let auth_path = write_auth(dir.path(), "2026-09-01T00:00:00Z");
        let before = std::fs::read_to_string(&auth_path).unwrap();
        let server = MockServer::start();
        let refresh = server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(400).body(r#"{"error": "invalid_grant"}"#);
        });
        let usage = mock_usage(&server, "old-access", 200, USAGE_BODY);

        let src = source(auth_path.clone(), &server.url("/usage"), &server.url("/token"));
        let report = src.fetch(&test_agent(), now()).unwrap();
        assert_eq!(report.session.percent, Some(42.0));

        refresh.assert();
        usage.assert();
        assert_eq!(std::fs::read_to_string(&auth_path).unwrap(), before);
    }

    #[test]
    fn test_fetch_http_error() {
        let dir = tempfile::tempdir().unwrap();
        let auth_path = write_auth(dir.path(), "2026-10-17T00:00:00Z");
        let server = MockServer::start();
        let usage = mock_usage(&server, "old-access", 401, r#"{"detail": "unauthorized"}"#);

        let src = source(auth_path, &server.url("/usage"), &server.url("/token"));
        let err = src.fetch(&test_agent(), now()).unwrap_err();
        assert!(matches!(err, UsageError::Status(401)));
        usage.assert();
    }

    #[test]
    fn test_fetch_missing_access_token() {
        let dir = tempfile::tempdir().unwrap();
        let auth_path = dir.path().join("auth.json");
        std::fs::write(&auth_path, r#"{"tokens": null}"#).unwrap();

        let src = source(auth_path, "http://127.0.0.1:9/", "http://127.0.0.1:9/");
        let err = src.fetch(&test_agent(), now()).unwrap_err();
        assert_eq!(err.to_string(), "Codex auth.json missing access token");
    }

    #[test]
    fn test_usage_without_rate_limit() {
        let dir = tempfile::tempdir().unwrap();
        let auth_path = write_auth(dir.path(), "2026-10-17T00:00:00Z");
        let server = MockServer::start();
        let usage = mock_usage(&server, "old-access", 200, "{}");

        let src = source(auth_path, &server.url("/usage"), &server.url("/token"));
        let report = src.fetch(&test_agent(), now()).unwrap();
        assert_eq!(report.session, UsageWindow::default());
        assert_eq!(report.top_percent(), None);
        usage.assert();
    }
}
