//! `codexbar status`: one poll cycle, one payload.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;
use ureq::Agent;

use codexbar_core::status::{render_combined, render_single, StatusPayload};
use codexbar_core::usage::{
    self, claude, codex, ClaudeSource, CodexSource, Provider, UsageError, UsageSource,
};

use crate::config::{ProviderChoice, Settings};

/// Build the Codex source, applying env and config overrides
pub fn codex_source(settings: &Settings) -> Result<CodexSource, UsageError> {
    let cfg = &settings.codex;
    let auth_path = cfg
        .auth_path
        .clone()
        .or_else(codex::default_auth_path)
        .ok_or_else(|| no_home(Provider::Codex))?;

    let mut source = CodexSource::new(auth_path);
    if let Some(url) = codex::usage_url_from_env().or_else(|| cfg.usage_url.clone()) {
        source.usage_url = url;
    }
    if let Some(url) = &cfg.refresh_url {
        source.refresh_url = url.clone();
    }
    if let Some(id) = &cfg.client_id {
        source.client_id = id.clone();
    }
    source.refresh_interval = chrono::Duration::try_days(settings.refresh_interval_days)
        .unwrap_or(chrono::Duration::MAX);
    Ok(source)
}

/// Build the Claude source, applying config overrides
pub fn claude_source(settings: &Settings) -> Result<ClaudeSource, UsageError> {
    let cfg = &settings.claude;
    let path = cfg
        .credentials_path
        .clone()
        .or_else(claude::default_credentials_path)
        .ok_or_else(|| no_home(Provider::Claude))?;

    let mut source = ClaudeSource::new(path);
    if let Some(url) = &cfg.usage_url {
        source.usage_url = url.clone();
    }
    Ok(source)
}

fn no_home(provider: Provider) -> UsageError {
    UsageError::Credentials(format!(
        "cannot locate {} credentials: home directory unknown",
        provider
    ))
}

/// Run one poll cycle and render the payload for the configured provider(s)
pub fn poll(settings: &Settings) -> StatusPayload {
    let agent = usage::http::agent(Duration::from_secs(settings.timeout_secs));
    poll_with(settings, &agent, Utc::now())
}

pub(crate) fn poll_with(settings: &Settings, agent: &Agent, now: DateTime<Utc>) -> StatusPayload {
    let thresholds = settings.thresholds();
    debug!("Polling usage for {:?}", settings.provider);

    match settings.provider {
        ProviderChoice::Codex => {
            let result = codex_source(settings).and_then(|s| s.fetch(agent, now));
            render_single(Provider::Codex, &result, &thresholds, now)
        }
        ProviderChoice::Claude => {
            let result = claude_source(settings).and_then(|s| s.fetch(agent, now));
            render_single(Provider::Claude, &result, &thresholds, now)
        }
        ProviderChoice::All => {
            let mut sources: Vec<Box<dyn UsageSource>> = Vec::new();
            let mut unresolved = Vec::new();

            if settings.codex.enabled {
                match codex_source(settings) {
                    Ok(s) => sources.push(Box::new(s)),
                    Err(e) => unresolved.push((Provider::Codex, Err(e))),
                }
            }
            if settings.claude.enabled {
                match claude_source(settings) {
                    Ok(s) => sources.push(Box::new(s)),
                    Err(e) => unresolved.push((Provider::Claude, Err(e))),
                }
            }

            let mut results = usage::collect(&sources, agent, now);
            results.extend(unresolved);
            results.sort_by_key(|(provider, _)| *provider != Provider::Codex);
            render_combined(&results, &thresholds, now)
        }
    }
}
