//! Blocking HTTP plumbing shared by the usage providers.

use std::time::Duration;

use ureq::Agent;

use super::types::UsageError;

/// Default hard timeout for every outbound request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Build an agent whose requests fail after `timeout`
pub fn agent(timeout: Duration) -> Agent {
    let config = Agent::config_builder()
        .timeout_global(Some(timeout))
        .build();
    Agent::new_with_config(config)
}

/// Read a response body and decode it as JSON
pub(crate) fn read_json<T: serde::de::DeserializeOwned>(
    mut response: ureq::http::Response<ureq::Body>,
) -> Result<T, UsageError> {
    let body = response.body_mut().read_to_string()?;
    Ok(serde_json::from_str(&body)?)
}

/// Agent without proxy lookup, for talking to a local mock server
#[cfg(test)]
pub(crate) fn test_agent() -> Agent {
    let config = Agent::config_builder()
        .proxy(None)
        .timeout_global(Some(Duration::from_secs(5)))
        .build();
    Agent::new_with_config(config)
}
