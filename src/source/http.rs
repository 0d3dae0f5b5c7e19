//! HTTP fetch source.
//!
//! The payload is expected at the resolved location; a detached signature
//! conventionally sits next to it (`<location>.ed25519`) for callers that wrap
//! this source with a verifying decorator.

use super::template::resolve_template;
use super::{Payload, Source};
use crate::error::{Result, UpdateError};
use std::time::Duration;

/// Default connect timeout for payload downloads.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default read timeout for payload downloads.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(300);

const USER_AGENT: &str = concat!("selfupdate/", env!("CARGO_PKG_VERSION"));

/// Source downloading the payload with a blocking HTTP GET.
pub struct HttpSource {
    agent: ureq::Agent,
    url: String,
    user_agent: String,
}

impl HttpSource {
    /// Create a source for `location`, expanding its platform placeholders
    /// (see [`template`](super::template)).
    pub fn new(location: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(DEFAULT_CONNECT_TIMEOUT)
            .timeout_read(DEFAULT_READ_TIMEOUT)
            .build();
        Self::with_agent(agent, location)
    }

    /// Create a source using a preconfigured agent.
    pub fn with_agent(agent: ureq::Agent, location: &str) -> Self {
        Self {
            agent,
            url: resolve_template(location),
            user_agent: USER_AGENT.to_owned(),
        }
    }

    /// Override the `User-Agent` header.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// The resolved URL this source fetches.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Debug for HttpSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSource")
            .field("url", &self.url)
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

impl Source for HttpSource {
    fn get(&self) -> Result<Payload> {
        tracing::info!(url = %self.url, "fetching update payload");

        let resp = self
            .agent
            .get(&self.url)
            .set("User-Agent", &self.user_agent)
            .call()
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => {
                    UpdateError::Fetch(format!("failed to get content: HTTP {code}"))
                }
                ureq::Error::Transport(t) => {
                    UpdateError::Fetch(format!("failed to get content from {}: {t}", self.url))
                }
            })?;

        if resp.status() != 200 {
            return Err(UpdateError::Fetch(format!(
                "failed to get content: HTTP {}",
                resp.status()
            )));
        }

        let length = resp
            .header("Content-Length")
            .and_then(|v| v.trim().parse::<u64>().ok());
        tracing::debug!(?length, "payload response received");

        Ok(Payload::new(resp.into_reader(), length))
    }
}
