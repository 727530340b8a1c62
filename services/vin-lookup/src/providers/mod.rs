//! Outbound clients for the external lookup providers.
//!
//! Both clients share the same transport plumbing: a `reqwest` client with a
//! bounded per-request timeout, and an exponential-backoff retry loop for
//! transient failures. Whether a provider failure is fatal to a lookup is
//! decided by the orchestrator, not here.

pub mod decode;
pub mod photo;

pub use decode::{DecodeError, DecodeProvider, VpicClient};
pub use photo::{CarImageryClient, PhotoError, PhotoProvider};

use crate::config::ProviderConfig;
use backoff::{backoff::Backoff, ExponentialBackoff};
use reqwest::{Client, Response, StatusCode};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Which external dependency a failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Decode,
    Photo,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Decode => "decode",
            Provider::Photo => "photo",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport-level failure talking to a provider
#[derive(Debug, Error)]
pub enum ProviderFailure {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("malformed response: {0}")]
    Payload(String),
}

impl ProviderFailure {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderFailure::Transport(_) => true,
            ProviderFailure::Status(status) => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            ProviderFailure::Payload(_) => false,
        }
    }
}

/// Errors raised while building a provider client
#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("invalid base URL {url:?}: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Retry settings for transient provider failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_base_delay(),
            max_delay: config.retry_max_delay(),
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.base_delay,
            max_interval: self.max_delay,
            max_elapsed_time: None, // bounded by max_retries instead
            ..Default::default()
        }
    }
}

/// HTTP plumbing shared by the provider clients
#[derive(Debug, Clone)]
pub(crate) struct HttpTransport {
    client: Client,
    base_url: Url,
    retry: RetryPolicy,
    provider: Provider,
}

impl HttpTransport {
    pub(crate) fn new(provider: Provider, config: &ProviderConfig) -> Result<Self, ClientBuildError> {
        let base_url = parse_base_url(&config.base_url)?;
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("vin-lookup-service/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url,
            retry: RetryPolicy::from_config(config),
            provider,
        })
    }

    /// Resolve `path` against the provider root
    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, ProviderFailure> {
        self.base_url
            .join(path)
            .map_err(|e| ProviderFailure::Payload(format!("cannot build request URL: {e}")))
    }

    /// GET `url`, retrying transient failures with exponential backoff.
    /// Only a success status is returned as `Ok`.
    pub(crate) async fn get(&self, url: Url) -> Result<Response, ProviderFailure> {
        let mut backoff = self.retry.backoff();
        let mut attempt = 0u32;

        loop {
            let failure = match self.client.get(url.clone()).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(
                        provider = %self.provider,
                        status = response.status().as_u16(),
                        attempt = attempt,
                        "Provider responded"
                    );
                    return Ok(response);
                }
                Ok(response) => ProviderFailure::Status(response.status()),
                Err(e) => ProviderFailure::Transport(e),
            };

            if !failure.is_transient() || attempt >= self.retry.max_retries {
                return Err(failure);
            }

            attempt += 1;
            let delay = backoff.next_backoff().unwrap_or(self.retry.max_delay);

            warn!(
                provider = %self.provider,
                error = %failure,
                attempt = attempt,
                max_retries = self.retry.max_retries,
                delay_ms = delay.as_millis() as u64,
                "Transient provider failure, retrying"
            );

            tokio::time::sleep(delay).await;
        }
    }
}

/// Parse a provider root, making sure relative joins append to its path
fn parse_base_url(raw: &str) -> Result<Url, ClientBuildError> {
    let mut normalized = raw.trim().to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }

    Url::parse(&normalized).map_err(|source| ClientBuildError::InvalidBaseUrl {
        url: raw.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ProviderFailure::Status(StatusCode::BAD_GATEWAY).is_transient());
        assert!(ProviderFailure::Status(StatusCode::TOO_MANY_REQUESTS).is_transient());
        assert!(!ProviderFailure::Status(StatusCode::NOT_FOUND).is_transient());
        assert!(!ProviderFailure::Payload("bad json".to_string()).is_transient());
    }

    #[test]
    fn test_base_url_join_keeps_prefix() {
        let base = parse_base_url("http://localhost:8080/proxy").unwrap();
        let joined = base.join("api/vehicles/DecodeVinValues/X").unwrap();
        assert_eq!(
            joined.as_str(),
            "http://localhost:8080/proxy/api/vehicles/DecodeVinValues/X"
        );

        assert!(matches!(
            parse_base_url("not a url"),
            Err(ClientBuildError::InvalidBaseUrl { .. })
        ));
    }
}
