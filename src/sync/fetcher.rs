//! Configuration agent client.
//!
//! # Responsibilities
//! - Build the agent endpoint URL for one application/environment/profile
//! - Perform exactly one GET per call, bounded by a timeout
//! - Classify the response into a [`FetchResult`]
//!
//! # Design Decisions
//! - No retries here; the synchronizer's schedule is the retry policy
//! - The timeout covers the whole exchange, body included
//! - 304 is a distinct "unchanged" outcome, not an error

use reqwest::StatusCode;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time;
use url::Url;

/// Maximum number of characters of an error body kept in [`FetchError::Upstream`].
pub const BODY_EXCERPT_CHARS: usize = 256;

/// Which configuration document to request from the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEndpoint {
    pub application: String,
    pub environment: String,
    pub profile: String,
}

/// Outcome of a single poll.
#[derive(Debug)]
pub enum FetchResult {
    Updated(Map<String, Value>),
    Unchanged,
    Failed(FetchError),
}

impl FetchResult {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            FetchResult::Updated(_) => "updated",
            FetchResult::Unchanged => "unchanged",
            FetchResult::Failed(e) => e.kind(),
        }
    }
}

/// Errors that can occur while fetching configuration.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection refused, DNS failure or other I/O error.
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The agent did not answer within the deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The agent answered with a status other than 200 or 304.
    #[error("agent returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    /// 200 response whose body is not a JSON object.
    #[error("malformed configuration document: {0}")]
    Malformed(String),
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Transport(_) => "transport",
            FetchError::Timeout(_) => "timeout",
            FetchError::Upstream { .. } => "upstream",
            FetchError::Malformed(_) => "malformed",
        }
    }
}

/// Errors raised while constructing an [`AgentFetcher`].
#[derive(Debug, Error)]
pub enum FetcherInitError {
    #[error("invalid agent URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Anything that can produce one configuration poll result.
pub trait ConfigSource: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = FetchResult> + Send;
}

impl<T: ConfigSource> ConfigSource for Arc<T> {
    fn fetch(&self) -> impl Future<Output = FetchResult> + Send {
        (**self).fetch()
    }
}

/// Build `{base}/applications/{app}/environments/{env}/configurations/{profile}`.
pub fn endpoint_url(base: &str, endpoint: &RemoteEndpoint) -> Result<Url, FetcherInitError> {
    let invalid = |reason: String| FetcherInitError::InvalidUrl {
        url: base.to_string(),
        reason,
    };

    let mut url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| invalid("cannot be a base URL".to_string()))?
        .pop_if_empty()
        .extend([
            "applications",
            endpoint.application.as_str(),
            "environments",
            endpoint.environment.as_str(),
            "configurations",
            endpoint.profile.as_str(),
        ]);
    Ok(url)
}

/// Truncate a response body to [`BODY_EXCERPT_CHARS`] characters.
pub fn body_excerpt(body: &str) -> String {
    match body.char_indices().nth(BODY_EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

/// Read only as much of an error body as the excerpt can show.
///
/// Stops at the excerpt size or the first read error, so a large or stalled
/// body cannot hold the poll open past what the log line needs.
async fn read_excerpt(mut response: reqwest::Response) -> String {
    let limit = BODY_EXCERPT_CHARS * 4;
    let mut buf = Vec::new();
    while buf.len() < limit {
        match response.chunk().await {
            Ok(Some(chunk)) => buf.extend_from_slice(&chunk),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "Error body read cut short");
                break;
            }
        }
    }
    body_excerpt(&String::from_utf8_lossy(&buf))
}

/// HTTP client for the configuration agent sidecar.
#[derive(Clone)]
pub struct AgentFetcher {
    client: reqwest::Client,
    url: Url,
    timeout: Duration,
}

impl AgentFetcher {
    pub fn new(
        base_url: &str,
        endpoint: &RemoteEndpoint,
        timeout: Duration,
    ) -> Result<Self, FetcherInitError> {
        let url = endpoint_url(base_url, endpoint)?;
        // The agent is a local sidecar, never reached through a proxy.
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()?;

        Ok(Self {
            client,
            url,
            timeout,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Perform one poll. Never takes longer than the configured timeout.
    pub async fn fetch_once(&self) -> FetchResult {
        tracing::debug!(url = %self.url, "Fetching configuration from agent");

        match time::timeout(self.timeout, self.exchange()).await {
            Ok(result) => result,
            Err(_) => FetchResult::Failed(FetchError::Timeout(self.timeout)),
        }
    }

    async fn exchange(&self) -> FetchResult {
        let response = match self.client.get(self.url.clone()).send().await {
            Ok(response) => response,
            Err(e) => return FetchResult::Failed(self.classify(e)),
        };

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            return FetchResult::Unchanged;
        }

        if status != StatusCode::OK {
            return FetchResult::Failed(FetchError::Upstream {
                status: status.as_u16(),
                body: read_excerpt(response).await,
            });
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return FetchResult::Failed(self.classify(e)),
        };

        match serde_json::from_str::<Value>(&body) {
            Ok(Value::Object(document)) => FetchResult::Updated(document),
            Ok(other) => FetchResult::Failed(FetchError::Malformed(format!(
                "expected a JSON object, got {}",
                json_type(&other)
            ))),
            Err(e) => FetchResult::Failed(FetchError::Malformed(e.to_string())),
        }
    }

    fn classify(&self, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Transport(error)
        }
    }
}

impl ConfigSource for AgentFetcher {
    fn fetch(&self) -> impl Future<Output = FetchResult> + Send {
        self.fetch_once()
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
