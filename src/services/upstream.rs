use std::time::Duration;

use anyhow::Context;
use reqwest::{Client, RequestBuilder, StatusCode};
use thiserror::Error;

/// Failure of a single call to an upstream model provider.
#[derive(Debug, Error)]
pub(crate) enum UpstreamError {
    #[error("{provider} API unreachable: {source}")]
    Unreachable {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider} API returned status {status}: {body}")]
    Rejected { provider: &'static str, status: StatusCode, body: String },
    #[error("Invalid response structure from {provider} API: {reason}")]
    Malformed { provider: &'static str, reason: String },
}

impl UpstreamError {
    pub(crate) fn outcome_label(&self) -> &'static str {
        match self {
            Self::Unreachable { .. } => "unreachable",
            Self::Rejected { .. } => "rejected",
            Self::Malformed { .. } => "malformed",
        }
    }
}

/// Exponential backoff that only applies to `503 Service Unavailable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    pub(crate) max_retries: u32,
    pub(crate) base_delay: Duration,
}

impl RetryPolicy {
    pub(crate) fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self { max_retries, base_delay }
    }

    /// Delay before retry number `attempt + 1`, or `None` once retries are used up.
    pub(crate) fn delay_after(&self, attempt: u32, status: StatusCode) -> Option<Duration> {
        if status != StatusCode::SERVICE_UNAVAILABLE || attempt >= self.max_retries {
            return None;
        }

        let factor = 2_u32.checked_pow(attempt).unwrap_or(u32::MAX);
        Some(self.base_delay.saturating_mul(factor))
    }
}

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ProviderHealth {
    Healthy,
    Unhealthy(String),
}

impl ProviderHealth {
    pub(crate) fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub(crate) fn label(&self) -> String {
        match self {
            Self::Healthy => "healthy".to_string(),
            Self::Unhealthy(reason) => format!("unhealthy: {reason}"),
        }
    }
}

/// Sends a metadata request for the configured model; any 2xx counts as healthy.
pub(crate) async fn check_provider(request: RequestBuilder) -> ProviderHealth {
    match request.timeout(HEALTH_CHECK_TIMEOUT).send().await {
        Ok(response) if response.status().is_success() => ProviderHealth::Healthy,
        Ok(response) => ProviderHealth::Unhealthy(format!("status {}", response.status())),
        Err(err) => ProviderHealth::Unhealthy(format!("unreachable: {err}")),
    }
}

pub(crate) fn build_client(timeout_seconds: u64, provider: &str) -> anyhow::Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(20))
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .with_context(|| format!("Failed to build {provider} HTTP client"))
}
