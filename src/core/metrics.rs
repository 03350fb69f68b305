use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    if PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

/// Counts one finished call to an upstream model provider.
pub(crate) fn record_upstream(provider: &'static str, outcome: &'static str, seconds: f64) {
    metrics::counter!(
        "upstream_requests_total",
        "provider" => provider,
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!("upstream_request_duration_seconds", "provider" => provider)
        .record(seconds);
}

pub(crate) fn record_retry(provider: &'static str) {
    metrics::counter!("upstream_retries_total", "provider" => provider).increment(1);
}
