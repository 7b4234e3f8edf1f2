//! Prometheus recorder installation.

use std::net::SocketAddr;

use {
    anyhow::Result,
    metrics_exporter_prometheus::{Matcher, PrometheusBuilder},
    tracing::info,
};

use crate::{buckets, purge};

fn builder() -> Result<PrometheusBuilder> {
    let builder = PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full(purge::DELETE_DURATION_SECONDS.to_string()),
        buckets::DELETE_DURATION,
    )?;
    Ok(builder)
}

/// Install the global recorder and serve `/metrics` on `listen`.
///
/// Call once, from within the Tokio runtime that should host the endpoint.
///
/// # Errors
///
/// Returns an error if a recorder is already installed or the listener
/// cannot be bound.
pub fn init_metrics(listen: SocketAddr) -> Result<()> {
    builder()?.with_http_listener(listen).install()?;
    info!(%listen, "prometheus metrics endpoint listening");
    Ok(())
}
