//! Prometheus exporter setup.
//!
//! Metrics are recorded unconditionally through the `metrics` facade. Without
//! an installed recorder they are dropped, so a run without `metrics.address`
//! pays nothing for them.

use metrics_exporter_prometheus::PrometheusBuilder;
#[cfg(any(test, feature = "test-util"))]
use metrics_exporter_prometheus::PrometheusHandle;
use snafu::prelude::*;
use std::net::SocketAddr;
use tracing::info;

use crate::error::{AddressParseSnafu, MetricsError, PrometheusInitSnafu};

/// Histogram buckets for duration metrics (in seconds).
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0,
];

#[cfg(any(test, feature = "test-util"))]
static TEST_HANDLE: std::sync::OnceLock<PrometheusHandle> = std::sync::OnceLock::new();

/// Install the Prometheus recorder and serve `/metrics` on `address`.
///
/// Must be called from within a Tokio runtime; the HTTP listener runs as a
/// background task for the lifetime of the process.
pub fn init(address: &str) -> Result<(), MetricsError> {
    let addr: SocketAddr = address.parse().context(AddressParseSnafu { address })?;

    PrometheusBuilder::new()
        .set_buckets(DURATION_BUCKETS)
        .context(PrometheusInitSnafu)?
        .with_http_listener(addr)
        .install()
        .context(PrometheusInitSnafu)?;

    info!(%addr, "Metrics exporter listening");
    Ok(())
}

/// Install a recorder without an HTTP listener and return its handle.
///
/// Safe to call from many tests; the first caller installs the recorder.
/// Only built for tests and behind the `test-util` feature.
#[cfg(any(test, feature = "test-util"))]
pub fn init_test() -> &'static PrometheusHandle {
    TEST_HANDLE.get_or_init(|| {
        PrometheusBuilder::new()
            .set_buckets(DURATION_BUCKETS)
            .expect("valid bucket configuration")
            .install_recorder()
            .expect("no other recorder installed in tests")
    })
}
