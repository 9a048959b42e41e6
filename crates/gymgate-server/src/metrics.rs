//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Must be called once at server startup before any metrics are recorded.
pub fn install_recorder() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Devices currently registered (gauge).
pub const DEVICES_REGISTERED: &str = "devices_registered";
/// Registrations accepted total (counter, labels: shape).
pub const REGISTRATIONS_TOTAL: &str = "registrations_total";
/// Registrations rejected total (counter).
pub const REGISTRATIONS_REJECTED_TOTAL: &str = "registrations_rejected_total";
/// Unlock dispatches attempted total (counter).
pub const UNLOCK_DISPATCH_TOTAL: &str = "unlock_dispatch_total";
/// Unlock dispatch failures total (counter, labels: reason).
pub const UNLOCK_FAILURES_TOTAL: &str = "unlock_failures_total";
/// Device connection duration seconds (histogram).
pub const CONNECTION_DURATION_SECONDS: &str = "connection_duration_seconds";
