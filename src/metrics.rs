//! Prometheus metrics for the object transport.
//!
//! Recording goes through the `metrics` facade and is a no-op until a
//! recorder is installed with [`init_metrics`].

use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use http::{Method, StatusCode};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::errors::StoreError;

// -- Metric name constants ----------------------------------------------------

/// Total round-trips (counter). Labels: method, status.
pub const REQUESTS_TOTAL: &str = "gsprotocol_requests_total";

/// Round-trip duration in seconds, up to the response head (histogram).
/// Labels: method.
pub const REQUEST_DURATION_SECONDS: &str = "gsprotocol_request_duration_seconds";

/// Storage errors seen by the transport (counter). Labels: kind.
pub const STORE_ERRORS_TOTAL: &str = "gsprotocol_store_errors_total";

/// Status label used when a round-trip ends in a hard error.
pub const STATUS_ERROR: &str = "error";

// -- Global recorder installation ---------------------------------------------

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder.  Later calls return the handle
/// installed by the first one.
pub fn init_metrics() -> anyhow::Result<&'static PrometheusHandle> {
    static INSTALL: Mutex<()> = Mutex::new(());

    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }
    let _guard = INSTALL.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle))
}

/// Register metric descriptions with the global recorder.  Call once after
/// [`init_metrics`].
pub fn describe_metrics() {
    describe_counter!(REQUESTS_TOTAL, "Total object round-trips");
    describe_histogram!(
        REQUEST_DURATION_SECONDS,
        "Object round-trip duration in seconds"
    );
    describe_counter!(STORE_ERRORS_TOTAL, "Storage errors by kind");
}

// -- Recording ----------------------------------------------------------------

/// Record one finished round-trip.  `status` is `None` for hard errors.
pub fn record_request(method: &Method, status: Option<StatusCode>, elapsed: Duration) {
    let status = status
        .map(|s| s.as_u16().to_string())
        .unwrap_or_else(|| STATUS_ERROR.to_string());
    counter!(REQUESTS_TOTAL, "method" => method.to_string(), "status" => status).increment(1);
    histogram!(REQUEST_DURATION_SECONDS, "method" => method.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_store_error(err: &StoreError) {
    counter!(STORE_ERRORS_TOTAL, "kind" => err.kind()).increment(1);
}
