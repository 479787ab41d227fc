//! # Metrics Collection
//!
//! Prometheus counters for sync outcomes and annotation writes.

use std::net::SocketAddr;

use ::tracing::{info, warn};
use metrics::{counter, describe_counter, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};
use crate::stores::StoreKind;

pub const SYNC_TOTAL: &str = "certsync_sync_total";
pub const ANNOTATION_WRITES_TOTAL: &str = "certsync_annotation_writes_total";

/// Metrics recorder for sync activity.
///
/// Recording is a no-op until a global recorder is installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn new() -> Self {
        Self
    }

    /// Record the outcome of one sync invocation.
    ///
    /// `result` is `success` or the error kind, e.g. `remote_transient`.
    pub fn record_sync(&self, store: StoreKind, result: &str) {
        let labels = [("store", store.as_str().to_string()), ("result", result.to_string())];
        counter!(SYNC_TOTAL, &labels).increment(1);
    }

    /// Record a persisted cert-id annotation change
    pub fn record_annotation_write(&self, store: StoreKind) {
        let labels = [("store", store.as_str().to_string())];
        counter!(ANNOTATION_WRITES_TOTAL, &labels).increment(1);
    }

    fn register_sync_metrics(&self) {
        describe_counter!(SYNC_TOTAL, Unit::Count, "Sync invocations grouped by store and result");
        describe_counter!(
            ANNOTATION_WRITES_TOTAL,
            Unit::Count,
            "Secrets re-persisted because the recorded store object id changed"
        );
    }
}

/// Initialize metrics collection and Prometheus exporter
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    let metrics_addr = match config.metrics_bind_address() {
        Some(addr) => addr,
        None => {
            warn!("Metrics disabled: no bind address configured");
            return Ok(());
        }
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        Error::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", crate::APP_NAME)
        .install()
        .map_err(|e| Error::config(format!("Failed to initialize metrics exporter: {}", e)))?;

    MetricsRecorder::new().register_sync_metrics();

    info!(metrics_addr = %metrics_addr, "Metrics collection initialized");

    Ok(())
}
