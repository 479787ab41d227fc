//! # Observability Infrastructure
//!
//! Structured logging and Prometheus metrics for the certificate sync operator.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, log_config_info};
pub use metrics::{init_metrics, MetricsRecorder};

use crate::config::ObservabilityConfig;
use crate::errors::Result;
use ::tracing::info;

/// Initialize logging and, when a port is configured, the metrics exporter.
///
/// Must run inside a Tokio runtime; the exporter serves on a background task.
pub fn init_observability(config: &ObservabilityConfig) -> Result<()> {
    init_logging(config)?;
    init_metrics(config)?;

    info!(
        log_level = %config.log_level,
        json_logging = config.json_logging,
        metrics_port = config.metrics_port,
        "Observability initialized successfully"
    );

    Ok(())
}

