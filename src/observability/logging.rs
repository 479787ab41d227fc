//! # Structured Logging
//!
//! Subscriber setup and span helpers built on the tracing ecosystem.
//!
//! `RUST_LOG` takes precedence over the configured level so operators can
//! raise verbosity for a single module, e.g. `RUST_LOG=certsync::stores=debug`.

use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, ObservabilityConfig};
use crate::errors::{Error, Result};

/// Create a tracing span for one sync invocation.
///
/// ```rust,ignore
/// let span = sync_span!(StoreKind::Cloudflare, "default", "example-tls");
/// ```
#[macro_export]
macro_rules! sync_span {
    ($store:expr, $namespace:expr, $name:expr) => {
        tracing::info_span!(
            "sync",
            action = "sync",
            store = %$store,
            secret_namespace = %$namespace,
            secret_name = %$name
        )
    };
    ($store:expr, $namespace:expr, $name:expr, $($field:tt)*) => {
        tracing::info_span!(
            "sync",
            action = "sync",
            store = %$store,
            secret_namespace = %$namespace,
            secret_name = %$name,
            $($field)*
        )
    };
}

/// Create a tracing span for one reconciliation of a secret
#[macro_export]
macro_rules! reconcile_span {
    ($namespace:expr, $name:expr) => {
        tracing::info_span!(
            "reconcile",
            action = "reconcile",
            secret_namespace = %$namespace,
            secret_name = %$name
        )
    };
}

/// Build the level filter, letting `RUST_LOG` override the configured level
pub fn env_filter(config: &ObservabilityConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.log_level).map_err(|e| {
            Error::config(format!("Invalid log level '{}': {}", config.log_level, e))
        }),
    }
}

/// Install the global subscriber.
///
/// A subscriber installed earlier (e.g. by a test harness) is left in place.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = env_filter(config)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let installed =
        if config.json_logging { builder.json().try_init() } else { builder.try_init() };

    if installed.is_err() {
        tracing::debug!("global subscriber already installed; keeping it");
    }
    Ok(())
}

/// Log configuration at startup
pub fn log_config_info(config: &AppConfig) {
    tracing::info!(
        watch_namespace = config.operator.watch_namespace.as_deref().unwrap_or("*"),
        stores = ?config.operator.stores,
        recreate_missing = config.operator.recreate_missing,
        cloudflare_api_url = %config.cloudflare.api_url,
        vault_address = %config.vault.address,
        vault_default_mount = %config.vault.default_mount,
        metrics_port = config.observability.metrics_port,
        "certsync configuration"
    );
}
