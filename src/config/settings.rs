//! # Configuration Settings
//!
//! Defines the configuration structure for the certificate sync operator.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::{Error, Result};
use crate::stores::StoreKind;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct AppConfig {
    /// Controller and sync policy configuration
    #[validate(nested)]
    pub operator: OperatorConfig,

    /// Cloudflare API configuration
    #[validate(nested)]
    pub cloudflare: CloudflareConfig,

    /// Vault store configuration
    #[validate(nested)]
    pub vault: VaultConfig,

    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load every section from `CERTSYNC_*` environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            operator: OperatorConfig::from_env()?,
            cloudflare: CloudflareConfig::from_env()?,
            vault: VaultConfig::from_env()?,
            observability: ObservabilityConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;

        if self.operator.stores.is_empty() {
            return Err(Error::config("At least one store must be enabled"));
        }

        Ok(())
    }
}

/// Controller and sync policy configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OperatorConfig {
    /// Namespace to watch; all namespaces when unset
    pub watch_namespace: Option<String>,

    /// Stores the operator registers backends for
    pub stores: Vec<StoreKind>,

    /// Re-create a remote object whose recorded id no longer exists
    pub recreate_missing: bool,

    /// Requeue delay after a retryable failure
    #[validate(range(
        min = 1,
        max = 86400,
        message = "Retry requeue must be between 1 and 86400 seconds"
    ))]
    pub retry_requeue_seconds: u64,

    /// Requeue delay after a terminal failure
    #[validate(range(
        min = 1,
        max = 86400,
        message = "Terminal requeue must be between 1 and 86400 seconds"
    ))]
    pub terminal_requeue_seconds: u64,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            stores: StoreKind::ALL.to_vec(),
            recreate_missing: true,
            retry_requeue_seconds: 30,
            terminal_requeue_seconds: 600,
        }
    }
}

impl OperatorConfig {
    pub fn retry_requeue(&self) -> Duration {
        Duration::from_secs(self.retry_requeue_seconds)
    }

    pub fn terminal_requeue(&self) -> Duration {
        Duration::from_secs(self.terminal_requeue_seconds)
    }

    /// Create OperatorConfig from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let watch_namespace = std::env::var("CERTSYNC_WATCH_NAMESPACE")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let stores = match std::env::var("CERTSYNC_STORES") {
            Ok(raw) => parse_stores(&raw)?,
            Err(_) => defaults.stores,
        };

        Ok(Self {
            watch_namespace,
            stores,
            recreate_missing: env_flag("CERTSYNC_RECREATE_MISSING", defaults.recreate_missing),
            retry_requeue_seconds: env_parse(
                "CERTSYNC_RETRY_REQUEUE_SECONDS",
                defaults.retry_requeue_seconds,
            )?,
            terminal_requeue_seconds: env_parse(
                "CERTSYNC_TERMINAL_REQUEUE_SECONDS",
                defaults.terminal_requeue_seconds,
            )?,
        })
    }
}

/// Cloudflare API configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CloudflareConfig {
    /// API base URL, without trailing slash
    #[validate(url(message = "Cloudflare API URL must be a valid URL"))]
    pub api_url: String,

    /// Request timeout in seconds
    #[validate(range(min = 1, max = 300, message = "Timeout must be between 1 and 300 seconds"))]
    pub timeout_seconds: u64,
}

impl Default for CloudflareConfig {
    fn default() -> Self {
        Self { api_url: "https://api.cloudflare.com/client/v4".to_string(), timeout_seconds: 30 }
    }
}

impl CloudflareConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Create CloudflareConfig from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let api_url = std::env::var("CERTSYNC_CLOUDFLARE_API_URL")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_url);

        Ok(Self {
            api_url,
            timeout_seconds: env_parse(
                "CERTSYNC_CLOUDFLARE_TIMEOUT_SECONDS",
                defaults.timeout_seconds,
            )?,
        })
    }
}

/// Vault store configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct VaultConfig {
    /// Vault server credentials are sent to unless a secret selects another
    /// address from `allowed_addresses`
    #[validate(url(message = "Vault address must be a valid URL"))]
    pub address: String,

    /// Further addresses a secret may select with its `vault-addr` annotation
    pub allowed_addresses: Vec<String>,

    /// KV v2 mount used when a secret does not annotate one
    #[validate(length(min = 1, message = "Vault mount cannot be empty"))]
    pub default_mount: String,

    /// Request timeout in seconds
    #[validate(range(min = 1, max = 300, message = "Timeout must be between 1 and 300 seconds"))]
    pub timeout_seconds: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:8200".to_string(),
            allowed_addresses: Vec::new(),
            default_mount: "secret".to_string(),
            timeout_seconds: 30,
        }
    }
}

impl VaultConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Whether credentials may be sent to `address`
    pub fn is_allowed_address(&self, address: &str) -> bool {
        let address = normalize_address(address);
        normalize_address(&self.address) == address
            || self.allowed_addresses.iter().any(|allowed| normalize_address(allowed) == address)
    }

    /// Create VaultConfig from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let address = std::env::var("CERTSYNC_VAULT_ADDR")
            .map(|s| s.trim().to_string())
            .unwrap_or(defaults.address);
        let allowed_addresses = std::env::var("CERTSYNC_VAULT_ALLOWED_ADDRS")
            .map(|raw| {
                raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect()
            })
            .unwrap_or_default();
        let default_mount = std::env::var("CERTSYNC_VAULT_DEFAULT_MOUNT")
            .map(|s| s.trim().trim_matches('/').to_string())
            .unwrap_or(defaults.default_mount);

        Ok(Self {
            address,
            allowed_addresses,
            default_mount,
            timeout_seconds: env_parse("CERTSYNC_VAULT_TIMEOUT_SECONDS", defaults.timeout_seconds)?,
        })
    }
}

fn normalize_address(address: &str) -> &str {
    address.trim().trim_end_matches('/')
}

/// Observability configuration for logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` takes precedence
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,

    /// Prometheus exporter port (0 = disabled)
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { log_level: "info".to_string(), json_logging: false, metrics_port: 9090 }
    }
}

impl ObservabilityConfig {
    /// Get metrics bind address (None if disabled)
    pub fn metrics_bind_address(&self) -> Option<String> {
        if self.metrics_port == 0 {
            None
        } else {
            Some(format!("0.0.0.0:{}", self.metrics_port))
        }
    }

    /// Create ObservabilityConfig from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            log_level: std::env::var("CERTSYNC_LOG_LEVEL").unwrap_or(defaults.log_level),
            json_logging: env_flag("CERTSYNC_LOG_JSON", defaults.json_logging),
            metrics_port: env_parse("CERTSYNC_METRICS_PORT", defaults.metrics_port)?,
        })
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| Error::config(format!("Invalid value for {}: {}", key, e))),
        Err(_) => Ok(default),
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|s| {
            let s = s.trim().to_lowercase();
            s == "true" || s == "1"
        })
        .unwrap_or(default)
}

/// Parse a comma separated store list, e.g. `cloudflare,vault`
pub fn parse_stores(raw: &str) -> Result<Vec<StoreKind>> {
    let mut stores = Vec::new();
    for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let store = item.parse::<StoreKind>().map_err(Error::config)?;
        if !stores.contains(&store) {
            stores.push(store);
        }
    }
    Ok(stores)
}
