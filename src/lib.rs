//! # certsync
//!
//! Distributes TLS certificates held in Kubernetes secrets to external
//! certificate stores (CDN edges, secret managers) and records the remote
//! object id back on the secret so later syncs update in place.
//!
//! ## Architecture
//!
//! ```text
//! controller -> SyncOrchestrator -> certificate::parse
//!                                -> annotations::read
//!                                -> CredentialResolver
//!                                -> StoreBackend::upsert
//!                                -> annotations::write -> SecretClient::replace_secret
//! ```
//!
//! ## Core Components
//!
//! - **Annotation Schema** ([`annotations`]): store-scoped keys that configure a
//!   sync and record its result
//! - **Certificate Extractor** ([`certificate`]): leaf, full chain and key from TLS data
//! - **Credential Resolver** ([`credentials`]): per-store credential secrets
//! - **Store Backends** ([`stores`]): Cloudflare custom certificates, Vault KV v2
//! - **Sync Orchestrator** ([`sync`]): one create-or-update per (secret, store)
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use certsync::{
//!     config, kube_client::KubeSecretClient, stores::{StoreKind, StoreRegistry},
//!     sync::{SyncOrchestrator, SyncPolicy}, kube_client::SecretClient,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = config::load()?;
//! let client = kube::Client::try_default().await?;
//! let secrets = Arc::new(KubeSecretClient::new(client));
//! let stores = StoreRegistry::from_config(&config, reqwest::Client::new());
//! let orchestrator = SyncOrchestrator::new(secrets.clone(), stores, SyncPolicy::default());
//!
//! if let Some(mut secret) = secrets.get_secret("default", "example-tls").await? {
//!     let outcome = orchestrator.sync(&mut secret, StoreKind::Cloudflare).await?;
//!     println!("synced as {}", outcome.object_id);
//! }
//! # Ok(())
//! # }
//! ```

pub mod annotations;
pub mod certificate;
pub mod cli;
pub mod config;
pub mod controller;
pub mod credentials;
pub mod errors;
pub mod kube_client;
pub mod observability;
pub mod secrets;
pub mod stores;
pub mod sync;

#[cfg(test)]
mod test_support;

// Re-export commonly used types and traits
pub use config::AppConfig;
pub use errors::{Error, Result, SyncError, SyncFailure};
pub use stores::{StoreBackend, StoreKind};
pub use sync::{SyncOrchestrator, SyncOutcome, SyncPolicy};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
