//! Store backends
//!
//! One [`StoreBackend`] implementation per external certificate store, selected
//! by its [`StoreKind`] tag through the [`StoreRegistry`].

pub mod cloudflare;
pub mod error;
pub mod registry;
#[cfg(feature = "vault")]
pub mod vault;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::annotations::StoreConfig;
use crate::certificate::ParsedCertificate;
use crate::credentials::Credentials;

pub use cloudflare::CloudflareStore;
pub use error::StoreError;
pub use registry::StoreRegistry;
#[cfg(feature = "vault")]
pub use vault::VaultStore;

/// External store a certificate can be synced to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// Cloudflare zone custom certificates
    Cloudflare,
    /// HashiCorp Vault KV v2
    Vault,
}

impl StoreKind {
    pub const ALL: [StoreKind; 2] = [StoreKind::Cloudflare, StoreKind::Vault];

    /// Annotation and metric label for this store
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cloudflare => "cloudflare",
            Self::Vault => "vault",
        }
    }
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cloudflare" => Ok(Self::Cloudflare),
            "vault" => Ok(Self::Vault),
            _ => Err(format!("Unknown store: {}", s)),
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a backend needs from the annotations and the credential secret.
///
/// Key names are suffixes; the full annotation key is built with
/// [`crate::annotations::store_key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreRequirements {
    /// Fields that must be present in the credential secret
    pub credential_fields: &'static [&'static str],
    /// Suffix of the zone / target scope annotation
    pub scope_key: &'static str,
    pub scope_required: bool,
    /// Extra annotation suffixes that must be set
    pub required_keys: &'static [&'static str],
    /// Extra annotation suffixes the backend reads when present
    pub optional_keys: &'static [&'static str],
}

/// Identifier the remote store assigned to the uploaded certificate
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreObjectId(String);

impl StoreObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inputs of a single upsert call
#[derive(Debug, Clone, Copy)]
pub struct UpsertRequest<'a> {
    /// Zone or target scope; validated non-empty when the backend requires it
    pub scope: &'a str,
    /// Object to update in place, `None` to create
    pub existing_id: Option<&'a str>,
    pub certificate: &'a ParsedCertificate,
    pub credentials: &'a Credentials,
    /// Full annotation-derived config, for backend-specific extra keys
    pub config: &'a StoreConfig,
}

/// Create-or-update capability of one external store.
///
/// Each call is a single attempt. Calling it twice with the same
/// `existing_id` and certificate must not create a second remote object,
/// including when `existing_id` is `None` because an earlier id was never
/// recorded.
#[async_trait]
pub trait StoreBackend: Send + Sync + fmt::Debug {
    fn kind(&self) -> StoreKind;

    fn requirements(&self) -> StoreRequirements;

    /// Reject annotation values the backend must not act on.
    ///
    /// Runs before credentials are resolved; the error text becomes a
    /// configuration error.
    fn check_config(&self, _config: &StoreConfig) -> Result<(), String> {
        Ok(())
    }

    /// Create the object when `existing_id` is `None`, otherwise update it.
    ///
    /// The returned id is authoritative for later syncs.
    async fn upsert(&self, request: UpsertRequest<'_>) -> Result<StoreObjectId, StoreError>;
}
