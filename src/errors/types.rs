//! # Sync Error Types
//!
//! The error taxonomy of a single sync invocation. Every step of the
//! orchestrator surfaces one of these immediately; nothing is retried in-process.
//! [`SyncError::is_retryable`] tells the reconciliation scheduler whether a
//! later re-invocation can succeed without anyone editing a resource.

use std::fmt;

use thiserror::Error;

use super::CertificateError;
use crate::credentials::CredentialError;
use crate::stores::{StoreError, StoreKind};

/// Error raised by one step of a sync invocation
#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing or invalid annotation-derived configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Credential secret missing, incomplete or unreadable
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// Certificate secret carries bad TLS data
    #[error("Malformed certificate data: {0}")]
    MalformedCertificate(#[from] CertificateError),

    /// Remote store rejected or failed the upsert
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Annotation write lost an optimistic-concurrency race
    #[error("Annotation update conflicted with a concurrent writer: {message}")]
    PersistenceConflict { message: String },

    /// Any other failure while persisting the secret
    #[error("Failed to persist secret: {message}")]
    Persistence { message: String },
}

impl SyncError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Whether a later re-invocation may succeed without any resource being edited
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Configuration { .. } | Self::MalformedCertificate(_) => false,
            Self::Credential(error) => error.is_retryable(),
            Self::Store(error) => error.is_retryable(),
            Self::PersistenceConflict { .. } | Self::Persistence { .. } => true,
        }
    }

    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Credential(_) => "credential",
            Self::MalformedCertificate(_) => "malformed_certificate",
            Self::Store(error) => error.kind(),
            Self::PersistenceConflict { .. } => "persistence_conflict",
            Self::Persistence { .. } => "persistence",
        }
    }
}

/// Steps of the sync state machine, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncStep {
    ExtractCertificate,
    ReadConfig,
    ResolveCredentials,
    Upsert,
    Persist,
}

impl SyncStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExtractCertificate => "extract_certificate",
            Self::ReadConfig => "read_config",
            Self::ResolveCredentials => "resolve_credentials",
            Self::Upsert => "upsert",
            Self::Persist => "persist",
        }
    }
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed sync invocation with enough context for the caller to log and
/// decide on re-invocation.
#[derive(Debug, Error)]
#[error("{store} sync of secret {namespace}/{name} failed at {step}: {source}")]
pub struct SyncFailure {
    pub step: SyncStep,
    pub store: StoreKind,
    pub namespace: String,
    pub name: String,
    #[source]
    pub source: SyncError,
}

impl SyncFailure {
    pub fn is_retryable(&self) -> bool {
        self.source.is_retryable()
    }
}
