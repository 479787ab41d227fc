use thiserror::Error;

use super::StoreKind;

/// Failure of a store upsert, classified for the reconciliation scheduler
#[derive(Debug, Error)]
pub enum StoreError {
    /// Credentials were rejected or have expired
    #[error("{store} rejected the credentials: {message}")]
    AuthenticationFailed { store: StoreKind, message: String },

    /// The zone or target scope does not exist
    #[error("{store} scope '{scope}' not found: {message}")]
    ScopeNotFound { store: StoreKind, scope: String, message: String },

    /// The store refused the certificate or key material
    #[error("{store} rejected the certificate: {message}")]
    RemoteRejected { store: StoreKind, message: String },

    /// Network failure, rate limiting or a server error
    #[error("{store} request failed: {message}")]
    TransientFailure { store: StoreKind, message: String },

    /// The object targeted by an update no longer exists remotely
    #[error("{store} object '{id}' no longer exists")]
    NotFound { store: StoreKind, id: String },
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientFailure { .. })
    }

    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed { .. } => "remote_auth",
            Self::ScopeNotFound { .. } => "remote_scope",
            Self::RemoteRejected { .. } => "remote_rejected",
            Self::TransientFailure { .. } => "remote_transient",
            Self::NotFound { .. } => "remote_not_found",
        }
    }

    pub fn store(&self) -> StoreKind {
        match self {
            Self::AuthenticationFailed { store, .. }
            | Self::ScopeNotFound { store, .. }
            | Self::RemoteRejected { store, .. }
            | Self::TransientFailure { store, .. }
            | Self::NotFound { store, .. } => *store,
        }
    }
}
