//! # Error Handling
//!
//! Error types for the certificate synchronizer, defined with `thiserror`.
//!
//! - [`Error`] covers process-level configuration failures.
//! - [`SyncError`] is the per-invocation taxonomy surfaced by the sync orchestrator.
//! - [`SyncFailure`] wraps a [`SyncError`] with the step, store and secret it happened on.
//! - [`CertificateError`] describes malformed TLS data on a certificate secret.

pub mod certificate;
pub mod types;

pub use certificate::CertificateError;
pub use types::{SyncError, SyncFailure, SyncStep};

/// Custom result type for process-level operations
pub type Result<T> = std::result::Result<T, Error>;

/// Process-level error type
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Config(errors.to_string())
    }
}
