use thiserror::Error;

/// Problems with the TLS material stored on a certificate secret.
#[derive(Debug, Error)]
pub enum CertificateError {
    /// The secret carries no data map at all, or lacks one of the required keys.
    #[error("Secret is missing TLS data field '{field}'")]
    MissingField { field: &'static str },

    /// No certificates were found in the field.
    #[error("TLS data field '{field}' does not contain any PEM certificates")]
    EmptyCertificateChain { field: &'static str },

    /// A PEM block in the field could not be decoded.
    #[error("TLS data field '{field}' is not valid PEM: {source}")]
    InvalidCertificatePem {
        field: &'static str,
        #[source]
        source: rustls::pki_types::pem::Error,
    },

    /// The private key PEM contents were invalid or unsupported.
    #[error("TLS data field '{field}' does not contain a supported private key: {reason}")]
    InvalidPrivateKey { field: &'static str, reason: String },

    /// The leaf certificate DER could not be parsed as X.509.
    #[error("Failed to extract leaf certificate metadata: {reason}")]
    CertificateMetadata { reason: String },
}
