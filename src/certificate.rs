//! Certificate Extractor
//!
//! Turns the opaque TLS data of a certificate secret into a structured
//! [`ParsedCertificate`] that any store backend can upload directly.

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Secret;
use ::pem::{EncodeConfig, LineEnding, Pem};
use rustls::pki_types::{pem::PemObject, CertificateDer, PrivateKeyDer};
use x509_parser::prelude::*;

use crate::errors::CertificateError;
use crate::secrets::SecretString;

/// Data key holding the leaf certificate followed by any intermediates
pub const TLS_CERT_KEY: &str = "tls.crt";
/// Data key holding the PEM private key
pub const TLS_KEY_KEY: &str = "tls.key";
/// Optional data key holding the issuing CA
pub const CA_CERT_KEY: &str = "ca.crt";

/// Metadata extracted from the leaf certificate for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub subject: String,
    pub issuer: String,
    pub serial: String,
    pub not_after: DateTime<Utc>,
    /// DNS names from the subjectAltName extension, in certificate order
    pub hosts: Vec<String>,
}

impl CertificateInfo {
    pub fn is_expired(&self) -> bool {
        self.not_after < Utc::now()
    }
}

/// Leaf certificate, full chain and private key of one certificate secret.
#[derive(Debug, Clone)]
pub struct ParsedCertificate {
    /// PEM of the leaf certificate alone
    pub leaf_pem: String,
    /// Leaf followed by intermediates and CA, PEM with LF line endings
    pub full_chain_pem: String,
    /// Private key PEM exactly as stored in the secret
    pub private_key: SecretString,
    pub chain_len: usize,
    pub info: CertificateInfo,
}

/// Parse the TLS data of a certificate secret.
///
/// Pure with respect to the secret; nothing is logged or fetched.
pub fn parse(secret: &Secret) -> Result<ParsedCertificate, CertificateError> {
    let cert_bytes = data_field(secret, TLS_CERT_KEY)
        .ok_or(CertificateError::MissingField { field: TLS_CERT_KEY })?;
    let key_bytes = data_field(secret, TLS_KEY_KEY)
        .ok_or(CertificateError::MissingField { field: TLS_KEY_KEY })?;

    let mut chain = read_certificates(cert_bytes, TLS_CERT_KEY)?;
    if chain.is_empty() {
        return Err(CertificateError::EmptyCertificateChain { field: TLS_CERT_KEY });
    }

    if let Some(ca_bytes) = data_field(secret, CA_CERT_KEY) {
        for cert in read_certificates(ca_bytes, CA_CERT_KEY)? {
            if !chain.contains(&cert) {
                chain.push(cert);
            }
        }
    }

    PrivateKeyDer::from_pem_slice(key_bytes).map_err(|err| CertificateError::InvalidPrivateKey {
        field: TLS_KEY_KEY,
        reason: err.to_string(),
    })?;
    let private_key = SecretString::from_utf8(key_bytes.to_vec()).ok_or_else(|| {
        CertificateError::InvalidPrivateKey {
            field: TLS_KEY_KEY,
            reason: "key data is not valid UTF-8".to_string(),
        }
    })?;

    let info = certificate_info(&chain[0])?;
    let leaf_pem = encode_pem(&chain[0]);
    let full_chain_pem = chain.iter().map(encode_pem).collect::<String>();

    Ok(ParsedCertificate { leaf_pem, full_chain_pem, private_key, chain_len: chain.len(), info })
}

fn data_field<'a>(secret: &'a Secret, key: &str) -> Option<&'a [u8]> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .map(|value| value.0.as_slice())
        .filter(|value| !value.is_empty())
}

fn read_certificates(
    bytes: &[u8],
    field: &'static str,
) -> Result<Vec<CertificateDer<'static>>, CertificateError> {
    CertificateDer::pem_slice_iter(bytes)
        .map(|result| {
            result.map_err(|source| CertificateError::InvalidCertificatePem { field, source })
        })
        .collect()
}

fn certificate_info(leaf: &CertificateDer<'_>) -> Result<CertificateInfo, CertificateError> {
    let (_, parsed) = X509Certificate::from_der(leaf.as_ref())
        .map_err(|err| CertificateError::CertificateMetadata { reason: err.to_string() })?;

    let timestamp = parsed.validity().not_after.timestamp();
    let not_after = DateTime::from_timestamp(timestamp, 0).ok_or_else(|| {
        CertificateError::CertificateMetadata {
            reason: format!("notAfter timestamp {} is out of range", timestamp),
        }
    })?;

    let hosts = match parsed.subject_alternative_name() {
        Ok(Some(san)) => san
            .value
            .general_names
            .iter()
            .filter_map(|name| match name {
                GeneralName::DNSName(host) => Some(host.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    Ok(CertificateInfo {
        subject: parsed.subject().to_string(),
        issuer: parsed.issuer().to_string(),
        serial: format!("{:x}", parsed.serial),
        not_after,
        hosts,
    })
}

fn encode_pem(cert: &CertificateDer<'_>) -> String {
    let block = Pem::new("CERTIFICATE", cert.as_ref().to_vec());
    ::pem::encode_config(&block, EncodeConfig::new().set_line_ending(LineEnding::LF))
}
