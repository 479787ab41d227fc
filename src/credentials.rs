//! Credential Resolver
//!
//! Fetches the secret named by a store's credential reference and checks that
//! every field the backend needs is present. Credentials are fetched fresh on
//! every sync and never cached.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::annotations::CredentialRef;
use crate::kube_client::{SecretClient, SecretClientError};
use crate::secrets::SecretString;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Credential secret {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },

    #[error(
        "Credential secret {namespace}/{name} is missing required field(s): {}",
        fields.join(", ")
    )]
    FieldMissing { namespace: String, name: String, fields: Vec<String> },

    #[error("Failed to read credential secret {namespace}/{name}: {source}")]
    Lookup {
        namespace: String,
        name: String,
        #[source]
        source: SecretClientError,
    },
}

impl CredentialError {
    /// Lookup failures are transport problems; the others need a user edit.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Lookup { .. })
    }
}

/// Resolved credential fields for one store call
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    fields: BTreeMap<String, SecretString>,
}

impl Credentials {
    pub fn from_fields<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<SecretString>,
    {
        Self { fields: fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }

    pub fn get(&self, field: &str) -> Option<&SecretString> {
        self.fields.get(field)
    }

    /// Field value as text. Empty when absent, which the resolver prevents.
    pub fn expose(&self, field: &str) -> &str {
        self.fields.get(field).map(SecretString::expose_secret).unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct CredentialResolver {
    client: Arc<dyn SecretClient>,
}

impl CredentialResolver {
    pub fn new(client: Arc<dyn SecretClient>) -> Self {
        Self { client }
    }

    /// Fetch the referenced secret and extract `required_fields`.
    ///
    /// Values are trimmed of surrounding whitespace; every absent or empty
    /// field is reported in a single [`CredentialError::FieldMissing`].
    pub async fn resolve(
        &self,
        reference: &CredentialRef,
        required_fields: &[&str],
    ) -> Result<Credentials, CredentialError> {
        let CredentialRef { namespace, name } = reference;

        let secret = self
            .client
            .get_secret(namespace, name)
            .await
            .map_err(|source| CredentialError::Lookup {
                namespace: namespace.clone(),
                name: name.clone(),
                source,
            })?
            .ok_or_else(|| CredentialError::NotFound {
                namespace: namespace.clone(),
                name: name.clone(),
            })?;

        let data = secret.data.unwrap_or_default();
        let mut fields = BTreeMap::new();
        let mut missing = Vec::new();

        for field in required_fields {
            let value = data
                .get(*field)
                .and_then(|bytes| std::str::from_utf8(&bytes.0).ok())
                .map(str::trim)
                .filter(|value| !value.is_empty());

            match value {
                Some(value) => {
                    fields.insert(field.to_string(), SecretString::from(value));
                }
                None => missing.push(field.to_string()),
            }
        }

        if !missing.is_empty() {
            return Err(CredentialError::FieldMissing {
                namespace: namespace.clone(),
                name: name.clone(),
                fields: missing,
            });
        }

        debug!(
            credential_namespace = %namespace,
            credential_name = %name,
            fields = fields.len(),
            "credentials resolved"
        );

        Ok(Credentials { fields })
    }
}
