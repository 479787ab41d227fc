//! Access to certificate and credential secrets in the cluster.
//!
//! The [`SecretClient`] trait is the seam between the sync protocol and the
//! Kubernetes API. Production code uses [`KubeSecretClient`]; tests substitute
//! a mock or an in-memory implementation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, PostParams};
use kube::{Client, ResourceExt};
use thiserror::Error;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

/// Errors returned by a [`SecretClient`]
#[derive(Debug, Error)]
pub enum SecretClientError {
    /// The secret's resourceVersion no longer matches the stored object (HTTP 409).
    #[error("Secret {namespace}/{name} was modified concurrently: {message}")]
    Conflict { namespace: String, name: String, message: String },

    /// The secret object lacks metadata needed to address it.
    #[error("Secret object has no {0}")]
    MissingMetadata(&'static str),

    /// Any other Kubernetes API failure.
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

/// Read and write access to secrets
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecretClient: Send + Sync {
    /// Fetch a secret, returning `None` when it does not exist
    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Secret>, SecretClientError>;

    /// Replace a secret with optimistic concurrency on its resourceVersion.
    ///
    /// Returns the stored object (with its new resourceVersion).
    async fn replace_secret(
        &self,
        secret: &Secret,
        field_manager: &str,
    ) -> Result<Secret, SecretClientError>;
}

/// [`SecretClient`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeSecretClient {
    client: Client,
}

impl KubeSecretClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretClient for KubeSecretClient {
    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Secret>, SecretClientError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(secret) => Ok(Some(secret)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn replace_secret(
        &self,
        secret: &Secret,
        field_manager: &str,
    ) -> Result<Secret, SecretClientError> {
        let namespace = secret.namespace().ok_or(SecretClientError::MissingMetadata("namespace"))?;
        let name = secret.metadata.name.clone().ok_or(SecretClientError::MissingMetadata("name"))?;

        let api: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
        let params = PostParams { dry_run: false, field_manager: Some(field_manager.to_string()) };

        match api.replace(&name, &params, secret).await {
            Ok(stored) => {
                debug!(
                    secret_namespace = %namespace,
                    secret_name = %name,
                    resource_version = ?stored.resource_version(),
                    "secret replaced"
                );
                Ok(stored)
            }
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                Err(SecretClientError::Conflict { namespace, name, message: ae.message })
            }
            Err(e) => Err(e.into()),
        }
    }
}
