//! Shared fixtures for integration tests: an in-memory secret store with
//! resourceVersion checks and throwaway certificates.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use certsync::config::CloudflareConfig;
use certsync::kube_client::{SecretClient, SecretClientError};
use certsync::stores::{CloudflareStore, StoreRegistry};
use certsync::sync::{SyncOrchestrator, SyncPolicy};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};

pub const PREFIX: &str = "cert-manager-sync.lestak.sh";

pub fn key(suffix: &str) -> String {
    format!("{}/{}", PREFIX, suffix)
}

/// Secrets held in memory, keyed by `(namespace, name)`.
///
/// `replace_secret` enforces resourceVersion equality the way the API server
/// does and bumps the version on every successful write.
#[derive(Default)]
pub struct InMemorySecrets {
    secrets: Mutex<HashMap<(String, String), Secret>>,
    replaces: AtomicUsize,
}

impl InMemorySecrets {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, mut secret: Secret) {
        let namespace = secret.metadata.namespace.clone().unwrap();
        let name = secret.metadata.name.clone().unwrap();
        secret.metadata.resource_version.get_or_insert_with(|| "1".to_string());
        self.secrets.lock().unwrap().insert((namespace, name), secret);
    }

    pub fn stored(&self, namespace: &str, name: &str) -> Secret {
        self.secrets
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .unwrap()
    }

    pub fn annotation(&self, namespace: &str, name: &str, key: &str) -> Option<String> {
        self.stored(namespace, name).metadata.annotations.and_then(|a| a.get(key).cloned())
    }

    /// Simulate another writer touching the secret
    pub fn bump_version(&self, namespace: &str, name: &str) {
        let mut secrets = self.secrets.lock().unwrap();
        let secret = secrets.get_mut(&(namespace.to_string(), name.to_string())).unwrap();
        secret.metadata.resource_version = Some(next_version(&secret.metadata));
    }

    pub fn replace_count(&self) -> usize {
        self.replaces.load(Ordering::SeqCst)
    }
}

fn next_version(metadata: &ObjectMeta) -> String {
    let current: u64 =
        metadata.resource_version.as_deref().and_then(|v| v.parse().ok()).unwrap_or(0);
    (current + 1).to_string()
}

#[async_trait]
impl SecretClient for InMemorySecrets {
    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Secret>, SecretClientError> {
        Ok(self.secrets.lock().unwrap().get(&(namespace.to_string(), name.to_string())).cloned())
    }

    async fn replace_secret(
        &self,
        secret: &Secret,
        _field_manager: &str,
    ) -> Result<Secret, SecretClientError> {
        let namespace = secret
            .metadata
            .namespace
            .clone()
            .ok_or(SecretClientError::MissingMetadata("namespace"))?;
        let name =
            secret.metadata.name.clone().ok_or(SecretClientError::MissingMetadata("name"))?;

        let mut secrets = self.secrets.lock().unwrap();
        let current = secrets.get(&(namespace.clone(), name.clone())).ok_or_else(|| {
            SecretClientError::Conflict {
                namespace: namespace.clone(),
                name: name.clone(),
                message: "secret no longer exists".to_string(),
            }
        })?;

        if current.metadata.resource_version != secret.metadata.resource_version {
            return Err(SecretClientError::Conflict {
                namespace,
                name,
                message: "the object has been modified".to_string(),
            });
        }

        let mut stored = secret.clone();
        stored.metadata.resource_version = Some(next_version(&current.metadata));
        secrets.insert((namespace, name), stored.clone());
        self.replaces.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }
}

pub struct IssuedCertificate {
    pub cert_pem: String,
    pub key_pem: String,
    pub ca_pem: String,
}

/// Leaf certificate for `common_name` signed by a fresh CA
pub fn issue_certificate(common_name: &str) -> IssuedCertificate {
    let ca_key = KeyPair::generate().unwrap();
    let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca_params.distinguished_name.push(DnType::CommonName, "Integration Test CA");
    let ca_cert = ca_params.self_signed(&ca_key).unwrap();

    let leaf_key = KeyPair::generate().unwrap();
    let mut leaf_params = CertificateParams::new(vec![common_name.to_string()]).unwrap();
    leaf_params.distinguished_name.push(DnType::CommonName, common_name);
    let leaf = leaf_params.signed_by(&leaf_key, &ca_cert, &ca_key).unwrap();

    IssuedCertificate {
        cert_pem: leaf.pem(),
        key_pem: leaf_key.serialize_pem(),
        ca_pem: ca_cert.pem(),
    }
}

fn data(fields: &[(&str, &str)]) -> BTreeMap<String, ByteString> {
    fields.iter().map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec()))).collect()
}

pub fn secret(
    namespace: &str,
    name: &str,
    annotations: &[(String, &str)],
    fields: &[(&str, &str)],
) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            annotations: Some(
                annotations.iter().map(|(k, v)| (k.clone(), v.to_string())).collect(),
            ),
            ..Default::default()
        },
        data: Some(data(fields)),
        ..Default::default()
    }
}

pub fn tls_secret(
    namespace: &str,
    name: &str,
    issued: &IssuedCertificate,
    annotations: &[(String, &str)],
) -> Secret {
    secret(
        namespace,
        name,
        annotations,
        &[("tls.crt", &issued.cert_pem), ("tls.key", &issued.key_pem), ("ca.crt", &issued.ca_pem)],
    )
}

pub fn cloudflare_credentials(namespace: &str, name: &str) -> Secret {
    secret(namespace, name, &[], &[("api_key", "key-123"), ("email", "ops@example.com")])
}

/// Orchestrator with only the Cloudflare backend, pointed at `api_url`
pub fn cloudflare_orchestrator(secrets: Arc<InMemorySecrets>, api_url: &str) -> SyncOrchestrator {
    let config = CloudflareConfig { api_url: api_url.to_string(), timeout_seconds: 5 };
    let mut registry = StoreRegistry::new();
    registry.register(Arc::new(CloudflareStore::new(reqwest::Client::new(), &config)));
    SyncOrchestrator::new(secrets, registry, SyncPolicy::default())
}

pub fn cloudflare_success(id: &str) -> serde_json::Value {
    serde_json::json!({
        "success": true,
        "errors": [],
        "messages": [],
        "result": { "id": id, "status": "active" }
    })
}

pub fn cloudflare_failure(code: i64, message: &str) -> serde_json::Value {
    serde_json::json!({
        "success": false,
        "errors": [{ "code": code, "message": message }],
        "messages": [],
        "result": null
    })
}

/// One page holding every certificate in `certificates`
pub fn cloudflare_list(certificates: serde_json::Value) -> serde_json::Value {
    let count = certificates.as_array().map(Vec::len).unwrap_or(0);
    serde_json::json!({
        "success": true,
        "errors": [],
        "messages": [],
        "result": certificates,
        "result_info": {
            "page": 1,
            "per_page": 50,
            "total_pages": 1,
            "count": count,
            "total_count": count
        }
    })
}
