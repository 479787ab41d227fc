//! # Annotation Schema
//!
//! The fixed set of metadata keys on a certificate secret that configure a
//! store sync and record its result. The annotations are the only persisted
//! state of the sync protocol.
//!
//! Keys are scoped per store under the operator prefix:
//!
//! ```text
//! cert-manager-sync.lestak.sh/sync-enabled            "true" opts the secret in
//! cert-manager-sync.lestak.sh/<store>-secret-name     credential ref, "ns/name" or "name"
//! cert-manager-sync.lestak.sh/<store>-<scope key>     zone / target scope
//! cert-manager-sync.lestak.sh/<store>-cert-id         remote object id, written on change
//! ```

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;

use crate::stores::{StoreKind, StoreRequirements};

/// Operator name; prefix of every annotation key and the field manager for writes
pub const OPERATOR_NAME: &str = "cert-manager-sync.lestak.sh";

/// Annotation that opts a secret into controller-driven sync
pub const SYNC_ENABLED_ANNOTATION: &str = "cert-manager-sync.lestak.sh/sync-enabled";

/// Suffix of the credential secret reference key
pub const SECRET_NAME_SUFFIX: &str = "secret-name";

/// Suffix of the remote object id key
pub const CERT_ID_SUFFIX: &str = "cert-id";

/// Full annotation key for a store-scoped suffix, e.g. `cloudflare-zone-id`
pub fn store_key(store: StoreKind, suffix: &str) -> String {
    format!("{}/{}-{}", OPERATOR_NAME, store.as_str(), suffix)
}

/// Reference to the secret holding a store's credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRef {
    pub namespace: String,
    pub name: String,
}

impl CredentialRef {
    /// Parse `"ns/name"` or `"name"`.
    ///
    /// A leading namespace segment overrides `default_namespace`; an empty one
    /// falls back to it. Returns `None` when no name remains or the name itself
    /// contains a `/`.
    pub fn parse(raw: &str, default_namespace: &str) -> Option<Self> {
        let raw = raw.trim();
        let (namespace, name) = match raw.split_once('/') {
            Some((namespace, name)) => (namespace.trim(), name.trim()),
            None => ("", raw),
        };

        if name.is_empty() || name.contains('/') {
            return None;
        }

        let namespace = if namespace.is_empty() { default_namespace } else { namespace };
        Some(Self { namespace: namespace.to_string(), name: name.to_string() })
    }
}

impl fmt::Display for CredentialRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Per-invocation store configuration derived from a secret's annotations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreConfig {
    /// Credential secret reference, after namespace defaulting
    pub credential_ref: Option<CredentialRef>,
    /// Zone or target scope; empty when not annotated
    pub scope: String,
    /// Previously recorded remote object id; empty on first sync
    pub cert_id: String,
    /// Backend-declared extra keys that were present, by suffix
    pub extra: BTreeMap<String, String>,
}

impl StoreConfig {
    /// The recorded object id, or `None` when the secret was never synced
    pub fn existing_id(&self) -> Option<&str> {
        if self.cert_id.is_empty() {
            None
        } else {
            Some(&self.cert_id)
        }
    }

    pub fn extra(&self, suffix: &str) -> Option<&str> {
        self.extra.get(suffix).map(String::as_str)
    }
}

fn annotation<'a>(secret: &'a Secret, key: &str) -> Option<&'a str> {
    secret
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(key))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

/// Read a store's configuration from the secret's annotations.
///
/// Every key is optional here; missing values are reported by the caller when
/// they turn out to be required.
pub fn read(secret: &Secret, store: StoreKind, requirements: &StoreRequirements) -> StoreConfig {
    let default_namespace = secret.namespace().unwrap_or_default();

    let credential_ref = annotation(secret, &store_key(store, SECRET_NAME_SUFFIX))
        .and_then(|raw| CredentialRef::parse(raw, &default_namespace));
    let scope = annotation(secret, &store_key(store, requirements.scope_key))
        .unwrap_or_default()
        .to_string();
    let cert_id =
        annotation(secret, &store_key(store, CERT_ID_SUFFIX)).unwrap_or_default().to_string();

    let extra = requirements
        .required_keys
        .iter()
        .chain(requirements.optional_keys)
        .filter_map(|suffix| {
            annotation(secret, &store_key(store, suffix))
                .map(|value| (suffix.to_string(), value.to_string()))
        })
        .collect();

    StoreConfig { credential_ref, scope, cert_id, extra }
}

/// Record a new remote object id on the in-memory secret.
///
/// Returns `true` when the annotation changed and the secret must be persisted.
pub fn write(secret: &mut Secret, store: StoreKind, new_id: &str) -> bool {
    let key = store_key(store, CERT_ID_SUFFIX);
    let annotations = secret.annotations_mut();
    if annotations.get(&key).map(String::as_str) == Some(new_id) {
        return false;
    }
    annotations.insert(key, new_id.to_string());
    true
}

/// Whether the secret has opted into controller-driven sync
pub fn sync_enabled(secret: &Secret) -> bool {
    annotation(secret, SYNC_ENABLED_ANNOTATION) == Some("true")
}

/// Stores with at least one store-scoped annotation on the secret
pub fn targeted_stores(secret: &Secret) -> Vec<StoreKind> {
    let Some(annotations) = secret.metadata.annotations.as_ref() else {
        return Vec::new();
    };

    StoreKind::ALL
        .into_iter()
        .filter(|store| {
            let prefix = format!("{}/{}-", OPERATOR_NAME, store.as_str());
            annotations.keys().any(|key| key.starts_with(&prefix))
        })
        .collect()
}
