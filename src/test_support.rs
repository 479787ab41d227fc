//! Fixtures shared by unit tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};

use crate::certificate::{CA_CERT_KEY, TLS_CERT_KEY, TLS_KEY_KEY};
use crate::stores::{
    StoreBackend, StoreError, StoreKind, StoreObjectId, StoreRequirements, UpsertRequest,
};

/// A leaf certificate issued by a throwaway CA
pub struct IssuedCertificate {
    pub cert_pem: String,
    pub key_pem: String,
    pub ca_pem: String,
}

pub fn issue_certificate(common_name: &str) -> IssuedCertificate {
    let ca_key = KeyPair::generate().unwrap();
    let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca_params.distinguished_name.push(DnType::CommonName, "Test Root CA");
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

pub fn data_map(fields: &[(&str, &str)]) -> BTreeMap<String, ByteString> {
    fields.iter().map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec()))).collect()
}

/// Certificate secret `namespace/name` carrying `annotations` and valid TLS data
pub fn tls_secret(namespace: &str, name: &str, annotations: &[(&str, &str)]) -> Secret {
    let issued = issue_certificate("example.com");
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            resource_version: Some("1".to_string()),
            annotations: Some(
                annotations.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            ),
            ..Default::default()
        },
        data: Some(data_map(&[
            (TLS_CERT_KEY, &issued.cert_pem),
            (TLS_KEY_KEY, &issued.key_pem),
            (CA_CERT_KEY, &issued.ca_pem),
        ])),
        type_: Some("kubernetes.io/tls".to_string()),
        ..Default::default()
    }
}

/// Credential secret holding `fields`
pub fn credential_secret(namespace: &str, name: &str, fields: &[(&str, &str)]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(data_map(fields)),
        ..Default::default()
    }
}

/// Cloudflare-shaped backend that records `(scope, existing_id)` per call and
/// replays scripted responses
#[derive(Debug, Default)]
pub struct ScriptedStore {
    calls: Mutex<Vec<(String, Option<String>)>>,
    responses: Mutex<VecDeque<Result<StoreObjectId, StoreError>>>,
}

impl ScriptedStore {
    pub fn with_responses(responses: Vec<Result<StoreObjectId, StoreError>>) -> Arc<Self> {
        Arc::new(Self { calls: Mutex::default(), responses: Mutex::new(responses.into()) })
    }

    pub fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StoreBackend for ScriptedStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Cloudflare
    }

    fn requirements(&self) -> StoreRequirements {
        StoreRequirements {
            credential_fields: &["api_key", "email"],
            scope_key: "zone-id",
            scope_required: true,
            required_keys: &[],
            optional_keys: &[],
        }
    }

    async fn upsert(&self, request: UpsertRequest<'_>) -> Result<StoreObjectId, StoreError> {
        assert!(request.certificate.full_chain_pem.contains("BEGIN CERTIFICATE"));
        assert_eq!(request.credentials.expose("api_key"), "key-123");
        self.calls
            .lock()
            .unwrap()
            .push((request.scope.to_string(), request.existing_id.map(str::to_string)));
        self.responses.lock().unwrap().pop_front().expect("unexpected upsert call")
    }
}

