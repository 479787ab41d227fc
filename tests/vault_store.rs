//! Vault KV v2 backend against a mock Vault server.

#![cfg(feature = "vault")]

mod support;

use std::collections::BTreeMap;
use std::sync::Arc;

use certsync::annotations::{CredentialRef, StoreConfig};
use certsync::certificate;
use certsync::config::VaultConfig;
use certsync::credentials::Credentials;
use certsync::errors::{SyncError, SyncStep};
use certsync::stores::{
    StoreBackend, StoreError, StoreKind, StoreRegistry, UpsertRequest, VaultStore,
};
use certsync::sync::{SyncOrchestrator, SyncPolicy};
use support::*;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn vault_store(server: &MockServer) -> VaultStore {
    VaultStore::new(&VaultConfig { address: server.uri(), ..Default::default() })
}

fn store_config(mount: Option<&str>) -> StoreConfig {
    let mut extra = BTreeMap::new();
    if let Some(mount) = mount {
        extra.insert("mount".to_string(), mount.to_string());
    }
    StoreConfig {
        credential_ref: CredentialRef::parse("vault-creds", "default"),
        scope: "certs/example".to_string(),
        extra,
        ..Default::default()
    }
}

fn write_response() -> serde_json::Value {
    serde_json::json!({
        "request_id": "3c1b2f4e-0000-0000-0000-000000000000",
        "lease_id": "",
        "renewable": false,
        "lease_duration": 0,
        "data": {
            "created_time": "2024-01-01T00:00:00.000000Z",
            "custom_metadata": null,
            "deletion_time": "",
            "destroyed": false,
            "version": 3
        },
        "wrap_info": null,
        "warnings": null,
        "auth": null
    })
}

#[tokio::test]
async fn writes_certificate_to_kv_path() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/pki-out/data/certs/example"))
        .and(header("X-Vault-Token", "s.token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(write_response()))
        .expect(1)
        .mount(&server)
        .await;

    let issued = issue_certificate("example.com");
    let parsed = certificate::parse(&tls_secret("default", "example-tls", &issued, &[])).unwrap();
    let credentials = Credentials::from_fields([("token", "s.token")]);
    let config = store_config(Some("/pki-out/"));
    let store = vault_store(&server);

    let request = UpsertRequest {
        scope: &config.scope,
        existing_id: None,
        certificate: &parsed,
        credentials: &credentials,
        config: &config,
    };
    let id = store.upsert(request).await.unwrap();

    assert_eq!(id.as_str(), "pki-out/certs/example");

    let received = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(body["data"]["tls.crt"], parsed.full_chain_pem.as_str());
    assert_eq!(body["data"]["tls.key"], issued.key_pem.as_str());
}

#[tokio::test]
async fn permission_denied_is_authentication_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/secret/data/certs/example"))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(serde_json::json!({ "errors": ["permission denied"] })),
        )
        .mount(&server)
        .await;

    let issued = issue_certificate("example.com");
    let parsed = certificate::parse(&tls_secret("default", "example-tls", &issued, &[])).unwrap();
    let credentials = Credentials::from_fields([("token", "s.revoked")]);
    let config = store_config(None);
    let store = vault_store(&server);

    let request = UpsertRequest {
        scope: &config.scope,
        existing_id: None,
        certificate: &parsed,
        credentials: &credentials,
        config: &config,
    };
    let err = store.upsert(request).await.unwrap_err();

    assert!(matches!(err, StoreError::AuthenticationFailed { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn unlisted_vault_address_rejected_before_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(write_response()))
        .expect(0)
        .mount(&server)
        .await;

    let issued = issue_certificate("example.com");
    let annotations = [
        (key("vault-secret-name"), "vault-creds"),
        (key("vault-path"), "certs/example"),
        (key("vault-addr"), "https://vault.attacker.example.com"),
    ];
    let secrets = InMemorySecrets::new();
    secrets.insert(tls_secret("default", "example-tls", &issued, &annotations));

    let mut registry = StoreRegistry::new();
    registry.register(Arc::new(vault_store(&server)));
    let orchestrator = SyncOrchestrator::new(secrets.clone(), registry, SyncPolicy::default());

    let mut secret = secrets.stored("default", "example-tls");
    let failure = orchestrator.sync(&mut secret, StoreKind::Vault).await.unwrap_err();

    // No credential secret exists, so reaching resolution would fail differently
    assert_eq!(failure.step, SyncStep::ReadConfig);
    assert!(matches!(
        failure.source,
        SyncError::Configuration { ref message } if message.contains("vault.attacker.example.com")
    ));
    assert!(!failure.is_retryable());
    assert_eq!(secrets.replace_count(), 0);
}

#[tokio::test]
async fn allowed_vault_address_selected_by_annotation() {
    let primary = MockServer::start().await;
    let secondary = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/secret/data/certs/example"))
        .respond_with(ResponseTemplate::new(200).set_body_json(write_response()))
        .expect(1)
        .mount(&secondary)
        .await;

    let store = VaultStore::new(&VaultConfig {
        address: primary.uri(),
        allowed_addresses: vec![secondary.uri()],
        ..Default::default()
    });

    let issued = issue_certificate("example.com");
    let parsed = certificate::parse(&tls_secret("default", "example-tls", &issued, &[])).unwrap();
    let credentials = Credentials::from_fields([("token", "s.token")]);
    let mut config = store_config(None);
    config.extra.insert("addr".to_string(), secondary.uri());

    let request = UpsertRequest {
        scope: &config.scope,
        existing_id: None,
        certificate: &parsed,
        credentials: &credentials,
        config: &config,
    };
    store.upsert(request).await.unwrap();

    assert!(primary.received_requests().await.unwrap().is_empty());
}
