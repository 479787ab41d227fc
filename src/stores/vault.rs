//! HashiCorp Vault KV v2 store.
//!
//! Writes `{tls.crt, tls.key}` to `<mount>/<path>`. KV writes create or
//! overwrite, so create and update are the same call and the returned id
//! (`<mount>/<path>`) never changes between syncs.
//!
//! Annotations:
//! - `vault-path` (scope, required)
//! - `vault-addr` (optional; must be the configured address or one of the
//!   configured allowed addresses, since the token is sent there)
//! - `vault-mount` (optional, falls back to the configured default mount)
//!
//! Credentials: `token`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;
use vaultrs::kv2;

use super::{StoreBackend, StoreError, StoreKind, StoreObjectId, StoreRequirements, UpsertRequest};
use crate::annotations::StoreConfig;
use crate::certificate::{TLS_CERT_KEY, TLS_KEY_KEY};
use crate::config::VaultConfig;

const STORE: StoreKind = StoreKind::Vault;

pub const TOKEN_FIELD: &str = "token";
pub const ADDR_KEY: &str = "addr";
pub const MOUNT_KEY: &str = "mount";

/// [`StoreBackend`] for Vault KV v2 mounts
#[derive(Debug, Clone)]
pub struct VaultStore {
    config: VaultConfig,
}

impl VaultStore {
    pub fn new(config: &VaultConfig) -> Self {
        Self { config: config.clone() }
    }

    fn timeout(&self) -> Duration {
        self.config.timeout()
    }

    /// Annotated address when present, else the configured one
    fn address<'a>(&'a self, config: &'a StoreConfig) -> &'a str {
        config.extra(ADDR_KEY).unwrap_or(self.config.address.as_str())
    }

    fn client(&self, address: &str, token: &str) -> Result<VaultClient, StoreError> {
        let mut settings_builder = VaultClientSettingsBuilder::default();
        settings_builder.address(address);
        settings_builder.token(token);
        settings_builder.timeout(Some(self.timeout()));

        let settings = settings_builder.build().map_err(|e| StoreError::RemoteRejected {
            store: STORE,
            message: format!("Invalid Vault configuration: {}", e),
        })?;

        VaultClient::new(settings).map_err(|e| StoreError::RemoteRejected {
            store: STORE,
            message: format!("Failed to create Vault client: {}", e),
        })
    }
}

#[async_trait]
impl StoreBackend for VaultStore {
    fn kind(&self) -> StoreKind {
        STORE
    }

    fn requirements(&self) -> StoreRequirements {
        StoreRequirements {
            credential_fields: &[TOKEN_FIELD],
            scope_key: "path",
            scope_required: true,
            required_keys: &[],
            optional_keys: &[ADDR_KEY, MOUNT_KEY],
        }
    }

    fn check_config(&self, config: &StoreConfig) -> Result<(), String> {
        match config.extra(ADDR_KEY) {
            Some(address) if !self.config.is_allowed_address(address) => Err(format!(
                "Vault address '{}' is not the configured address or an allowed address",
                address
            )),
            _ => Ok(()),
        }
    }

    async fn upsert(&self, request: UpsertRequest<'_>) -> Result<StoreObjectId, StoreError> {
        self.check_config(request.config)
            .map_err(|message| StoreError::RemoteRejected { store: STORE, message })?;
        let address = self.address(request.config);
        let mount = request
            .config
            .extra(MOUNT_KEY)
            .map(|m| m.trim_matches('/'))
            .filter(|m| !m.is_empty())
            .unwrap_or(self.config.default_mount.as_str());
        let path = request.scope.trim_matches('/');

        let client = self.client(address, request.credentials.expose(TOKEN_FIELD))?;

        let data: HashMap<&str, &str> = HashMap::from([
            (TLS_CERT_KEY, request.certificate.full_chain_pem.as_str()),
            (TLS_KEY_KEY, request.certificate.private_key.expose_secret()),
        ]);

        let metadata = kv2::set(&client, mount, path, &data)
            .await
            .map_err(|e| map_client_error(e, mount, path))?;

        debug!(
            mount = %mount,
            path = %path,
            version = metadata.version,
            "certificate written to Vault"
        );

        Ok(StoreObjectId::new(format!("{}/{}", mount, path)))
    }
}

fn map_client_error(error: ClientError, mount: &str, path: &str) -> StoreError {
    match error {
        ClientError::APIError { code, errors } => {
            let message = if errors.is_empty() {
                format!("HTTP {}", code)
            } else {
                errors.join("; ")
            };
            match code {
                401 | 403 => StoreError::AuthenticationFailed { store: STORE, message },
                404 => StoreError::ScopeNotFound {
                    store: STORE,
                    scope: format!("{}/{}", mount, path),
                    message,
                },
                429 | 500..=599 => StoreError::TransientFailure { store: STORE, message },
                _ => StoreError::RemoteRejected { store: STORE, message },
            }
        }
        other => StoreError::TransientFailure { store: STORE, message: other.to_string() },
    }
}
