//! # Sync Orchestrator
//!
//! Drives one reconciliation of a certificate secret against one store:
//!
//! ```text
//! ExtractCertificate -> ReadConfig -> ResolveCredentials -> Upsert
//!     -> (id changed? Persist) -> Done
//! ```
//!
//! Every step failure ends the invocation immediately with a [`SyncFailure`]
//! naming the step. Nothing is retried here apart from the single re-create
//! allowed by [`SyncPolicy::recreate_missing`]; the reconciliation scheduler
//! owns retries.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use tracing::{debug, error, info, warn, Instrument};

use crate::annotations::{self, StoreConfig, OPERATOR_NAME, SECRET_NAME_SUFFIX};
use crate::certificate::{self, ParsedCertificate};
use crate::credentials::{CredentialError, CredentialResolver, Credentials};
use crate::errors::{CertificateError, SyncError, SyncFailure, SyncStep};
use crate::kube_client::{SecretClient, SecretClientError};
use crate::observability::MetricsRecorder;
use crate::stores::{
    StoreBackend, StoreError, StoreKind, StoreObjectId, StoreRegistry, UpsertRequest,
};

/// Policy decisions the sync protocol leaves to the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPolicy {
    /// On `NotFound` for a recorded id, create a new object and record its id
    pub recreate_missing: bool,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self { recreate_missing: true }
    }
}

/// Result of a successful sync invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub store: StoreKind,
    /// Id returned by the store; authoritative for the next sync
    pub object_id: StoreObjectId,
    /// Id recorded on the secret before this sync
    pub previous_id: Option<String>,
    /// Whether the secret was re-persisted with a new id annotation
    pub persisted: bool,
    /// Whether the recorded object was missing remotely and created again
    pub recreated: bool,
}

type StepResult<T> = Result<T, (SyncStep, SyncError)>;

fn at<E: Into<SyncError>>(step: SyncStep) -> impl FnOnce(E) -> (SyncStep, SyncError) {
    move |error| (step, error.into())
}

/// Runs sync invocations with process-wide clients injected at construction
#[derive(Clone)]
pub struct SyncOrchestrator {
    secrets: Arc<dyn SecretClient>,
    credentials: CredentialResolver,
    stores: StoreRegistry,
    policy: SyncPolicy,
    metrics: MetricsRecorder,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("stores", &self.stores)
            .field("policy", &self.policy)
            .finish()
    }
}

impl SyncOrchestrator {
    pub fn new(secrets: Arc<dyn SecretClient>, stores: StoreRegistry, policy: SyncPolicy) -> Self {
        Self {
            credentials: CredentialResolver::new(secrets.clone()),
            secrets,
            stores,
            policy,
            metrics: MetricsRecorder::new(),
        }
    }

    pub fn stores(&self) -> &StoreRegistry {
        &self.stores
    }

    /// Sync `secret` to `store`.
    ///
    /// On success the in-memory secret reflects what is stored in the cluster,
    /// so the same object can be passed to the next store.
    pub async fn sync(
        &self,
        secret: &mut Secret,
        store: StoreKind,
    ) -> Result<SyncOutcome, SyncFailure> {
        let namespace = secret.namespace().unwrap_or_default();
        let name = secret.name_any();
        let span = crate::sync_span!(store, namespace, name);

        let result = self.run(secret, store).instrument(span.clone()).await;

        match result {
            Ok(outcome) => {
                self.metrics.record_sync(store, "success");
                Ok(outcome)
            }
            Err((step, source)) => {
                span.in_scope(|| {
                    error!(
                        step = %step,
                        error = %source,
                        error_kind = source.kind(),
                        retryable = source.is_retryable(),
                        "certificate sync failed"
                    );
                });
                self.metrics.record_sync(store, source.kind());
                Err(SyncFailure { step, store, namespace, name, source })
            }
        }
    }

    async fn run(&self, secret: &mut Secret, store: StoreKind) -> StepResult<SyncOutcome> {
        debug!("starting certificate sync");

        let certificate = certificate::parse(secret)
            .map_err(at::<CertificateError>(SyncStep::ExtractCertificate))?;
        log_certificate(&certificate);

        let backend = self.stores.get(store).ok_or_else(|| {
            (
                SyncStep::ReadConfig,
                SyncError::configuration(format!("no backend registered for store '{}'", store)),
            )
        })?;
        let config = self
            .read_config(secret, backend.as_ref())
            .map_err(at::<SyncError>(SyncStep::ReadConfig))?;

        // read_config guarantees the reference is present
        let credential_ref = config.credential_ref.as_ref().ok_or_else(|| {
            (SyncStep::ReadConfig, SyncError::configuration("credential reference missing"))
        })?;
        let credentials = self
            .credentials
            .resolve(credential_ref, backend.requirements().credential_fields)
            .await
            .map_err(at::<CredentialError>(SyncStep::ResolveCredentials))?;

        let previous_id = config.existing_id().map(str::to_string);
        let (object_id, recreated) = self
            .upsert(backend.as_ref(), &config, &certificate, &credentials)
            .await
            .map_err(at::<StoreError>(SyncStep::Upsert))?;

        let persisted = if annotations::write(secret, store, object_id.as_str()) {
            self.persist(secret).await.map_err(at::<SyncError>(SyncStep::Persist))?;
            self.metrics.record_annotation_write(store);
            true
        } else {
            debug!(id = %object_id, "store object id unchanged; skipping secret update");
            false
        };

        info!(id = %object_id, persisted, recreated, "certificate synced");

        Ok(SyncOutcome { store, object_id, previous_id, persisted, recreated })
    }

    fn read_config(
        &self,
        secret: &Secret,
        backend: &dyn StoreBackend,
    ) -> Result<StoreConfig, SyncError> {
        let store = backend.kind();
        let requirements = backend.requirements();
        let config = annotations::read(secret, store, &requirements);

        let mut missing = Vec::new();
        if config.credential_ref.is_none() {
            missing.push(annotations::store_key(store, SECRET_NAME_SUFFIX));
        }
        if requirements.scope_required && config.scope.is_empty() {
            missing.push(annotations::store_key(store, requirements.scope_key));
        }
        for key in requirements.required_keys {
            if config.extra(key).is_none() {
                missing.push(annotations::store_key(store, key));
            }
        }

        if !missing.is_empty() {
            return Err(SyncError::configuration(format!(
                "missing or invalid required annotation(s): {}",
                missing.join(", ")
            )));
        }

        backend.check_config(&config).map_err(SyncError::configuration)?;

        Ok(config)
    }

    async fn upsert(
        &self,
        backend: &dyn StoreBackend,
        config: &StoreConfig,
        certificate: &ParsedCertificate,
        credentials: &Credentials,
    ) -> Result<(StoreObjectId, bool), StoreError> {
        let request = UpsertRequest {
            scope: &config.scope,
            existing_id: config.existing_id(),
            certificate,
            credentials,
            config,
        };

        match backend.upsert(request).await {
            Ok(id) => Ok((id, false)),
            Err(StoreError::NotFound { id, .. }) if self.policy.recreate_missing => {
                warn!(
                    missing_id = %id,
                    "recorded store object no longer exists; creating a new one"
                );
                let id = backend.upsert(UpsertRequest { existing_id: None, ..request }).await?;
                Ok((id, true))
            }
            Err(e) => Err(e),
        }
    }

    async fn persist(&self, secret: &mut Secret) -> Result<(), SyncError> {
        match self.secrets.replace_secret(secret, OPERATOR_NAME).await {
            Ok(stored) => {
                *secret = stored;
                Ok(())
            }
            Err(SecretClientError::Conflict { message, .. }) => {
                Err(SyncError::PersistenceConflict { message })
            }
            Err(e) => Err(SyncError::Persistence { message: e.to_string() }),
        }
    }
}

fn log_certificate(certificate: &ParsedCertificate) {
    let info = &certificate.info;
    debug!(
        subject = %info.subject,
        issuer = %info.issuer,
        serial = %info.serial,
        not_after = %info.not_after,
        chain_len = certificate.chain_len,
        "certificate parsed"
    );
    if info.is_expired() {
        warn!(
            subject = %info.subject,
            not_after = %info.not_after,
            "distributing an expired certificate"
        );
    }
}
