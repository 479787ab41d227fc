//! Secret controller
//!
//! Watches Secrets and syncs every opted-in secret to each store its
//! annotations target. Stores are synced one after another on the same
//! in-memory copy so each annotation write sees the previous one's
//! resourceVersion. A failing store does not stop the others.

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::controller::Action;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, ResourceExt};
use thiserror::Error;
use tracing::{debug, info, warn, Instrument};

use crate::annotations;
use crate::config::OperatorConfig;
use crate::errors::SyncFailure;
use crate::stores::StoreKind;
use crate::sync::SyncOrchestrator;

/// Shared context for the secret controller
pub struct ControllerContext {
    pub orchestrator: SyncOrchestrator,
    pub settings: OperatorConfig,
}

impl ControllerContext {
    pub fn new(orchestrator: SyncOrchestrator, settings: OperatorConfig) -> Self {
        Self { orchestrator, settings }
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(
        "{} of {attempted} store sync(s) failed for secret {namespace}/{name}: {}",
        failures.len(),
        summarize(failures)
    )]
    SyncFailed { namespace: String, name: String, attempted: usize, failures: Vec<SyncFailure> },
}

impl ReconcileError {
    /// Retry soon when any failed store may succeed on its own
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::SyncFailed { failures, .. } => failures.iter().any(SyncFailure::is_retryable),
        }
    }
}

fn summarize(failures: &[SyncFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} at {}: {}", f.store, f.step, f.source))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Stores targeted by the secret that this process has a backend for
fn stores_to_sync(secret: &Secret, ctx: &ControllerContext) -> Vec<StoreKind> {
    annotations::targeted_stores(secret)
        .into_iter()
        .filter(|store| {
            let registered = ctx.orchestrator.stores().has_backend(*store);
            if !registered {
                debug!(store = %store, "store targeted by annotations is not enabled; skipping");
            }
            registered
        })
        .collect()
}

/// Reconcile one Secret
pub async fn reconcile(
    secret: Arc<Secret>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileError> {
    let namespace = secret.namespace().unwrap_or_default();
    let name = secret.name_any();
    let span = crate::reconcile_span!(namespace, name);

    async move {
        if !annotations::sync_enabled(&secret) {
            return Ok(Action::await_change());
        }

        let stores = stores_to_sync(&secret, &ctx);
        if stores.is_empty() {
            debug!("sync enabled but no enabled store is targeted");
            return Ok(Action::await_change());
        }

        let mut working = (*secret).clone();
        let mut failures = Vec::new();
        for store in &stores {
            if let Err(failure) = ctx.orchestrator.sync(&mut working, *store).await {
                failures.push(failure);
            }
        }

        if failures.is_empty() {
            debug!(stores = stores.len(), "secret reconciled");
            Ok(Action::await_change())
        } else {
            Err(ReconcileError::SyncFailed { namespace, name, attempted: stores.len(), failures })
        }
    }
    .instrument(span)
    .await
}

/// Requeue quickly for retryable failures, slowly for ones that need an edit
pub fn error_policy(
    secret: Arc<Secret>,
    error: &ReconcileError,
    ctx: Arc<ControllerContext>,
) -> Action {
    let retryable = error.is_retryable();
    let delay = if retryable {
        ctx.settings.retry_requeue()
    } else {
        ctx.settings.terminal_requeue()
    };

    warn!(
        secret_namespace = %secret.namespace().unwrap_or_default(),
        secret_name = %secret.name_any(),
        error = %error,
        retryable,
        requeue_seconds = delay.as_secs(),
        "secret reconciliation failed, will retry"
    );

    Action::requeue(delay)
}

/// Start the secret controller and run until a shutdown signal arrives
pub async fn run(client: Client, ctx: Arc<ControllerContext>) {
    let secrets: Api<Secret> = match &ctx.settings.watch_namespace {
        Some(namespace) => Api::namespaced(client, namespace),
        None => Api::all(client),
    };

    info!(
        watch_namespace = ctx.settings.watch_namespace.as_deref().unwrap_or("*"),
        stores = ?ctx.orchestrator.stores().registered_stores(),
        "Starting secret controller"
    );

    Controller::new(secrets, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object, action)) => {
                    debug!(secret = %object.name, ?action, "reconciliation completed");
                }
                Err(e) => {
                    debug!(error = %e, "reconciliation error");
                }
            }
        })
        .await;

    info!("secret controller stopped");
}
