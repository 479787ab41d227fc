//! # Command Line Interface
//!
//! `certsync run` starts the controller; `certsync sync` performs a one-shot
//! sync of a single secret; `certsync keys` prints the annotation schema of a
//! store.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use kube::Client;
use tracing::info;

use crate::annotations::{self, CERT_ID_SUFFIX, SECRET_NAME_SUFFIX, SYNC_ENABLED_ANNOTATION};
use crate::config::{self, AppConfig};
use crate::controller::{self, ControllerContext};
use crate::kube_client::{KubeSecretClient, SecretClient};
use crate::observability::{init_logging, init_observability, log_config_info};
use crate::stores::{StoreKind, StoreRegistry};
use crate::sync::{SyncOrchestrator, SyncPolicy};
use crate::{APP_NAME, VERSION};

#[derive(Parser)]
#[command(name = "certsync")]
#[command(about = "Sync TLS certificates from Kubernetes secrets to external certificate stores")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch secrets and keep opted-in certificates synced
    Run,

    /// Sync one certificate secret now
    Sync {
        /// Namespace of the certificate secret
        #[arg(short, long)]
        namespace: String,

        /// Name of the certificate secret
        #[arg(long)]
        name: String,

        /// Store to sync to; defaults to every store the secret's annotations target
        #[arg(short, long)]
        store: Option<StoreKind>,
    },

    /// Print the annotation keys a store reads and writes
    Keys {
        /// Store name (cloudflare, vault)
        store: StoreKind,
    },
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = config::load()?;
    if cli.verbose {
        config.observability.log_level = "debug".to_string();
    }

    match cli.command {
        Commands::Run => {
            init_observability(&config.observability)?;
            run_controller(config).await?
        }
        Commands::Sync { namespace, name, store } => {
            init_logging(&config.observability)?;
            sync_once(&config, &namespace, &name, store).await?
        }
        Commands::Keys { store } => print_keys(&config, store)?,
    }

    Ok(())
}

fn http_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(format!("{}/{}", APP_NAME, VERSION))
        .build()
        .context("Failed to build HTTP client")
}

fn orchestrator(
    config: &AppConfig,
    secrets: Arc<dyn SecretClient>,
) -> anyhow::Result<SyncOrchestrator> {
    let stores = StoreRegistry::from_config(config, http_client()?);
    let policy = SyncPolicy { recreate_missing: config.operator.recreate_missing };
    Ok(SyncOrchestrator::new(secrets, stores, policy))
}

async fn run_controller(config: AppConfig) -> anyhow::Result<()> {
    info!(app_name = APP_NAME, version = VERSION, "Starting certificate sync operator");
    log_config_info(&config);

    let client = Client::try_default().await.context("Failed to create Kubernetes client")?;
    let secrets = Arc::new(KubeSecretClient::new(client.clone()));
    let orchestrator = orchestrator(&config, secrets)?;

    let ctx = Arc::new(ControllerContext::new(orchestrator, config.operator.clone()));
    controller::run(client, ctx).await;

    Ok(())
}

async fn sync_once(
    config: &AppConfig,
    namespace: &str,
    name: &str,
    store: Option<StoreKind>,
) -> anyhow::Result<()> {
    let client = Client::try_default().await.context("Failed to create Kubernetes client")?;
    let secrets = Arc::new(KubeSecretClient::new(client));
    let orchestrator = orchestrator(config, secrets.clone())?;

    let mut secret = secrets
        .get_secret(namespace, name)
        .await?
        .with_context(|| format!("Secret {}/{} not found", namespace, name))?;

    let stores = match store {
        Some(store) => vec![store],
        None => annotations::targeted_stores(&secret),
    };
    if stores.is_empty() {
        anyhow::bail!("Secret {}/{} has no store annotations; use --store", namespace, name);
    }

    let mut failed = 0;
    for store in stores {
        match orchestrator.sync(&mut secret, store).await {
            Ok(outcome) => {
                let state = if outcome.persisted { "recorded" } else { "unchanged" };
                println!("{}: synced, id {} ({})", store, outcome.object_id, state);
            }
            Err(failure) => {
                failed += 1;
                println!("{}: failed at {}: {}", store, failure.step, failure.source);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} store sync(s) failed for {}/{}", failed, namespace, name);
    }
    Ok(())
}

fn print_keys(config: &AppConfig, store: StoreKind) -> anyhow::Result<()> {
    let registry = StoreRegistry::from_config(config, http_client()?);
    let backend = registry.get(store).with_context(|| {
        format!("Store '{}' is not enabled in this build or configuration", store)
    })?;
    let requirements = backend.requirements();

    let scope = if requirements.scope_required { "required" } else { "optional" };
    println!("{:<60} {}", SYNC_ENABLED_ANNOTATION, "\"true\" to sync from the controller");
    println!(
        "{:<60} {}",
        annotations::store_key(store, SECRET_NAME_SUFFIX),
        "credential secret, \"ns/name\" or \"name\" (required)"
    );
    println!("{:<60} scope ({})", annotations::store_key(store, requirements.scope_key), scope);
    for key in requirements.required_keys {
        println!("{:<60} required", annotations::store_key(store, key));
    }
    for key in requirements.optional_keys {
        println!("{:<60} optional", annotations::store_key(store, key));
    }
    println!("{:<60} written by {}", annotations::store_key(store, CERT_ID_SUFFIX), APP_NAME);
    println!();
    println!("credential fields: {}", requirements.credential_fields.join(", "));

    Ok(())
}
