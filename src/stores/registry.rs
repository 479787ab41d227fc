//! Store backend registry
//!
//! Maps each [`StoreKind`] to the backend instance that serves it. Backends
//! are constructed once per process and shared by every sync invocation.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use super::{CloudflareStore, StoreBackend, StoreKind};
use crate::config::AppConfig;

/// Registry of store backends
#[derive(Clone, Default)]
pub struct StoreRegistry {
    backends: HashMap<StoreKind, Arc<dyn StoreBackend>>,
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry").field("backends", &self.registered_stores()).finish()
    }
}

impl StoreRegistry {
    /// Create a new registry with no backends
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a store backend, replacing any previous one of the same kind
    pub fn register(&mut self, backend: Arc<dyn StoreBackend>) {
        let kind = backend.kind();
        info!(store = %kind, "Registering store backend");
        self.backends.insert(kind, backend);
    }

    pub fn get(&self, kind: StoreKind) -> Option<Arc<dyn StoreBackend>> {
        self.backends.get(&kind).cloned()
    }

    /// Check if a store backend is registered
    pub fn has_backend(&self, kind: StoreKind) -> bool {
        self.backends.contains_key(&kind)
    }

    /// Registered stores in stable order
    pub fn registered_stores(&self) -> Vec<StoreKind> {
        let mut kinds: Vec<StoreKind> = self.backends.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Register a backend for every store enabled in the configuration.
    ///
    /// `http` is shared by the HTTP-based backends.
    pub fn from_config(config: &AppConfig, http: reqwest::Client) -> Self {
        let mut registry = Self::new();

        for kind in &config.operator.stores {
            match kind {
                StoreKind::Cloudflare => {
                    let store = CloudflareStore::new(http.clone(), &config.cloudflare);
                    registry.register(Arc::new(store));
                }
                #[cfg(feature = "vault")]
                StoreKind::Vault => {
                    registry.register(Arc::new(super::VaultStore::new(&config.vault)));
                }
                #[cfg(not(feature = "vault"))]
                StoreKind::Vault => {
                    warn!(store = %kind, "Store enabled but this build lacks the 'vault' feature");
                }
            }
        }

        if registry.backends.is_empty() {
            warn!("No store backends registered; secrets will not be synced");
        }

        registry
    }
}
