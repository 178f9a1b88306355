use std::{
    collections::HashMap,
    sync::Arc,
    time::Duration,
};

use {
    dashmap::DashMap,
    fixgate_config::GatewayConfig,
    fixgate_sessions::{LibraryId, SessionRegistry, SurrogateId},
    tokio::sync::RwLock,
    tracing::{debug, info, warn},
};

use crate::{
    handler::{LibraryRef, SessionExistsHandler},
    ledger::DeliveryLedger,
    library::{DeliverySnapshot, DeliveryStats, LibraryProxy},
};

/// Handler registered for a library ahead of its attach.
#[derive(Clone)]
pub struct HandlerRegistration {
    pub library: LibraryRef,
    pub handler: Arc<dyn SessionExistsHandler>,
}

// ── Gateway state ────────────────────────────────────────────────────────────

/// State owned by one gateway instance.
///
/// Created at startup and dropped at shutdown; several instances can live in
/// one process. Lock order is `registry` before `libraries`.
pub struct GatewayState {
    /// Authoritative session table. Every mutation takes the write lock.
    pub registry: RwLock<SessionRegistry>,
    /// Attached libraries, keyed by library id.
    pub libraries: RwLock<HashMap<LibraryId, LibraryProxy>>,
    /// One handler per library instance.
    handlers: DashMap<LibraryId, HandlerRegistration>,
    /// Per-library delivery ledgers, kept across reattach.
    ledgers: DashMap<LibraryId, Arc<DeliveryLedger>>,
    /// Per-library delivery counters, kept across reattach.
    stats: DashMap<LibraryId, Arc<DeliveryStats>>,
    pub config: GatewayConfig,
    pub version: String,
}

impl GatewayState {
    pub fn new(config: GatewayConfig) -> Arc<Self> {
        Arc::new(Self {
            registry: RwLock::new(SessionRegistry::with_limit(config.max_surrogate_id)),
            libraries: RwLock::new(HashMap::new()),
            handlers: DashMap::new(),
            ledgers: DashMap::new(),
            stats: DashMap::new(),
            config,
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    /// Register the handler a library will be notified through.
    /// Replaces any earlier registration for the same id.
    pub fn register_handler(
        &self,
        id: LibraryId,
        name: impl Into<Arc<str>>,
        handler: Arc<dyn SessionExistsHandler>,
    ) -> LibraryRef {
        let library = LibraryRef::new(id, name);
        debug!(library = %library, "registered session exists handler");
        self.handlers.insert(id, HandlerRegistration {
            library: library.clone(),
            handler,
        });
        library
    }

    pub fn handler(&self, id: LibraryId) -> Option<HandlerRegistration> {
        self.handlers.get(&id).map(|h| h.clone())
    }

    pub(crate) fn ledger(&self, id: LibraryId) -> Arc<DeliveryLedger> {
        Arc::clone(self.ledgers.entry(id).or_default().value())
    }

    pub(crate) fn stats_for(&self, id: LibraryId) -> Arc<DeliveryStats> {
        Arc::clone(self.stats.entry(id).or_default().value())
    }

    pub(crate) fn forget_handle_everywhere(&self, id: SurrogateId, epoch: u64) {
        for ledger in self.ledgers.iter() {
            ledger.forget(id, epoch);
        }
    }

    /// Delivery counters for a library that has attached at least once.
    pub fn delivery_stats(&self, id: LibraryId) -> Option<DeliverySnapshot> {
        self.stats.get(&id).map(|s| s.snapshot())
    }

    pub async fn library_count(&self) -> usize {
        self.libraries.read().await.len()
    }

    pub async fn is_attached(&self, id: LibraryId) -> bool {
        self.libraries.read().await.contains_key(&id)
    }

    /// Detach every library, letting each worker deliver what is already
    /// queued, and wait up to `grace` per worker.
    pub async fn shutdown(&self, grace: Duration) {
        let proxies: Vec<_> = self.libraries.write().await.drain().collect();
        info!(libraries = proxies.len(), "gateway shutting down");
        for (id, proxy) in proxies {
            let Some(worker) = proxy.finish() else {
                continue;
            };
            if tokio::time::timeout(grace, worker).await.is_err() {
                warn!(library = %id, "delivery worker did not stop in time");
            }
        }
    }
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("version", &self.version)
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}
