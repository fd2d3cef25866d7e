//! Lazily created, health-checked store clients
//!
//! Drivers reach their backing store through a [`ClientCache`]. A client is
//! created on first use and cached under a logical name. Every cache hit is
//! probed with [`Connector::ping`]; a client that fails the probe is closed,
//! evicted and transparently replaced by a fresh one.
//!
//! Concurrent first callers for the same name share one in-flight creation:
//! each name maps to a `tokio::sync::OnceCell`, so only one `connect` runs.
//!
//! The map itself sits behind a `parking_lot::Mutex` that is never held
//! across an await.

use async_trait::async_trait;
use dualstore_core::{DriverError, DriverKind, DriverResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Reconnect attempts after a failed health probe before giving up
const MAX_RECONNECTS: usize = 2;

/// Creates, probes and closes clients for one store
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connected client handle
    type Client: Send + Sync + 'static;

    /// Store the clients talk to
    fn kind(&self) -> DriverKind;

    /// Name used in error context
    fn name(&self) -> &str;

    /// Open a new client for a logical name
    async fn connect(&self, key: &str) -> DriverResult<Self::Client>;

    /// Cheap liveness probe
    async fn ping(&self, client: &Self::Client) -> bool;

    /// Release the client's resources
    async fn close(&self, client: &Self::Client);
}

type Slot<T> = Arc<OnceCell<Arc<T>>>;

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientCacheStats {
    /// Cached names
    pub cached: usize,
    /// Clients created since the cache was built
    pub created: u64,
    /// Clients evicted after a failed probe
    pub evicted: u64,
}

/// Per-name client cache with probe-on-hit
pub struct ClientCache<C: Connector> {
    connector: C,
    slots: Mutex<HashMap<String, Slot<C::Client>>>,
    created: AtomicU64,
    evicted: AtomicU64,
}

impl<C: Connector> ClientCache<C> {
    /// Create an empty cache
    pub fn new(connector: C) -> Self {
        ClientCache {
            connector,
            slots: Mutex::new(HashMap::new()),
            created: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    /// The connector backing this cache
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Return a live client for `key`, connecting if needed
    ///
    /// A client created by this call is returned without a probe. A cached
    /// client is probed first and replaced if the probe fails.
    ///
    /// # Errors
    ///
    /// Returns the connector's error if `connect` fails, or a driver error
    /// if freshly created clients keep failing their probe.
    pub async fn get(&self, key: &str) -> DriverResult<Arc<C::Client>> {
        for _ in 0..=MAX_RECONNECTS {
            let slot = self.slot(key);
            let created = AtomicBool::new(false);
            let client = slot
                .get_or_try_init(|| async {
                    let client = self.connector.connect(key).await?;
                    created.store(true, Ordering::Relaxed);
                    Ok::<_, DriverError>(Arc::new(client))
                })
                .await;

            let client = match client {
                Ok(client) => Arc::clone(client),
                Err(e) => {
                    // Leave the name free so the next caller tries again
                    self.evict_slot(key, &slot);
                    return Err(e);
                }
            };

            if created.load(Ordering::Relaxed) {
                self.created.fetch_add(1, Ordering::Relaxed);
                debug!(target: "dualstore::pool", driver = self.connector.name(), key, "Client created");
                return Ok(client);
            }

            if self.connector.ping(&client).await {
                return Ok(client);
            }

            warn!(
                target: "dualstore::pool",
                driver = self.connector.name(),
                key,
                "Cached client failed health check, reconnecting"
            );
            if self.evict_slot(key, &slot) {
                self.evicted.fetch_add(1, Ordering::Relaxed);
                self.connector.close(&client).await;
            }
        }

        Err(DriverError::new(
            self.connector.kind(),
            self.connector.name(),
            "connect",
            format!("client '{}' failed health check after reconnecting", key),
        ))
    }

    /// Close and drop every cached client
    pub async fn clear(&self) {
        let slots: Vec<Slot<C::Client>> = self.slots.lock().drain().map(|(_, s)| s).collect();
        let mut closed = 0usize;
        for slot in slots {
            if let Some(client) = slot.get() {
                self.connector.close(client).await;
                closed += 1;
            }
        }
        info!(target: "dualstore::pool", driver = self.connector.name(), closed, "Client cache cleared");
    }

    /// Current counters
    pub fn stats(&self) -> ClientCacheStats {
        ClientCacheStats {
            cached: self.slots.lock().len(),
            created: self.created.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }

    fn slot(&self, key: &str) -> Slot<C::Client> {
        let mut slots = self.slots.lock();
        Arc::clone(
            slots
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new())),
        )
    }

    /// Remove `slot` if it is still the one registered under `key`
    ///
    /// Returns false when another caller already replaced it.
    fn evict_slot(&self, key: &str, slot: &Slot<C::Client>) -> bool {
        let mut slots = self.slots.lock();
        match slots.get(key) {
            Some(current) if Arc::ptr_eq(current, slot) => {
                slots.remove(key);
                true
            }
            _ => false,
        }
    }
}

impl<C: Connector> std::fmt::Debug for ClientCache<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCache")
            .field("connector", &self.connector.name())
            .field("stats", &self.stats())
            .finish()
    }
}
