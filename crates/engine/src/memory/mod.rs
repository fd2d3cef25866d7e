//! In-memory reference drivers
//!
//! - [`MemoryCluster`]: shared state standing in for both remote stores
//! - [`MemoryPrimaryDriver`]: `PrimaryDatabaseDriver` over the cluster
//! - [`MemoryVectorDriver`]: `VectorSearchDriver` with token-overlap scoring
//!
//! Both drivers reach the cluster through a [`ClientCache`], so dropped
//! connections heal the same way they would against a real store.

mod cluster;
mod primary;
mod vector;

pub use cluster::{ClusterStats, MemoryCluster, MemoryConnection, MemoryError};
pub use primary::MemoryPrimaryDriver;
pub use vector::MemoryVectorDriver;

use crate::pool::{ClientCache, Connector};
use async_trait::async_trait;
use dualstore_core::{DriverKind, DriverResult};
use std::sync::Arc;

/// Opens connections to a [`MemoryCluster`]
pub struct MemoryConnector {
    cluster: Arc<MemoryCluster>,
    kind: DriverKind,
    name: String,
}

impl MemoryConnector {
    pub(crate) fn new(cluster: Arc<MemoryCluster>, kind: DriverKind, name: impl Into<String>) -> Self {
        MemoryConnector {
            cluster,
            kind,
            name: name.into(),
        }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Client = MemoryConnection;

    fn kind(&self) -> DriverKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self, _key: &str) -> DriverResult<MemoryConnection> {
        Ok(self.cluster.open())
    }

    async fn ping(&self, client: &MemoryConnection) -> bool {
        client.is_open()
    }

    async fn close(&self, client: &MemoryConnection) {
        client.close();
    }
}

pub(crate) type MemoryClients = ClientCache<MemoryConnector>;

/// Cache key shared by every memory driver
pub(crate) const CLIENT_KEY: &str = "default";
