//! Vector store driver over a memory cluster
//!
//! Similarity is token overlap: the share of distinct query tokens that also
//! appear in the document, lowercased and split on non-alphanumerics. It is a
//! stand-in for embedding distance that keeps search results predictable.

use super::{MemoryClients, MemoryCluster, MemoryConnector, MemoryError, CLIENT_KEY};
use crate::pool::ClientCacheStats;
use async_trait::async_trait;
use dualstore_core::{
    DriverError, DriverKind, DriverResult, RecordFilter, VectorMatch, VectorMetadata,
    VectorRecord, VectorSearchDriver,
};
use std::collections::HashSet;
use std::sync::Arc;

const DRIVER_NAME: &str = "memory-vector";

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn overlap(query: &HashSet<String>, document: &str) -> f32 {
    if query.is_empty() {
        return 0.0;
    }
    let doc = tokens(document);
    let shared = query.iter().filter(|t| doc.contains(*t)).count();
    shared as f32 / query.len() as f32
}

/// `VectorSearchDriver` backed by a [`MemoryCluster`]
pub struct MemoryVectorDriver {
    clients: MemoryClients,
    images: bool,
}

impl MemoryVectorDriver {
    /// Create a text-only driver for the cluster
    pub fn new(cluster: Arc<MemoryCluster>) -> Self {
        MemoryVectorDriver {
            clients: MemoryClients::new(MemoryConnector::new(
                cluster,
                DriverKind::Vector,
                DRIVER_NAME,
            )),
            images: false,
        }
    }

    /// Accept image entries
    pub fn with_image_support(mut self, images: bool) -> Self {
        self.images = images;
        self
    }

    /// Client cache counters
    pub fn client_stats(&self) -> ClientCacheStats {
        self.clients.stats()
    }

    fn error(operation: &str, source: MemoryError) -> DriverError {
        DriverError::vector(DRIVER_NAME, operation, source)
    }
}

#[async_trait]
impl VectorSearchDriver for MemoryVectorDriver {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn supports_images(&self) -> bool {
        self.images
    }

    async fn add(
        &self,
        collection: &str,
        ids: &[String],
        documents: &[String],
        metadatas: &[VectorMetadata],
    ) -> DriverResult<()> {
        if ids.len() != documents.len() || ids.len() != metadatas.len() {
            return Err(Self::error(
                "add",
                MemoryError::LengthMismatch {
                    ids: ids.len(),
                    documents: documents.len(),
                    metadatas: metadatas.len(),
                },
            ));
        }
        let records = ids
            .iter()
            .zip(documents)
            .zip(metadatas)
            .map(|((id, document), metadata)| VectorRecord {
                id: id.clone(),
                document: document.clone(),
                metadata: metadata.clone(),
            })
            .collect();

        let conn = self.clients.get(CLIENT_KEY).await?;
        conn.put_vectors(collection, records)
            .map_err(|e| Self::error("add", e))
    }

    async fn query(
        &self,
        collection: &str,
        texts: &[String],
        limit: usize,
        filter: Option<&RecordFilter>,
    ) -> DriverResult<Vec<Vec<VectorMatch>>> {
        let conn = self.clients.get(CLIENT_KEY).await?;
        let stored = conn
            .scan_vectors(collection)
            .map_err(|e| Self::error("query", e))?;

        let results = texts
            .iter()
            .map(|text| {
                let query = tokens(text);
                let mut hits: Vec<VectorMatch> = stored
                    .iter()
                    .filter(|r| filter.map_or(true, |f| f.matches_metadata(&r.metadata)))
                    .filter_map(|r| {
                        let score = overlap(&query, &r.document);
                        (score > 0.0).then(|| VectorMatch {
                            id: r.id.clone(),
                            document: r.document.clone(),
                            metadata: r.metadata.clone(),
                            score,
                        })
                    })
                    .collect();
                hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
                hits.truncate(limit);
                hits
            })
            .collect();
        Ok(results)
    }

    async fn get(&self, collection: &str, ids: &[String]) -> DriverResult<Vec<VectorRecord>> {
        let conn = self.clients.get(CLIENT_KEY).await?;
        conn.get_vectors(collection, ids)
            .map_err(|e| Self::error("get", e))
    }

    async fn cleanup(&self) -> DriverResult<()> {
        self.clients.clear().await;
        Ok(())
    }
}
