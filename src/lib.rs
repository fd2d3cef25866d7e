//! dualstore - keep a primary record store and a vector index in step
//!
//! Every insert is committed to the primary store first. Its vector
//! projection is then written through a per-collection batching queue with
//! bounded exponential retry, and the outcome is recorded on the primary
//! record so drift can be detected and repaired later.
//!
//! # Quick Start
//!
//! ```ignore
//! use dualstore::{DualStore, DualStoreConfig, MemoryCluster, NewEntry};
//!
//! let cluster = MemoryCluster::new();
//! let store = DualStore::in_memory(DualStoreConfig::default(), &cluster)?;
//!
//! let outcome = store
//!     .insert("memories", NewEntry::new("met Ada at the conference"))
//!     .await?;
//!
//! let status = store.check_consistency("memories", &outcome.id).await?;
//! store.cleanup().await?;
//! ```
//!
//! # Architecture
//!
//! - `dualstore-core`: data model, errors, configuration, driver traits
//! - `dualstore-queue`: write queue and queue registry
//! - `dualstore-engine`: coordinator, auditor, client cache, memory drivers
//!
//! Plug in real stores by implementing [`PrimaryDatabaseDriver`] and
//! [`VectorSearchDriver`] and passing them to [`DualStore::new`].

pub use dualstore_core::*;
pub use dualstore_engine::*;
pub use dualstore_queue::{QueueRegistry, QueueStats, QueuedWrite, WriteQueue};
