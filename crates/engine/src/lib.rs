//! Dual-write engine for dualstore
//!
//! This crate wires the stores together:
//! - DualWriteCoordinator: primary write first, vector write through the queue
//! - ConsistencyAuditor: status checks, drift reports, repair
//! - ClientCache: lazily created, health-checked store clients
//! - Memory drivers: in-process primary and vector stores with fault injection
//! - DualStore: composition root owning the config, registry and drivers

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auditor;
pub mod coordinator;
pub mod database;
pub mod memory;
pub mod pool;

pub use auditor::{ConsistencyAuditor, RepairSummary, ReportScope, DEFAULT_REPORT_LIMIT};
pub use coordinator::{
    CoordinatorMetrics, DualWriteCoordinator, InsertOptions, InsertOutcome, VectorWriteOutcome,
};
pub use database::DualStore;
pub use memory::{
    ClusterStats, MemoryCluster, MemoryConnection, MemoryConnector, MemoryError,
    MemoryPrimaryDriver, MemoryVectorDriver,
};
pub use pool::{ClientCache, ClientCacheStats, Connector};
