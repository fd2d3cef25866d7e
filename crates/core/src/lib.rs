//! Core types and traits for dualstore
//!
//! This crate defines the foundational types used throughout the system:
//! - DualStoreEntry / NewEntry / EntryUpdate: the unit of storage and its edits
//! - MetadataValue: primitive-only metadata accepted by vector stores
//! - TimestampInput: caller timestamps normalized to epoch milliseconds
//! - RecordFilter / SortOrder: filters for sorted primary-store reads
//! - Error: DriverError, QueueError, DualStoreError
//! - Config: DualStoreConfig, WriteQueueConfig, ConsistencyLevel
//! - RetryPolicy: exponential backoff shared by queue and auditor
//! - Traits: PrimaryDatabaseDriver, VectorSearchDriver

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod consistency;
pub mod entry;
pub mod error;
pub mod filter;
pub mod retry;
pub mod timestamp;
pub mod traits;
pub mod value;

pub use config::{
    CollectionConfig, ConsistencyLevel, DualStoreConfig, ResolvedCollectionConfig,
    WriteQueueConfig, CONFIG_FILE_NAME,
};
pub use consistency::{ConsistencyFailure, ConsistencyReport, ConsistencyState, ConsistencyStatus};
pub use entry::{
    DualStoreEntry, EntryKind, EntryMetadata, EntryUpdate, NewEntry, SkipReason,
    VectorWriteStatus, VECTOR_WRITE_ERROR_KEY, VECTOR_WRITE_SKIPPED_KEY, VECTOR_WRITE_SUCCESS_KEY,
    VECTOR_WRITE_TIMESTAMP_KEY,
};
pub use error::{
    BoxError, DriverError, DriverKind, DriverResult, DualStoreError, DualStoreResult, QueueError,
    QueueResult,
};
pub use filter::{RecordFilter, SortOrder};
pub use retry::RetryPolicy;
pub use timestamp::{now_millis, resolve_timestamp, TimestampInput};
pub use traits::{PrimaryDatabaseDriver, VectorMatch, VectorRecord, VectorSearchDriver};
pub use value::{MetadataValue, VectorMetadata};
