//! Error types for dualstore
//!
//! Three layers, each a `thiserror` enum or struct:
//! - [`DriverError`]: a single failed store call, tagged with the store kind,
//!   driver name, operation and document id
//! - [`QueueError`]: the outcome of a vector write routed through a write queue
//! - [`DualStoreError`]: what coordinator and auditor callers see
//!
//! Driver failures are wrapped with context before they cross a component
//! boundary, so callers can tell a transient vector-store error from a
//! primary-store error without matching on message strings.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error accepted by [`DriverError`] constructors
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Result type alias for driver calls
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Result type alias for write queue operations
pub type QueueResult<T> = std::result::Result<T, QueueError>;

/// Result type alias for coordinator and auditor operations
pub type DualStoreResult<T> = std::result::Result<T, DualStoreError>;

// =============================================================================
// DriverError
// =============================================================================

/// Which store a driver talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverKind {
    /// The durable primary record store
    Primary,
    /// The secondary vector index
    Vector,
}

impl DriverKind {
    /// Human-readable name for display
    pub fn name(&self) -> &'static str {
        match self {
            DriverKind::Primary => "primary",
            DriverKind::Vector => "vector",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A failed driver call with its context
///
/// The underlying client error is kept behind an `Arc` so the same failure
/// can be handed to every job of a failed batch.
#[derive(Debug, Clone, Error)]
#[error(
    "{kind} driver '{driver}' failed during {operation} (document: {doc}): {source}",
    doc = .document_id.as_deref().unwrap_or("-")
)]
pub struct DriverError {
    /// Store the failing driver talks to
    pub kind: DriverKind,
    /// Driver name (e.g. "memory-primary")
    pub driver: String,
    /// Operation that failed (e.g. "add", "update")
    pub operation: String,
    /// Document the operation targeted, if any
    pub document_id: Option<String>,
    /// Original client error
    pub source: Arc<dyn StdError + Send + Sync>,
}

impl DriverError {
    /// Wrap a client error
    pub fn new(
        kind: DriverKind,
        driver: impl Into<String>,
        operation: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        DriverError {
            kind,
            driver: driver.into(),
            operation: operation.into(),
            document_id: None,
            source: Arc::from(source.into()),
        }
    }

    /// Wrap a primary-store client error
    pub fn primary(
        driver: impl Into<String>,
        operation: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::new(DriverKind::Primary, driver, operation, source)
    }

    /// Wrap a vector-store client error
    pub fn vector(
        driver: impl Into<String>,
        operation: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::new(DriverKind::Vector, driver, operation, source)
    }

    /// Attach the document id the failed call targeted
    pub fn with_document(mut self, id: impl Into<String>) -> Self {
        self.document_id = Some(id.into());
        self
    }

    /// Check if the failure came from the vector store
    pub fn is_vector(&self) -> bool {
        self.kind == DriverKind::Vector
    }

    /// Check if the failure came from the primary store
    pub fn is_primary(&self) -> bool {
        self.kind == DriverKind::Primary
    }

    /// Message of the original client error
    pub fn original_message(&self) -> String {
        self.source.to_string()
    }
}

// =============================================================================
// QueueError
// =============================================================================

/// Errors produced by a write queue
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    /// The queue was shut down before the write completed
    #[error("write queue for collection '{collection}' is shut down")]
    Shutdown {
        /// Collection the queue serves
        collection: String,
    },

    /// Every attempt for this write failed
    #[error("vector write for '{id}' in '{collection}' failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Collection the queue serves
        collection: String,
        /// Record id
        id: String,
        /// Number of bulk calls that included this write
        attempts: u32,
        /// Error from the last attempt
        #[source]
        source: DriverError,
    },

    /// Direct (unbatched) write failed
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Queue configuration was rejected
    #[error("invalid write queue config: {message}")]
    InvalidConfig {
        /// Reason
        message: String,
    },
}

impl QueueError {
    /// Check if this error means the queue is no longer running
    pub fn is_shutdown(&self) -> bool {
        matches!(self, QueueError::Shutdown { .. })
    }

    /// The driver error behind this failure, if there is one
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            QueueError::RetriesExhausted { source, .. } => Some(source),
            QueueError::Driver(e) => Some(e),
            _ => None,
        }
    }
}

// =============================================================================
// DualStoreError
// =============================================================================

/// Errors surfaced by the coordinator and the auditor
#[derive(Debug, Clone, Error)]
pub enum DualStoreError {
    /// Primary-store call failed; always fatal to the calling operation
    #[error("primary store error: {0}")]
    Primary(DriverError),

    /// Vector-store call failed outside of the write queue
    #[error("vector store error: {0}")]
    Vector(DriverError),

    /// Strict-consistency insert whose vector write failed
    ///
    /// The primary record has already been committed when this is returned.
    #[error("critical: vector write failed for '{id}' in collection '{collection}': {reason}")]
    CriticalVectorWrite {
        /// Collection name
        collection: String,
        /// Record id
        id: String,
        /// Underlying failure
        reason: String,
    },

    /// No primary record exists for the id
    #[error("record not found: {collection}/{id}")]
    NotFound {
        /// Collection name
        collection: String,
        /// Record id
        id: String,
    },

    /// Write queue failure
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Caller-supplied data was rejected
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Reason
        message: String,
    },

    /// Configuration could not be loaded or is inconsistent
    #[error("configuration error: {message}")]
    Config {
        /// Reason
        message: String,
    },
}

impl DualStoreError {
    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        DualStoreError::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        DualStoreError::Config {
            message: message.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        DualStoreError::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Check if this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, DualStoreError::NotFound { .. })
    }

    /// Check if this is a strict-mode vector write escalation
    pub fn is_critical(&self) -> bool {
        matches!(self, DualStoreError::CriticalVectorWrite { .. })
    }

    /// Check if the failure originated in the primary store
    pub fn is_primary(&self) -> bool {
        matches!(self, DualStoreError::Primary(_))
    }
}

impl From<DriverError> for DualStoreError {
    fn from(e: DriverError) -> Self {
        match e.kind {
            DriverKind::Primary => DualStoreError::Primary(e),
            DriverKind::Vector => DualStoreError::Vector(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_display_includes_context() {
        let err = DriverError::vector("chroma", "add", "connection reset").with_document("doc-1");
        let msg = err.to_string();
        assert!(msg.contains("vector driver 'chroma'"));
        assert!(msg.contains("during add"));
        assert!(msg.contains("doc-1"));
        assert!(msg.contains("connection reset"));
    }

    #[test]
    fn test_driver_error_display_without_document() {
        let err = DriverError::primary("mongo", "get_most_recent", "timeout");
        assert_eq!(
            err.to_string(),
            "primary driver 'mongo' failed during get_most_recent (document: -): timeout"
        );
    }

    #[test]
    fn test_driver_error_kind_routing() {
        let vector: DualStoreError = DriverError::vector("v", "add", "x").into();
        assert!(matches!(vector, DualStoreError::Vector(_)));

        let primary: DualStoreError = DriverError::primary("p", "insert", "x").into();
        assert!(primary.is_primary());
    }

    #[test]
    fn test_driver_error_clone_shares_source() {
        let err = DriverError::vector("v", "add", "boom");
        let copy = err.clone();
        assert!(Arc::ptr_eq(&err.source, &copy.source));
        assert_eq!(copy.original_message(), "boom");
    }

    #[test]
    fn test_queue_error_driver_error() {
        let driver = DriverError::vector("v", "add", "boom");
        let err = QueueError::RetriesExhausted {
            collection: "c".into(),
            id: "a".into(),
            attempts: 3,
            source: driver,
        };
        assert!(!err.is_shutdown());
        assert_eq!(err.driver_error().map(|e| e.operation.as_str()), Some("add"));
        assert!(err.to_string().contains("after 3 attempts"));

        let shutdown = QueueError::Shutdown {
            collection: "c".into(),
        };
        assert!(shutdown.is_shutdown());
        assert!(shutdown.driver_error().is_none());
    }

    #[test]
    fn test_critical_error_message() {
        let err = DualStoreError::CriticalVectorWrite {
            collection: "memories".into(),
            id: "m1".into(),
            reason: "down".into(),
        };
        assert!(err.is_critical());
        assert!(err.to_string().starts_with("critical: vector write failed"));
    }

    #[test]
    fn test_not_found_error() {
        let err = DualStoreError::not_found("memories", "nope");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "record not found: memories/nope");
    }
}
