//! Pending vector write jobs

use dualstore_core::{QueueError, QueueResult, VectorMetadata, VectorRecord};
use tokio::sync::oneshot;
use tokio::time::Instant;

/// A vector write waiting in a queue
///
/// Completion is reported through a one-shot channel owned by the caller's
/// pending `enqueue` future. Dropping a job without resolving it closes the
/// channel, which the caller observes as a shutdown.
#[derive(Debug)]
pub struct QueuedWrite {
    /// Record id
    pub id: String,
    /// Text payload
    pub document: String,
    /// Primitive metadata
    pub metadata: VectorMetadata,
    /// Failed bulk calls this job took part in
    pub retry_count: u32,
    /// Enqueue time
    pub enqueued_at: Instant,
    /// Enqueue order within the queue
    pub(crate) sequence: u64,
    completion: oneshot::Sender<QueueResult<()>>,
}

impl QueuedWrite {
    pub(crate) fn new(
        record: VectorRecord,
        sequence: u64,
        completion: oneshot::Sender<QueueResult<()>>,
    ) -> Self {
        QueuedWrite {
            id: record.id,
            document: record.document,
            metadata: record.metadata,
            retry_count: 0,
            enqueued_at: Instant::now(),
            sequence,
            completion,
        }
    }

    /// Fulfill the caller's pending enqueue
    pub(crate) fn resolve(self) {
        // The caller may have stopped waiting; the write still happened
        let _ = self.completion.send(Ok(()));
    }

    /// Fail the caller's pending enqueue
    pub(crate) fn reject(self, error: QueueError) {
        let _ = self.completion.send(Err(error));
    }
}
