//! Batching write queue for vector-store writes
//!
//! One queue serves one collection. Writes accumulate in a FIFO buffer and
//! are submitted to the vector store as a single bulk `add` when either
//! trigger fires:
//! - the buffer reaches `batch_size`
//! - the periodic `flush_interval_ms` tick elapses with a non-empty buffer
//!
//! ## Scheduling
//!
//! A single scheduler task owns the buffer and selects over three event
//! sources: incoming commands, the flush tick, and the earliest retry
//! deadline. Flushes run inline in that task, so at most one bulk call is in
//! flight per queue and no lock guards the buffer.
//!
//! ## Retries
//!
//! When a bulk call fails, every job in it has its `retry_count`
//! incremented. Jobs still under `max_retries` are parked until
//! `retry_delay_ms * 2^(retry_count - 1)` (plus jitter, capped) elapses,
//! then put back at the front of the buffer in enqueue order and flushed.
//! The rest are rejected with [`QueueError::RetriesExhausted`].
//!
//! With `enabled == false` the buffer is bypassed and every `enqueue`
//! performs a one-element `add` inline.

use crate::job::QueuedWrite;
use dualstore_core::{
    DriverError, QueueError, QueueResult, VectorMetadata, VectorRecord, VectorSearchDriver,
    WriteQueueConfig,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Queue metrics snapshot, used for health checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    /// Collection the queue serves
    pub collection: String,
    /// Jobs waiting in the buffer
    pub queue_length: usize,
    /// Jobs parked until their retry delay elapses
    pub retry_pending: usize,
    /// Whether a bulk call is in flight
    pub flushing: bool,
    /// Active configuration
    pub config: WriteQueueConfig,
    /// Bulk calls issued (successful or not)
    pub batches_flushed: u64,
    /// Writes confirmed by the vector store
    pub writes_completed: u64,
    /// Writes rejected permanently
    pub writes_failed: u64,
}

enum Command {
    Enqueue(QueuedWrite),
    Flush(oneshot::Sender<()>),
    Reconfigure(WriteQueueConfig, oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// State shared between the handle and the scheduler task
///
/// Counters use Relaxed ordering: they are observational only.
struct QueueShared {
    collection: String,
    config: RwLock<WriteQueueConfig>,
    flushing: AtomicBool,
    shut_down: AtomicBool,
    queue_length: AtomicUsize,
    retry_pending: AtomicUsize,
    batches_flushed: AtomicU64,
    writes_completed: AtomicU64,
    writes_failed: AtomicU64,
    sequence: AtomicU64,
}

impl QueueShared {
    fn shutdown_error(&self) -> QueueError {
        QueueError::Shutdown {
            collection: self.collection.clone(),
        }
    }
}

/// Handle to a collection's write queue
pub struct WriteQueue {
    shared: Arc<QueueShared>,
    driver: Arc<dyn VectorSearchDriver>,
    commands: mpsc::UnboundedSender<Command>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WriteQueue {
    /// Create a queue and start its scheduler task
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the config fails validation.
    pub fn new(
        collection: impl Into<String>,
        driver: Arc<dyn VectorSearchDriver>,
        config: WriteQueueConfig,
    ) -> QueueResult<Self> {
        config.validate()?;
        let collection = collection.into();
        let shared = Arc::new(QueueShared {
            collection: collection.clone(),
            config: RwLock::new(config.clone()),
            flushing: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            queue_length: AtomicUsize::new(0),
            retry_pending: AtomicUsize::new(0),
            batches_flushed: AtomicU64::new(0),
            writes_completed: AtomicU64::new(0),
            writes_failed: AtomicU64::new(0),
            sequence: AtomicU64::new(0),
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler {
            shared: Arc::clone(&shared),
            driver: Arc::clone(&driver),
            commands: rx,
            buffer: VecDeque::new(),
            parked: Vec::new(),
            config,
        };
        let handle = tokio::spawn(scheduler.run());

        info!(target: "dualstore::queue", collection = %collection, "Write queue started");

        Ok(WriteQueue {
            shared,
            driver,
            commands: tx,
            task: Mutex::new(Some(handle)),
        })
    }

    /// Collection this queue serves
    pub fn collection(&self) -> &str {
        &self.shared.collection
    }

    /// Active configuration
    pub fn config(&self) -> WriteQueueConfig {
        self.shared.config.read().clone()
    }

    /// Whether `shutdown` has completed or the scheduler has stopped
    pub fn is_shut_down(&self) -> bool {
        self.shared.shut_down.load(Ordering::Acquire)
    }

    /// Submit a vector write
    ///
    /// Resolves once the vector store has accepted the record. Rejects only
    /// after retries are exhausted, or if the queue shuts down first.
    pub async fn enqueue(&self, record: VectorRecord) -> QueueResult<()> {
        if self.is_shut_down() {
            return Err(self.shared.shutdown_error());
        }
        if !self.shared.config.read().enabled {
            return self.write_direct(record).await;
        }

        let sequence = self.shared.sequence.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Enqueue(QueuedWrite::new(record, sequence, tx)))
            .map_err(|_| self.shared.shutdown_error())?;

        // A dropped sender means the scheduler discarded the job on exit
        rx.await.unwrap_or_else(|_| Err(self.shared.shutdown_error()))
    }

    /// Flush the whole buffer now, regardless of batch size
    ///
    /// Returns after every buffered job has been submitted once. Jobs whose
    /// batch failed stay parked for retry.
    pub async fn force_flush(&self) -> QueueResult<()> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Flush(tx))
            .map_err(|_| self.shared.shutdown_error())?;
        rx.await.map_err(|_| self.shared.shutdown_error())
    }

    /// Replace the configuration and restart the flush timer
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the config fails validation, or
    /// `Shutdown` if the queue is no longer running.
    pub async fn reconfigure(&self, config: WriteQueueConfig) -> QueueResult<()> {
        config.validate()?;
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Reconfigure(config, tx))
            .map_err(|_| self.shared.shutdown_error())?;
        rx.await.map_err(|_| self.shared.shutdown_error())
    }

    /// Stop the timer, flush once, and reject everything still pending
    ///
    /// Idempotent: later calls return immediately.
    pub async fn shutdown(&self) -> QueueResult<()> {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(target: "dualstore::queue", collection = %self.shared.collection, error = %e, "Write queue task failed");
            }
        }
        self.shared.shut_down.store(true, Ordering::Release);
        Ok(())
    }

    /// Return a snapshot of queue metrics
    pub fn stats(&self) -> QueueStats {
        let s = &self.shared;
        QueueStats {
            collection: s.collection.clone(),
            queue_length: s.queue_length.load(Ordering::Relaxed),
            retry_pending: s.retry_pending.load(Ordering::Relaxed),
            flushing: s.flushing.load(Ordering::Relaxed),
            config: s.config.read().clone(),
            batches_flushed: s.batches_flushed.load(Ordering::Relaxed),
            writes_completed: s.writes_completed.load(Ordering::Relaxed),
            writes_failed: s.writes_failed.load(Ordering::Relaxed),
        }
    }

    async fn write_direct(&self, record: VectorRecord) -> QueueResult<()> {
        let s = &self.shared;
        let result = self
            .driver
            .add(
                &s.collection,
                std::slice::from_ref(&record.id),
                std::slice::from_ref(&record.document),
                std::slice::from_ref(&record.metadata),
            )
            .await;
        s.batches_flushed.fetch_add(1, Ordering::Relaxed);
        match result {
            Ok(()) => {
                s.writes_completed.fetch_add(1, Ordering::Relaxed);
                debug!(target: "dualstore::queue", collection = %s.collection, id = %record.id, "Direct vector write");
                Ok(())
            }
            Err(e) => {
                s.writes_failed.fetch_add(1, Ordering::Relaxed);
                warn!(target: "dualstore::queue", collection = %s.collection, id = %record.id, error = %e, "Direct vector write failed");
                Err(QueueError::Driver(with_document(e, &record.id)))
            }
        }
    }
}

impl std::fmt::Debug for WriteQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteQueue")
            .field("collection", &self.shared.collection)
            .field("driver", &self.driver.name())
            .finish()
    }
}

fn with_document(error: DriverError, id: &str) -> DriverError {
    if error.document_id.is_none() {
        error.with_document(id)
    } else {
        error
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// How a flush treats a failed bulk call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushMode {
    /// Park failed jobs for retry while attempts remain
    Retry,
    /// Last pass before exit: failed jobs are rejected as shut down
    Final,
}

struct ParkedBatch {
    due: Instant,
    jobs: Vec<QueuedWrite>,
}

struct Scheduler {
    shared: Arc<QueueShared>,
    driver: Arc<dyn VectorSearchDriver>,
    commands: mpsc::UnboundedReceiver<Command>,
    buffer: VecDeque<QueuedWrite>,
    parked: Vec<ParkedBatch>,
    config: WriteQueueConfig,
}

fn new_ticker(config: &WriteQueueConfig) -> Interval {
    let period = config.flush_interval();
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

impl Scheduler {
    async fn run(mut self) {
        let mut ticker = new_ticker(&self.config);

        loop {
            let next_due = self.parked.iter().map(|p| p.due).min();
            let retry_at = next_due.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Enqueue(job)) => {
                        self.buffer.push_back(job);
                        self.sync_gauges();
                        if self.config.enabled {
                            while self.buffer.len() >= self.config.batch_size {
                                self.flush_once(FlushMode::Retry).await;
                            }
                        } else {
                            // Sent before batching was switched off
                            self.settle().await;
                        }
                    }
                    Some(Command::Flush(done)) => {
                        self.drain(FlushMode::Retry).await;
                        let _ = done.send(());
                    }
                    Some(Command::Reconfigure(config, done)) => {
                        self.apply_config(config).await;
                        ticker = new_ticker(&self.config);
                        let _ = done.send(());
                    }
                    Some(Command::Shutdown(done)) => {
                        self.finish().await;
                        let _ = done.send(());
                        return;
                    }
                    None => {
                        self.finish().await;
                        return;
                    }
                },
                _ = ticker.tick() => {
                    if !self.buffer.is_empty() {
                        debug!(target: "dualstore::queue", collection = %self.shared.collection, pending = self.buffer.len(), "Interval flush");
                        self.flush_once(FlushMode::Retry).await;
                    }
                }
                _ = time::sleep_until(retry_at), if next_due.is_some() => {
                    self.release_due();
                    self.flush_once(FlushMode::Retry).await;
                    while self.buffer.len() >= self.config.batch_size {
                        self.flush_once(FlushMode::Retry).await;
                    }
                }
            }
        }
    }

    fn sync_gauges(&self) {
        self.shared
            .queue_length
            .store(self.buffer.len(), Ordering::Relaxed);
        let parked: usize = self.parked.iter().map(|p| p.jobs.len()).sum();
        self.shared.retry_pending.store(parked, Ordering::Relaxed);
    }

    async fn apply_config(&mut self, config: WriteQueueConfig) {
        info!(
            target: "dualstore::queue",
            collection = %self.shared.collection,
            batch_size = config.batch_size,
            flush_interval_ms = config.flush_interval_ms,
            enabled = config.enabled,
            "Write queue reconfigured"
        );
        self.config = config.clone();
        if !self.config.enabled {
            self.settle().await;
        }
        // Callers switch to direct writes only once nothing is left here
        *self.shared.config.write() = config;
    }

    /// Flush the buffer and every parked retry to completion
    ///
    /// Backoff delays are waited out inline, so no other bulk call can start
    /// from this queue until every job has resolved.
    async fn settle(&mut self) {
        loop {
            self.drain(FlushMode::Retry).await;
            match self.parked.iter().map(|p| p.due).min() {
                Some(due) => {
                    time::sleep_until(due).await;
                    self.release_due();
                }
                None => break,
            }
        }
    }

    /// Move parked jobs whose delay has elapsed back to the buffer front
    fn release_due(&mut self) {
        let now = Instant::now();
        let mut released = Vec::new();
        let mut i = 0;
        while i < self.parked.len() {
            if self.parked[i].due <= now {
                released.extend(self.parked.swap_remove(i).jobs);
            } else {
                i += 1;
            }
        }
        released.sort_by_key(|job| job.sequence);
        for job in released.into_iter().rev() {
            self.buffer.push_front(job);
        }
        self.sync_gauges();
    }

    async fn drain(&mut self, mode: FlushMode) {
        while !self.buffer.is_empty() {
            self.flush_once(mode).await;
        }
    }

    /// Submit up to `batch_size` jobs as one bulk call
    async fn flush_once(&mut self, mode: FlushMode) {
        if self.buffer.is_empty() {
            return;
        }
        self.shared.flushing.store(true, Ordering::Relaxed);

        let take = self.config.batch_size.min(self.buffer.len());
        let batch: Vec<QueuedWrite> = self.buffer.drain(..take).collect();
        self.sync_gauges();

        let ids: Vec<String> = batch.iter().map(|j| j.id.clone()).collect();
        let documents: Vec<String> = batch.iter().map(|j| j.document.clone()).collect();
        let metadatas: Vec<VectorMetadata> = batch.iter().map(|j| j.metadata.clone()).collect();

        let result = self
            .driver
            .add(&self.shared.collection, &ids, &documents, &metadatas)
            .await;
        self.shared.batches_flushed.fetch_add(1, Ordering::Relaxed);

        match result {
            Ok(()) => {
                debug!(target: "dualstore::queue", collection = %self.shared.collection, batch = batch.len(), "Batch flushed");
                self.shared
                    .writes_completed
                    .fetch_add(batch.len() as u64, Ordering::Relaxed);
                for job in batch {
                    job.resolve();
                }
            }
            Err(e) => self.handle_failure(batch, e, mode),
        }

        self.sync_gauges();
        self.shared.flushing.store(false, Ordering::Relaxed);
    }

    fn handle_failure(&mut self, batch: Vec<QueuedWrite>, err: DriverError, mode: FlushMode) {
        warn!(
            target: "dualstore::queue",
            collection = %self.shared.collection,
            batch = batch.len(),
            error = %err,
            "Batch vector write failed"
        );

        let policy = self.config.retry_policy();
        let mut retry_groups: BTreeMap<u32, Vec<QueuedWrite>> = BTreeMap::new();
        for mut job in batch {
            job.retry_count += 1;
            if mode == FlushMode::Final {
                warn!(
                    target: "dualstore::queue",
                    collection = %self.shared.collection,
                    id = %job.id,
                    "Vector write dropped at shutdown"
                );
                self.shared.writes_failed.fetch_add(1, Ordering::Relaxed);
                job.reject(self.shared.shutdown_error());
            } else if job.retry_count < self.config.max_retries {
                retry_groups.entry(job.retry_count).or_default().push(job);
            } else {
                error!(
                    target: "dualstore::queue",
                    collection = %self.shared.collection,
                    id = %job.id,
                    attempts = job.retry_count,
                    "Vector write permanently failed"
                );
                self.shared.writes_failed.fetch_add(1, Ordering::Relaxed);
                let source = with_document(err.clone(), &job.id);
                let error = QueueError::RetriesExhausted {
                    collection: self.shared.collection.clone(),
                    id: job.id.clone(),
                    attempts: job.retry_count,
                    source,
                };
                job.reject(error);
            }
        }

        for (retry_count, jobs) in retry_groups {
            let delay = policy.delay_for(retry_count);
            debug!(
                target: "dualstore::queue",
                collection = %self.shared.collection,
                attempt = retry_count,
                jobs = jobs.len(),
                delay_ms = delay.as_millis() as u64,
                "Scheduling retry"
            );
            self.parked.push(ParkedBatch {
                due: Instant::now() + delay,
                jobs,
            });
        }
    }

    /// Final flush, then reject everything still pending
    async fn finish(&mut self) {
        info!(
            target: "dualstore::queue",
            collection = %self.shared.collection,
            pending = self.buffer.len(),
            "Write queue shutting down"
        );
        self.shared.shut_down.store(true, Ordering::Release);
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Enqueue(job) => self.buffer.push_back(job),
                Command::Flush(done) | Command::Reconfigure(_, done) | Command::Shutdown(done) => {
                    let _ = done.send(());
                }
            }
        }

        self.drain(FlushMode::Final).await;

        for parked in self.parked.drain(..) {
            for job in parked.jobs {
                self.shared.writes_failed.fetch_add(1, Ordering::Relaxed);
                job.reject(self.shared.shutdown_error());
            }
        }
        self.sync_gauges();
    }
}
