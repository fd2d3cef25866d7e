//! Write queue for dualstore
//!
//! Decouples vector-store writes from the caller's insert path:
//! - WriteQueue: per-collection batching buffer with bounded exponential retry
//! - QueueRegistry: one queue per collection, owned by the composition root
//! - QueuedWrite: a pending job and its completion channel

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod job;
pub mod queue;
pub mod registry;

#[cfg(test)]
mod test_support;

pub use job::QueuedWrite;
pub use queue::{QueueStats, WriteQueue};
pub use registry::QueueRegistry;
