//! Dual-Write Integration Tests
//!
//! End-to-end behavior of the dual store over the memory drivers:
//! - Scenarios: queue batching, retry, direct writes, strict escalation,
//!   repair of unknown ids
//! - Consistency: status recording, reports, idempotent repair
//! - Lifecycle: reconnects, cleanup, configuration

#[path = "../common/mod.rs"]
mod common;

mod consistency;
mod lifecycle;
mod scenarios;
