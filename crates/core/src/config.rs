//! Configuration via `dualstore.toml`
//!
//! A single [`DualStoreConfig`] holds process-wide defaults (dual write on or
//! off, consistency level, write queue settings) and optional per-collection
//! overrides. Environment variables can override the two process-level
//! switches:
//!
//! - `DUALSTORE_DUAL_WRITE` = `true` | `false`
//! - `DUALSTORE_CONSISTENCY` = `eventual` | `strict`

use crate::error::{DualStoreError, DualStoreResult, QueueError, QueueResult};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Config file name looked up by `DualStoreConfig::discover`
pub const CONFIG_FILE_NAME: &str = "dualstore.toml";

/// Environment variable overriding `dual_write`
pub const ENV_DUAL_WRITE: &str = "DUALSTORE_DUAL_WRITE";

/// Environment variable overriding `consistency`
pub const ENV_CONSISTENCY: &str = "DUALSTORE_CONSISTENCY";

// ============================================================================
// Consistency level
// ============================================================================

/// Whether a vector-store failure fails the overall insert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyLevel {
    /// Vector failures are recorded and logged; the insert still succeeds
    #[default]
    Eventual,
    /// Vector failures fail the insert after the primary write has committed
    Strict,
}

impl ConsistencyLevel {
    /// Human-readable name for display
    pub fn name(&self) -> &'static str {
        match self {
            ConsistencyLevel::Eventual => "eventual",
            ConsistencyLevel::Strict => "strict",
        }
    }

    /// Parse from string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "eventual" => Some(ConsistencyLevel::Eventual),
            "strict" => Some(ConsistencyLevel::Strict),
            _ => None,
        }
    }
}

// ============================================================================
// Write queue config
// ============================================================================

/// Settings for one write queue instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteQueueConfig {
    /// Maximum jobs per bulk call
    pub batch_size: usize,
    /// Periodic flush cadence in milliseconds
    pub flush_interval_ms: u64,
    /// Bulk calls a job may take part in before it is rejected
    pub max_retries: u32,
    /// Base retry delay in milliseconds, doubled per attempt
    pub retry_delay_ms: u64,
    /// Upper bound for a single retry delay in milliseconds
    pub max_retry_delay_ms: u64,
    /// Add random jitter to retry delays
    pub jitter: bool,
    /// When false, every write goes straight to the vector store
    pub enabled: bool,
}

impl Default for WriteQueueConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            flush_interval_ms: 1_000,
            max_retries: 3,
            retry_delay_ms: 1_000,
            max_retry_delay_ms: 30_000,
            jitter: true,
            enabled: true,
        }
    }
}

impl WriteQueueConfig {
    /// Config that bypasses batching
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Set batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set flush interval
    pub fn with_flush_interval_ms(mut self, ms: u64) -> Self {
        self.flush_interval_ms = ms;
        self
    }

    /// Set maximum retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set base retry delay
    pub fn with_retry_delay_ms(mut self, ms: u64) -> Self {
        self.retry_delay_ms = ms;
        self
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Enable or disable batching
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Flush interval as a `Duration`
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Backoff schedule for failed batches
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay_ms: self.retry_delay_ms,
            max_delay_ms: self.max_retry_delay_ms.max(self.retry_delay_ms),
            jitter: self.jitter,
        }
    }

    /// Validate the settings
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a zero batch size or flush interval.
    pub fn validate(&self) -> QueueResult<()> {
        if self.batch_size == 0 {
            return Err(QueueError::InvalidConfig {
                message: "batch_size must be > 0".to_string(),
            });
        }
        if self.flush_interval_ms == 0 {
            return Err(QueueError::InvalidConfig {
                message: "flush_interval_ms must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Collection overrides
// ============================================================================

/// Per-collection overrides; unset fields inherit the process defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Override for `dual_write`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dual_write: Option<bool>,
    /// Override for `consistency`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consistency: Option<ConsistencyLevel>,
    /// Replacement queue settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<WriteQueueConfig>,
}

/// Effective settings of one collection after applying overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCollectionConfig {
    /// Whether inserts also write the vector projection
    pub dual_write: bool,
    /// Failure policy for the vector write
    pub consistency: ConsistencyLevel,
    /// Write queue settings
    pub queue: WriteQueueConfig,
}

// ============================================================================
// DualStoreConfig
// ============================================================================

/// Process-level configuration loaded from `dualstore.toml`
///
/// # Example
///
/// ```toml
/// dual_write = true
/// consistency = "eventual"
///
/// [queue]
/// batch_size = 10
/// flush_interval_ms = 1000
///
/// [collections.audit_log]
/// consistency = "strict"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DualStoreConfig {
    /// Write the vector projection on insert
    pub dual_write: bool,
    /// Default failure policy for vector writes
    pub consistency: ConsistencyLevel,
    /// Default queue settings
    pub queue: WriteQueueConfig,
    /// Attempts made by `retry_vector_write` when the caller gives none
    pub repair_max_retries: u32,
    /// Per-collection overrides keyed by collection name
    pub collections: BTreeMap<String, CollectionConfig>,
}

impl Default for DualStoreConfig {
    fn default() -> Self {
        Self {
            dual_write: true,
            consistency: ConsistencyLevel::Eventual,
            queue: WriteQueueConfig::default(),
            repair_max_retries: 3,
            collections: BTreeMap::new(),
        }
    }
}

impl DualStoreConfig {
    /// Effective settings for a collection
    pub fn resolve(&self, collection: &str) -> ResolvedCollectionConfig {
        let overrides = self.collections.get(collection);
        ResolvedCollectionConfig {
            dual_write: overrides
                .and_then(|c| c.dual_write)
                .unwrap_or(self.dual_write),
            consistency: overrides
                .and_then(|c| c.consistency)
                .unwrap_or(self.consistency),
            queue: overrides
                .and_then(|c| c.queue.clone())
                .unwrap_or_else(|| self.queue.clone()),
        }
    }

    /// Add or replace a collection override
    pub fn with_collection(mut self, name: impl Into<String>, config: CollectionConfig) -> Self {
        self.collections.insert(name.into(), config);
        self
    }

    /// Validate the default and per-collection queue settings
    ///
    /// # Errors
    ///
    /// Returns a `Config` error naming the offending section.
    pub fn validate(&self) -> DualStoreResult<()> {
        self.queue
            .validate()
            .map_err(|e| DualStoreError::config(format!("[queue]: {}", e)))?;
        for (name, collection) in &self.collections {
            if let Some(queue) = &collection.queue {
                queue.validate().map_err(|e| {
                    DualStoreError::config(format!("[collections.{}.queue]: {}", name, e))
                })?;
            }
        }
        Ok(())
    }

    /// Parse from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or fails validation.
    pub fn from_toml_str(content: &str) -> DualStoreResult<Self> {
        let config: DualStoreConfig = toml::from_str(content)
            .map_err(|e| DualStoreError::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> DualStoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DualStoreError::config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load `dualstore.toml` from a directory, falling back to defaults
    ///
    /// Environment overrides are applied in both cases.
    pub fn discover(dir: &Path) -> DualStoreResult<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `DUALSTORE_*` overrides read through `lookup`
    ///
    /// # Errors
    ///
    /// Returns a `Config` error for unparseable values.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> DualStoreResult<()> {
        if let Some(raw) = lookup(ENV_DUAL_WRITE) {
            self.dual_write = match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(DualStoreError::config(format!(
                        "Invalid {} value '{}'",
                        ENV_DUAL_WRITE, other
                    )))
                }
            };
        }
        if let Some(raw) = lookup(ENV_CONSISTENCY) {
            self.consistency = ConsistencyLevel::parse(&raw).ok_or_else(|| {
                DualStoreError::config(format!(
                    "Invalid {} value '{}'. Expected \"eventual\" or \"strict\".",
                    ENV_CONSISTENCY, raw
                ))
            })?;
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# dualstore configuration
#
# Write the vector projection of every insert (default: true).
# Overridden by DUALSTORE_DUAL_WRITE.
dual_write = true

# Vector write failure policy: "eventual" (default) or "strict"
#   "eventual" = record the failure on the primary record, insert succeeds
#   "strict"   = insert fails after the primary write has committed
# Overridden by DUALSTORE_CONSISTENCY.
consistency = "eventual"

# Attempts made by a manual vector write repair.
repair_max_retries = 3

[queue]
batch_size = 10
flush_interval_ms = 1000
max_retries = 3
retry_delay_ms = 1000
max_retry_delay_ms = 30000
jitter = true
enabled = true

# Per-collection overrides:
# [collections.audit_log]
# consistency = "strict"
# dual_write = true
"#
    }
}
