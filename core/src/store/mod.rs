mod coord;
mod kv;
mod memory;
mod stream;

pub use coord::{CoordStore, ScoredMember};
pub use kv::{ensure_table, KvTable};
pub use memory::{MemoryBus, MemoryCoord, MemoryKv};
pub use stream::{ensure_stream, EventStream, ReadOutcome, StreamBus, StreamReader};

use crate::config::{CoordinationConfig, KvConfig, StreamConfig};
use anyhow::Result;
use std::sync::Arc;

/// Failures surfaced by the storage adapters, grouped by how callers should
/// react rather than by backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Worth retrying on the caller's normal cadence.
    #[error("transient {0} failure: {1}")]
    Transient(&'static str, String),

    /// The named scope, stream, or table has not been created.
    #[error("{kind} {name} does not exist")]
    Missing { kind: &'static str, name: String },
}

impl StoreError {
    pub fn missing(kind: &'static str, name: impl Into<String>) -> Self {
        StoreError::Missing {
            kind,
            name: name.into(),
        }
    }
}

/// Create a stream bus based on the configuration.
pub fn create_stream_bus(config: &StreamConfig) -> Result<Arc<dyn StreamBus>> {
    match config.backend.as_str() {
        "memory" => {
            tracing::info!("stream backend: in-memory (single process, no durability)");
            Ok(Arc::new(MemoryBus::new()))
        }
        "pravega" => {
            anyhow::bail!("pravega stream backend not yet implemented; use the memory backend")
        }
        other => anyhow::bail!("unknown stream backend: {}", other),
    }
}

/// Create a key-value table client based on the configuration.
pub fn create_kv_table(config: &KvConfig) -> Result<Arc<dyn KvTable>> {
    match config.backend.as_str() {
        "memory" => {
            tracing::info!("kv backend: in-memory (single process, no durability)");
            Ok(Arc::new(MemoryKv::new()))
        }
        "pravega" => {
            anyhow::bail!("pravega kv backend not yet implemented; use the memory backend")
        }
        other => anyhow::bail!("unknown kv backend: {}", other),
    }
}

/// Create a coordination store based on the configuration.
pub fn create_coord_store(config: &CoordinationConfig) -> Result<Arc<dyn CoordStore>> {
    match config.backend.as_str() {
        "memory" => {
            tracing::info!("coordination backend: in-memory (single process)");
            Ok(Arc::new(MemoryCoord::new()))
        }
        "redis" => {
            anyhow::bail!("redis coordination backend not yet implemented; use the memory backend")
        }
        other => anyhow::bail!("unknown coordination backend: {}", other),
    }
}
