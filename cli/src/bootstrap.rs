//! Shared startup plumbing for every subcommand.

use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use parcelflow_core::store::{create_coord_store, create_kv_table, create_stream_bus};
use parcelflow_core::{Config, CoordStore, KvTable, StreamBus};

/// Initialize console logging at the requested level; `RUST_LOG` overrides.
pub fn init_tracing(level: &str) {
    let level = match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string())),
        )
        .init();
}

/// Handles to the three shared storage systems.
pub struct Backends {
    pub bus: Arc<dyn StreamBus>,
    pub kv: Arc<dyn KvTable>,
    pub coord: Arc<dyn CoordStore>,
}

/// Connect to the configured backends. A `--uri` flag on the command line
/// overrides the stream and kv endpoints from the config file.
pub fn connect(config: &Config, uri: Option<&str>) -> Result<Backends> {
    let mut stream_config = config.stream.clone();
    let mut kv_config = config.kv.clone();
    if let Some(uri) = uri {
        stream_config.uri = Some(uri.to_string());
        kv_config.uri = Some(uri.to_string());
    }

    Ok(Backends {
        bus: create_stream_bus(&stream_config)?,
        kv: create_kv_table(&kv_config)?,
        coord: create_coord_store(&config.coordination)?,
    })
}
