//! Operator maintenance: wipe shared state so a run starts fresh.

use anyhow::Result;

use crate::names;
use crate::store::{CoordStore, KvTable, StreamBus};

/// Drop every stream in the scope.
pub async fn purge_streams(bus: &dyn StreamBus, scope: &str) -> Result<()> {
    bus.purge_scope(scope).await?;
    tracing::info!("purged streams in scope {}", scope);
    Ok(())
}

/// Empty both shared package tables.
pub async fn purge_tables(kv: &dyn KvTable, scope: &str) -> Result<()> {
    for table in [names::PACKAGE_ATTRIBUTES_TABLE, names::PACKAGE_EVENTS_TABLE] {
        kv.clear(scope, table).await?;
    }
    tracing::info!("purged kv tables in scope {}", scope);
    Ok(())
}

/// Delete every coordination key the pipeline writes.
pub async fn purge_coordination(coord: &dyn CoordStore) -> Result<()> {
    for key in names::ALL_COORDINATION_KEYS {
        coord.del(key).await?;
    }
    tracing::info!("purged coordination keys");
    Ok(())
}
