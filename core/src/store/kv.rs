use anyhow::Result;
use async_trait::async_trait;

/// Keyed record store with per-key get/put/delete.
///
/// There are no transactions; callers use read-modify-write per key and
/// accept last-writer-wins, which is safe because package-id partitioning
/// means one pipeline worker writes a given key at a time.
#[async_trait]
pub trait KvTable: Send + Sync {
    /// Idempotent; returns whether the table was newly created.
    async fn create_table(&self, scope: &str, table: &str) -> Result<bool>;

    async fn get(&self, scope: &str, table: &str, key: &str) -> Result<Option<Vec<u8>>>;

    async fn put(&self, scope: &str, table: &str, key: &str, value: Vec<u8>) -> Result<()>;

    async fn delete(&self, scope: &str, table: &str, key: &str) -> Result<()>;

    /// Remove every entry in the table.
    async fn clear(&self, scope: &str, table: &str) -> Result<()>;
}

/// Create the table if needed, logging the outcome.
pub async fn ensure_table(kv: &dyn KvTable, scope: &str, table: &str) -> Result<()> {
    let created = kv.create_table(scope, table).await?;
    tracing::debug!(
        "kvt table {}/{} {}",
        scope,
        table,
        if created { "created" } else { "already exists" }
    );
    Ok(())
}
