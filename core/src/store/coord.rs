use anyhow::Result;
use async_trait::async_trait;

/// A sorted-set member with its score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredMember {
    pub member: String,
    pub score: i64,
}

/// Shared cross-worker state surface: sorted sets, hashes, and plain sets.
///
/// Every operation is atomic on its own; the pipeline never needs a
/// multi-key transaction.
#[async_trait]
pub trait CoordStore: Send + Sync {
    async fn zadd(&self, key: &str, score: i64, member: &str) -> Result<()>;

    async fn zrem(&self, key: &str, members: &[String]) -> Result<()>;

    /// Members with `min <= score <= max`, ascending by score.
    async fn zrange_by_score(&self, key: &str, min: i64, max: i64) -> Result<Vec<ScoredMember>>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;

    async fn hdel(&self, key: &str, field: &str) -> Result<()>;

    /// Returns whether the member was newly added.
    async fn sadd(&self, key: &str, member: &str) -> Result<bool>;

    async fn srem(&self, key: &str, member: &str) -> Result<()>;

    async fn smembers(&self, key: &str) -> Result<Vec<String>>;

    async fn del(&self, key: &str) -> Result<()>;
}
