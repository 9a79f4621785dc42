//! Single-process in-memory backends for the three storage adapters.
//!
//! The bus keeps each stream as an append-only record vector; appending
//! under one lock gives a total order, which trivially satisfies the
//! per-partition-key FIFO guarantee the pipeline consumes.

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

use super::coord::{CoordStore, ScoredMember};
use super::kv::KvTable;
use super::stream::{ReadOutcome, StreamBus, StreamReader};
use super::StoreError;

#[derive(Default)]
struct StreamState {
    records: Mutex<Vec<Vec<u8>>>,
    arrivals: Notify,
}

type Scope = DashMap<String, Arc<StreamState>>;

/// In-memory stream bus.
#[derive(Default)]
pub struct MemoryBus {
    scopes: DashMap<String, Scope>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn stream(&self, scope: &str, stream: &str) -> Result<Arc<StreamState>> {
        let scope_entry = self
            .scopes
            .get(scope)
            .ok_or_else(|| StoreError::missing("scope", scope))?;
        let state = scope_entry
            .get(stream)
            .ok_or_else(|| StoreError::missing("stream", format!("{scope}/{stream}")))?;
        Ok(Arc::clone(&state))
    }
}

#[async_trait]
impl StreamBus for MemoryBus {
    async fn create_scope(&self, scope: &str) -> Result<bool> {
        let created = !self.scopes.contains_key(scope);
        self.scopes.entry(scope.to_string()).or_default();
        Ok(created)
    }

    async fn create_stream(&self, scope: &str, stream: &str) -> Result<bool> {
        let scope_entry = self
            .scopes
            .get(scope)
            .ok_or_else(|| StoreError::missing("scope", scope))?;
        let created = !scope_entry.contains_key(stream);
        scope_entry.entry(stream.to_string()).or_default();
        Ok(created)
    }

    async fn publish(
        &self,
        scope: &str,
        stream: &str,
        _partition_key: &str,
        payload: Vec<u8>,
    ) -> Result<()> {
        let state = self.stream(scope, stream)?;
        state.records.lock().await.push(payload);
        state.arrivals.notify_waiters();
        Ok(())
    }

    async fn open_reader(
        &self,
        scope: &str,
        stream: &str,
        _reader_name: &str,
    ) -> Result<Box<dyn StreamReader>> {
        let state = self.stream(scope, stream)?;
        Ok(Box::new(MemoryReader { state, position: 0 }))
    }

    async fn purge_scope(&self, scope: &str) -> Result<()> {
        self.scopes.remove(scope);
        Ok(())
    }
}

struct MemoryReader {
    state: Arc<StreamState>,
    position: usize,
}

#[async_trait]
impl StreamReader for MemoryReader {
    async fn read_next(&mut self, timeout: Duration) -> Result<ReadOutcome> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let records = self.state.records.lock().await;
                if self.position < records.len() {
                    let payload = records[self.position].clone();
                    self.position += 1;
                    return Ok(ReadOutcome::Event(payload));
                }
            }
            let arrival = self.state.arrivals.notified();
            if tokio::time::timeout_at(deadline, arrival).await.is_err() {
                return Ok(ReadOutcome::Idle);
            }
        }
    }

    async fn unread(&self) -> Result<bool> {
        Ok(self.position < self.state.records.lock().await.len())
    }
}

/// In-memory key-value tables, keyed by `scope/table`.
#[derive(Default)]
pub struct MemoryKv {
    tables: DashMap<String, DashMap<String, Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn table_key(scope: &str, table: &str) -> String {
        format!("{scope}/{table}")
    }
}

#[async_trait]
impl KvTable for MemoryKv {
    async fn create_table(&self, scope: &str, table: &str) -> Result<bool> {
        let key = Self::table_key(scope, table);
        let created = !self.tables.contains_key(&key);
        self.tables.entry(key).or_default();
        Ok(created)
    }

    async fn get(&self, scope: &str, table: &str, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .tables
            .get(&Self::table_key(scope, table))
            .and_then(|t| t.get(key).map(|v| v.value().clone())))
    }

    async fn put(&self, scope: &str, table: &str, key: &str, value: Vec<u8>) -> Result<()> {
        self.tables
            .entry(Self::table_key(scope, table))
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, scope: &str, table: &str, key: &str) -> Result<()> {
        if let Some(t) = self.tables.get(&Self::table_key(scope, table)) {
            t.remove(key);
        }
        Ok(())
    }

    async fn clear(&self, scope: &str, table: &str) -> Result<()> {
        if let Some(t) = self.tables.get(&Self::table_key(scope, table)) {
            t.clear();
        }
        Ok(())
    }
}

#[derive(Default)]
struct CoordState {
    zsets: HashMap<String, HashMap<String, i64>>,
    hashes: HashMap<String, HashMap<String, String>>,
    sets: HashMap<String, HashSet<String>>,
}

/// In-memory coordination store; one lock makes every operation atomic.
#[derive(Default)]
pub struct MemoryCoord {
    state: Mutex<CoordState>,
}

impl MemoryCoord {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CoordStore for MemoryCoord {
    async fn zadd(&self, key: &str, score: i64, member: &str) -> Result<()> {
        self.state
            .lock()
            .await
            .zsets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn zrem(&self, key: &str, members: &[String]) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(zset) = state.zsets.get_mut(key) {
            for member in members {
                zset.remove(member);
            }
        }
        Ok(())
    }

    async fn zrange_by_score(&self, key: &str, min: i64, max: i64) -> Result<Vec<ScoredMember>> {
        let state = self.state.lock().await;
        let mut members: Vec<ScoredMember> = state
            .zsets
            .get(key)
            .map(|zset| {
                zset.iter()
                    .filter(|(_, &score)| min <= score && score <= max)
                    .map(|(member, &score)| ScoredMember {
                        member: member.clone(),
                        score,
                    })
                    .collect()
            })
            .unwrap_or_default();
        members.sort_by(|a, b| (a.score, &a.member).cmp(&(b.score, &b.member)));
        Ok(members)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.state
            .lock()
            .await
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self
            .state
            .lock()
            .await
            .hashes
            .get(key)
            .and_then(|h| h.get(field).cloned()))
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(hash) = state.hashes.get_mut(key) {
            hash.remove(field);
        }
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .await
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn srem(&self, key: &str, member: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(set) = state.sets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        let mut members: Vec<String> = state
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        Ok(members)
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.zsets.remove(key);
        state.hashes.remove(key);
        state.sets.remove(key);
        Ok(())
    }
}
