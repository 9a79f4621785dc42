use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Result of one bounded read attempt against a stream.
#[derive(Debug)]
pub enum ReadOutcome {
    Event(Vec<u8>),
    /// The timeout elapsed without a record arriving.
    Idle,
}

/// Append-only, per-key-partitioned log of opaque payloads.
///
/// Records published with the same partition key are totally ordered; that
/// is the only ordering guarantee the pipeline relies on.
#[async_trait]
pub trait StreamBus: Send + Sync {
    /// Idempotent; returns whether the scope was newly created.
    async fn create_scope(&self, scope: &str) -> Result<bool>;

    /// Idempotent; returns whether the stream was newly created.
    async fn create_stream(&self, scope: &str, stream: &str) -> Result<bool>;

    async fn publish(
        &self,
        scope: &str,
        stream: &str,
        partition_key: &str,
        payload: Vec<u8>,
    ) -> Result<()>;

    /// Open a fresh reader positioned at the start of the stream.
    async fn open_reader(
        &self,
        scope: &str,
        stream: &str,
        reader_name: &str,
    ) -> Result<Box<dyn StreamReader>>;

    /// Drop every stream in the scope.
    async fn purge_scope(&self, scope: &str) -> Result<()>;
}

#[async_trait]
pub trait StreamReader: Send {
    /// Wait up to `timeout` for the next record.
    async fn read_next(&mut self, timeout: Duration) -> Result<ReadOutcome>;

    /// Whether records remain beyond this reader's position.
    async fn unread(&self) -> Result<bool>;
}

/// Create the scope and stream if needed, logging the outcome.
pub async fn ensure_stream(bus: &dyn StreamBus, scope: &str, stream: &str) -> Result<()> {
    bus.create_scope(scope).await?;
    let created = bus.create_stream(scope, stream).await?;
    tracing::debug!(
        "stream {}/{} {}",
        scope,
        stream,
        if created { "created" } else { "already exists" }
    );
    Ok(())
}

/// Iterates a stream's payloads, probing for drain on every read timeout.
///
/// A quiet timeout ends the iteration once the stream reports no unread
/// records, unless `wait_for_events` is set and nothing has been read yet,
/// in which case the reader keeps retrying until the first record arrives.
pub struct EventStream {
    reader: Box<dyn StreamReader>,
    read_timeout: Duration,
    wait_for_events: bool,
    have_read: bool,
}

impl EventStream {
    pub async fn open(
        bus: &dyn StreamBus,
        scope: &str,
        stream: &str,
        read_timeout: Duration,
        wait_for_events: bool,
    ) -> Result<Self> {
        let reader_name = uuid::Uuid::new_v4().simple().to_string();
        let reader = bus.open_reader(scope, stream, &reader_name).await?;
        Ok(Self {
            reader,
            read_timeout,
            wait_for_events,
            have_read: false,
        })
    }

    pub async fn next_event(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            match self.reader.read_next(self.read_timeout).await? {
                ReadOutcome::Event(payload) => {
                    self.have_read = true;
                    return Ok(Some(payload));
                }
                ReadOutcome::Idle => {
                    if self.reader.unread().await? {
                        // still more to read, retry
                        continue;
                    }
                    if !self.have_read && self.wait_for_events {
                        tracing::debug!("waiting for events");
                        continue;
                    }
                    tracing::debug!("all events have been read");
                    return Ok(None);
                }
            }
        }
    }
}
