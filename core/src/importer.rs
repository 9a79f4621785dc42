//! Routes a JSON-lines event feed into the four per-center input streams.

use anyhow::{Context, Result};
use std::io::BufRead;
use std::sync::Arc;

use crate::event::{Center, ScanEvent};
use crate::names;
use crate::store::{ensure_stream, StreamBus};

/// Gap between the last real scan and the end-of-stream sentinels.
pub const END_OF_STREAM_GAP_SECS: i64 = 86_400;

pub struct EventImporter {
    bus: Arc<dyn StreamBus>,
    scope: String,
}

impl EventImporter {
    pub fn new(bus: Arc<dyn StreamBus>, scope: &str) -> Self {
        Self {
            bus,
            scope: scope.to_string(),
        }
    }

    /// Create the per-center input streams if needed.
    pub async fn create_streams(&self) -> Result<()> {
        self.bus.create_scope(&self.scope).await?;
        for center in Center::ALL {
            ensure_stream(self.bus.as_ref(), &self.scope, &names::input_stream(center)).await?;
        }
        Ok(())
    }

    /// Parse events line by line and fan them out by sorting center, using
    /// the package id as the partition key. After the input is exhausted,
    /// every center's stream gets an end-of-stream sentinel dated one day
    /// past the newest event seen.
    ///
    /// A line that fails to parse aborts the import: the feed comes from the
    /// simulator, so malformed data means an ingest bug, not noise.
    pub async fn import<R: BufRead>(&self, input: R) -> Result<u64> {
        self.create_streams().await?;

        let mut imported: u64 = 0;
        let mut newest_event_time: Option<i64> = None;
        for line in input.lines() {
            let line = line.context("failed reading import input")?;
            if line.trim().is_empty() {
                continue;
            }
            let event: ScanEvent = serde_json::from_str(&line)
                .with_context(|| format!("malformed import line: {line}"))?;
            tracing::trace!("{:?}", event);

            let payload = serde_json::to_vec(&event)?;
            self.bus
                .publish(
                    &self.scope,
                    &names::input_stream(event.sorting_center),
                    &event.package_id,
                    payload,
                )
                .await?;
            newest_event_time =
                Some(newest_event_time.map_or(event.event_time, |t| t.max(event.event_time)));
            imported += 1;
        }

        if let Some(newest) = newest_event_time {
            self.emit_end_of_stream(newest + END_OF_STREAM_GAP_SECS)
                .await?;
        }
        tracing::info!("imported {} events", imported);
        Ok(imported)
    }

    async fn emit_end_of_stream(&self, event_time: i64) -> Result<()> {
        for center in Center::ALL {
            let sentinel = ScanEvent::end_of_stream(center, event_time);
            let payload = serde_json::to_vec(&sentinel)?;
            self.bus
                .publish(
                    &self.scope,
                    &names::input_stream(center),
                    names::END_OF_STREAM_PACKAGE_ID,
                    payload,
                )
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{NextHop, ScanKind, ScannerId};
    use crate::store::{EventStream, MemoryBus};
    use std::io::Cursor;
    use std::time::Duration;

    fn routing_line(event_time: i64, center: Center, package_id: &str) -> String {
        let event = ScanEvent {
            event_time,
            sorting_center: center,
            package_id: package_id.into(),
            kind: ScanKind::Transit {
                scanner: ScannerId::Routing,
                next: Some(NextHop {
                    scanner: ScannerId::Output,
                    expected_at: event_time + 600,
                }),
            },
        };
        serde_json::to_string(&event).unwrap()
    }

    async fn read_all(bus: &MemoryBus, center: Center) -> Vec<ScanEvent> {
        let mut stream = EventStream::open(
            bus,
            "s",
            &names::input_stream(center),
            Duration::from_millis(5),
            false,
        )
        .await
        .unwrap();
        let mut events = Vec::new();
        while let Some(payload) = stream.next_event().await.unwrap() {
            events.push(serde_json::from_slice(&payload).unwrap());
        }
        events
    }

    #[tokio::test]
    async fn routes_by_center_and_appends_sentinels() {
        let bus = Arc::new(MemoryBus::new());
        let importer = EventImporter::new(bus.clone(), "s");
        let input = [
            routing_line(100, Center::A, "1"),
            routing_line(900, Center::B, "2"),
            routing_line(500, Center::A, "3"),
        ]
        .join("\n");

        assert_eq!(importer.import(Cursor::new(input)).await.unwrap(), 3);

        let at_a = read_all(&bus, Center::A).await;
        assert_eq!(at_a.len(), 3);
        assert_eq!(at_a[0].package_id, "1");
        assert_eq!(at_a[1].package_id, "3");
        assert!(at_a[2].is_end_of_stream());
        // sentinel lands one day after the newest event anywhere
        assert_eq!(at_a[2].event_time, 900 + END_OF_STREAM_GAP_SECS);

        let at_c = read_all(&bus, Center::C).await;
        assert_eq!(at_c.len(), 1);
        assert!(at_c[0].is_end_of_stream());
    }

    #[tokio::test]
    async fn malformed_line_aborts_the_import() {
        let bus = Arc::new(MemoryBus::new());
        let importer = EventImporter::new(bus, "s");
        let input = format!("{}\nnot json\n", routing_line(100, Center::A, "1"));
        let err = importer.import(Cursor::new(input)).await.unwrap_err();
        assert!(err.to_string().contains("malformed import line"));
    }

    #[tokio::test]
    async fn empty_input_emits_no_sentinels() {
        let bus = Arc::new(MemoryBus::new());
        let importer = EventImporter::new(bus.clone(), "s");
        assert_eq!(importer.import(Cursor::new("")).await.unwrap(), 0);
        assert!(read_all(&bus, Center::A).await.is_empty());
    }
}
