use anyhow::{Context, Result};
use std::sync::Arc;

use crate::event::ScanEvent;
use crate::names;
use crate::records::TrackedScan;
use crate::store::KvTable;

/// Records public-scanner events into the customer-visible tracking table.
///
/// Entries are deduplicated by event time, which makes replaying the input
/// stream a no-op for this stage.
pub struct PublicTracking {
    kv: Arc<dyn KvTable>,
    scope: String,
}

impl PublicTracking {
    pub fn new(kv: Arc<dyn KvTable>, scope: &str) -> Self {
        Self {
            kv,
            scope: scope.to_string(),
        }
    }

    pub async fn apply(&mut self, event: &ScanEvent) -> Result<()> {
        if !event.scanner().is_public() || event.is_end_of_stream() {
            return Ok(());
        }

        let mut scans: Vec<TrackedScan> = match self
            .kv
            .get(&self.scope, names::PACKAGE_EVENTS_TABLE, &event.package_id)
            .await?
        {
            Some(bytes) => {
                serde_json::from_slice(&bytes).context("malformed package-events record")?
            }
            None => Vec::new(),
        };

        if scans.iter().any(|scan| scan.event_time == event.event_time) {
            return Ok(());
        }

        scans.push(TrackedScan {
            event_time: event.event_time,
            sorting_center: event.sorting_center,
            scanner_id: event.scanner(),
        });
        scans.sort_by_key(|scan| scan.event_time);

        let bytes = serde_json::to_vec(&scans)?;
        self.kv
            .put(&self.scope, names::PACKAGE_EVENTS_TABLE, &event.package_id, bytes)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Center, NextHop, ScanKind, ScannerId};
    use crate::store::MemoryKv;

    fn event(event_time: i64, center: Center, kind: ScanKind) -> ScanEvent {
        ScanEvent {
            event_time,
            sorting_center: center,
            package_id: "1".into(),
            kind,
        }
    }

    fn intake(event_time: i64) -> ScanEvent {
        event(
            event_time,
            Center::A,
            ScanKind::Intake {
                next: NextHop {
                    scanner: ScannerId::Weighing,
                    expected_at: event_time + 120,
                },
                destination: Center::B,
                declared_value: 10,
                estimated_delivery_time: 99_000,
            },
        )
    }

    async fn stored(kv: &MemoryKv) -> Vec<TrackedScan> {
        match kv.get("s", names::PACKAGE_EVENTS_TABLE, "1").await.unwrap() {
            Some(bytes) => serde_json::from_slice(&bytes).unwrap(),
            None => Vec::new(),
        }
    }

    #[tokio::test]
    async fn only_public_scanners_are_tracked() {
        let kv = Arc::new(MemoryKv::new());
        let mut tracking = PublicTracking::new(kv.clone(), "s");

        tracking.apply(&intake(100)).await.unwrap();
        tracking
            .apply(&event(
                200,
                Center::A,
                ScanKind::Transit {
                    scanner: ScannerId::Routing,
                    next: None,
                },
            ))
            .await
            .unwrap();
        tracking
            .apply(&event(300, Center::A, ScanKind::Output))
            .await
            .unwrap();

        let scans = stored(&kv).await;
        assert_eq!(scans.len(), 2);
        assert_eq!(scans[0].scanner_id, ScannerId::Intake);
        assert_eq!(scans[1].scanner_id, ScannerId::Output);
    }

    #[tokio::test]
    async fn entries_stay_sorted_by_event_time() {
        let kv = Arc::new(MemoryKv::new());
        let mut tracking = PublicTracking::new(kv.clone(), "s");

        // the destination's receiving scan can land before the origin's
        // handoff is processed
        tracking
            .apply(&event(
                500,
                Center::B,
                ScanKind::Transit {
                    scanner: ScannerId::Receiving,
                    next: None,
                },
            ))
            .await
            .unwrap();
        tracking.apply(&intake(100)).await.unwrap();

        let scans = stored(&kv).await;
        assert_eq!(scans[0].event_time, 100);
        assert_eq!(scans[1].event_time, 500);
    }

    #[tokio::test]
    async fn replay_produces_the_identical_record() {
        let kv = Arc::new(MemoryKv::new());
        let mut tracking = PublicTracking::new(kv.clone(), "s");
        let events = vec![
            intake(100),
            event(300, Center::A, ScanKind::Output),
        ];

        for e in &events {
            tracking.apply(e).await.unwrap();
        }
        let first_pass = kv.get("s", names::PACKAGE_EVENTS_TABLE, "1").await.unwrap();

        for e in &events {
            tracking.apply(e).await.unwrap();
        }
        let second_pass = kv.get("s", names::PACKAGE_EVENTS_TABLE, "1").await.unwrap();

        assert_eq!(first_pass, second_pass);
        assert_eq!(stored(&kv).await.len(), 2);
    }

    #[tokio::test]
    async fn sentinel_is_ignored() {
        let kv = Arc::new(MemoryKv::new());
        let mut tracking = PublicTracking::new(kv.clone(), "s");
        tracking
            .apply(&ScanEvent::end_of_stream(Center::A, 999))
            .await
            .unwrap();
        assert!(stored(&kv).await.is_empty());
    }
}
