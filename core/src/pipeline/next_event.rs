use anyhow::Result;
use std::sync::Arc;

use crate::event::ScanEvent;
use crate::names;
use crate::store::CoordStore;

/// Maintains the shared next-expected-event indexes.
///
/// A package appears in the sorted set exactly while it has an outstanding
/// un-scanned next event; the scanner hash is updated in lockstep. Any
/// fresh signal clears a prior lateness marker.
pub struct NextEventIndex {
    coord: Arc<dyn CoordStore>,
}

impl NextEventIndex {
    pub fn new(coord: Arc<dyn CoordStore>) -> Self {
        Self { coord }
    }

    pub async fn apply(&mut self, event: &ScanEvent) -> Result<()> {
        if event.is_end_of_stream() {
            return Ok(());
        }

        let package_id = event.package_id.as_str();
        match event.next() {
            Some(next) => {
                self.coord
                    .zadd(names::NEXT_EVENT_KEY, next.expected_at, package_id)
                    .await?;
                let center = event.next_center().unwrap_or(event.sorting_center);
                self.coord
                    .hset(
                        names::NEXT_SCANNER_KEY,
                        package_id,
                        &format!("{}/{}", center, next.scanner),
                    )
                    .await?;
                self.coord.srem(names::LATE_PACKAGES_KEY, package_id).await?;
            }
            None => {
                self.coord
                    .zrem(names::NEXT_EVENT_KEY, &[package_id.to_string()])
                    .await?;
                self.coord.hdel(names::NEXT_SCANNER_KEY, package_id).await?;
                self.coord.srem(names::LATE_PACKAGES_KEY, package_id).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Center, NextHop, ScanKind, ScannerId};
    use crate::store::MemoryCoord;

    fn routing(package_id: &str, next: Option<(ScannerId, i64)>) -> ScanEvent {
        ScanEvent {
            event_time: 100,
            sorting_center: Center::A,
            package_id: package_id.into(),
            kind: ScanKind::Transit {
                scanner: ScannerId::Routing,
                next: next.map(|(scanner, expected_at)| NextHop {
                    scanner,
                    expected_at,
                }),
            },
        }
    }

    fn handoff(package_id: &str, destination: Center, expected_at: i64) -> ScanEvent {
        ScanEvent {
            event_time: 100,
            sorting_center: Center::A,
            package_id: package_id.into(),
            kind: ScanKind::Handoff {
                scanner: ScannerId::HoldingAt(destination),
                next_center: destination,
                next: NextHop {
                    scanner: ScannerId::Receiving,
                    expected_at,
                },
            },
        }
    }

    #[tokio::test]
    async fn registers_and_clears_in_lockstep() {
        let coord = Arc::new(MemoryCoord::new());
        let mut index = NextEventIndex::new(coord.clone());

        index
            .apply(&routing("7", Some((ScannerId::Output, 900))))
            .await
            .unwrap();
        let range = coord
            .zrange_by_score(names::NEXT_EVENT_KEY, 0, i64::MAX)
            .await
            .unwrap();
        assert_eq!(range.len(), 1);
        assert_eq!(range[0].member, "7");
        assert_eq!(range[0].score, 900);
        assert_eq!(
            coord.hget(names::NEXT_SCANNER_KEY, "7").await.unwrap(),
            Some("A/output".to_string())
        );

        index.apply(&routing("7", None)).await.unwrap();
        assert!(coord
            .zrange_by_score(names::NEXT_EVENT_KEY, 0, i64::MAX)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(coord.hget(names::NEXT_SCANNER_KEY, "7").await.unwrap(), None);
    }

    #[tokio::test]
    async fn handoff_points_at_the_destination_center() {
        let coord = Arc::new(MemoryCoord::new());
        let mut index = NextEventIndex::new(coord.clone());

        index.apply(&handoff("3", Center::C, 90_000)).await.unwrap();
        assert_eq!(
            coord.hget(names::NEXT_SCANNER_KEY, "3").await.unwrap(),
            Some("C/receiving".to_string())
        );
    }

    #[tokio::test]
    async fn fresh_signal_clears_the_lateness_marker() {
        let coord = Arc::new(MemoryCoord::new());
        let mut index = NextEventIndex::new(coord.clone());
        coord.sadd(names::LATE_PACKAGES_KEY, "7").await.unwrap();

        index
            .apply(&routing("7", Some((ScannerId::Output, 900))))
            .await
            .unwrap();
        assert!(coord
            .smembers(names::LATE_PACKAGES_KEY)
            .await
            .unwrap()
            .is_empty());

        coord.sadd(names::LATE_PACKAGES_KEY, "7").await.unwrap();
        index.apply(&routing("7", None)).await.unwrap();
        assert!(coord
            .smembers(names::LATE_PACKAGES_KEY)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn sentinel_touches_nothing() {
        let coord = Arc::new(MemoryCoord::new());
        let mut index = NextEventIndex::new(coord.clone());
        coord
            .zadd(names::NEXT_EVENT_KEY, 500, "end-of-stream")
            .await
            .unwrap();

        index
            .apply(&ScanEvent::end_of_stream(Center::A, 999))
            .await
            .unwrap();
        assert_eq!(
            coord
                .zrange_by_score(names::NEXT_EVENT_KEY, 0, i64::MAX)
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
