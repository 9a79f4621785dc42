use anyhow::{Context, Result};
use std::sync::Arc;

use super::TroubleWriter;
use crate::event::{Center, ScanEvent, ScanKind, TroubleEvent};
use crate::names;
use crate::records::PackageAttributes;
use crate::reporter::short_time;
use crate::store::KvTable;

/// Records intake, weight, and delivery into the shared attribute table.
///
/// The attribute record is shared between sorting centers: the origin writes
/// the intake fields and the weight, the destination writes the delivery
/// time. Read-modify-write per package keeps the two halves merged.
pub struct AttributeRecorder {
    kv: Arc<dyn KvTable>,
    scope: String,
    center: Center,
}

impl AttributeRecorder {
    pub fn new(kv: Arc<dyn KvTable>, scope: &str, center: Center) -> Self {
        Self {
            kv,
            scope: scope.to_string(),
            center,
        }
    }

    pub async fn apply(&mut self, event: &ScanEvent, trouble: &TroubleWriter) -> Result<()> {
        match &event.kind {
            ScanKind::Intake {
                destination,
                declared_value,
                estimated_delivery_time,
                ..
            } => {
                let mut attributes = self.load(&event.package_id).await?;
                attributes.intake_time = Some(event.event_time);
                attributes.origin = Some(event.sorting_center);
                attributes.destination = Some(*destination);
                attributes.declared_value = Some(*declared_value);
                attributes.estimated_delivery_time = Some(*estimated_delivery_time);
                self.store(&event.package_id, &attributes).await
            }
            ScanKind::Weighing { weight, .. } => {
                let mut attributes = self.load(&event.package_id).await?;
                attributes.weight = Some(*weight);
                self.store(&event.package_id, &attributes).await
            }
            ScanKind::Output => {
                let mut attributes = self.load(&event.package_id).await?;
                attributes.delivered_time = Some(event.event_time);
                self.store(&event.package_id, &attributes).await?;
                self.report_late_delivery(&event.package_id, &attributes, trouble)
                    .await
            }
            _ => Ok(()),
        }
    }

    /// If this package was delivered past its estimate, report it.
    async fn report_late_delivery(
        &self,
        package_id: &str,
        attributes: &PackageAttributes,
        trouble: &TroubleWriter,
    ) -> Result<()> {
        let (Some(delivered), Some(estimated)) =
            (attributes.delivered_time, attributes.estimated_delivery_time)
        else {
            return Ok(());
        };
        if delivered <= estimated {
            return Ok(());
        }
        tracing::debug!(
            "late delivery package_id {} expected {} late {}s",
            package_id,
            short_time(estimated),
            delivered - estimated
        );
        trouble
            .publish(&TroubleEvent::LateDelivery {
                event_time: delivered,
                package_id: package_id.to_string(),
                expected_event_time: estimated,
                sorting_center: self.center,
            })
            .await
    }

    async fn load(&self, package_id: &str) -> Result<PackageAttributes> {
        match self
            .kv
            .get(&self.scope, names::PACKAGE_ATTRIBUTES_TABLE, package_id)
            .await?
        {
            Some(bytes) => {
                serde_json::from_slice(&bytes).context("malformed package-attributes record")
            }
            // first scan for a fresh package
            None => Ok(PackageAttributes::default()),
        }
    }

    async fn store(&self, package_id: &str, attributes: &PackageAttributes) -> Result<()> {
        let bytes = serde_json::to_vec(attributes)?;
        self.kv
            .put(&self.scope, names::PACKAGE_ATTRIBUTES_TABLE, package_id, bytes)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{NextHop, ScannerId};
    use crate::store::{MemoryBus, MemoryKv, StreamBus};

    async fn recorder() -> (AttributeRecorder, TroubleWriter, Arc<MemoryBus>, Arc<MemoryKv>) {
        let bus = Arc::new(MemoryBus::new());
        bus.create_scope("s").await.unwrap();
        bus.create_stream("s", names::TROUBLE_STREAM).await.unwrap();
        let kv = Arc::new(MemoryKv::new());
        let recorder = AttributeRecorder::new(kv.clone(), "s", Center::A);
        let trouble = TroubleWriter::new(bus.clone() as Arc<dyn StreamBus>, "s", Center::A);
        (recorder, trouble, bus, kv)
    }

    fn intake(event_time: i64, estimated_delivery_time: i64) -> ScanEvent {
        ScanEvent {
            event_time,
            sorting_center: Center::A,
            package_id: "1".into(),
            kind: ScanKind::Intake {
                next: NextHop {
                    scanner: ScannerId::Weighing,
                    expected_at: event_time + 120,
                },
                destination: Center::A,
                declared_value: 55,
                estimated_delivery_time,
            },
        }
    }

    fn output(event_time: i64) -> ScanEvent {
        ScanEvent {
            event_time,
            sorting_center: Center::A,
            package_id: "1".into(),
            kind: ScanKind::Output,
        }
    }

    async fn stored(kv: &MemoryKv) -> PackageAttributes {
        let bytes = kv
            .get("s", names::PACKAGE_ATTRIBUTES_TABLE, "1")
            .await
            .unwrap()
            .expect("record should exist");
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn trouble_count(bus: &MemoryBus) -> usize {
        use crate::store::EventStream;
        use std::time::Duration;
        let mut stream = EventStream::open(
            bus,
            "s",
            names::TROUBLE_STREAM,
            Duration::from_millis(5),
            false,
        )
        .await
        .unwrap();
        let mut count = 0;
        while stream.next_event().await.unwrap().is_some() {
            count += 1;
        }
        count
    }

    #[tokio::test]
    async fn intake_then_weight_then_delivery() {
        let (mut recorder, trouble, bus, kv) = recorder().await;

        recorder.apply(&intake(100, 500_000), &trouble).await.unwrap();
        let attributes = stored(&kv).await;
        assert_eq!(attributes.intake_time, Some(100));
        assert_eq!(attributes.origin, Some(Center::A));
        assert_eq!(attributes.declared_value, Some(55));
        assert_eq!(attributes.weight, None);

        let weighing = ScanEvent {
            event_time: 220,
            sorting_center: Center::A,
            package_id: "1".into(),
            kind: ScanKind::Weighing {
                next: NextHop {
                    scanner: ScannerId::PreRouting,
                    expected_at: 400,
                },
                weight: 12,
            },
        };
        recorder.apply(&weighing, &trouble).await.unwrap();
        let attributes = stored(&kv).await;
        assert_eq!(attributes.weight, Some(12));
        assert_eq!(attributes.intake_time, Some(100));

        recorder.apply(&output(2_000), &trouble).await.unwrap();
        let attributes = stored(&kv).await;
        assert_eq!(attributes.delivered_time, Some(2_000));
        // delivered well before the estimate
        assert_eq!(trouble_count(&bus).await, 0);
    }

    #[tokio::test]
    async fn late_delivery_is_reported_once_per_output() {
        let (mut recorder, trouble, bus, _kv) = recorder().await;
        recorder.apply(&intake(100, 1_000), &trouble).await.unwrap();
        recorder.apply(&output(9_000), &trouble).await.unwrap();
        assert_eq!(trouble_count(&bus).await, 1);
    }

    #[tokio::test]
    async fn delivery_without_estimate_is_not_late() {
        let (mut recorder, trouble, bus, kv) = recorder().await;
        // output arrives for a package whose intake we never saw
        recorder.apply(&output(9_000), &trouble).await.unwrap();
        let attributes = stored(&kv).await;
        assert_eq!(attributes.delivered_time, Some(9_000));
        assert_eq!(attributes.estimated_delivery_time, None);
        assert_eq!(trouble_count(&bus).await, 0);
    }

    #[tokio::test]
    async fn transit_events_pass_through() {
        let (mut recorder, trouble, _bus, kv) = recorder().await;
        let event = ScanEvent {
            event_time: 100,
            sorting_center: Center::A,
            package_id: "1".into(),
            kind: ScanKind::Transit {
                scanner: ScannerId::Routing,
                next: None,
            },
        };
        recorder.apply(&event, &trouble).await.unwrap();
        assert!(kv
            .get("s", names::PACKAGE_ATTRIBUTES_TABLE, "1")
            .await
            .unwrap()
            .is_none());
    }
}
