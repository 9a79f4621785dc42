//! The per-sorting-center processing pipeline.
//!
//! One worker owns one center's input stream and runs every event through
//! five stages in order: hour-rollover checkpoint hinting, package-attribute
//! recording, public-tracking recording, next-expected-event indexing, and
//! time-driven delayed-package detection. Stages communicate only through
//! the shared stores, so later stages observe the side effects earlier
//! stages made for the same event.

mod attributes;
mod delay;
mod hints;
mod next_event;
mod tracking;

pub use attributes::AttributeRecorder;
pub use delay::DelayDetector;
pub use hints::HourlyCheckpoints;
pub use next_event::NextEventIndex;
pub use tracking::PublicTracking;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

use crate::config::PipelineConfig;
use crate::event::{Center, ScanEvent, ScannerId, TroubleEvent};
use crate::names;
use crate::store::{ensure_stream, ensure_table, CoordStore, EventStream, KvTable, StreamBus};

/// Publishes trouble events for one center, partitioned by center code.
pub struct TroubleWriter {
    bus: Arc<dyn StreamBus>,
    scope: String,
    partition_key: String,
}

impl TroubleWriter {
    pub fn new(bus: Arc<dyn StreamBus>, scope: &str, center: Center) -> Self {
        Self {
            bus,
            scope: scope.to_string(),
            partition_key: center.code().to_string(),
        }
    }

    pub async fn publish(&self, event: &TroubleEvent) -> Result<()> {
        let payload = serde_json::to_vec(event)?;
        self.bus
            .publish(
                &self.scope,
                names::TROUBLE_STREAM,
                &self.partition_key,
                payload,
            )
            .await
    }
}

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub center: Center,
    pub scope: String,
    /// Keep retrying until at least one event has been read.
    pub wait_for_events: bool,
    /// Stop after this many events (testing aid).
    pub maximum_event_count: Option<u64>,
    /// Log progress every N events; zero disables.
    pub mark_event_index_frequency: u64,
    /// After the stream drains, report everything still marked late as lost.
    /// Exactly one worker per run should be configured this way.
    pub report_lost_packages: bool,
}

impl WorkerOptions {
    pub fn new(center: Center, scope: &str) -> Self {
        Self {
            center,
            scope: scope.to_string(),
            wait_for_events: false,
            maximum_event_count: None,
            mark_event_index_frequency: 0,
            report_lost_packages: false,
        }
    }
}

/// Processes all tracking events for one sorting center.
pub struct SortingCenterWorker {
    options: WorkerOptions,
    bus: Arc<dyn StreamBus>,
    kv: Arc<dyn KvTable>,
    coord: Arc<dyn CoordStore>,
    tunables: PipelineConfig,
}

impl SortingCenterWorker {
    pub fn new(
        options: WorkerOptions,
        bus: Arc<dyn StreamBus>,
        kv: Arc<dyn KvTable>,
        coord: Arc<dyn CoordStore>,
        tunables: PipelineConfig,
    ) -> Self {
        Self {
            options,
            bus,
            kv,
            coord,
            tunables,
        }
    }

    /// Consume the center's input stream until it drains; returns the number
    /// of events processed.
    pub async fn run(&self) -> Result<u64> {
        let span = tracing::info_span!("sorting_center", center = %self.options.center);
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&self) -> Result<u64> {
        let scope = &self.options.scope;
        let input_stream = names::input_stream(self.options.center);
        ensure_stream(self.bus.as_ref(), scope, names::TROUBLE_STREAM).await?;
        ensure_stream(self.bus.as_ref(), scope, &input_stream).await?;
        ensure_table(self.kv.as_ref(), scope, names::PACKAGE_ATTRIBUTES_TABLE).await?;
        ensure_table(self.kv.as_ref(), scope, names::PACKAGE_EVENTS_TABLE).await?;

        let trouble = TroubleWriter::new(self.bus.clone(), scope, self.options.center);
        let mut checkpoints = HourlyCheckpoints::new();
        let mut recorder = AttributeRecorder::new(self.kv.clone(), scope, self.options.center);
        let mut tracking = PublicTracking::new(self.kv.clone(), scope);
        let mut next_index = NextEventIndex::new(self.coord.clone());
        let mut detector =
            DelayDetector::new(self.coord.clone(), self.options.center, self.tunables.clone());

        tracing::debug!("begin reading from stream {:?}", input_stream);
        let mut stream = EventStream::open(
            self.bus.as_ref(),
            scope,
            &input_stream,
            self.tunables.read_timeout(),
            self.options.wait_for_events,
        )
        .await?;

        let mut processed: u64 = 0;
        let mut last_event_time: Option<i64> = None;
        while let Some(payload) = stream.next_event().await? {
            let event: ScanEvent = serde_json::from_slice(&payload).with_context(|| {
                format!(
                    "malformed event payload: {}",
                    String::from_utf8_lossy(&payload)
                )
            })?;

            checkpoints.apply(&event);
            recorder.apply(&event, &trouble).await?;
            tracking.apply(&event).await?;
            next_index.apply(&event).await?;
            detector.apply(&event, &trouble).await?;

            if !event.is_end_of_stream() {
                last_event_time = Some(event.event_time);
            }
            processed += 1;
            if self.options.mark_event_index_frequency > 0
                && processed % self.options.mark_event_index_frequency == 0
            {
                tracing::debug!("event # {}", processed);
            }
            if let Some(maximum) = self.options.maximum_event_count {
                if processed >= maximum {
                    break;
                }
            }
        }

        if self.options.report_lost_packages {
            if let Some(event_time) = last_event_time {
                detector.report_lost(&trouble, event_time).await?;
            }
        }

        Ok(processed)
    }
}

/// Read every event for one package from a center's input stream, stopping
/// at its first output scan.
///
/// This is a debugging aid, not a serving path: it scans the whole stream
/// and filters by package id.
pub async fn extract_package_events(
    bus: &dyn StreamBus,
    scope: &str,
    center: Center,
    package_id: &str,
    read_timeout: Duration,
) -> Result<Vec<ScanEvent>> {
    let stream_name = names::input_stream(center);
    tracing::debug!("begin reading from stream {:?}", stream_name);
    let mut stream = EventStream::open(bus, scope, &stream_name, read_timeout, false).await?;
    let mut events = Vec::new();
    while let Some(payload) = stream.next_event().await? {
        let event: ScanEvent = serde_json::from_slice(&payload).with_context(|| {
            format!(
                "malformed event payload: {}",
                String::from_utf8_lossy(&payload)
            )
        })?;
        if event.package_id != package_id {
            continue;
        }
        let delivered = event.scanner() == ScannerId::Output;
        events.push(event);
        if delivered {
            break;
        }
    }
    Ok(events)
}
