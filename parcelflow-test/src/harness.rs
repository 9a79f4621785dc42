//! In-process test network: memory backends, one importer, four pipeline
//! workers, and a trouble reporter, all sharing one scope.

use anyhow::Result;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use parcelflow_core::config::PipelineConfig;
use parcelflow_core::pipeline::{SortingCenterWorker, WorkerOptions};
use parcelflow_core::store::{
    ensure_stream, EventStream, MemoryBus, MemoryCoord, MemoryKv,
};
use parcelflow_core::{
    names, Center, CoordStore, EventImporter, KvTable, PackageAttributes, ScanEvent, StreamBus,
    TrackedScan, TroubleEvent, TroubleReporter,
};

pub struct TestNetwork {
    pub bus: Arc<dyn StreamBus>,
    pub kv: Arc<dyn KvTable>,
    pub coord: Arc<dyn CoordStore>,
    pub scope: String,
    pub tunables: PipelineConfig,
}

impl TestNetwork {
    pub fn new() -> Self {
        Self {
            bus: Arc::new(MemoryBus::new()),
            kv: Arc::new(MemoryKv::new()),
            coord: Arc::new(MemoryCoord::new()),
            scope: "test-runs".to_string(),
            // short read timeout so drained streams end quickly
            tunables: PipelineConfig {
                read_timeout_ms: 20,
                ..PipelineConfig::default()
            },
        }
    }

    /// Serialize events to JSON lines and run them through the importer.
    pub async fn import(&self, events: &[ScanEvent]) -> Result<u64> {
        let mut jsonl = String::new();
        for event in events {
            jsonl.push_str(&serde_json::to_string(event)?);
            jsonl.push('\n');
        }
        EventImporter::new(self.bus.clone(), &self.scope)
            .import(Cursor::new(jsonl))
            .await
    }

    /// Append one event directly to its center's input stream.
    pub async fn publish(&self, event: &ScanEvent) -> Result<()> {
        let stream = names::input_stream(event.sorting_center);
        ensure_stream(self.bus.as_ref(), &self.scope, &stream).await?;
        self.bus
            .publish(
                &self.scope,
                &stream,
                &event.package_id,
                serde_json::to_vec(event)?,
            )
            .await
    }

    pub fn worker(&self, options: WorkerOptions) -> SortingCenterWorker {
        SortingCenterWorker::new(
            options,
            self.bus.clone(),
            self.kv.clone(),
            self.coord.clone(),
            self.tunables.clone(),
        )
    }

    /// Run one center's worker to completion.
    pub async fn run_center(&self, center: Center) -> Result<u64> {
        self.worker(WorkerOptions::new(center, &self.scope))
            .run()
            .await
    }

    /// Run all four workers concurrently, optionally electing one to report
    /// lost packages after its stream drains.
    pub async fn run_all_centers(&self, report_lost_on: Option<Center>) -> Result<()> {
        let workers = Center::ALL.iter().map(|&center| {
            let mut options = WorkerOptions::new(center, &self.scope);
            options.report_lost_packages = report_lost_on == Some(center);
            let worker = self.worker(options);
            async move { worker.run().await }
        });
        futures::future::try_join_all(workers).await?;
        Ok(())
    }

    pub async fn attributes(&self, package_id: &str) -> Result<Option<PackageAttributes>> {
        let record = self
            .kv
            .get(&self.scope, names::PACKAGE_ATTRIBUTES_TABLE, package_id)
            .await?;
        Ok(match record {
            Some(bytes) => Some(serde_json::from_slice(&bytes)?),
            None => None,
        })
    }

    pub async fn tracked_scans(&self, package_id: &str) -> Result<Vec<TrackedScan>> {
        let record = self
            .kv
            .get(&self.scope, names::PACKAGE_EVENTS_TABLE, package_id)
            .await?;
        Ok(match record {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => Vec::new(),
        })
    }

    /// Drain the trouble stream with a fresh reader.
    pub async fn trouble_events(&self) -> Result<Vec<TroubleEvent>> {
        ensure_stream(self.bus.as_ref(), &self.scope, names::TROUBLE_STREAM).await?;
        let mut stream = EventStream::open(
            self.bus.as_ref(),
            &self.scope,
            names::TROUBLE_STREAM,
            Duration::from_millis(20),
            false,
        )
        .await?;
        let mut events = Vec::new();
        while let Some(payload) = stream.next_event().await? {
            events.push(serde_json::from_slice(&payload)?);
        }
        Ok(events)
    }

    pub async fn run_reporter(&self) -> Result<Vec<String>> {
        TroubleReporter::new(
            self.bus.clone(),
            self.kv.clone(),
            &self.scope,
            Duration::from_millis(20),
        )
        .run(false)
        .await
    }

    pub async fn purge_coordination(&self) -> Result<()> {
        parcelflow_core::admin::purge_coordination(self.coord.as_ref()).await
    }
}

impl Default for TestNetwork {
    fn default() -> Self {
        Self::new()
    }
}
