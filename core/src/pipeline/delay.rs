use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use super::TroubleWriter;
use crate::config::PipelineConfig;
use crate::event::{Center, ScanEvent, TroubleEvent};
use crate::names;
use crate::reporter::short_time;
use crate::store::CoordStore;

/// Time-driven delayed-package detection.
///
/// Once per check-frequency bucket of simulated time, the stage asks the
/// shared sorted set for packages whose expected next scan has not arrived.
/// Four workers advance through their own streams at different speeds, so
/// before judging lateness each worker votes its clock into a shared sorted
/// set and evaluates against the slowest peer; otherwise a worker running
/// ahead would accuse packages the others simply have not reached yet.
pub struct DelayDetector {
    coord: Arc<dyn CoordStore>,
    center: Center,
    tunables: PipelineConfig,
    last_bucket: Option<i64>,
}

impl DelayDetector {
    pub fn new(coord: Arc<dyn CoordStore>, center: Center, tunables: PipelineConfig) -> Self {
        Self {
            coord,
            center,
            tunables,
            last_bucket: None,
        }
    }

    pub async fn apply(&mut self, event: &ScanEvent, trouble: &TroubleWriter) -> Result<()> {
        if event.is_end_of_stream() {
            // sentinels are markers, not scans; they must not advance the clock
            return Ok(());
        }
        let bucket = event.event_time.div_euclid(self.tunables.check_frequency_secs);
        match self.last_bucket {
            None => {
                self.last_bucket = Some(bucket);
                Ok(())
            }
            Some(previous) if previous == bucket => Ok(()),
            Some(_) => {
                self.last_bucket = Some(bucket);
                self.check_for_delays(event.event_time, trouble).await
            }
        }
    }

    async fn check_for_delays(&self, mut event_time: i64, trouble: &TroubleWriter) -> Result<()> {
        // vote on the current time, then judge against the slowest peer
        self.coord
            .zadd(names::CLOCK_SYNC_KEY, event_time, self.center.code())
            .await?;
        let earlier_clocks = self
            .coord
            .zrange_by_score(names::CLOCK_SYNC_KEY, 0, event_time)
            .await?;
        if let Some(earliest) = earlier_clocks.first() {
            let lead = event_time - earliest.score;
            if lead > self.tunables.sync_threshold_secs {
                // give the lagging worker a chance to catch up
                tracing::debug!(
                    "center {} is at {}, {}s behind; yielding",
                    earliest.member,
                    earliest.score,
                    lead
                );
                tokio::time::sleep(Duration::from_millis(self.tunables.sleep_process_ms)).await;
            }
            event_time = earliest.score;
        }

        let candidates = self
            .coord
            .zrange_by_score(names::NEXT_EVENT_KEY, 0, event_time)
            .await?;
        let mut reported: Vec<String> = Vec::new();
        for candidate in candidates {
            let expected = candidate.score;
            if event_time - expected < self.tunables.minimum_late_secs {
                // not actually late yet
                continue;
            }
            if !self
                .coord
                .sadd(names::LATE_PACKAGES_KEY, &candidate.member)
                .await?
            {
                // already reported this lateness episode
                continue;
            }
            let next_scanner = self
                .coord
                .hget(names::NEXT_SCANNER_KEY, &candidate.member)
                .await?;
            tracing::warn!(
                "delayed package {} expected {} late {}s at {}",
                candidate.member,
                short_time(expected),
                event_time - expected,
                next_scanner.as_deref().unwrap_or("?")
            );
            trouble
                .publish(&TroubleEvent::DelayedPackage {
                    event_time,
                    package_id: candidate.member.clone(),
                    expected_event_time: expected,
                    sorting_center: self.center,
                    next_scanner_id: next_scanner,
                })
                .await?;
            reported.push(candidate.member);
        }

        if !reported.is_empty() {
            // one report per episode; the next on-time scan re-registers them
            self.coord.zrem(names::NEXT_EVENT_KEY, &reported).await?;
            for package_id in &reported {
                self.coord.hdel(names::NEXT_SCANNER_KEY, package_id).await?;
            }
        }
        Ok(())
    }

    /// Emit a lost-package report for everything still marked late once the
    /// input stream has drained. Exactly one worker per run should do this.
    pub async fn report_lost(&self, trouble: &TroubleWriter, event_time: i64) -> Result<()> {
        for package_id in self.coord.smembers(names::LATE_PACKAGES_KEY).await? {
            tracing::debug!("lost package {}", package_id);
            trouble
                .publish(&TroubleEvent::LostPackage {
                    event_time,
                    package_id,
                    sorting_center: self.center,
                })
                .await?;
        }
        Ok(())
    }
}
