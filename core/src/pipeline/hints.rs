use crate::event::ScanEvent;

/// Watches for the event-time hour rolling over.
///
/// Each rollover is the moment to snapshot the input reader's position so a
/// later run could rewind close to a package's first scan instead of
/// re-reading the whole stream.
pub struct HourlyCheckpoints {
    last_hour: Option<i64>,
}

impl HourlyCheckpoints {
    pub fn new() -> Self {
        Self { last_hour: None }
    }

    pub fn apply(&mut self, event: &ScanEvent) {
        if event.is_end_of_stream() {
            return;
        }
        let hour = event.event_time.div_euclid(3600);
        if self.last_hour != Some(hour) {
            if self.last_hour.is_some() {
                self.record_position(hour);
            }
            self.last_hour = Some(hour);
        }
    }

    fn record_position(&self, hour: i64) {
        // Persisting the reader position here would let the per-package
        // extractor seek near a package's first scan instead of scanning the
        // whole stream. Position persistence is not implemented; the
        // extractor reads from the start.
        tracing::trace!("hour rollover at {}", hour);
    }
}

impl Default for HourlyCheckpoints {
    fn default() -> Self {
        Self::new()
    }
}
