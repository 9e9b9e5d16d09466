use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct MetricsRecorder {
    inner: Mutex<Metrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    pub processed: usize,
    pub triggered: usize,
    pub rejected: usize,
    /// Grid points removed for lack of energy or readout.
    pub dropped_points: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&self, triggered: bool) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.processed += 1;
            if triggered {
                metrics.triggered += 1;
            } else {
                metrics.rejected += 1;
            }
        }
    }

    pub fn record_dropped_points(&self, count: usize) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.dropped_points += count;
        }
    }

    pub fn snapshot(&self) -> Metrics {
        self.inner.lock().map(|m| *m).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_events_by_outcome() {
        let recorder = MetricsRecorder::new();
        recorder.record_event(true);
        recorder.record_event(false);
        recorder.record_event(true);
        recorder.record_dropped_points(4);
        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.processed, 3);
        assert_eq!(snapshot.triggered, 2);
        assert_eq!(snapshot.rejected, 1);
        assert_eq!(snapshot.dropped_points, 4);
    }
}
