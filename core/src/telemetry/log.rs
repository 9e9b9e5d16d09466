use log::{debug, info};

/// Run-level and per-event log records of an engine.
#[derive(Debug, Clone, Default)]
pub struct LogManager {
    source: String,
}

impl LogManager {
    pub fn new(source: impl Into<String>) -> Self {
        Self { source: source.into() }
    }

    pub fn record(&self, message: &str) {
        info!("[{}] {}", self.source, message);
    }

    pub fn event_summary(&self, event: u64, collections: usize, points: usize, accepted: bool) {
        debug!(
            "[{}] event {}: {} collections, {} points, {}",
            self.source,
            event,
            collections,
            points,
            if accepted { "accepted" } else { "rejected" }
        );
    }
}
