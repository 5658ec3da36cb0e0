//! Busy Tracker.

use tracing::debug;

/// Tracks whether any channel or preview surface is using the engine.
///
/// Only the busy-to-idle edge is reported, so an engine that was never busy
/// does not announce itself idle.
#[derive(Debug, Default)]
pub struct BusyTracker {
    busy: bool,
}

impl BusyTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Re-evaluate from current counts. Returns true when the engine just
    /// became idle.
    pub fn evaluate(&mut self, channels: usize, previews: usize) -> bool {
        let busy = channels + previews > 0;
        let became_idle = self.busy && !busy;
        if busy != self.busy {
            debug!(channels, previews, busy, "Busy state changed");
        }
        self.busy = busy;
        became_idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_busy_to_idle_edge_reports() {
        let mut tracker = BusyTracker::new();
        assert!(!tracker.evaluate(0, 0));
        assert!(!tracker.evaluate(0, 1));
        assert!(tracker.is_busy());
        assert!(!tracker.evaluate(1, 1));
        assert!(!tracker.evaluate(1, 0));
        assert!(tracker.evaluate(0, 0));
        assert!(!tracker.evaluate(0, 0));
    }
}
