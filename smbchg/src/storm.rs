//! Interrupt storm detection.
//!
//! Counts events that arrive in quick succession. When enough of them land
//! within the configured period of their predecessor, a storm is reported and
//! the count starts over.

/// Watches one event line for storms.
#[derive(Debug, Clone, Copy)]
pub struct StormWatch {
    period_ms: u64,
    max_count: u8,
    count: u8,
    last_event_ms: Option<u64>,
}

impl StormWatch {
    /// Create a watch that reports a storm after `max_count` quick successions.
    ///
    /// An event counts as a quick succession when it arrives within
    /// `period_ms` of the previous event.
    pub fn new(period_ms: u64, max_count: u8) -> Self {
        Self {
            period_ms,
            max_count,
            count: 0,
            last_event_ms: None,
        }
    }

    /// Register an event. Returns `true` when this event completes a storm.
    ///
    /// A completed storm forgets all recorded events; the next event starts
    /// a fresh count.
    pub fn note_event(&mut self, now_ms: u64) -> bool {
        if let Some(last) = self.last_event_ms {
            if now_ms.saturating_sub(last) <= self.period_ms {
                self.count += 1;
                if self.count >= self.max_count {
                    self.reset();
                    return true;
                }
            } else {
                self.count = 0;
            }
        }

        self.last_event_ms = Some(now_ms);
        false
    }

    /// Change the storm threshold and restart counting.
    pub fn set_max_count(&mut self, max_count: u8) {
        self.max_count = max_count;
        self.reset();
    }

    /// The current storm threshold.
    pub fn max_count(&self) -> u8 {
        self.max_count
    }

    /// Forget all recorded events.
    pub fn reset(&mut self) {
        self.count = 0;
        self.last_event_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quick_successions_complete_a_storm() {
        let mut watch = StormWatch::new(100, 3);

        assert!(!watch.note_event(0));
        assert!(!watch.note_event(50));
        assert!(!watch.note_event(100));
        assert!(watch.note_event(150));
    }

    #[test]
    fn a_slow_event_restarts_the_count() {
        let mut watch = StormWatch::new(100, 3);

        assert!(!watch.note_event(0));
        assert!(!watch.note_event(50));
        assert!(!watch.note_event(100));
        // Arrives after the period; not a quick succession.
        assert!(!watch.note_event(500));
        assert!(!watch.note_event(550));
        assert!(!watch.note_event(600));
        assert!(watch.note_event(650));
    }

    #[test]
    fn detection_resets_the_count() {
        let mut watch = StormWatch::new(100, 2);

        assert!(!watch.note_event(0));
        assert!(!watch.note_event(10));
        assert!(watch.note_event(20));
        assert!(!watch.note_event(30));
        assert!(!watch.note_event(40));
        assert!(watch.note_event(50));
    }

    #[test]
    fn changing_the_threshold_restarts_counting() {
        let mut watch = StormWatch::new(100, 8);

        for t in 0..5 {
            assert!(!watch.note_event(t * 10));
        }

        watch.set_max_count(3);
        assert!(!watch.note_event(60));
        assert!(!watch.note_event(70));
        assert!(!watch.note_event(80));
        assert!(watch.note_event(90));
    }
}
