//! Deferred work items.
//!
//! The charger schedules follow-up actions to run after a delay, e.g. the QC
//! detection timeout. The queue holds at most one pending instance per kind;
//! re-scheduling replaces the previous deadline.
use heapless::Vec;

/// The maximum number of concurrently pending work items.
pub const MAX_PENDING: usize = 8;

/// The deferred actions the charger knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WorkKind {
    /// QC detection timeout after BC1.2 reported a DCP.
    HvdcpDetect,
    /// Release the parallel charging hold-off.
    PlEnable,
    /// Re-read the settled input current limit.
    IclChange,
    /// Withdraw the reverse boost suspend vote.
    BoostBackRemoval,
    /// Judge whether OTG soft-start completed.
    OtgSsDone,
    /// Run the legacy cable detection workaround.
    LegacyDetection,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    kind: WorkKind,
    due_at_ms: u64,
}

/// A deadline-ordered queue of pending work.
#[derive(Debug, Default)]
pub struct WorkQueue<const N: usize = MAX_PENDING> {
    pending: Vec<Pending, N>,
}

impl<const N: usize> WorkQueue<N> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self { pending: Vec::new() }
    }

    /// Schedule `kind` to run at `due_at_ms`, replacing any pending instance.
    pub fn schedule(&mut self, kind: WorkKind, due_at_ms: u64) {
        self.cancel(kind);
        // Cannot overflow: at most one entry per kind.
        let _ = self.pending.push(Pending { kind, due_at_ms });
    }

    /// Cancel a pending work item. Returns whether one was pending.
    pub fn cancel(&mut self, kind: WorkKind) -> bool {
        let before = self.pending.len();
        self.pending.retain(|pending| pending.kind != kind);
        self.pending.len() != before
    }

    /// Whether `kind` is pending.
    pub fn is_scheduled(&self, kind: WorkKind) -> bool {
        self.pending.iter().any(|pending| pending.kind == kind)
    }

    /// The earliest pending deadline.
    pub fn next_deadline(&self) -> Option<u64> {
        self.pending.iter().map(|pending| pending.due_at_ms).min()
    }

    /// Remove and return the earliest work item that is due at `now_ms`.
    pub fn take_due(&mut self, now_ms: u64) -> Option<WorkKind> {
        let index = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, pending)| pending.due_at_ms <= now_ms)
            .min_by_key(|(_, pending)| pending.due_at_ms)
            .map(|(index, _)| index)?;

        Some(self.pending.remove(index).kind)
    }

    /// Whether any work is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescheduling_replaces_the_deadline() {
        let mut queue: WorkQueue = WorkQueue::new();

        queue.schedule(WorkKind::HvdcpDetect, 2500);
        queue.schedule(WorkKind::HvdcpDetect, 5000);

        assert_eq!(queue.next_deadline(), Some(5000));
        assert_eq!(queue.take_due(2500), None);
        assert_eq!(queue.take_due(5000), Some(WorkKind::HvdcpDetect));
        assert!(queue.is_empty());
    }

    #[test]
    fn due_items_come_out_earliest_first() {
        let mut queue: WorkQueue = WorkQueue::new();

        queue.schedule(WorkKind::PlEnable, 30_000);
        queue.schedule(WorkKind::IclChange, 1000);
        queue.schedule(WorkKind::BoostBackRemoval, 750);

        assert_eq!(queue.next_deadline(), Some(750));
        assert_eq!(queue.take_due(1000), Some(WorkKind::BoostBackRemoval));
        assert_eq!(queue.take_due(1000), Some(WorkKind::IclChange));
        assert_eq!(queue.take_due(1000), None);
        assert!(queue.is_scheduled(WorkKind::PlEnable));
    }

    #[test]
    fn cancel_reports_whether_work_was_pending() {
        let mut queue: WorkQueue = WorkQueue::new();

        queue.schedule(WorkKind::LegacyDetection, 0);
        assert!(queue.cancel(WorkKind::LegacyDetection));
        assert!(!queue.cancel(WorkKind::LegacyDetection));
    }
}
