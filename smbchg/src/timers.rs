//! Timers for the charger state machine, and the trait that provides them.
use core::future::Future;

/// Timer trait, through which the charger sleeps and reads a monotonic clock.
pub trait Timer {
    /// Wait for the given number of milliseconds.
    fn after_millis(milliseconds: u64) -> impl Future<Output = ()>;

    /// A monotonic millisecond timestamp.
    ///
    /// Only differences between readings are meaningful.
    fn now_millis() -> u64;
}

/// Fixed-duration waits that the detection and protection sequences use.
#[derive(Debug, Clone, Copy)]
pub enum TimerType {
    /// Wait between polls of the OTG over-current status flag.
    OcStatusPoll,
    /// Wait before the boost status poll during OTG soft-start.
    OtgSoftStartPoll,
    /// Vbus discharge time with Type-C disabled, during legacy cable detection.
    LegacyVbusDischarge,
    /// Time allowed for the Type-C block to re-detect after being re-enabled.
    LegacyRedetect,
    /// tCCDebounce after forcing a role during try-sink.
    TrySinkAttach,
    /// Settle time after forcing the source role during try-sink.
    TrySinkSrcSettle,
    /// Wait between Vbus polls while try-sink holds the dual role.
    TrySinkVbusPoll,
}

impl TimerType {
    fn duration_millis(&self) -> u64 {
        match self {
            Self::OcStatusPoll => 2,
            Self::OtgSoftStartPoll => 2,
            Self::LegacyVbusDischarge => 1000,
            Self::LegacyRedetect => 400,
            Self::TrySinkAttach => 120,
            Self::TrySinkSrcSettle => 80,
            Self::TrySinkVbusPoll => 2,
        }
    }

    /// Wait for the timer's duration.
    pub async fn wait<TIMER: Timer>(&self) {
        TIMER::after_millis(self.duration_millis()).await;
    }
}
