//! Definition of counters, used for bounded retry and poll loops.

/// Counter error.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The counter was incremented past its maximum value.
    Overrun,
}

/// A saturating counter with a fixed maximum.
#[derive(Debug, Clone, Copy)]
pub struct Counter {
    value: u8,
    max_value: u8,
}

/// The retry and poll loops that are bounded by a counter.
#[derive(Debug, Clone, Copy)]
pub enum CounterType {
    /// Soft-start polls during OTG boost enable.
    OtgEnablePoll,
    /// Status polls while waiting for an over-current flag to fall.
    OcStatusPoll,
    /// OTG re-enable attempts after over-current shutdown.
    OtgOcRecovery,
    /// VCONN re-enable attempts after over-current shutdown.
    VconnOcRecovery,
    /// Vbus polls while try-sink holds the dual role.
    TrySinkVbusPoll,
}

impl Counter {
    /// Create a counter with the maximum that its type prescribes.
    pub fn new(counter_type: CounterType) -> Self {
        let max_value = match counter_type {
            CounterType::OtgEnablePoll => 15,
            CounterType::OcStatusPoll => 10,
            CounterType::OtgOcRecovery => 3,
            CounterType::VconnOcRecovery => 3,
            CounterType::TrySinkVbusPoll => 100,
        };

        Self { value: 0, max_value }
    }

    /// Create a counter with an explicit maximum, e.g. from board configuration.
    pub fn new_with_max(max_value: u8) -> Self {
        Self { value: 0, max_value }
    }

    /// The current value.
    pub fn value(&self) -> u8 {
        self.value
    }

    /// Increment the counter, failing once it would exceed its maximum.
    pub fn increment(&mut self) -> Result<(), Error> {
        if self.value >= self.max_value {
            Err(Error::Overrun)
        } else {
            self.value += 1;
            Ok(())
        }
    }

    /// Reset the counter to zero.
    pub fn reset(&mut self) {
        self.value = 0;
    }
}
