//! Implements a dummy bus, timer and platform for testing.
use std::cell::Cell;
use std::collections::BTreeMap;
use std::vec::Vec;

use smbchg_traits::{Platform, Supply, Transport, TransportError};

use crate::timers::Timer;

std::thread_local! {
    static CLOCK_MILLIS: Cell<u64> = const { Cell::new(0) };
}

/// A dummy timer for testing.
///
/// Waits complete immediately, advancing a thread-local clock by the waited
/// duration. Tests read the same clock through `now_millis` and can move it
/// forward with [`DummyTimer::advance`], so that scheduled work becomes due
/// without real sleeps.
pub struct DummyTimer {}

impl DummyTimer {
    /// Move the clock forward by the given number of milliseconds.
    pub fn advance(milliseconds: u64) {
        CLOCK_MILLIS.with(|clock| clock.set(clock.get() + milliseconds));
    }

    /// Reset the clock to zero.
    pub fn reset() {
        CLOCK_MILLIS.with(|clock| clock.set(0));
    }
}

impl Timer for DummyTimer {
    async fn after_millis(milliseconds: u64) {
        Self::advance(milliseconds);
    }

    fn now_millis() -> u64 {
        CLOCK_MILLIS.with(|clock| clock.get())
    }
}

/// A dummy register bus for testing.
///
/// Reads return injected register values (zero if never set), and all writes
/// are both applied to the register file and appended to a log that tests can
/// probe.
pub struct DummyBus {
    registers: BTreeMap<u16, u8>,
    writes: Vec<(u16, u8)>,
}

impl DummyBus {
    /// Create a new dummy bus with an all-zero register file.
    pub fn new() -> Self {
        Self {
            registers: BTreeMap::new(),
            writes: Vec::new(),
        }
    }

    /// Inject a register value that subsequent reads observe.
    pub fn set_reg(&mut self, address: u16, value: u8) {
        self.registers.insert(address, value);
    }

    /// The current value of a register.
    pub fn reg(&self, address: u16) -> u8 {
        self.registers.get(&address).copied().unwrap_or(0)
    }

    /// Probe all values that were written to an address, oldest first.
    pub fn writes_to(&self, address: u16) -> Vec<u8> {
        self.writes
            .iter()
            .filter(|(addr, _)| *addr == address)
            .map(|(_, value)| *value)
            .collect()
    }

    /// The most recent value written to an address, if any.
    pub fn last_write_to(&self, address: u16) -> Option<u8> {
        self.writes_to(address).last().copied()
    }

    /// Forget the write log, keeping register contents.
    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }
}

impl Transport for DummyBus {
    fn read(&mut self, address: u16) -> Result<u8, TransportError> {
        Ok(self.reg(address))
    }

    fn write(&mut self, address: u16, value: u8) -> Result<(), TransportError> {
        self.registers.insert(address, value);
        self.writes.push((address, value));
        Ok(())
    }
}

/// A dummy platform that records every notification for later inspection.
pub struct DummyPlatform {
    /// Supplies reported as changed, in order.
    pub supply_changes: Vec<Supply>,
    /// Device mode enable/disable notifications, in order.
    pub device_mode: Vec<bool>,
    /// Host mode enable/disable notifications, in order.
    pub host_mode: Vec<bool>,
    /// D+/D- ownership requests, in order.
    pub dpdm_requests: Vec<bool>,
}

impl DummyPlatform {
    /// Create a new dummy platform with empty logs.
    pub fn new() -> Self {
        Self {
            supply_changes: Vec::new(),
            device_mode: Vec::new(),
            host_mode: Vec::new(),
            dpdm_requests: Vec::new(),
        }
    }
}

impl Platform for DummyPlatform {
    fn supply_changed(&mut self, supply: Supply) {
        self.supply_changes.push(supply);
    }

    fn notify_device_mode(&mut self, enable: bool) {
        self.device_mode.push(enable);
    }

    fn notify_host_mode(&mut self, enable: bool) {
        self.host_mode.push(enable);
    }

    fn request_dpdm(&mut self, enable: bool) -> Result<(), TransportError> {
        self.dpdm_requests.push(enable);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use smbchg_traits::Transport;

    use crate::dummy::DummyBus;

    #[test]
    fn test_masked_write() {
        let mut bus = DummyBus::new();
        bus.set_reg(0x1340, 0b1010_0000);

        bus.masked_write(0x1340, 0b0000_1111, 0b0000_0101).unwrap();

        assert_eq!(bus.reg(0x1340), 0b1010_0101);
        assert_eq!(bus.writes_to(0x1340), vec![0b1010_0101]);
    }
}
