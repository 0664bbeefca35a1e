//! Charger library traits.
//!
//! Provides the bus and platform traits that allow running the charger state
//! machine on various register transports and host environments.
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

/// Register access error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// Reading the register at the given address failed.
    #[error("failed to read register {0:#06x}")]
    Read(u16),

    /// Writing the register at the given address failed.
    #[error("failed to write register {0:#06x}")]
    Write(u16),
}

/// Bus trait, through which the charger talks to its register file.
///
/// Addresses are 16 bit wide: the high byte selects a peripheral block, the
/// low byte an offset within it.
pub trait Transport {
    /// Read a single register.
    fn read(&mut self, address: u16) -> Result<u8, TransportError>;

    /// Write a single register.
    fn write(&mut self, address: u16, value: u8) -> Result<(), TransportError>;

    /// Update only the masked bits of a register.
    fn masked_write(&mut self, address: u16, mask: u8, value: u8) -> Result<(), TransportError> {
        let old = self.read(address)?;
        self.write(address, (old & !mask) | (value & mask))
    }
}

/// Power supplies whose observable state the charger can change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Supply {
    /// The USB input supply.
    Usb,

    /// The main (settled) USB input supply.
    UsbMain,

    /// The battery supply.
    Battery,
}

/// Platform trait, through which the charger notifies its host environment.
///
/// All methods default to no-ops so that bare-metal targets only implement
/// what they route somewhere.
pub trait Platform {
    /// A supply's properties changed and observers should re-read them.
    fn supply_changed(&mut self, _supply: Supply) {}

    /// Enable or disable USB device mode (we are attached to a host).
    fn notify_device_mode(&mut self, _enable: bool) {}

    /// Enable or disable USB host mode (a peripheral is attached to us).
    fn notify_host_mode(&mut self, _enable: bool) {}

    /// Hand the D+/D- lines to the charger for BC1.2 detection, or return
    /// them to the USB controller.
    fn request_dpdm(&mut self, _enable: bool) -> Result<(), TransportError> {
        Ok(())
    }
}
