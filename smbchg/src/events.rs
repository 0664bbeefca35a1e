//! Hardware events that drive the state machine.
use core::future::Future;

/// An interrupt, translated into an abstract event by the integration layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// The Type-C machine changed state.
    TypecChange,
    /// Vbus crossed the plugin threshold, in either direction.
    UsbPlugin,
    /// BC1.2 or QC detection made progress.
    UsbSourceChange,
    /// The AICL loop settled on a new input current.
    IclChange,
    /// The OTG boost hit its current limit.
    OtgOvercurrent,
    /// The switcher reported power-ok, watched for storms.
    SwitcherPowerOk,
    /// The battery crossed a temperature window boundary.
    BattTempChanged,
}

/// Source of events, typically backed by an interrupt controller.
pub trait EventSource {
    /// Wait for the next event.
    fn next_event(&mut self) -> impl Future<Output = Event>;
}
