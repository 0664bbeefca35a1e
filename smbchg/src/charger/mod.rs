//! The charger instance: session state, votable wiring and the event loop.
//!
//! Hardware interrupts arrive as [`Event`]s. Each handler re-reads the
//! status registers it cares about, updates the session state and casts
//! votes; the votable apply callbacks push the resolved values to hardware.
use core::marker::PhantomData;

use embassy_futures::select::{Either, select};
use smbchg_traits::{Platform, Supply, Transport, TransportError};

use crate::config::{ChargerConfig, USBIN_25MA, USBIN_100MA, USBIN_500MA};
use crate::counters::Counter;
use crate::events::{Event, EventSource};
use crate::regs::*;
use crate::storm::StormWatch;
use crate::timers::Timer;
use crate::votable::{self, Policy, Votable, Voter};
use crate::work::{WorkKind, WorkQueue};

pub mod state;

mod apsd;
mod protection;
mod thermal;
mod typec;

#[cfg(test)]
mod tests;

pub use apsd::DpDmAction;
use state::{ChargerState, ChargerType};

/// Lowest step of the software fast-charge ramp.
const FCC_STEPPER_FLOOR_UA: i32 = 1_500_000;

/// Errors that can occur in the charger state machine.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum Error {
    /// A register access failed. The affected state keeps its last value.
    #[error("register access failed")]
    Transport(#[from] TransportError),

    /// A vote was rejected or its apply callback failed.
    #[error("vote failed")]
    Vote(#[from] votable::Error<TransportError>),

    /// PD activation was requested before the pd-allowed gate resolved true.
    #[error("power delivery is not allowed yet")]
    PdNotAllowed,

    /// The requested thermal level is outside the configured table.
    #[error("invalid thermal level")]
    InvalidThermalLevel,

    /// A bounded retry loop exhausted its attempts; the feature stays off
    /// until the next attach.
    #[error("retries exhausted")]
    RetriesExhausted,
}

/// The register access layer.
///
/// Also the context handed to votable apply callbacks, which is why it
/// carries a mirror of the detected charger type: the input current limit
/// is applied differently for SDPs.
pub(crate) struct Hw<BUS: Transport> {
    bus: BUS,
    real_type: ChargerType,
    default_icl_ua: i32,
    fcc_default_ua: i32,
}

impl<BUS: Transport> Hw<BUS> {
    fn new(bus: BUS, config: &ChargerConfig) -> Self {
        Self {
            bus,
            real_type: ChargerType::Unknown,
            default_icl_ua: config.default_icl_ua,
            fcc_default_ua: config.fcc_default_ua,
        }
    }

    pub fn read(&mut self, address: u16) -> Result<u8, TransportError> {
        self.bus.read(address)
    }

    pub fn write(&mut self, address: u16, value: u8) -> Result<(), TransportError> {
        self.bus.write(address, value)
    }

    pub fn masked_write(&mut self, address: u16, mask: u8, value: u8) -> Result<(), TransportError> {
        self.bus.masked_write(address, mask, value)
    }

    /// Write a protected register: unlock the block, then write.
    pub fn secure_write(&mut self, address: u16, value: u8) -> Result<(), TransportError> {
        self.bus.write((address & 0xFF00) | SEC_ACCESS_OFFSET, SEC_ACCESS_UNLOCK)?;
        self.bus.write(address, value)
    }

    /// Masked write to a protected register.
    pub fn secure_masked_write(&mut self, address: u16, mask: u8, value: u8) -> Result<(), TransportError> {
        let old = self.bus.read(address)?;
        self.secure_write(address, (old & !mask) | (value & mask))
    }

    pub fn set_usb_suspend(&mut self, suspend: bool) -> Result<(), TransportError> {
        let mask = UsbinCmdIl(0).with_usbin_suspend(true).0;
        self.masked_write(USBIN_CMD_IL_REG, mask, if suspend { mask } else { 0 })
    }

    fn set_icl_raw(&mut self, ua: i32) -> Result<(), TransportError> {
        self.write(USBIN_CURRENT_LIMIT_CFG_REG, (ua / CURRENT_STEP_UA) as u8)
    }

    pub fn set_buck_frequency(&mut self, khz: u16) -> Result<(), TransportError> {
        self.secure_write(CFG_BUCK_FREQ_REG, (khz / 100) as u8)
    }

    pub fn set_adapter_allowance(&mut self, allowance: AdapterAllowance) -> Result<(), TransportError> {
        self.secure_write(USBIN_ADAPTER_ALLOW_CFG_REG, allowance as u8)
    }

    /// Apply callback of the input current limit votable.
    fn apply_usb_icl(hw: &mut Self, _old: Option<i32>, new: Option<i32>) -> Result<(), TransportError> {
        let Some(ua) = new else {
            hw.set_icl_raw(hw.default_icl_ua)?;
            return hw.set_usb_suspend(false);
        };

        if ua <= USBIN_25MA {
            return hw.set_usb_suspend(true);
        }

        if hw.real_type == ChargerType::Sdp {
            // SDPs draw per the USB spec: pick between the 100 mA and
            // 500 mA modes instead of the raw limit alone.
            let mask = UsbinIclOptions(0).with_usb51_mode(true).0;
            let value = if ua >= USBIN_500MA { mask } else { 0 };
            hw.masked_write(USBIN_ICL_OPTIONS_REG, mask, value)?;
        }

        hw.set_icl_raw(ua)?;
        hw.set_usb_suspend(false)
    }

    /// Apply callback of the fast charge current votable.
    fn apply_fcc(hw: &mut Self, _old: Option<i32>, new: Option<i32>) -> Result<(), TransportError> {
        let ua = new.unwrap_or(hw.fcc_default_ua);
        hw.write(FAST_CHARGE_CURRENT_CFG_REG, (ua / CURRENT_STEP_UA) as u8)
    }

    /// Apply callback of the charging disable votable.
    fn apply_chg_disable(hw: &mut Self, _old: Option<i32>, new: Option<i32>) -> Result<(), TransportError> {
        let disable = matches!(new, Some(value) if value != 0);
        let mask = ChargingEnableCmd(0).with_charging_enable(true).0;
        hw.masked_write(CHARGING_ENABLE_CMD_REG, mask, if disable { 0 } else { mask })
    }

    /// Apply callback of the BC1.2 disable votable.
    fn apply_apsd_disable(hw: &mut Self, _old: Option<i32>, new: Option<i32>) -> Result<(), TransportError> {
        let disable = matches!(new, Some(value) if value != 0);
        let mask = UsbinOptions1Cfg(0).with_auto_src_detect(true).0;
        hw.secure_masked_write(USBIN_OPTIONS_1_CFG_REG, mask, if disable { 0 } else { mask })
    }

    /// Apply callback of the QC detection disable votable.
    fn apply_hvdcp_disable(hw: &mut Self, _old: Option<i32>, new: Option<i32>) -> Result<(), TransportError> {
        let disable = matches!(new, Some(value) if value != 0);
        let mask = UsbinOptions1Cfg(0).with_hvdcp_en(true).with_hvdcp_auth_alg_en(true).0;
        hw.secure_masked_write(USBIN_OPTIONS_1_CFG_REG, mask, if disable { 0 } else { mask })
    }

    /// Apply callback for votables that gate software behavior only.
    fn apply_nothing(_hw: &mut Self, _old: Option<i32>, _new: Option<i32>) -> Result<(), TransportError> {
        Ok(())
    }
}

/// The votables this subsystem arbitrates.
pub(crate) struct Votables<BUS: Transport> {
    /// USB input current limit, in uA. MIN.
    pub usb_icl: Votable<Hw<BUS>, TransportError>,
    /// Fast charge current, in uA. MIN.
    pub fcc: Votable<Hw<BUS>, TransportError>,
    /// Charging disable gate. SET_ANY.
    pub chg_disable: Votable<Hw<BUS>, TransportError>,
    /// BC1.2 disable gate, held during PD sessions. SET_ANY.
    pub apsd_disable: Votable<Hw<BUS>, TransportError>,
    /// QC detection disable gate. SET_ANY.
    pub hvdcp_disable: Votable<Hw<BUS>, TransportError>,
    /// PD activation gate. SET_ANY, software only.
    pub pd_allowed: Votable<Hw<BUS>, TransportError>,
    /// Reasons against PD activation; feeds `pd_allowed` inverted. SET_ANY.
    pub pd_disallowed: Votable<Hw<BUS>, TransportError>,
    /// System wakelock requests. SET_ANY, software only.
    pub awake: Votable<Hw<BUS>, TransportError>,
    /// Parallel charging disable gate. SET_ANY, software only.
    pub pl_disable: Votable<Hw<BUS>, TransportError>,
}

impl<BUS: Transport> Votables<BUS> {
    fn new() -> Self {
        Self {
            usb_icl: Votable::new("usb_icl", Policy::Min, Hw::apply_usb_icl).with_range(0, 3_300_000),
            fcc: Votable::new("fcc", Policy::Min, Hw::apply_fcc).with_range(0, 4_500_000),
            chg_disable: Votable::new("chg_disable", Policy::SetAny, Hw::apply_chg_disable),
            apsd_disable: Votable::new("apsd_disable", Policy::SetAny, Hw::apply_apsd_disable),
            hvdcp_disable: Votable::new("hvdcp_disable", Policy::SetAny, Hw::apply_hvdcp_disable),
            pd_allowed: Votable::new("pd_allowed", Policy::SetAny, Hw::apply_nothing),
            pd_disallowed: Votable::new("pd_disallowed", Policy::SetAny, Hw::apply_nothing),
            awake: Votable::new("awake", Policy::SetAny, Hw::apply_nothing),
            pl_disable: Votable::new("pl_disable", Policy::SetAny, Hw::apply_nothing),
        }
    }
}

/// The charger state machine.
pub struct Charger<BUS: Transport, TIMER: Timer, PLAT: Platform> {
    pub(crate) hw: Hw<BUS>,
    pub(crate) platform: PLAT,
    pub(crate) config: ChargerConfig,
    pub(crate) state: ChargerState,
    pub(crate) votables: Votables<BUS>,
    pub(crate) work: WorkQueue,
    pub(crate) storm: StormWatch,

    _timer: PhantomData<TIMER>,
}

impl<BUS: Transport, TIMER: Timer, PLAT: Platform> Charger<BUS, TIMER, PLAT> {
    /// Create a charger instance. No hardware is touched until
    /// [`Self::initialize`] runs.
    pub fn new(bus: BUS, platform: PLAT, config: ChargerConfig) -> Self {
        let mut state = ChargerState::new();
        state.otg_oc_attempts = Counter::new_with_max(config.otg_oc_attempts);
        state.vconn_oc_attempts = Counter::new_with_max(config.vconn_oc_attempts);

        Self {
            hw: Hw::new(bus, &config),
            platform,
            storm: StormWatch::new(config.storm_period_ms, config.weak_storm_count),
            config,
            state,
            votables: Votables::new(),
            work: WorkQueue::new(),
            _timer: PhantomData,
        }
    }

    /// Board configuration.
    pub fn config(&self) -> &ChargerConfig {
        &self.config
    }

    /// The current session state.
    pub fn state(&self) -> &ChargerState {
        &self.state
    }

    /// The charger type after all override rules.
    pub fn charger_type(&self) -> ChargerType {
        self.state.real_type
    }

    /// Configure the hardware, cast the initial votes and pick up whatever
    /// is already attached.
    pub async fn initialize(&mut self) -> Result<(), Error> {
        let cfg = self.config;

        let mask = TypeCCfg(0).with_apsd_start_on_cc(true).0;
        self.hw.secure_masked_write(TYPE_C_CFG_REG, mask, mask)?;

        let mask = UsbinIclOptions(0).with_icl_override(true).0;
        self.hw.masked_write(USBIN_ICL_OPTIONS_REG, mask, mask)?;

        let aicl_mask = UsbinAiclOptionsCfg(0)
            .with_aicl_en(true)
            .with_suspend_on_collapse(true)
            .0;
        let aicl_value = UsbinAiclOptionsCfg(0)
            .with_aicl_en(true)
            .with_suspend_on_collapse(cfg.workarounds.boost_back)
            .0;
        self.hw.secure_masked_write(USBIN_AICL_OPTIONS_CFG_REG, aicl_mask, aicl_value)?;

        self.hw.write(HVDCP_PULSE_COUNT_MAX_REG, cfg.qc3_max_pulses)?;
        self.hw.set_adapter_allowance(AdapterAllowance::Allow5VTo12V)?;
        self.hw.set_buck_frequency(cfg.buck_freq.freq_removal)?;

        if cfg.workarounds.qc_auth_irq {
            let mask = UsbinSourceChangeIntrptEnb(0).with_auth_irq_en(true).0;
            self.hw.masked_write(USBIN_SOURCE_CHANGE_INTRPT_ENB_REG, mask, 0)?;
        }

        self.vote_usb_icl(Voter::LegacyUnknown, true, USBIN_100MA)?;
        self.vote_fcc(Voter::BattProfile, true, cfg.fcc_default_ua)?;
        if cfg.fcc_stepper_enable {
            // The stepper ramps from its floor; hold it there until an
            // input attaches.
            self.vote_fcc(Voter::FccStepper, true, FCC_STEPPER_FLOOR_UA)?;
        }
        self.vote_pd_disallowed(Voter::CcDetached, true)?;
        self.vote_pd_disallowed(Voter::HvdcpTimeout, true)?;
        if cfg.workarounds.legacy_cable_detection {
            self.vote_hvdcp_disable(Voter::VbusCcShort, true)?;
        }
        self.vote_pl_disable(Voter::PlDelay, true)?;

        self.handle_usb_plugin()?;
        self.update_typec_state().await?;
        self.handle_usb_source_change()
    }

    /// Drive the state machine forever: wait for events, run due work.
    pub async fn run(&mut self, source: &mut impl EventSource) -> ! {
        loop {
            let event = match self.work.next_deadline() {
                Some(deadline) => {
                    let sleep = TIMER::after_millis(deadline.saturating_sub(TIMER::now_millis()));
                    match select(source.next_event(), sleep).await {
                        Either::First(event) => Some(event),
                        Either::Second(()) => None,
                    }
                }
                None => Some(source.next_event().await),
            };

            match event {
                Some(event) => self.handle_event(event).await,
                None => self.run_due_work().await,
            }
        }
    }

    /// Handle one event. Errors are logged and contained to the handler;
    /// the affected state keeps its last-known value.
    pub async fn handle_event(&mut self, event: Event) {
        trace!("event: {:?}", event);

        let result = match event {
            Event::TypecChange => self.handle_usb_typec_change().await,
            Event::UsbPlugin => self.handle_usb_plugin(),
            Event::UsbSourceChange => self.handle_usb_source_change(),
            Event::IclChange => self.handle_icl_change(),
            Event::OtgOvercurrent => self.handle_otg_overcurrent().await,
            Event::SwitcherPowerOk => self.handle_switcher_power_ok(),
            Event::BattTempChanged => self.handle_batt_temp_changed(),
        };

        if let Err(error) = result {
            error!("failed to handle {:?}: {:?}", event, error);
        }
    }

    /// Run every work item whose deadline has passed.
    pub async fn run_due_work(&mut self) {
        while let Some(kind) = self.work.take_due(TIMER::now_millis()) {
            trace!("running work: {:?}", kind);

            let result = match kind {
                WorkKind::HvdcpDetect => self.hvdcp_detect_work(),
                WorkKind::PlEnable => self.pl_enable_work(),
                WorkKind::IclChange => self.icl_change_work(),
                WorkKind::BoostBackRemoval => self.boost_back_removal_work(),
                WorkKind::OtgSsDone => self.otg_ss_done_work().await,
                WorkKind::LegacyDetection => self.legacy_detection_work().await,
            };

            if let Err(error) = result {
                error!("work {:?} failed: {:?}", kind, error);
            }
        }
    }

    pub(crate) fn schedule_in(&mut self, kind: WorkKind, delay_ms: u64) {
        self.work.schedule(kind, TIMER::now_millis() + delay_ms);
    }

    /// Vbus crossed the plugin threshold.
    fn handle_usb_plugin(&mut self) -> Result<(), Error> {
        let status = UsbIntRtSts(self.hw.read(USB_INT_RT_STS_REG)?);
        let vbus_present = status.usbin_plugin();

        if vbus_present && self.state.otg_enabled {
            // Our own boost raised Vbus; this is not a charger insertion.
            return Ok(());
        }
        if vbus_present == self.state.vbus_present {
            return Ok(());
        }
        self.state.vbus_present = vbus_present;
        debug!("vbus present: {}", vbus_present);

        self.hw.set_buck_frequency(if vbus_present {
            self.config.buck_freq.freq_5v
        } else {
            self.config.buck_freq.freq_removal
        })?;

        let collapse_mask = UsbinAiclOptionsCfg(0).with_suspend_on_collapse(true).0;

        if vbus_present {
            self.platform.request_dpdm(true)?;
            if self.config.fcc_stepper_enable {
                self.vote_fcc(Voter::FccStepper, false, 0)?;
            }
            self.vote_awake(Voter::PlDelay, true)?;
            self.schedule_in(WorkKind::PlEnable, self.config.pl_delay_ms);
            if self.config.workarounds.boost_back {
                // A collapsing input must rerun AICL while we watch for
                // storms, not latch into suspend.
                self.hw.secure_masked_write(USBIN_AICL_OPTIONS_CFG_REG, collapse_mask, 0)?;
            }
        } else {
            self.work.cancel(WorkKind::PlEnable);
            self.work.cancel(WorkKind::IclChange);
            self.vote_pl_disable(Voter::PlDelay, true)?;
            self.vote_awake(Voter::PlDelay, false)?;
            if self.config.workarounds.boost_back {
                // Removal ends the session; the first storm of the next
                // attach is a weak charger again.
                self.storm.set_max_count(self.config.weak_storm_count);
                self.hw
                    .secure_masked_write(USBIN_AICL_OPTIONS_CFG_REG, collapse_mask, collapse_mask)?;
                self.vote_usb_icl(Voter::BoostBack, false, 0)?;
                self.vote_usb_icl(Voter::WeakCharger, false, 0)?;
            }
            if self.config.fcc_stepper_enable {
                self.vote_fcc(Voter::FccStepper, true, FCC_STEPPER_FLOOR_UA)?;
            }
            self.platform.request_dpdm(false)?;
        }

        self.platform.supply_changed(Supply::Usb);
        Ok(())
    }

    /// AICL settled on a new input current; debounce before reporting.
    fn handle_icl_change(&mut self) -> Result<(), Error> {
        if !self.state.vbus_present {
            self.work.cancel(WorkKind::IclChange);
            return Ok(());
        }

        let status = AiclStatus(self.hw.read(AICL_STATUS_REG)?);
        if status.aicl_done() {
            self.schedule_in(WorkKind::IclChange, self.config.icl_change_settle_ms);
        }
        Ok(())
    }

    fn icl_change_work(&mut self) -> Result<(), Error> {
        let raw = self.hw.read(ICL_STATUS_REG)?;
        debug!("settled input current limit: {} uA", i32::from(raw) * CURRENT_STEP_UA);
        self.platform.supply_changed(Supply::UsbMain);
        Ok(())
    }

    /// QC detection had its chance; stop holding PD back.
    fn hvdcp_detect_work(&mut self) -> Result<(), Error> {
        self.vote_pd_disallowed(Voter::HvdcpTimeout, false)?;
        self.platform.supply_changed(Supply::Usb);
        Ok(())
    }

    /// The input has been stable long enough for parallel charging.
    fn pl_enable_work(&mut self) -> Result<(), Error> {
        debug!("releasing parallel charging hold-off");
        self.vote_pl_disable(Voter::PlDelay, false)?;
        self.vote_awake(Voter::PlDelay, false)?;
        Ok(())
    }

    fn boost_back_removal_work(&mut self) -> Result<(), Error> {
        self.vote_usb_icl(Voter::BoostBack, false, 0)?;
        self.vote_awake(Voter::BoostBack, false)?;
        Ok(())
    }

    /// The USB stack enumerated and reports the configured current.
    pub fn set_usb_current(&mut self, ua: i32) -> Result<(), Error> {
        // Enumeration proves a float-detected charger is a real SDP.
        if self.state.real_type == ChargerType::Float && ua > 0 {
            self.set_real_type(ChargerType::Sdp);
            // Re-apply the limit through the SDP mode selection path.
            self.votables.usb_icl.rerun(&mut self.hw)?;
        }

        self.vote_usb_icl(Voter::UsbPsy, true, ua)?;
        self.platform.supply_changed(Supply::Usb);
        Ok(())
    }

    pub(crate) fn set_real_type(&mut self, charger_type: ChargerType) {
        self.state.real_type = charger_type;
        self.hw.real_type = charger_type;
    }

    pub(crate) fn vote_usb_icl(&mut self, voter: Voter, active: bool, ua: i32) -> Result<(), Error> {
        Ok(self.votables.usb_icl.vote(&mut self.hw, voter, active, ua)?)
    }

    pub(crate) fn vote_fcc(&mut self, voter: Voter, active: bool, ua: i32) -> Result<(), Error> {
        Ok(self.votables.fcc.vote(&mut self.hw, voter, active, ua)?)
    }

    pub(crate) fn vote_chg_disable(&mut self, voter: Voter, active: bool) -> Result<(), Error> {
        Ok(self.votables.chg_disable.vote(&mut self.hw, voter, active, 1)?)
    }

    pub(crate) fn vote_apsd_disable(&mut self, voter: Voter, active: bool) -> Result<(), Error> {
        Ok(self.votables.apsd_disable.vote(&mut self.hw, voter, active, 1)?)
    }

    pub(crate) fn vote_hvdcp_disable(&mut self, voter: Voter, active: bool) -> Result<(), Error> {
        Ok(self.votables.hvdcp_disable.vote(&mut self.hw, voter, active, 1)?)
    }

    pub(crate) fn vote_pd_allowed(&mut self, voter: Voter, active: bool) -> Result<(), Error> {
        Ok(self.votables.pd_allowed.vote(&mut self.hw, voter, active, 1)?)
    }

    /// Vote a reason against PD and propagate the inverted result into the
    /// pd-allowed gate. Votables must not re-enter themselves, so the
    /// indirection is resolved here, after the vote returns.
    pub(crate) fn vote_pd_disallowed(&mut self, voter: Voter, active: bool) -> Result<(), Error> {
        self.votables.pd_disallowed.vote(&mut self.hw, voter, active, 1)?;

        let allowed = !self.votables.pd_disallowed.is_enabled();
        self.vote_pd_allowed(Voter::PdDisallowedIndirect, allowed)
    }

    pub(crate) fn vote_awake(&mut self, voter: Voter, active: bool) -> Result<(), Error> {
        Ok(self.votables.awake.vote(&mut self.hw, voter, active, 1)?)
    }

    pub(crate) fn vote_pl_disable(&mut self, voter: Voter, active: bool) -> Result<(), Error> {
        Ok(self.votables.pl_disable.vote(&mut self.hw, voter, active, 1)?)
    }
}
