//! Type-C attach, detach and PD session handling.
use smbchg_traits::{Platform, Supply, Transport};

use super::state::{CcOrientation, ChargerType, TypecMode};
use super::{Charger, Error};
use crate::config::{MICRO_5V, USBIN_100MA, USBIN_500MA};
use crate::counters::{Counter, CounterType};
use crate::regs::*;
use crate::timers::{Timer, TimerType};
use crate::votable::Voter;
use crate::work::WorkKind;

/// Input current for a 3 A Rp advertisement.
const TYPEC_HIGH_CURRENT_UA: i32 = 3_000_000;

/// Outcome of a try-sink role cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrySinkExit {
    /// The partner stayed a sink; we source it.
    AttachedSource,
    /// The partner switched to sourcing Vbus; we charge from it.
    AttachedSink,
    /// The partner went away mid-cycle.
    Detached,
}

impl<BUS: Transport, TIMER: Timer, PLAT: Platform> Charger<BUS, TIMER, PLAT> {
    /// The Type-C machine changed state.
    pub(crate) async fn handle_usb_typec_change(&mut self) -> Result<(), Error> {
        if self.state.typec_en_dis_active {
            // The legacy workaround is toggling the port; it re-evaluates
            // the CC state itself when it finishes.
            trace!("type-c change ignored during legacy detection");
            return Ok(());
        }

        self.update_typec_state().await
    }

    /// Re-read the Type-C status block and act on what changed.
    pub(crate) async fn update_typec_state(&mut self) -> Result<(), Error> {
        // One role cycle per evaluation; a second attempt could ping-pong
        // against a partner running the same dance.
        let mut allow_try_sink = true;

        loop {
            let status1 = TypeCStatus1(self.hw.read(TYPE_C_STATUS_1_REG)?);
            let status2 = TypeCStatus2(self.hw.read(TYPE_C_STATUS_1_REG + 1)?);
            let status4 = TypeCStatus4(self.hw.read(TYPE_C_STATUS_1_REG + 3)?);

            if status4.vconn_overcurrent() && self.state.vconn_enabled {
                self.vconn_oc_recover().await?;
            }

            if !status4.debounce_done() {
                // Attach state not stable yet; the machine will fire again.
                return Ok(());
            }

            let mode = TypecMode::from_status(status1, status2, status4);
            self.state.orientation = if status4.cc_orientation() {
                CcOrientation::Cc2
            } else {
                CcOrientation::Cc1
            };

            let old_mode = self.state.typec_mode;
            self.state.typec_mode = mode;

            match (self.state.typec_present, mode != TypecMode::None) {
                (false, true) => {
                    if allow_try_sink && self.should_try_sink(mode) {
                        allow_try_sink = false;
                        if self.typec_try_sink().await? != TrySinkExit::AttachedSource {
                            // The roles changed under us; re-read the state.
                            continue;
                        }
                    }
                    self.typec_insertion(mode)?;
                }
                (true, false) => self.typec_removal()?,
                (true, true) if mode != old_mode => self.typec_mode_change(old_mode, mode)?,
                _ => return Ok(()),
            }

            self.platform.supply_changed(Supply::Usb);
            return Ok(());
        }
    }

    fn should_try_sink(&self, mode: TypecMode) -> bool {
        self.config.try_sink_enabled
            && mode.is_sink_attached()
            && !matches!(mode, TypecMode::SinkAudioAdapter | TypecMode::SinkDebugAccessory)
    }

    /// Cycle through the sink role to give a dual-role partner the chance
    /// to source Vbus, so that we end up charging instead of discharging.
    async fn typec_try_sink(&mut self) -> Result<TrySinkExit, Error> {
        let result = self.run_try_sink().await;

        // Whatever happened, release the forced role and restore the
        // full tCCDebounce.
        let role_mask = TypeCSwCtrl(0)
            .with_ufp_en_cmd(true)
            .with_dfp_en_cmd(true)
            .with_typec_disable_cmd(true)
            .0;
        self.hw.masked_write(TYPE_C_SW_CTRL_REG, role_mask, 0)?;
        let mask = MiscCfg(0).with_tcc_debounce_20ms(true).0;
        self.hw.secure_masked_write(MISC_CFG_REG, mask, 0)?;

        result
    }

    async fn run_try_sink(&mut self) -> Result<TrySinkExit, Error> {
        debug!("try-sink role cycle");

        let role_mask = TypeCSwCtrl(0)
            .with_ufp_en_cmd(true)
            .with_dfp_en_cmd(true)
            .with_typec_disable_cmd(true)
            .0;

        // Force the sink role with a short debounce and give the partner
        // tDRPTRY plus tCCDebounce to switch to sourcing.
        let sink = TypeCSwCtrl(0).with_ufp_en_cmd(true).0;
        self.hw.masked_write(TYPE_C_SW_CTRL_REG, role_mask, sink)?;
        let mask = MiscCfg(0).with_tcc_debounce_20ms(true).0;
        self.hw.secure_masked_write(MISC_CFG_REG, mask, mask)?;
        TimerType::TrySinkAttach.wait::<TIMER>().await;

        let status4 = TypeCStatus4(self.hw.read(TYPE_C_STATUS_1_REG + 3)?);
        if status4.debounce_done() {
            // The partner shows Rp now. Go dual-role so a withdrawn Rp
            // gets answered with ours within the short debounce, and wait
            // for its Vbus.
            self.hw.masked_write(TYPE_C_SW_CTRL_REG, role_mask, 0)?;

            let mut polls = Counter::new(CounterType::TrySinkVbusPoll);
            loop {
                let status4 = TypeCStatus4(self.hw.read(TYPE_C_STATUS_1_REG + 3)?);
                if status4.vbus_detected() && status4.debounce_done() {
                    return Ok(TrySinkExit::AttachedSink);
                }
                if !status4.debounce_done()
                    || status4.ufp_dfp_mode()
                    || polls.increment().is_err()
                {
                    break;
                }
                TimerType::TrySinkVbusPoll.wait::<TIMER>().await;
            }
        }

        // Trywait.SRC: show Rp and check whether the partner still wants
        // to be a sink or was removed.
        let source = TypeCSwCtrl(0).with_dfp_en_cmd(true).0;
        self.hw.masked_write(TYPE_C_SW_CTRL_REG, role_mask, source)?;
        TimerType::TrySinkSrcSettle.wait::<TIMER>().await;

        let status4 = TypeCStatus4(self.hw.read(TYPE_C_STATUS_1_REG + 3)?);
        if status4.debounce_done() {
            Ok(TrySinkExit::AttachedSource)
        } else {
            Ok(TrySinkExit::Detached)
        }
    }

    fn typec_insertion(&mut self, mode: TypecMode) -> Result<(), Error> {
        debug!("type-c attach: {:?}", mode);
        self.state.typec_present = true;

        self.vote_pd_disallowed(Voter::CcDetached, false)?;

        // Detection owns BC1.2 starts from here until detach.
        let mask = TypeCCfg(0).with_apsd_start_on_cc(true).0;
        self.hw.secure_masked_write(TYPE_C_CFG_REG, mask, 0)?;

        if mode.is_sink_attached() {
            // We source Vbus; the input path is unused and there is no
            // QC detection to wait out before PD.
            self.vote_usb_icl(Voter::Otg, true, 0)?;
            self.vote_pd_disallowed(Voter::HvdcpTimeout, false)?;
            self.platform.notify_host_mode(true);
        } else {
            self.platform.request_dpdm(true)?;
            if self.config.workarounds.legacy_cable_detection && !self.state.typec_legacy_valid {
                self.schedule_in(WorkKind::LegacyDetection, 0);
            }
        }

        Ok(())
    }

    /// Tear the session down and restore the detached defaults.
    fn typec_removal(&mut self) -> Result<(), Error> {
        debug!("type-c detach");

        self.work.cancel(WorkKind::HvdcpDetect);
        self.work.cancel(WorkKind::PlEnable);
        self.work.cancel(WorkKind::IclChange);
        self.work.cancel(WorkKind::LegacyDetection);
        self.work.cancel(WorkKind::OtgSsDone);
        self.storm.set_max_count(self.config.weak_storm_count);

        for voter in [
            Voter::UsbPsy,
            Voter::Dcp,
            Voter::Pd,
            Voter::SwQc3,
            Voter::Hvdcp2Icl,
            Voter::Otg,
            Voter::WeakCharger,
            Voter::BoostBack,
            Voter::ThermalDaemon,
        ] {
            self.vote_usb_icl(voter, false, 0)?;
        }
        self.vote_usb_icl(Voter::LegacyUnknown, true, USBIN_100MA)?;

        self.vote_fcc(Voter::Jeita, false, 0)?;
        self.vote_chg_disable(Voter::ThermalDaemon, false)?;
        self.vote_apsd_disable(Voter::Pd, false)?;
        self.vote_apsd_disable(Voter::PdHardReset, false)?;
        self.vote_hvdcp_disable(Voter::Pd, false)?;
        if self.config.workarounds.legacy_cable_detection {
            self.vote_hvdcp_disable(Voter::VbusCcShort, true)?;
        }
        self.vote_pd_allowed(Voter::Pd, false)?;
        self.vote_pd_disallowed(Voter::CcDetached, true)?;
        self.vote_pd_disallowed(Voter::HvdcpTimeout, true)?;
        self.vote_pl_disable(Voter::PlDelay, true)?;
        self.vote_awake(Voter::PlDelay, false)?;

        // Restore the detection hardware for the next attach.
        self.hw.write(HVDCP_PULSE_COUNT_MAX_REG, self.config.qc3_max_pulses)?;
        self.hw.set_adapter_allowance(AdapterAllowance::Allow5VTo12V)?;
        self.hw.set_buck_frequency(self.config.buck_freq.freq_removal)?;

        let mask = MiscCfg(0).with_tcc_debounce_20ms(true).0;
        self.hw.secure_masked_write(MISC_CFG_REG, mask, 0)?;

        let mask = TypeCCfg(0).with_apsd_start_on_cc(true).0;
        self.hw.secure_masked_write(TYPE_C_CFG_REG, mask, mask)?;

        if self.config.workarounds.qc_auth_irq {
            let mask = UsbinSourceChangeIntrptEnb(0).with_auth_irq_en(true).0;
            self.hw.masked_write(USBIN_SOURCE_CHANGE_INTRPT_ENB_REG, mask, 0)?;
        }

        self.state.reset_on_removal();
        self.set_real_type(ChargerType::Unknown);

        self.platform.notify_device_mode(false);
        self.platform.notify_host_mode(false);
        Ok(())
    }

    /// The partner stayed attached but changed its advertisement.
    fn typec_mode_change(&mut self, old_mode: TypecMode, mode: TypecMode) -> Result<(), Error> {
        debug!("type-c mode change: {:?} -> {:?}", old_mode, mode);

        if mode.is_source_attached()
            && matches!(
                self.state.real_type,
                ChargerType::Dcp | ChargerType::Ocp | ChargerType::Float
            )
        {
            // BC1.2 classes take their current from the Rp advertisement.
            let rp_ua = self.rp_based_dcp_current(mode);
            self.vote_usb_icl(Voter::LegacyUnknown, true, rp_ua)?;
        }

        Ok(())
    }

    pub(crate) fn rp_based_dcp_current(&self, mode: TypecMode) -> i32 {
        match mode {
            TypecMode::SourceHigh => TYPEC_HIGH_CURRENT_UA,
            _ => self.config.dcp_icl_ua,
        }
    }

    /// Cycle the Type-C machine to get a verdict on non-compliant cables
    /// that pull Vbus without presenting Rp properly.
    pub(crate) async fn legacy_detection_work(&mut self) -> Result<(), Error> {
        self.state.typec_en_dis_active = true;
        let result = self.run_legacy_detection().await;
        self.state.typec_en_dis_active = false;

        // Catch up on whatever happened while the port was down.
        self.update_typec_state().await?;
        result
    }

    async fn run_legacy_detection(&mut self) -> Result<(), Error> {
        debug!("legacy cable detection");

        let mask = TypeCSwCtrl(0).with_typec_disable_cmd(true).0;
        self.hw.masked_write(TYPE_C_SW_CTRL_REG, mask, mask)?;
        TimerType::LegacyVbusDischarge.wait::<TIMER>().await;

        self.hw.masked_write(TYPE_C_SW_CTRL_REG, mask, 0)?;
        TimerType::LegacyRedetect.wait::<TIMER>().await;

        let status5 = TypeCStatus5(self.hw.read(TYPE_C_STATUS_5_REG)?);
        let legacy = status5.legacy_cable();
        self.state.legacy_cable = legacy;
        self.state.typec_legacy_valid = true;
        debug!("legacy cable: {}", legacy);

        let rp_high = self.state.typec_mode == TypecMode::SourceHigh;
        if !legacy || !rp_high {
            // No shorted CC suspected; QC detection may run.
            self.vote_hvdcp_disable(Voter::VbusCcShort, false)?;
        }

        Ok(())
    }

    /// The PD stack negotiated, or tore down, a contract.
    ///
    /// Activation is honored only once the pd-allowed gate resolved true,
    /// i.e. after QC detection had its chance to run or fail.
    pub fn set_pd_active(&mut self, active: bool) -> Result<(), Error> {
        if active && !self.votables.pd_allowed.is_enabled() {
            return Err(Error::PdNotAllowed);
        }

        self.state.pd_active = active;

        if active {
            self.vote_pd_allowed(Voter::Pd, true)?;
            self.vote_apsd_disable(Voter::Pd, true)?;
            self.vote_hvdcp_disable(Voter::Pd, true)?;

            // Route VCONN to the active CC line.
            let mask = TypeCSwCtrl(0).with_vconn_en_orientation(true).0;
            let value = match self.state.orientation {
                CcOrientation::Cc2 => mask,
                CcOrientation::Cc1 => 0,
            };
            self.hw.masked_write(TYPE_C_SW_CTRL_REG, mask, value)?;

            // PD owns the current limit now.
            self.vote_usb_icl(Voter::Pd, true, USBIN_500MA)?;
            self.vote_usb_icl(Voter::Dcp, false, 0)?;
            self.vote_usb_icl(Voter::LegacyUnknown, false, 0)?;
            self.set_real_type(ChargerType::Pd);
        } else {
            self.vote_apsd_disable(Voter::Pd, false)?;
            self.vote_hvdcp_disable(Voter::Pd, false)?;
            self.vote_usb_icl(Voter::Pd, false, 0)?;
            self.vote_pd_allowed(Voter::Pd, false)?;

            // Without a contract the cable's legacy status matters again.
            if self.config.workarounds.legacy_cable_detection && !self.state.typec_legacy_valid {
                self.schedule_in(WorkKind::LegacyDetection, 0);
            }
        }

        self.platform.supply_changed(Supply::Usb);
        Ok(())
    }

    /// The PD stack grants the contract's operating current.
    pub fn set_pd_current_max(&mut self, ua: i32) -> Result<(), Error> {
        self.vote_usb_icl(Voter::Pd, true, ua)
    }

    /// The PD stack reports the contract's voltage range.
    pub fn set_pd_voltage(&mut self, min_uv: i32, max_uv: i32) -> Result<(), Error> {
        self.state.voltage_min_uv = min_uv;
        self.state.voltage_max_uv = max_uv;

        let allowance = if max_uv <= MICRO_5V {
            AdapterAllowance::Allow5V
        } else {
            AdapterAllowance::Allow5VTo12V
        };
        self.hw.set_adapter_allowance(allowance)?;
        self.set_buck_frequency_for(min_uv)?;
        Ok(())
    }

    /// PD hard reset entry and exit. The session survives; only BC1.2 is
    /// held off so the reset does not look like a new charger.
    pub fn set_pd_in_hard_reset(&mut self, in_hard_reset: bool) -> Result<(), Error> {
        if self.state.pd_hard_reset == in_hard_reset {
            return Ok(());
        }
        self.state.pd_hard_reset = in_hard_reset;
        self.vote_apsd_disable(Voter::PdHardReset, in_hard_reset)
    }
}
