//! BC1.2 classification and QC adaptive voltage negotiation.
use smbchg_traits::{Platform, Supply, Transport};

use super::state::ChargerType;
use super::{Charger, Error};
use crate::config::{MICRO_5V, MICRO_9V, MICRO_12V, USBIN_100MA, USBIN_500MA};
use crate::regs::*;
use crate::timers::Timer;
use crate::votable::Voter;
use crate::work::WorkKind;

/// Input current cap while a forced QC2 voltage change is in flight.
const HVDCP2_TRANSITION_ICL_UA: i32 = 1_000_000;
/// Adapter voltage change per QC3.0 pulse.
const QC3_PULSE_STEP_UV: i32 = 200_000;

/// D+/D- line requests from the host's charging policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DpDmAction {
    /// Request one 200 mV increment from a QC3.0 adapter.
    DpPulse,
    /// Request one 200 mV decrement from a QC3.0 adapter.
    DmPulse,
    /// Force a QC2.0 adapter back to 5 V.
    Force5V,
    /// Force a QC2.0 adapter to 9 V.
    Force9V,
    /// Force a QC2.0 adapter to 12 V.
    Force12V,
    /// Back the input current off by one step.
    IclDown,
}

impl<BUS: Transport, TIMER: Timer, PLAT: Platform> Charger<BUS, TIMER, PLAT> {
    /// BC1.2 or QC detection made progress.
    pub(crate) fn handle_usb_source_change(&mut self) -> Result<(), Error> {
        let status = ApsdStatus(self.hw.read(APSD_STATUS_REG)?);
        trace!("apsd status: {:?}", status);

        if status.apsd_done() {
            self.handle_apsd_done()?;
        }
        if status.hvdcp_detect_done() && status.qc_charger() {
            self.handle_hvdcp_detect_done()?;
        }
        if status.hvdcp_check_timeout() {
            self.handle_hvdcp_check_timeout(status.qc_charger())?;
        }
        if status.hvdcp_auth_done() {
            self.handle_hvdcp_auth_done()?;
        }
        if status.vadp_change_done() {
            self.handle_adapter_voltage_changed()?;
        }

        Ok(())
    }

    fn handle_apsd_done(&mut self) -> Result<(), Error> {
        let result = ApsdResultStatus(self.hw.read(APSD_RESULT_STATUS_REG)?);
        let apsd_type = ChargerType::from_apsd(result);
        debug!("apsd done: {:?}", apsd_type);

        self.update_real_type(apsd_type);
        self.force_legacy_icl(self.state.real_type)?;

        // Only a DCP gets the QC detection window; every other class
        // releases the PD gate right away.
        match self.state.real_type {
            ChargerType::Sdp | ChargerType::Cdp => {
                self.vote_pd_disallowed(Voter::HvdcpTimeout, false)?;
                self.platform.notify_device_mode(true);
            }
            ChargerType::Ocp | ChargerType::Float => {
                self.vote_pd_disallowed(Voter::HvdcpTimeout, false)?;
            }
            ChargerType::Dcp => {
                if self.votables.hvdcp_disable.is_enabled() {
                    // QC will not run; PD may go ahead immediately.
                    self.vote_pd_disallowed(Voter::HvdcpTimeout, false)?;
                } else {
                    self.schedule_in(WorkKind::HvdcpDetect, self.config.hvdcp_detect_ms);
                    if self.config.workarounds.qc_auth_irq {
                        let mask = UsbinSourceChangeIntrptEnb(0).with_auth_irq_en(true).0;
                        self.hw.masked_write(USBIN_SOURCE_CHANGE_INTRPT_ENB_REG, mask, mask)?;
                    }
                }
            }
            _ => {}
        }

        self.platform.supply_changed(Supply::Usb);
        Ok(())
    }

    /// Update the detected type, applying the override rules: an active PD
    /// contract wins over any BC1.2 result, and a float reclassification
    /// cannot undo an enumeration-proven SDP.
    pub(crate) fn update_real_type(&mut self, apsd_type: ChargerType) {
        let new = if self.state.pd_active {
            ChargerType::Pd
        } else if apsd_type == ChargerType::Float && self.state.real_type == ChargerType::Sdp {
            ChargerType::Sdp
        } else {
            apsd_type
        };

        self.set_real_type(new);
    }

    /// Vote the charger class's input current.
    fn force_legacy_icl(&mut self, charger_type: ChargerType) -> Result<(), Error> {
        let ua = match charger_type {
            ChargerType::Unknown => USBIN_100MA,
            ChargerType::Sdp => {
                if self.votables.usb_icl.is_client_enabled(Voter::UsbPsy) {
                    // The USB stack already enumerated; its vote rules.
                    return Ok(());
                }
                USBIN_500MA
            }
            ChargerType::Cdp => self.config.cdp_icl_ua,
            ChargerType::Dcp | ChargerType::Ocp => self.rp_based_dcp_current(self.state.typec_mode),
            ChargerType::Float => self.config.float_icl_ua,
            ChargerType::Hvdcp2 | ChargerType::Hvdcp3 => self.config.hvdcp_icl_ua,
            ChargerType::Pd => return Ok(()),
        };

        self.vote_usb_icl(Voter::LegacyUnknown, true, ua)
    }

    fn handle_hvdcp_detect_done(&mut self) -> Result<(), Error> {
        self.work.cancel(WorkKind::HvdcpDetect);

        let result = ApsdResultStatus(self.hw.read(APSD_RESULT_STATUS_REG)?);
        let apsd_type = ChargerType::from_apsd(result);
        if apsd_type.is_hvdcp() {
            debug!("qc adapter detected: {:?}", apsd_type);
            self.update_real_type(apsd_type);
            self.force_legacy_icl(self.state.real_type)?;
        }

        self.platform.supply_changed(Supply::Usb);
        Ok(())
    }

    /// The QC detection window in hardware closed; stop holding PD back.
    fn handle_hvdcp_check_timeout(&mut self, qc_charger: bool) -> Result<(), Error> {
        self.work.cancel(WorkKind::HvdcpDetect);
        self.vote_pd_disallowed(Voter::HvdcpTimeout, false)?;

        if !qc_charger && self.state.real_type == ChargerType::Dcp {
            self.vote_usb_icl(Voter::Dcp, true, self.config.dcp_icl_ua)?;
        }

        if !self.votables.pd_allowed.is_enabled() {
            // PD stays ruled out; hand the session back to the QC engine.
            self.set_pd_active(false)?;
        }
        Ok(())
    }

    fn handle_hvdcp_auth_done(&mut self) -> Result<(), Error> {
        let result = ApsdResultStatus(self.hw.read(APSD_RESULT_STATUS_REG)?);
        let apsd_type = ChargerType::from_apsd(result);
        if apsd_type != ChargerType::Hvdcp3 {
            return Ok(());
        }

        debug!("qc3 authentication done");
        self.update_real_type(apsd_type);
        self.force_legacy_icl(self.state.real_type)?;
        self.platform.supply_changed(Supply::Usb);
        Ok(())
    }

    /// The adapter acknowledged a voltage change; retune the buck.
    fn handle_adapter_voltage_changed(&mut self) -> Result<(), Error> {
        let status = QcChangeStatus(self.hw.read(QC_CHANGE_STATUS_REG)?);
        let uv = if status.qc_12v() {
            MICRO_12V
        } else if status.qc_9v() {
            MICRO_9V
        } else {
            MICRO_5V
        };

        self.state.voltage_max_uv = uv;
        self.set_buck_frequency_for(uv)
    }

    /// Execute a D+/D- request from the host's charging policy.
    pub fn dp_dm(&mut self, action: DpDmAction) -> Result<(), Error> {
        match action {
            DpDmAction::DpPulse => {
                if self.state.real_type != ChargerType::Hvdcp3 {
                    return Ok(());
                }
                if self.state.pulse_count >= self.config.qc3_max_pulses {
                    warn!("qc3 pulse limit reached at {}", self.state.pulse_count);
                    return Ok(());
                }

                let mask = CmdHvdcp2(0).with_single_increment(true).0;
                self.hw.masked_write(CMD_HVDCP_2_REG, mask, mask)?;
                self.state.pulse_count += 1;
                self.update_adaptive_voltage()?;
            }
            DpDmAction::DmPulse => {
                if self.state.real_type != ChargerType::Hvdcp3 || self.state.pulse_count == 0 {
                    return Ok(());
                }

                let mask = CmdHvdcp2(0).with_single_decrement(true).0;
                self.hw.masked_write(CMD_HVDCP_2_REG, mask, mask)?;
                self.state.pulse_count -= 1;
                self.update_adaptive_voltage()?;
            }
            DpDmAction::Force5V => {
                self.hw.set_adapter_allowance(AdapterAllowance::Allow5V)?;
                let mask = CmdHvdcp2(0).with_force_5v(true).0;
                self.hw.masked_write(CMD_HVDCP_2_REG, mask, mask)?;

                self.state.voltage_min_uv = MICRO_5V;
                self.state.voltage_max_uv = MICRO_5V;
                self.set_buck_frequency_for(MICRO_5V)?;
                self.vote_usb_icl(Voter::Hvdcp2Icl, false, 0)?;
            }
            DpDmAction::Force9V => {
                self.force_hvdcp2_voltage(MICRO_9V, AdapterAllowance::Allow9V)?;
                let mask = CmdHvdcp2(0).with_force_9v(true).0;
                self.hw.masked_write(CMD_HVDCP_2_REG, mask, mask)?;
            }
            DpDmAction::Force12V => {
                self.force_hvdcp2_voltage(MICRO_12V, AdapterAllowance::Allow12V)?;
                let mask = CmdHvdcp2(0).with_force_12v(true).0;
                self.hw.masked_write(CMD_HVDCP_2_REG, mask, mask)?;
            }
            DpDmAction::IclDown => {
                let effective = self.votables.usb_icl.effective().unwrap_or(0);
                if effective > USBIN_100MA {
                    self.vote_usb_icl(Voter::SwQc3, true, effective - USBIN_100MA)?;
                }
            }
        }

        Ok(())
    }

    /// Restart BC1.2 classification, e.g. after a rerun request from the host.
    pub fn rerun_apsd(&mut self) -> Result<(), Error> {
        debug!("rerunning apsd");
        let mask = CmdApsd(0).with_apsd_rerun(true).0;
        Ok(self.hw.masked_write(CMD_APSD_REG, mask, mask)?)
    }

    /// The pulse count the adapter acknowledged, read back from hardware.
    pub fn hw_pulse_count(&mut self) -> Result<u8, Error> {
        let status = QcPulseCountStatus(self.hw.read(QC_PULSE_COUNT_STATUS_REG)?);
        Ok(status.pulse_count())
    }

    fn force_hvdcp2_voltage(&mut self, uv: i32, allowance: AdapterAllowance) -> Result<(), Error> {
        // Cap the input current before the transition so the collapsing
        // 5 V rail cannot brown the system out.
        self.vote_usb_icl(Voter::Hvdcp2Icl, true, HVDCP2_TRANSITION_ICL_UA)?;

        self.hw.set_adapter_allowance(allowance)?;
        self.state.voltage_min_uv = uv;
        self.state.voltage_max_uv = uv;
        self.set_buck_frequency_for(uv)
    }

    /// The adapter voltage a QC3.0 pulse count amounts to.
    pub(crate) fn qc3_voltage_for_pulses(&self, pulses: u8) -> i32 {
        MICRO_5V + i32::from(pulses) * QC3_PULSE_STEP_UV
    }

    fn update_adaptive_voltage(&mut self) -> Result<(), Error> {
        let uv = self.qc3_voltage_for_pulses(self.state.pulse_count);
        self.state.voltage_max_uv = uv;
        self.set_buck_frequency_for(uv)
    }

    /// Retune the buck switching frequency to the adapter voltage tier.
    pub(crate) fn set_buck_frequency_for(&mut self, uv: i32) -> Result<(), Error> {
        let freq = &self.config.buck_freq;
        let khz = if uv < 6_000_000 {
            freq.freq_5v
        } else if uv < MICRO_9V {
            freq.freq_6v_8v
        } else if uv < MICRO_12V {
            freq.freq_9v
        } else {
            freq.freq_12v
        };

        Ok(self.hw.set_buck_frequency(khz)?)
    }
}
