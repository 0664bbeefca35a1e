//! Thermal derating and JEITA compensation.
use smbchg_traits::{Platform, Supply, Transport};

use super::state::ChargerType;
use super::{Charger, Error};
use crate::config::{MICRO_9V, MICRO_12V};
use crate::regs::*;
use crate::timers::Timer;
use crate::votable::Voter;

impl<BUS: Transport, TIMER: Timer, PLAT: Platform> Charger<BUS, TIMER, PLAT> {
    /// Apply a thermal mitigation level from the host's thermal daemon.
    ///
    /// Level zero clears the thermal vote. The highest level disables
    /// charging outright on top of the table's last entry.
    pub fn set_system_temp_level(&mut self, level: usize) -> Result<(), Error> {
        let levels = self.config.thermal_levels();
        if level >= levels {
            return Err(Error::InvalidThermalLevel);
        }

        self.state.system_temp_level = level;
        self.vote_chg_disable(Voter::ThermalDaemon, level == levels - 1)?;

        if level == 0 {
            return self.vote_usb_icl(Voter::ThermalDaemon, false, 0);
        }

        let ua = self.thermal_icl_for(level);
        debug!("thermal level {}: {} uA", level, ua);
        self.vote_usb_icl(Voter::ThermalDaemon, true, ua)
    }

    /// Look the level up in the charger type's derating table.
    fn thermal_icl_for(&self, level: usize) -> i32 {
        let tables = &self.config.thermal;

        match self.state.real_type {
            ChargerType::Hvdcp2 => tables.qc2[level],
            ChargerType::Hvdcp3 => tables.qc3[level],
            ChargerType::Pd => {
                // Higher contract voltages derate harder for the same
                // thermal budget.
                let percent = if self.state.voltage_min_uv >= MICRO_12V {
                    60
                } else if self.state.voltage_min_uv >= MICRO_9V {
                    65
                } else if self.state.voltage_min_uv >= 6_000_000 {
                    75
                } else {
                    85
                };
                tables.pd_base[level] * percent / 100
            }
            _ => tables.dcp[level],
        }
    }

    /// The battery crossed a temperature window boundary.
    ///
    /// The hard limits stop charging in hardware; the soft windows get a
    /// fast charge current compensation vote.
    pub(crate) fn handle_batt_temp_changed(&mut self) -> Result<(), Error> {
        let status = BatteryChargerStatus2(self.hw.read(BATTERY_CHARGER_STATUS_2_REG)?);

        let in_soft_window = status.bat_temp_hot_soft() || status.bat_temp_cold_soft();
        self.vote_fcc(Voter::Jeita, in_soft_window, self.config.jeita_cc_comp_ua)?;
        self.vote_awake(Voter::Jeita, in_soft_window)?;

        if status.bat_temp_too_hot() || status.bat_temp_too_cold() {
            debug!("battery outside hard temperature limits");
        }

        self.platform.supply_changed(Supply::Battery);
        Ok(())
    }
}
