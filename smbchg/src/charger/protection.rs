//! OTG/VCONN boost protection and the boost-back storm watch.
use smbchg_traits::{Platform, Transport};

use super::{Charger, Error};
use crate::config::USBIN_25MA;
use crate::counters::{Counter, CounterType};
use crate::regs::*;
use crate::timers::{Timer, TimerType};
use crate::votable::Voter;
use crate::work::WorkKind;

impl<BUS: Transport, TIMER: Timer, PLAT: Platform> Charger<BUS, TIMER, PLAT> {
    /// Enable the OTG boost regulator.
    ///
    /// With the soft-start workaround, the current limit steps through the
    /// configured ladder while the soft-start status is polled; a boost
    /// that never reports done is switched back off.
    pub async fn enable_otg(&mut self) -> Result<(), Error> {
        if self.state.otg_failed {
            return Err(Error::RetriesExhausted);
        }
        if self.state.otg_enabled {
            return Ok(());
        }

        debug!("enabling otg boost");

        if self.config.workarounds.otg_soft_start {
            self.enable_otg_soft_start().await?;
        } else {
            self.set_otg_current_limit(self.config.otg_cl_ua)?;
            let mask = CmdOtg(0).with_otg_en(true).0;
            self.hw.masked_write(CMD_OTG_REG, mask, mask)?;
        }

        self.state.otg_enabled = true;
        self.schedule_in(WorkKind::OtgSsDone, self.config.otg_ss_done_ms);
        Ok(())
    }

    async fn enable_otg_soft_start(&mut self) -> Result<(), Error> {
        // Start at the lowest limit so an attached load cannot stall the
        // ramp, then poll for soft-start completion.
        self.set_otg_current_limit(self.config.otg_current_ladder[0])?;
        let enable_mask = CmdOtg(0).with_otg_en(true).0;
        self.hw.masked_write(CMD_OTG_REG, enable_mask, enable_mask)?;

        let mut polls = Counter::new(CounterType::OtgEnablePoll);
        loop {
            TimerType::OtgSoftStartPoll.wait::<TIMER>().await;

            let status = OtgStatus(self.hw.read(OTG_STATUS_REG)?);
            if status.boost_softstart_done() {
                break;
            }

            if polls.increment().is_err() {
                warn!("otg soft-start never completed");
                self.hw.masked_write(CMD_OTG_REG, enable_mask, 0)?;
                return Err(Error::RetriesExhausted);
            }
        }

        self.set_otg_current_limit(self.config.otg_cl_ua)
    }

    /// Disable the OTG boost regulator.
    pub fn disable_otg(&mut self) -> Result<(), Error> {
        if !self.state.otg_enabled {
            return Ok(());
        }

        debug!("disabling otg boost");
        self.work.cancel(WorkKind::OtgSsDone);

        let mask = CmdOtg(0).with_otg_en(true).0;
        self.hw.masked_write(CMD_OTG_REG, mask, 0)?;
        self.set_otg_current_limit(self.config.otg_current_ladder[0])?;
        self.state.otg_enabled = false;
        Ok(())
    }

    fn set_otg_current_limit(&mut self, ua: i32) -> Result<(), Error> {
        // The raw value indexes the ladder; clamp to the largest step
        // that does not exceed the request.
        let raw = self
            .config
            .otg_current_ladder
            .iter()
            .rposition(|&step| step <= ua)
            .unwrap_or(0);

        Ok(self.hw.write(OTG_CURRENT_LIMIT_CFG_REG, raw as u8)?)
    }

    /// The boost hit its current limit.
    pub(crate) async fn handle_otg_overcurrent(&mut self) -> Result<(), Error> {
        if !self.state.otg_enabled {
            return Ok(());
        }

        self.otg_oc_recover().await
    }

    /// Shut the boost down, wait for the over-current flag to fall, and
    /// try again, a bounded number of times per session.
    async fn otg_oc_recover(&mut self) -> Result<(), Error> {
        if self.state.otg_oc_attempts.increment().is_err() {
            warn!("otg over-current persists; giving up until next attach");
            self.state.otg_failed = true;
            return self.disable_otg().and(Err(Error::RetriesExhausted));
        }

        debug!(
            "otg over-current, recovery attempt {}",
            self.state.otg_oc_attempts.value()
        );
        self.disable_otg()?;

        let mut polls = Counter::new(CounterType::OcStatusPoll);
        loop {
            TimerType::OcStatusPoll.wait::<TIMER>().await;

            let status = OtgIntRtSts(self.hw.read(OTG_INT_RT_STS_REG)?);
            if !status.otg_overcurrent() {
                break;
            }

            if polls.increment().is_err() {
                warn!("otg over-current flag never fell");
                self.state.otg_failed = true;
                return Err(Error::RetriesExhausted);
            }
        }

        self.enable_otg().await
    }

    /// Delayed verdict on the soft-start: a boost that still reports an
    /// unfinished soft-start after the settle window is in trouble.
    pub(crate) async fn otg_ss_done_work(&mut self) -> Result<(), Error> {
        if !self.state.otg_enabled {
            return Ok(());
        }

        let status = OtgStatus(self.hw.read(OTG_STATUS_REG)?);
        if !status.boost_softstart_done() {
            return self.otg_oc_recover().await;
        }

        Ok(())
    }

    /// Supply VCONN on the inactive CC line.
    pub fn enable_vconn(&mut self) -> Result<(), Error> {
        if self.state.vconn_failed {
            return Err(Error::RetriesExhausted);
        }

        let mask = TypeCSwCtrl(0).with_vconn_en_value(true).0;
        self.hw.masked_write(TYPE_C_SW_CTRL_REG, mask, mask)?;
        self.state.vconn_enabled = true;
        Ok(())
    }

    /// Stop supplying VCONN.
    pub fn disable_vconn(&mut self) -> Result<(), Error> {
        let mask = TypeCSwCtrl(0).with_vconn_en_value(true).0;
        self.hw.masked_write(TYPE_C_SW_CTRL_REG, mask, 0)?;
        self.state.vconn_enabled = false;
        Ok(())
    }

    /// VCONN over-current recovery, same pattern as OTG with its own
    /// attempt budget.
    pub(crate) async fn vconn_oc_recover(&mut self) -> Result<(), Error> {
        if self.state.vconn_oc_attempts.increment().is_err() {
            warn!("vconn over-current persists; giving up until next attach");
            self.state.vconn_failed = true;
            return self.disable_vconn().and(Err(Error::RetriesExhausted));
        }

        debug!(
            "vconn over-current, recovery attempt {}",
            self.state.vconn_oc_attempts.value()
        );
        self.disable_vconn()?;

        let mut polls = Counter::new(CounterType::OcStatusPoll);
        loop {
            TimerType::OcStatusPoll.wait::<TIMER>().await;

            let status = TypeCStatus4(self.hw.read(TYPE_C_STATUS_1_REG + 3)?);
            if !status.vconn_overcurrent() {
                break;
            }

            if polls.increment().is_err() {
                warn!("vconn over-current flag never fell");
                self.state.vconn_failed = true;
                return Err(Error::RetriesExhausted);
            }
        }

        self.enable_vconn()
    }

    /// The switcher reported power-ok; watch for storms.
    ///
    /// The first storm is read as a weak charger and answered with a
    /// reduced current limit. A storm after that, with the weak charger
    /// vote already in place, means the switcher is self-oscillating
    /// (reverse boost): suspend the input and lift the suspension again
    /// after a fixed delay.
    pub(crate) fn handle_switcher_power_ok(&mut self) -> Result<(), Error> {
        if !self.config.workarounds.boost_back {
            return Ok(());
        }

        let status = PowerPathStatus(self.hw.read(POWER_PATH_STATUS_REG)?);

        // A suspended input or a DC-powered path cannot storm.
        let effective = self.votables.usb_icl.effective();
        if status.use_usbin() && matches!(effective, Some(ua) if (0..=USBIN_25MA).contains(&ua)) {
            return Ok(());
        }
        if status.use_dcin() {
            return Ok(());
        }

        if !self.storm.note_event(TIMER::now_millis()) {
            return Ok(());
        }

        if self.votables.usb_icl.is_client_enabled(Voter::WeakCharger) {
            warn!("reverse boost detected; suspending input");
            self.vote_usb_icl(Voter::BoostBack, true, 0)?;
            self.vote_awake(Voter::BoostBack, true)?;
            self.schedule_in(WorkKind::BoostBackRemoval, self.config.boost_back_unvote_ms);
        } else {
            warn!("weak charger suspected; reducing input current");
            self.vote_usb_icl(Voter::WeakCharger, true, self.config.weak_chg_icl_ua)?;
            // From here a storm means reverse boost; tighten the threshold.
            self.storm.set_max_count(self.config.boost_back_storm_count);
        }

        Ok(())
    }
}
