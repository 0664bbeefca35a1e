//! Scenario tests for the charger state machine, on dummy hardware.
use smbchg_traits::Supply;

use super::state::ChargerType;
use super::{Charger, Error};
use crate::config::ChargerConfig;
use crate::dummy::{DummyBus, DummyPlatform, DummyTimer};
use crate::events::Event;
use crate::regs::*;
use crate::votable::Voter;
use crate::work::WorkKind;

type TestCharger = Charger<DummyBus, DummyTimer, DummyPlatform>;

async fn charger_with(config: ChargerConfig) -> TestCharger {
    DummyTimer::reset();

    let mut charger = Charger::new(DummyBus::new(), DummyPlatform::new(), config);
    charger.initialize().await.unwrap();
    charger.hw.bus.clear_writes();
    charger
}

async fn charger() -> TestCharger {
    charger_with(ChargerConfig::default()).await
}

/// Raise Vbus and attach a default-Rp source.
async fn attach_source(charger: &mut TestCharger) {
    charger
        .hw
        .bus
        .set_reg(USB_INT_RT_STS_REG, UsbIntRtSts(0).with_usbin_plugin(true).0);
    charger.handle_event(Event::UsbPlugin).await;

    charger
        .hw
        .bus
        .set_reg(TYPE_C_STATUS_1_REG, TypeCStatus1(0).with_source_default(true).0);
    charger
        .hw
        .bus
        .set_reg(TYPE_C_STATUS_1_REG + 3, TypeCStatus4(0).with_debounce_done(true).0);
    charger.handle_event(Event::TypecChange).await;
}

/// Drop the CC lines and Vbus again.
async fn detach(charger: &mut TestCharger) {
    charger.hw.bus.set_reg(TYPE_C_STATUS_1_REG, 0);
    charger.hw.bus.set_reg(TYPE_C_STATUS_1_REG + 1, 0);
    charger
        .hw
        .bus
        .set_reg(TYPE_C_STATUS_1_REG + 3, TypeCStatus4(0).with_debounce_done(true).0);
    charger.handle_event(Event::TypecChange).await;

    charger.hw.bus.set_reg(USB_INT_RT_STS_REG, 0);
    charger.handle_event(Event::UsbPlugin).await;
}

/// Latch a detection result and fire the source-change event.
async fn report_apsd(charger: &mut TestCharger, status: ApsdStatus, result: ApsdResultStatus) {
    charger.hw.bus.set_reg(APSD_STATUS_REG, status.0);
    charger.hw.bus.set_reg(APSD_RESULT_STATUS_REG, result.0);
    charger.handle_event(Event::UsbSourceChange).await;
}

fn dcp_result() -> ApsdResultStatus {
    ApsdResultStatus(0).with_dcp(true)
}

fn qc3_status() -> ApsdStatus {
    ApsdStatus(0)
        .with_apsd_done(true)
        .with_hvdcp_detect_done(true)
        .with_qc_charger(true)
}

#[tokio::test]
async fn dcp_detection_gates_pd_until_the_detection_window_closes() {
    let mut charger = charger().await;
    attach_source(&mut charger).await;

    report_apsd(&mut charger, ApsdStatus(0).with_apsd_done(true), dcp_result()).await;
    assert_eq!(charger.charger_type(), ChargerType::Dcp);
    assert_eq!(charger.votables.usb_icl.effective(), Some(1_500_000));
    assert!(charger.work.is_scheduled(WorkKind::HvdcpDetect));

    // QC detection still has its window; PD must wait.
    assert_eq!(charger.set_pd_active(true), Err(Error::PdNotAllowed));
    assert!(!charger.state.pd_active);

    DummyTimer::advance(2500);
    charger.run_due_work().await;

    charger.set_pd_active(true).unwrap();
    assert_eq!(charger.charger_type(), ChargerType::Pd);
    assert_eq!(charger.votables.usb_icl.effective(), Some(500_000));

    charger.set_pd_current_max(3_000_000).unwrap();
    assert_eq!(charger.votables.usb_icl.effective(), Some(3_000_000));

    charger.set_pd_voltage(5_000_000, 5_000_000).unwrap();
    assert_eq!(
        charger.hw.bus.last_write_to(USBIN_ADAPTER_ALLOW_CFG_REG),
        Some(AdapterAllowance::Allow5V as u8)
    );
    assert_eq!(charger.hw.bus.last_write_to(CFG_BUCK_FREQ_REG), Some(6));
}

#[tokio::test]
async fn a_cdp_classification_releases_the_pd_gate_immediately() {
    let mut charger = charger().await;
    attach_source(&mut charger).await;

    report_apsd(
        &mut charger,
        ApsdStatus(0).with_apsd_done(true),
        ApsdResultStatus(0).with_cdp(true),
    )
    .await;
    assert_eq!(charger.charger_type(), ChargerType::Cdp);
    assert_eq!(charger.platform.device_mode.last(), Some(&true));

    // A CDP never gets a QC window; PD may negotiate right away.
    assert!(!charger.work.is_scheduled(WorkKind::HvdcpDetect));
    charger.set_pd_active(true).unwrap();
    assert!(charger.state.pd_active);
}

#[tokio::test]
async fn a_float_classification_releases_the_pd_gate_immediately() {
    let mut charger = charger().await;
    attach_source(&mut charger).await;

    report_apsd(
        &mut charger,
        ApsdStatus(0).with_apsd_done(true),
        ApsdResultStatus(0).with_float(true),
    )
    .await;
    assert!(!charger.work.is_scheduled(WorkKind::HvdcpDetect));
    charger.set_pd_active(true).unwrap();
}

#[tokio::test]
async fn the_hardware_qc_window_closing_releases_the_pd_gate() {
    let mut charger = charger().await;
    attach_source(&mut charger).await;

    report_apsd(&mut charger, ApsdStatus(0).with_apsd_done(true), dcp_result()).await;
    assert!(charger.work.is_scheduled(WorkKind::HvdcpDetect));
    assert_eq!(charger.set_pd_active(true), Err(Error::PdNotAllowed));

    // Hardware gives up on QC before the software window elapses.
    report_apsd(
        &mut charger,
        ApsdStatus(0).with_apsd_done(true).with_hvdcp_check_timeout(true),
        dcp_result(),
    )
    .await;
    assert!(!charger.work.is_scheduled(WorkKind::HvdcpDetect));
    assert_eq!(charger.votables.usb_icl.client_vote(Voter::Dcp), Some(1_500_000));
    charger.set_pd_active(true).unwrap();
}

#[tokio::test]
async fn apsd_result_cannot_override_an_active_pd_contract() {
    let mut charger = charger().await;
    attach_source(&mut charger).await;

    report_apsd(&mut charger, ApsdStatus(0).with_apsd_done(true), dcp_result()).await;
    DummyTimer::advance(2500);
    charger.run_due_work().await;
    charger.set_pd_active(true).unwrap();

    // A late BC1.2 rerun still reports a DCP; the contract wins.
    report_apsd(&mut charger, ApsdStatus(0).with_apsd_done(true), dcp_result()).await;
    assert_eq!(charger.charger_type(), ChargerType::Pd);
    assert!(!charger.votables.usb_icl.is_client_enabled(Voter::Dcp));
}

#[tokio::test]
async fn an_enumerated_float_charger_is_treated_as_an_sdp() {
    let mut charger = charger().await;
    attach_source(&mut charger).await;

    report_apsd(
        &mut charger,
        ApsdStatus(0).with_apsd_done(true),
        ApsdResultStatus(0).with_float(true),
    )
    .await;
    assert_eq!(charger.charger_type(), ChargerType::Float);
    assert_eq!(charger.votables.usb_icl.effective(), Some(100_000));

    // The USB stack enumerated; the data lines were not floating after all.
    charger.set_usb_current(500_000).unwrap();
    assert_eq!(charger.charger_type(), ChargerType::Sdp);
    assert_eq!(charger.votables.usb_icl.client_vote(Voter::UsbPsy), Some(500_000));

    // A repeated float report does not undo the reclassification.
    report_apsd(
        &mut charger,
        ApsdStatus(0).with_apsd_done(true),
        ApsdResultStatus(0).with_float(true),
    )
    .await;
    assert_eq!(charger.charger_type(), ChargerType::Sdp);
}

#[tokio::test]
async fn removal_resets_the_session_and_cancels_pending_work() {
    let mut charger = charger().await;
    attach_source(&mut charger).await;

    report_apsd(&mut charger, qc3_status(), ApsdResultStatus(0).with_qc3(true).with_dcp(true)).await;
    assert_eq!(charger.charger_type(), ChargerType::Hvdcp3);

    charger.dp_dm(super::DpDmAction::DpPulse).unwrap();
    charger.dp_dm(super::DpDmAction::DpPulse).unwrap();
    assert_eq!(charger.state.pulse_count, 2);
    assert_eq!(charger.state.voltage_max_uv, 5_400_000);

    detach(&mut charger).await;

    assert!(!charger.state.typec_present);
    assert_eq!(charger.charger_type(), ChargerType::Unknown);
    assert!(!charger.state.pd_active);
    assert_eq!(charger.state.pulse_count, 0);
    assert_eq!(charger.state.voltage_max_uv, 5_000_000);
    assert!(charger.work.is_empty());
    assert_eq!(charger.votables.usb_icl.effective(), Some(100_000));
    assert_eq!(charger.platform.device_mode.last(), Some(&false));
    assert_eq!(charger.platform.host_mode.last(), Some(&false));
}

#[tokio::test]
async fn qc3_pulses_move_the_buck_frequency_tier() {
    let mut config = ChargerConfig::default();
    config.qc3_max_pulses = 40;
    let mut charger = charger_with(config).await;
    attach_source(&mut charger).await;

    report_apsd(&mut charger, qc3_status(), ApsdResultStatus(0).with_qc3(true).with_dcp(true)).await;

    // Nineteen pulses land at 8.8 V, still in the 6-8 V tier.
    for _ in 0..19 {
        charger.dp_dm(super::DpDmAction::DpPulse).unwrap();
    }
    assert_eq!(charger.state.voltage_max_uv, 8_800_000);
    assert_eq!(charger.hw.bus.last_write_to(CFG_BUCK_FREQ_REG), Some(8));

    // The twentieth crosses into the 9 V tier.
    charger.dp_dm(super::DpDmAction::DpPulse).unwrap();
    assert_eq!(charger.state.voltage_max_uv, 9_000_000);
    assert_eq!(charger.hw.bus.last_write_to(CFG_BUCK_FREQ_REG), Some(10));

    charger.dp_dm(super::DpDmAction::DmPulse).unwrap();
    assert_eq!(charger.state.voltage_max_uv, 8_800_000);
    assert_eq!(charger.hw.bus.last_write_to(CFG_BUCK_FREQ_REG), Some(8));
}

#[tokio::test]
async fn qc3_pulse_requests_stop_at_the_configured_limit() {
    let mut charger = charger().await;
    attach_source(&mut charger).await;

    report_apsd(&mut charger, qc3_status(), ApsdResultStatus(0).with_qc3(true).with_dcp(true)).await;
    charger.hw.bus.clear_writes();

    for _ in 0..10 {
        charger.dp_dm(super::DpDmAction::DpPulse).unwrap();
    }

    assert_eq!(charger.state.pulse_count, 8);
    assert_eq!(charger.hw.bus.writes_to(CMD_HVDCP_2_REG).len(), 8);
}

#[tokio::test]
async fn a_forced_qc2_voltage_change_caps_the_input_current_first() {
    let mut charger = charger().await;
    attach_source(&mut charger).await;

    report_apsd(&mut charger, qc3_status(), ApsdResultStatus(0).with_qc2(true).with_dcp(true)).await;
    assert_eq!(charger.charger_type(), ChargerType::Hvdcp2);

    charger.dp_dm(super::DpDmAction::Force9V).unwrap();
    assert_eq!(charger.votables.usb_icl.client_vote(Voter::Hvdcp2Icl), Some(1_000_000));
    assert_eq!(
        charger.hw.bus.last_write_to(USBIN_ADAPTER_ALLOW_CFG_REG),
        Some(AdapterAllowance::Allow9V as u8)
    );
    assert_eq!(
        charger.hw.bus.last_write_to(CMD_HVDCP_2_REG),
        Some(CmdHvdcp2(0).with_force_9v(true).0)
    );
    assert_eq!(charger.state.voltage_max_uv, 9_000_000);

    charger.dp_dm(super::DpDmAction::Force5V).unwrap();
    assert!(!charger.votables.usb_icl.is_client_enabled(Voter::Hvdcp2Icl));
    assert_eq!(
        charger.hw.bus.last_write_to(USBIN_ADAPTER_ALLOW_CFG_REG),
        Some(AdapterAllowance::Allow5V as u8)
    );
    assert_eq!(charger.hw.bus.last_write_to(CFG_BUCK_FREQ_REG), Some(6));
}

#[tokio::test]
async fn icl_down_backs_the_effective_limit_off_one_step() {
    let mut charger = charger().await;
    attach_source(&mut charger).await;

    report_apsd(&mut charger, qc3_status(), ApsdResultStatus(0).with_qc3(true).with_dcp(true)).await;
    assert_eq!(charger.votables.usb_icl.effective(), Some(3_000_000));

    charger.dp_dm(super::DpDmAction::IclDown).unwrap();
    assert_eq!(charger.votables.usb_icl.effective(), Some(2_900_000));

    charger.dp_dm(super::DpDmAction::IclDown).unwrap();
    assert_eq!(charger.votables.usb_icl.effective(), Some(2_800_000));
}

#[tokio::test]
async fn otg_gives_up_after_its_recovery_attempts_are_spent() {
    let mut charger = charger().await;

    charger
        .hw
        .bus
        .set_reg(OTG_STATUS_REG, OtgStatus(0).with_boost_softstart_done(true).0);
    charger.enable_otg().await.unwrap();
    assert!(charger.state.otg_enabled);

    // The over-current flag falls as soon as the boost is off, so every
    // recovery attempt gets as far as re-enabling.
    for _ in 0..3 {
        charger.handle_event(Event::OtgOvercurrent).await;
        assert!(charger.state.otg_enabled);
        assert!(!charger.state.otg_failed);
    }

    // The budget is spent; the next one shuts OTG down for the session.
    charger.handle_event(Event::OtgOvercurrent).await;
    assert!(charger.state.otg_failed);
    assert!(!charger.state.otg_enabled);
    assert_eq!(charger.enable_otg().await, Err(Error::RetriesExhausted));
}

#[tokio::test]
async fn otg_soft_start_failure_switches_the_boost_back_off() {
    let mut config = ChargerConfig::default();
    config.workarounds.otg_soft_start = true;
    let mut charger = charger_with(config).await;

    // Soft-start never reports done.
    assert_eq!(charger.enable_otg().await, Err(Error::RetriesExhausted));
    assert!(!charger.state.otg_enabled);
    assert_eq!(charger.hw.bus.last_write_to(CMD_OTG_REG), Some(0));
    // The ramp started from the lowest current limit step.
    assert_eq!(charger.hw.bus.writes_to(OTG_CURRENT_LIMIT_CFG_REG).first(), Some(&0));
}

#[tokio::test]
async fn otg_soft_start_success_raises_the_current_limit() {
    let mut config = ChargerConfig::default();
    config.workarounds.otg_soft_start = true;
    let mut charger = charger_with(config).await;

    charger
        .hw
        .bus
        .set_reg(OTG_STATUS_REG, OtgStatus(0).with_boost_softstart_done(true).0);
    charger.enable_otg().await.unwrap();

    assert!(charger.state.otg_enabled);
    assert_eq!(charger.hw.bus.last_write_to(OTG_CURRENT_LIMIT_CFG_REG), Some(3));
    assert!(charger.work.is_scheduled(WorkKind::OtgSsDone));
}

#[tokio::test]
async fn switcher_storms_escalate_from_weak_charger_to_input_suspend() {
    let mut config = ChargerConfig::default();
    config.workarounds.boost_back = true;
    let mut charger = charger_with(config).await;

    charger
        .hw
        .bus
        .set_reg(POWER_PATH_STATUS_REG, PowerPathStatus(0).with_use_usbin(true).0);

    // Eight quick successions make the first storm.
    for _ in 0..9 {
        charger.handle_event(Event::SwitcherPowerOk).await;
        DummyTimer::advance(10);
    }
    assert_eq!(charger.votables.usb_icl.client_vote(Voter::WeakCharger), Some(500_000));
    assert!(!charger.votables.usb_icl.is_client_enabled(Voter::BoostBack));
    assert_eq!(charger.storm.max_count(), 3);

    // With the weak charger vote in place the threshold is tighter, and the
    // next storm reads as reverse boost.
    for _ in 0..4 {
        charger.handle_event(Event::SwitcherPowerOk).await;
        DummyTimer::advance(10);
    }
    assert_eq!(charger.votables.usb_icl.client_vote(Voter::BoostBack), Some(0));
    assert_eq!(charger.votables.usb_icl.effective(), Some(0));
    assert!(charger.votables.awake.is_enabled());
    assert!(charger.work.is_scheduled(WorkKind::BoostBackRemoval));

    // The suspend vote lifts again after the fixed delay.
    DummyTimer::advance(750);
    charger.run_due_work().await;
    assert!(!charger.votables.usb_icl.is_client_enabled(Voter::BoostBack));
    assert!(!charger.votables.awake.is_enabled());
    assert_eq!(charger.votables.usb_icl.effective(), Some(100_000));
}

#[tokio::test]
async fn a_suspended_input_stops_counting_power_ok_events() {
    let mut config = ChargerConfig::default();
    config.workarounds.boost_back = true;
    let mut charger = charger_with(config).await;

    charger
        .hw
        .bus
        .set_reg(POWER_PATH_STATUS_REG, PowerPathStatus(0).with_use_usbin(true).0);
    charger.vote_usb_icl(Voter::User, true, 0).unwrap();

    // The switcher line still fires while the input is suspended, but the
    // events must not count towards a storm.
    for _ in 0..20 {
        charger.handle_event(Event::SwitcherPowerOk).await;
        DummyTimer::advance(10);
    }
    assert!(!charger.votables.usb_icl.is_client_enabled(Voter::WeakCharger));
    assert!(charger.work.is_empty());
}

#[tokio::test]
async fn a_dc_powered_path_ignores_power_ok_events() {
    let mut config = ChargerConfig::default();
    config.workarounds.boost_back = true;
    let mut charger = charger_with(config).await;

    charger
        .hw
        .bus
        .set_reg(POWER_PATH_STATUS_REG, PowerPathStatus(0).with_use_dcin(true).0);

    for _ in 0..20 {
        charger.handle_event(Event::SwitcherPowerOk).await;
        DummyTimer::advance(10);
    }
    assert!(!charger.votables.usb_icl.is_client_enabled(Voter::WeakCharger));
    assert!(charger.work.is_empty());
}

#[tokio::test]
async fn thermal_levels_vote_the_derating_table() {
    let mut charger = charger().await;
    attach_source(&mut charger).await;

    report_apsd(&mut charger, ApsdStatus(0).with_apsd_done(true), dcp_result()).await;

    charger.set_system_temp_level(5).unwrap();
    assert_eq!(charger.votables.usb_icl.client_vote(Voter::ThermalDaemon), Some(1_200_000));
    assert!(!charger.votables.chg_disable.is_enabled());

    // The last level stops charging on top of the table entry.
    charger.set_system_temp_level(9).unwrap();
    assert_eq!(charger.votables.usb_icl.client_vote(Voter::ThermalDaemon), Some(400_000));
    assert!(charger.votables.chg_disable.is_enabled());
    assert_eq!(charger.hw.bus.last_write_to(CHARGING_ENABLE_CMD_REG), Some(0));

    charger.set_system_temp_level(0).unwrap();
    assert!(!charger.votables.usb_icl.is_client_enabled(Voter::ThermalDaemon));
    assert!(!charger.votables.chg_disable.is_enabled());
    assert_eq!(charger.hw.bus.last_write_to(CHARGING_ENABLE_CMD_REG), Some(1));

    assert_eq!(charger.set_system_temp_level(10), Err(Error::InvalidThermalLevel));
}

#[tokio::test]
async fn pd_thermal_derating_scales_with_the_contract_voltage() {
    let mut charger = charger().await;

    charger.set_real_type(ChargerType::Pd);

    charger.state.voltage_min_uv = 5_000_000;
    charger.set_system_temp_level(5).unwrap();
    assert_eq!(charger.votables.usb_icl.client_vote(Voter::ThermalDaemon), Some(1_020_000));

    charger.state.voltage_min_uv = 9_000_000;
    charger.set_system_temp_level(5).unwrap();
    assert_eq!(charger.votables.usb_icl.client_vote(Voter::ThermalDaemon), Some(780_000));

    charger.state.voltage_min_uv = 12_000_000;
    charger.set_system_temp_level(5).unwrap();
    assert_eq!(charger.votables.usb_icl.client_vote(Voter::ThermalDaemon), Some(720_000));
}

#[tokio::test]
async fn jeita_soft_windows_compensate_the_fast_charge_current() {
    let mut charger = charger().await;

    charger.hw.bus.set_reg(
        BATTERY_CHARGER_STATUS_2_REG,
        BatteryChargerStatus2(0).with_bat_temp_hot_soft(true).0,
    );
    charger.handle_event(Event::BattTempChanged).await;
    assert_eq!(charger.votables.fcc.effective(), Some(1_200_000));
    assert_eq!(charger.hw.bus.last_write_to(FAST_CHARGE_CURRENT_CFG_REG), Some(48));

    charger.hw.bus.set_reg(BATTERY_CHARGER_STATUS_2_REG, 0);
    charger.handle_event(Event::BattTempChanged).await;
    assert_eq!(charger.votables.fcc.effective(), Some(2_000_000));
    assert_eq!(charger.hw.bus.last_write_to(FAST_CHARGE_CURRENT_CFG_REG), Some(80));

    assert!(charger.platform.supply_changes.contains(&Supply::Battery));
}

#[tokio::test]
async fn legacy_cable_detection_cycles_the_port_and_releases_qc() {
    let mut config = ChargerConfig::default();
    config.workarounds.legacy_cable_detection = true;
    let mut charger = charger_with(config).await;

    assert!(charger.votables.hvdcp_disable.is_enabled());

    attach_source(&mut charger).await;
    assert!(charger.work.is_scheduled(WorkKind::LegacyDetection));
    charger.run_due_work().await;

    assert!(charger.state.typec_legacy_valid);
    assert!(!charger.state.legacy_cable);
    assert!(!charger.state.typec_en_dis_active);
    assert!(!charger.votables.hvdcp_disable.is_enabled());

    // The port was disabled once and re-enabled once.
    let disable_bit = TypeCSwCtrl(0).with_typec_disable_cmd(true).0;
    assert_eq!(charger.hw.bus.writes_to(TYPE_C_SW_CTRL_REG), vec![disable_bit, 0]);
}

#[tokio::test]
async fn a_legacy_cable_with_high_rp_keeps_qc_disabled() {
    let mut config = ChargerConfig::default();
    config.workarounds.legacy_cable_detection = true;
    let mut charger = charger_with(config).await;

    charger
        .hw
        .bus
        .set_reg(TYPE_C_STATUS_5_REG, TypeCStatus5(0).with_legacy_cable(true).0);
    charger
        .hw
        .bus
        .set_reg(USB_INT_RT_STS_REG, UsbIntRtSts(0).with_usbin_plugin(true).0);
    charger.handle_event(Event::UsbPlugin).await;
    charger
        .hw
        .bus
        .set_reg(TYPE_C_STATUS_1_REG, TypeCStatus1(0).with_source_high(true).0);
    charger
        .hw
        .bus
        .set_reg(TYPE_C_STATUS_1_REG + 3, TypeCStatus4(0).with_debounce_done(true).0);
    charger.handle_event(Event::TypecChange).await;

    charger.run_due_work().await;

    // A 3 A advertisement on a legacy cable suggests a Vbus/CC short.
    assert!(charger.state.legacy_cable);
    assert!(charger.votables.hvdcp_disable.is_enabled());
}

#[tokio::test]
async fn a_pd_hard_reset_holds_bc12_off_without_ending_the_session() {
    let mut charger = charger().await;
    attach_source(&mut charger).await;

    report_apsd(&mut charger, ApsdStatus(0).with_apsd_done(true), dcp_result()).await;
    DummyTimer::advance(2500);
    charger.run_due_work().await;
    charger.set_pd_active(true).unwrap();

    charger.set_pd_in_hard_reset(true).unwrap();
    assert!(charger.state.pd_hard_reset);
    assert!(charger.votables.apsd_disable.is_enabled());
    assert!(charger.state.typec_present);
    assert!(charger.state.pd_active);

    // The contract's own vote keeps BC1.2 off after the reset ends.
    charger.set_pd_in_hard_reset(false).unwrap();
    assert!(charger.votables.apsd_disable.is_enabled());
    assert!(charger.votables.apsd_disable.is_client_enabled(Voter::Pd));
}

#[tokio::test]
async fn a_sink_attach_enters_host_mode_and_zeroes_the_input() {
    let mut charger = charger().await;

    charger
        .hw
        .bus
        .set_reg(TYPE_C_STATUS_1_REG + 1, TypeCStatus2(0).with_sink_attached(true).0);
    charger.hw.bus.set_reg(
        TYPE_C_STATUS_1_REG + 3,
        TypeCStatus4(0).with_debounce_done(true).with_ufp_dfp_mode(true).0,
    );
    charger.handle_event(Event::TypecChange).await;

    assert!(charger.state.typec_present);
    assert_eq!(charger.platform.host_mode.last(), Some(&true));
    assert_eq!(charger.votables.usb_icl.effective(), Some(0));

    detach(&mut charger).await;
    assert_eq!(charger.platform.host_mode.last(), Some(&false));
}

#[tokio::test]
async fn an_adamant_sink_gets_sourced_after_the_role_cycle() {
    let mut config = ChargerConfig::default();
    config.try_sink_enabled = true;
    let mut charger = charger_with(config).await;

    // The partner keeps showing Rd throughout: debounce holds, we stay
    // the source and it never raises Vbus.
    charger
        .hw
        .bus
        .set_reg(TYPE_C_STATUS_1_REG + 1, TypeCStatus2(0).with_sink_attached(true).0);
    charger.hw.bus.set_reg(
        TYPE_C_STATUS_1_REG + 3,
        TypeCStatus4(0).with_debounce_done(true).with_ufp_dfp_mode(true).0,
    );
    charger.handle_event(Event::TypecChange).await;

    // Forced sink, dual role, trywait source, released to dual role.
    let ufp = TypeCSwCtrl(0).with_ufp_en_cmd(true).0;
    let dfp = TypeCSwCtrl(0).with_dfp_en_cmd(true).0;
    assert_eq!(charger.hw.bus.writes_to(TYPE_C_SW_CTRL_REG), vec![ufp, 0, dfp, 0]);
    assert_eq!(charger.hw.bus.last_write_to(MISC_CFG_REG), Some(0));

    assert!(charger.state.typec_present);
    assert_eq!(charger.platform.host_mode.last(), Some(&true));
    assert_eq!(charger.votables.usb_icl.effective(), Some(0));
}

#[tokio::test]
async fn accessories_skip_the_try_sink_role_cycle() {
    let mut config = ChargerConfig::default();
    config.try_sink_enabled = true;
    let mut charger = charger_with(config).await;

    charger
        .hw
        .bus
        .set_reg(TYPE_C_STATUS_1_REG + 1, TypeCStatus2(0).with_audio_adapter(true).0);
    charger.hw.bus.set_reg(
        TYPE_C_STATUS_1_REG + 3,
        TypeCStatus4(0).with_debounce_done(true).with_ufp_dfp_mode(true).0,
    );
    charger.handle_event(Event::TypecChange).await;

    assert!(charger.state.typec_present);
    assert!(charger.hw.bus.writes_to(TYPE_C_SW_CTRL_REG).is_empty());
    assert_eq!(charger.platform.host_mode.last(), Some(&true));
}

#[tokio::test]
async fn the_fcc_stepper_floor_holds_until_vbus_rises() {
    let mut config = ChargerConfig::default();
    config.fcc_stepper_enable = true;
    let mut charger = charger_with(config).await;

    // Without an input the ramp waits at its floor.
    assert_eq!(charger.votables.fcc.effective(), Some(1_500_000));

    charger
        .hw
        .bus
        .set_reg(USB_INT_RT_STS_REG, UsbIntRtSts(0).with_usbin_plugin(true).0);
    charger.handle_event(Event::UsbPlugin).await;

    assert_eq!(charger.votables.fcc.effective(), Some(2_000_000));
    assert_eq!(charger.platform.dpdm_requests.last(), Some(&true));
    assert_eq!(charger.hw.bus.last_write_to(CFG_BUCK_FREQ_REG), Some(6));

    charger.hw.bus.set_reg(USB_INT_RT_STS_REG, 0);
    charger.handle_event(Event::UsbPlugin).await;

    assert_eq!(charger.votables.fcc.effective(), Some(1_500_000));
    assert_eq!(charger.platform.dpdm_requests.last(), Some(&false));
    assert_eq!(charger.hw.bus.last_write_to(CFG_BUCK_FREQ_REG), Some(10));
}

#[tokio::test]
async fn uneven_thermal_tables_bound_the_level_range() {
    static SHORT_QC: [i32; 3] = [1_000_000, 800_000, 600_000];
    let mut config = ChargerConfig::default();
    config.thermal.qc2 = &SHORT_QC;
    let mut charger = charger_with(config).await;

    // The shortest table decides how far the levels go.
    charger.set_system_temp_level(2).unwrap();
    assert_eq!(charger.set_system_temp_level(3), Err(Error::InvalidThermalLevel));
}

#[tokio::test]
async fn fcc_votes_above_the_hardware_range_are_rejected() {
    let mut charger = charger().await;

    let result = charger.vote_fcc(Voter::User, true, 5_000_000);
    assert_eq!(result, Err(Error::Vote(crate::votable::Error::OutOfRange)));
    assert_eq!(charger.votables.fcc.effective(), Some(2_000_000));
}

#[tokio::test]
async fn the_parallel_hold_off_releases_after_the_input_settles() {
    let mut charger = charger().await;

    charger
        .hw
        .bus
        .set_reg(USB_INT_RT_STS_REG, UsbIntRtSts(0).with_usbin_plugin(true).0);
    charger.handle_event(Event::UsbPlugin).await;

    assert!(charger.votables.pl_disable.is_enabled());
    assert!(charger.votables.awake.is_enabled());
    assert!(charger.work.is_scheduled(WorkKind::PlEnable));

    DummyTimer::advance(30_000);
    charger.run_due_work().await;

    assert!(!charger.votables.pl_disable.is_enabled());
    assert!(!charger.votables.awake.is_enabled());
}

#[tokio::test]
async fn an_apsd_rerun_hits_the_command_register() {
    let mut charger = charger().await;

    charger.rerun_apsd().unwrap();
    assert_eq!(
        charger.hw.bus.last_write_to(CMD_APSD_REG),
        Some(CmdApsd(0).with_apsd_rerun(true).0)
    );
}

#[tokio::test]
async fn the_acknowledged_pulse_count_comes_from_hardware() {
    let mut charger = charger().await;

    charger
        .hw
        .bus
        .set_reg(QC_PULSE_COUNT_STATUS_REG, QcPulseCountStatus(0).with_pulse_count(13).0);
    assert_eq!(charger.hw_pulse_count().unwrap(), 13);
}
