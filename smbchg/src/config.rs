//! Board configuration.
//!
//! Everything a board would tune lives here as data, so the state machine
//! itself carries no board-specific branches.

/// 5 V, in microvolts.
pub const MICRO_5V: i32 = 5_000_000;
/// 9 V, in microvolts.
pub const MICRO_9V: i32 = 9_000_000;
/// 12 V, in microvolts.
pub const MICRO_12V: i32 = 12_000_000;

/// Input current considered equivalent to suspend.
pub const USBIN_25MA: i32 = 25_000;
/// USB 2.0 unconfigured current.
pub const USBIN_100MA: i32 = 100_000;
/// USB 2.0 configured current.
pub const USBIN_500MA: i32 = 500_000;

/// Buck switching frequencies for the adapter voltage tiers, in kHz.
#[derive(Debug, Clone, Copy)]
pub struct BuckFrequencies {
    /// Frequency while on 5 V input.
    pub freq_5v: u16,
    /// Frequency between 6 V and 8 V input.
    pub freq_6v_8v: u16,
    /// Frequency between 9 V and 12 V input.
    pub freq_9v: u16,
    /// Frequency at 12 V input.
    pub freq_12v: u16,
    /// Frequency to fall back to on removal.
    pub freq_removal: u16,
}

impl Default for BuckFrequencies {
    fn default() -> Self {
        Self {
            freq_5v: 600,
            freq_6v_8v: 800,
            freq_9v: 1000,
            freq_12v: 1200,
            freq_removal: 1000,
        }
    }
}

/// Thermal derating tables, one input current per temperature level.
///
/// Tables are indexed by `system_temp_level`; entry zero is unused because
/// level zero clears the thermal vote instead.
#[derive(Debug, Clone, Copy)]
pub struct ThermalTables {
    /// Table for BC1.2 class chargers.
    pub dcp: &'static [i32],
    /// Table for QC2.0 adapters.
    pub qc2: &'static [i32],
    /// Table for QC3.0 adapters.
    pub qc3: &'static [i32],
    /// Base table for PD contracts, scaled by the contract voltage.
    pub pd_base: &'static [i32],
}

/// Default ten-level derating tables.
pub const DEFAULT_THERMAL_DCP: [i32; 10] = [
    1_800_000, 1_700_000, 1_600_000, 1_500_000, 1_400_000, 1_200_000, 1_000_000, 800_000, 600_000, 400_000,
];
/// See [`DEFAULT_THERMAL_DCP`].
pub const DEFAULT_THERMAL_QC: [i32; 10] = [
    1_500_000, 1_400_000, 1_300_000, 1_200_000, 1_100_000, 1_000_000, 900_000, 700_000, 500_000, 300_000,
];

impl Default for ThermalTables {
    fn default() -> Self {
        Self {
            dcp: &DEFAULT_THERMAL_DCP,
            qc2: &DEFAULT_THERMAL_QC,
            qc3: &DEFAULT_THERMAL_QC,
            pd_base: &DEFAULT_THERMAL_DCP,
        }
    }
}

/// Hardware workaround enables.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkaroundFlags {
    /// Soft-start the OTG boost by stepping through the current limit ladder.
    pub otg_soft_start: bool,
    /// Watch the switcher-power-ok line for weak charger and reverse boost storms.
    pub boost_back: bool,
    /// Mask the QC authentication interrupt until BC1.2 completes.
    pub qc_auth_irq: bool,
    /// Run the legacy cable detection cycle on attach.
    pub legacy_cable_detection: bool,
}

/// Static board configuration, fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct ChargerConfig {
    /// Default input current limit before any detection result, in uA.
    pub default_icl_ua: i32,
    /// Input current limit for DCP class chargers, in uA.
    pub dcp_icl_ua: i32,
    /// Input current limit for CDP chargers, in uA.
    pub cdp_icl_ua: i32,
    /// Input current limit for float chargers until enumeration, in uA.
    pub float_icl_ua: i32,
    /// Input current limit for QC adapters, in uA.
    pub hvdcp_icl_ua: i32,
    /// Input current limit while a weak charger storm is suspected, in uA.
    pub weak_chg_icl_ua: i32,
    /// Default fast charge current, in uA.
    pub fcc_default_ua: i32,
    /// Ramp the fast charge current in software from a fixed floor.
    pub fcc_stepper_enable: bool,

    /// Cycle through the sink role on insertion to prefer charging.
    pub try_sink_enabled: bool,

    /// OTG boost current limit ladder, lowest step first, in uA.
    pub otg_current_ladder: [i32; 4],
    /// Final OTG boost current limit, in uA.
    pub otg_cl_ua: i32,
    /// OTG re-enable attempts after over-current, before giving up.
    pub otg_oc_attempts: u8,
    /// VCONN re-enable attempts after over-current, before giving up.
    pub vconn_oc_attempts: u8,

    /// Maximum QC3.0 increment pulses the adapter will be asked for.
    pub qc3_max_pulses: u8,
    /// JEITA soft-limit fast charge compensation, in uA.
    pub jeita_cc_comp_ua: i32,

    /// Storm window for the switcher-power-ok line, in ms.
    pub storm_period_ms: u64,
    /// Quick successions that make a weak charger storm.
    pub weak_storm_count: u8,
    /// Quick successions that make a reverse boost storm.
    pub boost_back_storm_count: u8,

    /// Wait for QC detection after BC1.2 reports a DCP, in ms.
    pub hvdcp_detect_ms: u64,
    /// Hold-off before parallel charging may engage, in ms.
    pub pl_delay_ms: u64,
    /// Settle time before re-reading the input current limit, in ms.
    pub icl_change_settle_ms: u64,
    /// Delay before withdrawing the reverse boost suspend vote, in ms.
    pub boost_back_unvote_ms: u64,
    /// Delay before judging the OTG soft-start outcome, in ms.
    pub otg_ss_done_ms: u64,

    /// Buck frequency per adapter voltage tier.
    pub buck_freq: BuckFrequencies,
    /// Thermal derating tables.
    pub thermal: ThermalTables,
    /// Workaround enables.
    pub workarounds: WorkaroundFlags,
}

impl Default for ChargerConfig {
    fn default() -> Self {
        Self {
            default_icl_ua: 100_000,
            dcp_icl_ua: 1_500_000,
            cdp_icl_ua: 1_500_000,
            float_icl_ua: 100_000,
            hvdcp_icl_ua: 3_000_000,
            weak_chg_icl_ua: 500_000,
            fcc_default_ua: 2_000_000,
            fcc_stepper_enable: false,

            try_sink_enabled: false,

            otg_current_ladder: [250_000, 500_000, 1_000_000, 1_500_000],
            otg_cl_ua: 1_500_000,
            otg_oc_attempts: 3,
            vconn_oc_attempts: 3,

            qc3_max_pulses: 8,
            jeita_cc_comp_ua: 1_200_000,

            storm_period_ms: 1000,
            weak_storm_count: 8,
            boost_back_storm_count: 3,

            hvdcp_detect_ms: 2500,
            pl_delay_ms: 30_000,
            icl_change_settle_ms: 1000,
            boost_back_unvote_ms: 750,
            otg_ss_done_ms: 500,

            buck_freq: BuckFrequencies::default(),
            thermal: ThermalTables::default(),
            workarounds: WorkaroundFlags::default(),
        }
    }
}

impl ChargerConfig {
    /// The number of thermal mitigation levels the tables provide.
    ///
    /// The shortest table bounds the level range.
    pub fn thermal_levels(&self) -> usize {
        let t = &self.thermal;
        t.dcp
            .len()
            .min(t.qc2.len())
            .min(t.qc3.len())
            .min(t.pd_base.len())
    }
}
