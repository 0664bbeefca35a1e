//! The charger block's register map.
//!
//! Addresses are 16 bit: the high byte selects a peripheral block (charger,
//! OTG, USB input, misc), the low byte an offset within it. Offsets at 0xD0
//! and above are write-protected and need a secure-access unlock first.
use proc_bitfield::bitfield;

/// Charger peripheral block base.
pub const CHGR_BASE: u16 = 0x1000;
/// OTG peripheral block base.
pub const OTG_BASE: u16 = 0x1100;
/// USB input peripheral block base.
pub const USBIN_BASE: u16 = 0x1300;
/// Misc peripheral block base.
pub const MISC_BASE: u16 = 0x1600;

/// Offset of the secure-access register within each block.
pub const SEC_ACCESS_OFFSET: u16 = 0xD0;
/// Value that unlocks a block's protected registers for one write.
pub const SEC_ACCESS_UNLOCK: u8 = 0xA5;

/// Battery temperature window status.
pub const BATTERY_CHARGER_STATUS_2_REG: u16 = CHGR_BASE + 0x07;
/// Charging enable command.
pub const CHARGING_ENABLE_CMD_REG: u16 = CHGR_BASE + 0x42;
/// Fast charge current limit, 25 mA per LSB.
pub const FAST_CHARGE_CURRENT_CFG_REG: u16 = CHGR_BASE + 0x61;

/// OTG boost status.
pub const OTG_STATUS_REG: u16 = OTG_BASE + 0x09;
/// OTG real-time interrupt status.
pub const OTG_INT_RT_STS_REG: u16 = OTG_BASE + 0x10;
/// OTG enable command.
pub const CMD_OTG_REG: u16 = OTG_BASE + 0x40;
/// OTG current limit, one of four steps.
pub const OTG_CURRENT_LIMIT_CFG_REG: u16 = OTG_BASE + 0x52;

/// BC1.2 detection progress.
pub const APSD_STATUS_REG: u16 = USBIN_BASE + 0x07;
/// BC1.2 detection result.
pub const APSD_RESULT_STATUS_REG: u16 = USBIN_BASE + 0x08;
/// QC adapter voltage acknowledge status.
pub const QC_CHANGE_STATUS_REG: u16 = USBIN_BASE + 0x09;
/// QC3.0 pulse counter.
pub const QC_PULSE_COUNT_STATUS_REG: u16 = USBIN_BASE + 0x0A;
/// Type-C machine status, five consecutive registers.
pub const TYPE_C_STATUS_1_REG: u16 = USBIN_BASE + 0x0B;
/// Fifth Type-C status register, legacy cable flags.
pub const TYPE_C_STATUS_5_REG: u16 = USBIN_BASE + 0x0F;
/// USB input real-time interrupt status.
pub const USB_INT_RT_STS_REG: u16 = USBIN_BASE + 0x10;
/// USB input suspend command.
pub const USBIN_CMD_IL_REG: u16 = USBIN_BASE + 0x40;
/// BC1.2 rerun command.
pub const CMD_APSD_REG: u16 = USBIN_BASE + 0x41;
/// QC voltage change commands.
pub const CMD_HVDCP_2_REG: u16 = USBIN_BASE + 0x43;
/// Type-C software control.
pub const TYPE_C_SW_CTRL_REG: u16 = USBIN_BASE + 0x68;
/// Maximum QC3.0 pulses the hardware will request.
pub const HVDCP_PULSE_COUNT_MAX_REG: u16 = USBIN_BASE + 0xB0;
/// Type-C machine configuration.
pub const TYPE_C_CFG_REG: u16 = USBIN_BASE + 0xD8;
/// Adapter voltage allowance.
pub const USBIN_ADAPTER_ALLOW_CFG_REG: u16 = USBIN_BASE + 0xE0;
/// USB input options: BC1.2 and QC detection enables.
pub const USBIN_OPTIONS_1_CFG_REG: u16 = USBIN_BASE + 0xE2;
/// USB input current limit modes.
pub const USBIN_ICL_OPTIONS_REG: u16 = USBIN_BASE + 0xE6;
/// USB input current limit, 25 mA per LSB.
pub const USBIN_CURRENT_LIMIT_CFG_REG: u16 = USBIN_BASE + 0xF0;
/// AICL behavior configuration.
pub const USBIN_AICL_OPTIONS_CFG_REG: u16 = USBIN_BASE + 0xF3;
/// Source-change interrupt enables.
pub const USBIN_SOURCE_CHANGE_INTRPT_ENB_REG: u16 = USBIN_BASE + 0xF5;

/// Settled input current limit, 25 mA per LSB.
pub const ICL_STATUS_REG: u16 = MISC_BASE + 0x07;
/// AICL loop status.
pub const AICL_STATUS_REG: u16 = MISC_BASE + 0x0A;
/// Power path selection status.
pub const POWER_PATH_STATUS_REG: u16 = MISC_BASE + 0x0B;
/// Misc configuration, CC debounce selection.
pub const MISC_CFG_REG: u16 = MISC_BASE + 0xD2;
/// Buck switching frequency, 100 kHz per LSB.
pub const CFG_BUCK_FREQ_REG: u16 = MISC_BASE + 0xE0;

/// Input and fast charge current limit granularity, in microamperes per LSB.
pub const CURRENT_STEP_UA: i32 = 25_000;

bitfield! {
    /// BC1.2 detection progress flags.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct ApsdStatus(pub u8): Debug, FromStorage, IntoStorage {
        /// BC1.2 classification finished.
        pub apsd_done: bool @ 0,
        /// USB enumeration finished before the slow-plugin timeout.
        pub enumeration_done: bool @ 1,
        /// An adapter voltage change completed.
        pub vadp_change_done: bool @ 2,
        /// The slow-plugin timer expired.
        pub slow_plugin_timeout: bool @ 3,
        /// QC adapter detection finished.
        pub hvdcp_detect_done: bool @ 4,
        /// QC adapter detection timed out.
        pub hvdcp_check_timeout: bool @ 5,
        /// QC3.0 authentication finished.
        pub hvdcp_auth_done: bool @ 6,
        /// A QC adapter is present.
        pub qc_charger: bool @ 7,
    }
}

bitfield! {
    /// BC1.2 detection result flags. At most one bit is set.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct ApsdResultStatus(pub u8): Debug, FromStorage, IntoStorage {
        /// Standard downstream port.
        pub sdp: bool @ 0,
        /// Other charging port.
        pub ocp: bool @ 1,
        /// Charging downstream port.
        pub cdp: bool @ 2,
        /// Dedicated charging port.
        pub dcp: bool @ 3,
        /// Floating data lines.
        pub float: bool @ 4,
        /// QC2.0 adapter.
        pub qc2: bool @ 5,
        /// QC3.0 adapter.
        pub qc3: bool @ 6,
        /// A result is latched.
        pub icl_override_latch: bool @ 7,
    }
}

bitfield! {
    /// QC adapter voltage acknowledge status.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct QcChangeStatus(pub u8): Debug, FromStorage, IntoStorage {
        /// The adapter acknowledged 5 V.
        pub qc_5v: bool @ 0,
        /// The adapter acknowledged 9 V.
        pub qc_9v: bool @ 1,
        /// The adapter acknowledged 12 V.
        pub qc_12v: bool @ 2,
    }
}

bitfield! {
    /// QC3.0 pulse counter.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct QcPulseCountStatus(pub u8): Debug, FromStorage, IntoStorage {
        /// Net number of requested increment pulses.
        pub pulse_count: u8 @ 0..=5,
    }
}

bitfield! {
    /// First Type-C status register: the attached source's advertisement.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct TypeCStatus1(pub u8): Debug, FromStorage, IntoStorage {
        /// Source advertising default Rp.
        pub source_default: bool @ 0,
        /// Source advertising 1.5 A Rp.
        pub source_medium: bool @ 1,
        /// Source advertising 3 A Rp.
        pub source_high: bool @ 2,
        /// Both CC pins terminated, powered cable without sink.
        pub powered_cable_only: bool @ 3,
    }
}

bitfield! {
    /// Second Type-C status register: the attached sink's kind.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct TypeCStatus2(pub u8): Debug, FromStorage, IntoStorage {
        /// A plain sink is attached.
        pub sink_attached: bool @ 0,
        /// A powered cable with a sink is attached.
        pub powered_cable_sink: bool @ 1,
        /// A debug accessory is attached.
        pub debug_accessory: bool @ 2,
        /// An audio adapter accessory is attached.
        pub audio_adapter: bool @ 3,
    }
}

bitfield! {
    /// Fourth Type-C status register: machine state.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct TypeCStatus4(pub u8): Debug, FromStorage, IntoStorage {
        /// CC line orientation, zero for CC1 and one for CC2.
        pub cc_orientation: bool @ 0,
        /// VCONN over-current shutdown latched.
        pub vconn_overcurrent: bool @ 1,
        /// Vbus present but CC detection failed.
        pub vbus_error: bool @ 2,
        /// Vbus above the detection threshold.
        pub vbus_detected: bool @ 4,
        /// tCCDebounce elapsed, attach state is valid.
        pub debounce_done: bool @ 5,
        /// We act as the source (a sink or accessory is attached).
        pub ufp_dfp_mode: bool @ 6,
    }
}

bitfield! {
    /// Fifth Type-C status register: legacy cable flags.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct TypeCStatus5(pub u8): Debug, FromStorage, IntoStorage {
        /// The attached cable pulls up Vbus without presenting Rp properly.
        pub legacy_cable: bool @ 0,
    }
}

bitfield! {
    /// USB input real-time interrupt status.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct UsbIntRtSts(pub u8): Debug, FromStorage, IntoStorage {
        /// Vbus is above the plugin threshold.
        pub usbin_plugin: bool @ 4,
    }
}

bitfield! {
    /// OTG boost status.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct OtgStatus(pub u8): Debug, FromStorage, IntoStorage {
        /// The boost regulator finished its soft-start ramp.
        pub boost_softstart_done: bool @ 3,
    }
}

bitfield! {
    /// OTG real-time interrupt status.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct OtgIntRtSts(pub u8): Debug, FromStorage, IntoStorage {
        /// The boost regulator hit its current limit.
        pub otg_overcurrent: bool @ 0,
    }
}

bitfield! {
    /// OTG enable command.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct CmdOtg(pub u8): Debug, FromStorage, IntoStorage {
        /// Enable the boost regulator.
        pub otg_en: bool @ 0,
    }
}

bitfield! {
    /// USB input suspend command.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct UsbinCmdIl(pub u8): Debug, FromStorage, IntoStorage {
        /// Suspend the USB input path.
        pub usbin_suspend: bool @ 0,
    }
}

bitfield! {
    /// BC1.2 rerun command.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct CmdApsd(pub u8): Debug, FromStorage, IntoStorage {
        /// Restart BC1.2 classification.
        pub apsd_rerun: bool @ 0,
    }
}

bitfield! {
    /// QC voltage change commands. Force bits override the pulse counter.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct CmdHvdcp2(pub u8): Debug, FromStorage, IntoStorage {
        /// Request a fixed 5 V from the adapter.
        pub force_5v: bool @ 0,
        /// Request a fixed 9 V from the adapter.
        pub force_9v: bool @ 1,
        /// Request a fixed 12 V from the adapter.
        pub force_12v: bool @ 2,
        /// Return the adapter to continuous mode.
        pub idle: bool @ 3,
        /// Request one 200 mV decrement pulse.
        pub single_decrement: bool @ 4,
        /// Request one 200 mV increment pulse.
        pub single_increment: bool @ 5,
    }
}

bitfield! {
    /// Type-C software control.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct TypeCSwCtrl(pub u8): Debug, FromStorage, IntoStorage {
        /// Supply VCONN.
        pub vconn_en_value: bool @ 0,
        /// Pick the VCONN pin from the detected orientation.
        pub vconn_en_orientation: bool @ 1,
        /// Present Rd only, sink role.
        pub ufp_en_cmd: bool @ 2,
        /// Present Rp only, source role.
        pub dfp_en_cmd: bool @ 3,
        /// Disable the Type-C machine entirely.
        pub typec_disable_cmd: bool @ 4,
    }
}

bitfield! {
    /// Type-C machine configuration.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct TypeCCfg(pub u8): Debug, FromStorage, IntoStorage {
        /// Only start BC1.2 once CC attach debounced.
        pub apsd_start_on_cc: bool @ 7,
    }
}

bitfield! {
    /// USB input detection options.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct UsbinOptions1Cfg(pub u8): Debug, FromStorage, IntoStorage {
        /// Run BC1.2 classification when a source attaches.
        pub auto_src_detect: bool @ 3,
        /// Run the QC3.0 authentication algorithm.
        pub hvdcp_auth_alg_en: bool @ 6,
        /// Detect QC adapters at all.
        pub hvdcp_en: bool @ 7,
    }
}

bitfield! {
    /// USB input current limit modes.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct UsbinIclOptions(pub u8): Debug, FromStorage, IntoStorage {
        /// Select 500 mA in USB 5/1 mode, 100 mA otherwise.
        pub usb51_mode: bool @ 1,
        /// Take the limit from the current limit register, not the USB mode pins.
        pub icl_override: bool @ 2,
    }
}

bitfield! {
    /// AICL behavior configuration.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct UsbinAiclOptionsCfg(pub u8): Debug, FromStorage, IntoStorage {
        /// Run the input current optimization loop.
        pub aicl_en: bool @ 2,
        /// Suspend the input when it collapses instead of rerunning AICL.
        pub suspend_on_collapse: bool @ 7,
    }
}

bitfield! {
    /// Source-change interrupt enables.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct UsbinSourceChangeIntrptEnb(pub u8): Debug, FromStorage, IntoStorage {
        /// Interrupt on QC3.0 authentication completion.
        pub auth_irq_en: bool @ 3,
    }
}

bitfield! {
    /// AICL loop status.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct AiclStatus(pub u8): Debug, FromStorage, IntoStorage {
        /// The loop settled on an input current.
        pub aicl_done: bool @ 0,
    }
}

bitfield! {
    /// Power path selection status.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct PowerPathStatus(pub u8): Debug, FromStorage, IntoStorage {
        /// Input power is usable.
        pub valid_input_power_source: bool @ 0,
        /// The USB input feeds the system.
        pub use_usbin: bool @ 1,
        /// The DC input feeds the system.
        pub use_dcin: bool @ 2,
    }
}

bitfield! {
    /// Misc configuration.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct MiscCfg(pub u8): Debug, FromStorage, IntoStorage {
        /// Debounce CC attach for 20 ms instead of 120 ms.
        pub tcc_debounce_20ms: bool @ 1,
    }
}

bitfield! {
    /// Charging enable command.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct ChargingEnableCmd(pub u8): Debug, FromStorage, IntoStorage {
        /// Let the charger run.
        pub charging_enable: bool @ 0,
    }
}

bitfield! {
    /// Battery temperature window status.
    #[derive(Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    pub struct BatteryChargerStatus2(pub u8): Debug, FromStorage, IntoStorage {
        /// Battery below the hard cold limit, charging stopped by hardware.
        pub bat_temp_too_cold: bool @ 0,
        /// Battery above the hard hot limit, charging stopped by hardware.
        pub bat_temp_too_hot: bool @ 1,
        /// Battery in the soft cold window.
        pub bat_temp_cold_soft: bool @ 2,
        /// Battery in the soft hot window.
        pub bat_temp_hot_soft: bool @ 3,
    }
}

/// Adapter voltage allowance values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AdapterAllowance {
    /// Only accept 5 V.
    Allow5V = 0,
    /// Only accept 9 V.
    Allow9V = 2,
    /// Accept 5 V or 9 V.
    Allow5VOr9V = 3,
    /// Only accept 12 V.
    Allow12V = 4,
    /// Accept anything from 5 V to 12 V.
    Allow5VTo12V = 8,
}
