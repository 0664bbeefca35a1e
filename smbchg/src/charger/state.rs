//! The charger session state and its enums.
use crate::config::MICRO_5V;
use crate::counters::{Counter, CounterType};
use crate::regs::{ApsdResultStatus, TypeCStatus1, TypeCStatus2, TypeCStatus4};

/// What the Type-C machine sees on the CC lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TypecMode {
    /// Nothing attached.
    #[default]
    None,
    /// A source advertising default USB current.
    SourceDefault,
    /// A source advertising 1.5 A.
    SourceMedium,
    /// A source advertising 3 A.
    SourceHigh,
    /// A sink; we are the source.
    Sink,
    /// A sink behind a powered cable; we are the source.
    SinkPoweredCable,
    /// A debug accessory.
    SinkDebugAccessory,
    /// An audio adapter accessory.
    SinkAudioAdapter,
    /// A powered cable with no sink behind it.
    PoweredCableOnly,
}

impl TypecMode {
    /// Decode the mode from the Type-C status registers.
    pub fn from_status(status1: TypeCStatus1, status2: TypeCStatus2, status4: TypeCStatus4) -> Self {
        if status4.ufp_dfp_mode() {
            // We are the source.
            if status2.audio_adapter() {
                Self::SinkAudioAdapter
            } else if status2.debug_accessory() {
                Self::SinkDebugAccessory
            } else if status2.powered_cable_sink() {
                Self::SinkPoweredCable
            } else if status2.sink_attached() {
                Self::Sink
            } else {
                Self::None
            }
        } else if status1.source_high() {
            Self::SourceHigh
        } else if status1.source_medium() {
            Self::SourceMedium
        } else if status1.source_default() {
            Self::SourceDefault
        } else if status1.powered_cable_only() {
            Self::PoweredCableOnly
        } else {
            Self::None
        }
    }

    /// Whether we are the sink of an attached source.
    pub fn is_source_attached(&self) -> bool {
        matches!(self, Self::SourceDefault | Self::SourceMedium | Self::SourceHigh)
    }

    /// Whether we are the source for an attached sink or accessory.
    pub fn is_sink_attached(&self) -> bool {
        matches!(
            self,
            Self::Sink | Self::SinkPoweredCable | Self::SinkDebugAccessory | Self::SinkAudioAdapter
        )
    }
}

/// Which CC line carries the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CcOrientation {
    /// CC1 is active.
    #[default]
    Cc1,
    /// CC2 is active.
    Cc2,
}

/// The detected charger type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChargerType {
    /// No detection result yet.
    #[default]
    Unknown,
    /// Standard downstream port.
    Sdp,
    /// Charging downstream port.
    Cdp,
    /// Dedicated charging port.
    Dcp,
    /// Other charging port.
    Ocp,
    /// Floating data lines.
    Float,
    /// QC2.0 adapter.
    Hvdcp2,
    /// QC3.0 adapter.
    Hvdcp3,
    /// A Power Delivery contract is active.
    Pd,
}

impl ChargerType {
    /// Map a BC1.2 result register to a charger type.
    pub fn from_apsd(result: ApsdResultStatus) -> Self {
        // QC bits accompany the DCP bit and take precedence.
        if result.qc3() {
            Self::Hvdcp3
        } else if result.qc2() {
            Self::Hvdcp2
        } else if result.dcp() {
            Self::Dcp
        } else if result.cdp() {
            Self::Cdp
        } else if result.ocp() {
            Self::Ocp
        } else if result.float() {
            Self::Float
        } else if result.sdp() {
            Self::Sdp
        } else {
            Self::Unknown
        }
    }

    /// Whether this is a QC adapter.
    pub fn is_hvdcp(&self) -> bool {
        matches!(self, Self::Hvdcp2 | Self::Hvdcp3)
    }
}

/// Volatile session state, rebuilt from hardware status on each attach.
#[derive(Debug)]
pub struct ChargerState {
    /// A partner is attached and debounced.
    pub typec_present: bool,
    /// The classified CC state.
    pub typec_mode: TypecMode,
    /// The active CC line.
    pub orientation: CcOrientation,
    /// The detected charger type, after override rules.
    pub real_type: ChargerType,
    /// Vbus is above the plugin threshold.
    pub vbus_present: bool,

    /// A PD contract is active.
    pub pd_active: bool,
    /// A PD hard reset is in progress.
    pub pd_hard_reset: bool,
    /// Negotiated minimum bus voltage, in uV.
    pub voltage_min_uv: i32,
    /// Negotiated maximum bus voltage, in uV.
    pub voltage_max_uv: i32,

    /// Net QC3.0 increment pulses requested from the adapter.
    pub pulse_count: u8,

    /// The OTG boost is running.
    pub otg_enabled: bool,
    /// VCONN is supplied.
    pub vconn_enabled: bool,
    /// OTG gave up after repeated over-current, until the next attach.
    pub otg_failed: bool,
    /// VCONN gave up after repeated over-current, until the next attach.
    pub vconn_failed: bool,
    /// OTG re-enable attempts this session.
    pub otg_oc_attempts: Counter,
    /// VCONN re-enable attempts this session.
    pub vconn_oc_attempts: Counter,

    /// Current thermal mitigation level.
    pub system_temp_level: usize,

    /// The legacy cable workaround has produced a verdict.
    pub typec_legacy_valid: bool,
    /// The attached cable is a non-compliant legacy cable.
    pub legacy_cable: bool,
    /// The legacy cable workaround is toggling Type-C; ignore its events.
    pub typec_en_dis_active: bool,
}

impl ChargerState {
    /// Fresh detached state.
    pub fn new() -> Self {
        Self {
            typec_present: false,
            typec_mode: TypecMode::None,
            orientation: CcOrientation::Cc1,
            real_type: ChargerType::Unknown,
            vbus_present: false,
            pd_active: false,
            pd_hard_reset: false,
            voltage_min_uv: MICRO_5V,
            voltage_max_uv: MICRO_5V,
            pulse_count: 0,
            otg_enabled: false,
            vconn_enabled: false,
            otg_failed: false,
            vconn_failed: false,
            otg_oc_attempts: Counter::new(CounterType::OtgOcRecovery),
            vconn_oc_attempts: Counter::new(CounterType::VconnOcRecovery),
            system_temp_level: 0,
            typec_legacy_valid: false,
            legacy_cable: false,
            typec_en_dis_active: false,
        }
    }

    /// Reset the session on Type-C removal.
    ///
    /// The thermal level is host policy, not session state, and survives.
    pub fn reset_on_removal(&mut self) {
        self.typec_present = false;
        self.typec_mode = TypecMode::None;
        self.orientation = CcOrientation::Cc1;
        self.real_type = ChargerType::Unknown;
        self.pd_active = false;
        self.pd_hard_reset = false;
        self.voltage_min_uv = MICRO_5V;
        self.voltage_max_uv = MICRO_5V;
        self.pulse_count = 0;
        self.otg_failed = false;
        self.vconn_failed = false;
        self.otg_oc_attempts.reset();
        self.vconn_oc_attempts.reset();
        self.typec_legacy_valid = false;
        self.legacy_cable = false;
    }
}

impl Default for ChargerState {
    fn default() -> Self {
        Self::new()
    }
}
