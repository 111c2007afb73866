// crates/eemlink-rs/src/hal.rs
use crate::model::{
    BatteryData, BatteryMode, ConfigFloat, ControllerInfo, LoadDisconnectState, OutputData,
    RectifierData, RectifierInventory, SolarConverterData, SystemData, TempKind, ThresholdScope,
};
use crate::registry::BlockClass;
use crate::types::Severity;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// Defines a portable, descriptive Error type for the wire layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EemError {
    /// The request payload exceeds the framing budget (MTU minus overhead).
    FrameTooLarge,
    /// The provided buffer is too small for the operation.
    BufferTooShort,
    /// A field that should carry 8 hex digits is shorter than that.
    TruncatedFloat,
    /// A byte in a numeric field is not an ASCII hex digit.
    InvalidHexDigit(u8),
    /// A block id field is malformed.
    InvalidBlockId,
}

impl fmt::Display for EemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FrameTooLarge => write!(f, "Request exceeds frame size budget"),
            Self::BufferTooShort => write!(f, "Buffer is too short"),
            Self::TruncatedFloat => write!(f, "Truncated float field"),
            Self::InvalidHexDigit(b) => write!(f, "Invalid hex digit: {:#04x}", b),
            Self::InvalidBlockId => write!(f, "Malformed block id"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EemError {}

/// Managed-object sink: the northbound model tree the engine populates.
///
/// The engine drives discovery, polling and alarm decoding; everything it
/// learns is pushed through this trait. Implementations are expected to be
/// idempotent where data did not change, since the engine re-delivers
/// records on every poll cycle. All methods have no-op defaults so harnesses
/// only implement what they observe.
pub trait PowerSink {
    // --- Topology ---

    /// A block discovered on the bus, with its human-readable name.
    fn add_device(&mut self, class: BlockClass, id: &str, name: &str) {
        let _ = (class, id, name);
    }

    /// Auto-configuration of a load-disconnect contactor (LVD1/LVD2).
    fn add_load_disconnect(&mut self, contactor: u8, name: &str, specific_problem: &str) {
        let _ = (contactor, name, specific_problem);
    }

    /// A battery LVD block exists; attach the system battery profile.
    fn attach_battery_profile(&mut self, id: &str) {
        let _ = id;
    }

    fn set_controller_info(&mut self, info: &ControllerInfo) {
        let _ = info;
    }

    /// SNMP inventory strings for one rectifier (NCU only).
    fn rectifier_inventory(&mut self, id: &str, inv: &RectifierInventory) {
        let _ = (id, inv);
    }

    /// Number of rectifier instances known to the model tree.
    fn rectifier_count(&self) -> usize {
        0
    }

    /// Ids of the solar converter instances known to the model tree.
    fn solar_converter_ids(&self) -> Vec<String> {
        Vec::new()
    }

    /// Post-discovery fixups of alarm entry labels.
    fn align_alarm_labels(&mut self) {}

    /// Post-discovery pruning of threshold alarm entries.
    fn prune_threshold_entries(&mut self) {}

    /// The configuration delta of this discovery round should be persisted.
    fn persist_config(&mut self) {}

    // --- Data ---

    fn system_data(&mut self, data: &SystemData) {
        let _ = data;
    }

    /// Group-level output data (rectifier group, solar converter group).
    fn output_data(&mut self, id: &str, data: &OutputData) {
        let _ = (id, data);
    }

    fn rectifier_data(&mut self, id: &str, data: &RectifierData) {
        let _ = (id, data);
    }

    fn solar_converter_data(&mut self, id: &str, data: &SolarConverterData) {
        let _ = (id, data);
    }

    fn battery_data(&mut self, data: &BatteryData) {
        let _ = data;
    }

    fn mode_set(&mut self, mode: BatteryMode) {
        let _ = mode;
    }

    fn load_disconnect_state(&mut self, state: &LoadDisconnectState) {
        let _ = state;
    }

    fn dc_meter_voltage(&mut self, id: &str, volts: f32) {
        let _ = (id, volts);
    }

    fn dc_meter_current(&mut self, id: &str, amps: f32) {
        let _ = (id, amps);
    }

    fn temp_sensor(&mut self, kind: TempKind, index: usize, celsius: f32) {
        let _ = (kind, index, celsius);
    }

    fn ensure_threshold(&mut self, scope: ThresholdScope, name: &str) {
        let _ = (scope, name);
    }

    /// A configuration float changed locally without wire traffic (e.g. the
    /// undervoltage levels tracking the LVD settings).
    fn config_updated(&mut self, kind: ConfigFloat, value: f32) {
        let _ = (kind, value);
    }

    // --- Alarms ---

    /// A poll cycle's alarm accounting begins; raised-but-unseen alarms may
    /// be closed by `alarm_clear_inactive` at the end of the sweep.
    fn alarm_cycle_start(&mut self) {}

    fn plant_alarm(&mut self, kind: SystemAlarm, bit: u16, severity: Severity, active: bool) {
        let _ = (kind, bit, severity, active);
    }

    /// Plant alarm carrying an additional specific-problem text.
    fn plant_alarm_text(
        &mut self,
        kind: SystemAlarm,
        bit: u16,
        severity: Severity,
        text: &str,
        active: bool,
    ) {
        let _ = (kind, bit, severity, text, active);
    }

    /// Input-scoped alarm (rectifier, solar converter).
    fn input_alarm(&mut self, id: &str, kind: InputAlarm, bit: u16, severity: Severity, active: bool) {
        let _ = (id, kind, bit, severity, active);
    }

    /// Output-scoped alarm (rectifier group, solar group, LVD unit).
    fn output_alarm(
        &mut self,
        id: &str,
        kind: OutputAlarm,
        bit: u16,
        severity: Severity,
        active: bool,
    ) {
        let _ = (id, kind, bit, severity, active);
    }

    /// External alarm input (SM IO boards), 1-based index.
    fn external_alarm(&mut self, index: u16, severity: Severity, active: bool) {
        let _ = (index, severity, active);
    }

    /// A solar converter vanished from (or reappeared on) the bus.
    fn solar_lost(&mut self, id: &str, active: bool) {
        let _ = (id, active);
    }

    fn rectifiers_fail(&mut self, installed: usize, failed: usize) {
        let _ = (installed, failed);
    }

    fn rectifiers_lost(&mut self, known: usize, lost: usize) {
        let _ = (known, lost);
    }

    /// Close every alarm that was not re-raised during this sweep.
    fn alarm_clear_inactive(&mut self) {}

    /// Connection lost: decoded values are stale and should be dropped.
    fn plant_forget(&mut self) {}
}

pub use crate::alarms::{InputAlarm, OutputAlarm, SystemAlarm};
