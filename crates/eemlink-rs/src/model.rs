//! Normalized plant model shared between the block readers, the write path
//! and the managed-object sink.

use crate::types::{ControllerFlavor, NCU_NUM_BATT_TEMP_SENS};
use alloc::string::String;
use core::fmt;

// --- Configuration Floats ---

/// Abstract configuration values the upper layer can read back and write.
/// Each kind maps onto one or more AO indices of a specific block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum ConfigFloat {
    FloatChargeVoltage,
    BoostChargeVoltage,
    LoadDisconnectVolt1,
    LoadDisconnectTime1,
    LoadReconnectVolt1,
    LoadDisconnectVolt2,
    LoadDisconnectTime2,
    LoadReconnectVolt2,
    BatteryDisconnectVoltage,
    BatteryDisconnectTime,
    BatteryReconnectVoltage,
    NominalCapacity,
    DcVoltMax,
    HighEnvTemp,
    LowEnvTemp,
    BatteryHighTempMajor,
    BatteryHighTempMinor,
    ChargeCurrentMax,
    Batt1HighTemp,
    Batt1LowTemp,
    Batt2HighTemp,
    Batt2LowTemp,
    Batt3HighTemp,
    Batt3LowTemp,
    TestTerminationTime,
    TestTerminationCapacity,
    LowVoltageMinor,
    LowVoltageMajor,
}

impl ConfigFloat {
    pub const COUNT: usize = 28;

    pub fn index(self) -> usize {
        self as usize
    }

    /// Load-disconnect kinds keyed by contactor id (1 or 2).
    pub fn load_disconnect_volt(contactor: u8) -> Option<Self> {
        match contactor {
            1 => Some(ConfigFloat::LoadDisconnectVolt1),
            2 => Some(ConfigFloat::LoadDisconnectVolt2),
            _ => None,
        }
    }

    pub fn load_disconnect_time(contactor: u8) -> Option<Self> {
        match contactor {
            1 => Some(ConfigFloat::LoadDisconnectTime1),
            2 => Some(ConfigFloat::LoadDisconnectTime2),
            _ => None,
        }
    }

    pub fn load_reconnect_volt(contactor: u8) -> Option<Self> {
        match contactor {
            1 => Some(ConfigFloat::LoadReconnectVolt1),
            2 => Some(ConfigFloat::LoadReconnectVolt2),
            _ => None,
        }
    }
}

/// One float per `ConfigFloat` kind; unset entries are NaN.
#[derive(Debug, Clone)]
pub struct ConfigTable([f32; ConfigFloat::COUNT]);

impl Default for ConfigTable {
    fn default() -> Self {
        ConfigTable([f32::NAN; ConfigFloat::COUNT])
    }
}

impl ConfigTable {
    pub fn get(&self, kind: ConfigFloat) -> f32 {
        self.0[kind.index()]
    }

    pub fn set(&mut self, kind: ConfigFloat, value: f32) {
        self.0[kind.index()] = value;
    }

    pub fn clear(&mut self) {
        self.0 = [f32::NAN; ConfigFloat::COUNT];
    }
}

// --- Setter Validation ---

/// Pre-flight validation failure of a configuration setter. Nothing is sent
/// on the wire when one of these is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The kind is not writable on this protocol.
    NotWritable,
    DisconnectLevelOutOfRange,
    ReconnectLevelOutOfRange,
    DelayValueOutOfRange,
    /// Per-contactor: disconnect voltage above the reconnect voltage.
    DisconnectAboveReconnect,
    /// LVD1 disconnect voltage below LVD2 disconnect voltage.
    Lvd1VoltageBelowLvd2,
    /// LVD1 reconnect voltage below LVD2 reconnect voltage.
    Lvd1ReconnectBelowLvd2,
    /// LVD1 disconnect time not above LVD2 disconnect time.
    Lvd1TimeBelowLvd2,
    /// An LVD disconnect voltage below the battery LVD voltage.
    VoltageBelowBlvd,
    /// An LVD reconnect voltage below the battery LVD reconnect voltage.
    ReconnectBelowBlvd,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotWritable => write!(f, "Value is not writable on this power system"),
            Self::DisconnectLevelOutOfRange => write!(f, "DisconnectLevel value out of range"),
            Self::ReconnectLevelOutOfRange => write!(f, "ReconnectLevel value out of range"),
            Self::DelayValueOutOfRange => write!(f, "DelayValue value out of range"),
            Self::DisconnectAboveReconnect => write!(
                f,
                "LVD disconnect level can't be set higher than the reconnect level"
            ),
            Self::Lvd1VoltageBelowLvd2 => {
                write!(f, "LVD1 voltage cannot be set below LVD2 voltage")
            }
            Self::Lvd1ReconnectBelowLvd2 => write!(
                f,
                "LVD1 reconnect voltage cannot be set below LVD2 reconnect voltage"
            ),
            Self::Lvd1TimeBelowLvd2 => write!(f, "LVD1 time cannot be set below LVD2 time"),
            Self::VoltageBelowBlvd => write!(f, "LVD voltage cannot be set below BLVD voltage"),
            Self::ReconnectBelowBlvd => write!(
                f,
                "LVD reconnect voltage cannot be set below BLVD reconnect voltage"
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

// --- Battery / Contactor Modes ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryMode {
    Float,
    Boost,
    Test,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectMethod {
    Voltage,
    Time,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactorState {
    On,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempKind {
    Ambient,
    Battery,
}

/// Scope of a threshold ensured through the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdScope {
    System,
    Battery,
    TempSensor(usize),
}

// --- Data Records Pushed to the Sink ---

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SystemData {
    pub voltage: f32,
    pub current: f32,
    pub power: f32,
}

/// Group-level output data (rectifier group, solar converter group).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputData {
    pub voltage: f32,
    pub current: f32,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectifierData {
    pub active: bool,
    pub voltage: f32,
    pub current: f32,
    pub temperature: f32,
    pub utilization: f32,
    pub input_voltage: f32,
    pub run_time_s: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarConverterData {
    pub active: bool,
    pub failed: bool,
    pub comm_fail: bool,
    pub voltage: f32,
    pub current: f32,
    pub input_voltage: f32,
    pub input_current: f32,
    pub temperature: f32,
    pub utilization: f32,
    pub run_time_s: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatteryData {
    pub voltage: f32,
    pub current: f32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadDisconnectState {
    pub contactor: u8,
    pub state: Option<ContactorState>,
    pub enabled: Option<bool>,
    pub method: Option<DisconnectMethod>,
}

/// Identity of the supervision unit, assembled from discovery and (on NCU)
/// the SNMP inventory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerInfo {
    pub product_name: String,
    pub product_model: String,
    pub product_number: String,
    pub serial_number: String,
    pub sw_revision: String,
}

/// Per-rectifier inventory strings fetched over SNMP on NCU controllers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RectifierInventory {
    pub product_number: String,
    pub hw_version: String,
    pub sw_version: String,
    pub serial_number: String,
    pub ident: String,
}

// --- Internal Plant State ---

/// Mutable per-plant aggregate the readers keep current. The managed-object
/// tree mirrors a richer view of this through the sink; the engine itself
/// only needs what its own decisions depend on.
#[derive(Debug, Clone)]
pub struct PlantState {
    pub enabled: bool,
    pub voltage: f32,
    pub current: f32,
    pub power: f32,
    pub bat_voltage: f32,
    pub bat_current: f32,
    pub bat_temperature: f32,
    pub batt_temps: [f32; NCU_NUM_BATT_TEMP_SENS],
    /// Installed rectifier count as reported by the group block.
    pub in_count: usize,
    pub fail_count: usize,
    pub input_current_limit: f32,
    /// Values read back from the device AO vectors.
    pub device_config: ConfigTable,
    /// Values the upper layer asked for.
    pub config: ConfigTable,
    /// Disconnect method observed per load contactor (index 0 = LVD1).
    pub ld_method: [Option<DisconnectMethod>; 2],
    pub bat_discharge_active: bool,
    pub battery_disconnect_latch: bool,
    pub run_time_ms: u64,
}

impl Default for PlantState {
    fn default() -> Self {
        PlantState {
            enabled: false,
            voltage: f32::NAN,
            current: f32::NAN,
            power: f32::NAN,
            bat_voltage: f32::NAN,
            bat_current: f32::NAN,
            bat_temperature: f32::NAN,
            batt_temps: [f32::NAN; NCU_NUM_BATT_TEMP_SENS],
            in_count: 0,
            fail_count: 0,
            input_current_limit: f32::NAN,
            device_config: ConfigTable::default(),
            config: ConfigTable::default(),
            ld_method: [None; 2],
            bat_discharge_active: false,
            battery_disconnect_latch: false,
            run_time_ms: 0,
        }
    }
}

impl PlantState {
    /// Requested configuration value if set, otherwise the last value read
    /// back from the device.
    pub fn effective_config(&self, kind: ConfigFloat) -> f32 {
        let wanted = self.config.get(kind);
        if wanted.is_nan() {
            self.device_config.get(kind)
        } else {
            wanted
        }
    }

    /// Drops everything learned from the wire but keeps northbound wishes.
    pub fn forget(&mut self) {
        let config = self.config.clone();
        let run_time_ms = self.run_time_ms;
        *self = PlantState::default();
        self.config = config;
        self.run_time_ms = run_time_ms;
    }
}

/// Human-facing name of a load-disconnect contactor for a given flavor.
pub fn load_disconnect_name(flavor: ControllerFlavor, contactor: u8) -> String {
    use alloc::format;
    match (flavor, contactor) {
        (ControllerFlavor::Ncu, 1 | 2) => format!("Load{contactor}"),
        _ => format!("LVD{contactor}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_table_defaults_to_nan() {
        let t = ConfigTable::default();
        assert!(t.get(ConfigFloat::FloatChargeVoltage).is_nan());
    }

    #[test]
    fn effective_config_prefers_requested_value() {
        let mut p = PlantState::default();
        p.device_config.set(ConfigFloat::DcVoltMax, 57.5);
        assert_eq!(p.effective_config(ConfigFloat::DcVoltMax), 57.5);
        p.config.set(ConfigFloat::DcVoltMax, 58.0);
        assert_eq!(p.effective_config(ConfigFloat::DcVoltMax), 58.0);
    }

    #[test]
    fn forget_keeps_requested_config() {
        let mut p = PlantState::default();
        p.voltage = 54.2;
        p.config.set(ConfigFloat::FloatChargeVoltage, 54.0);
        p.forget();
        assert!(p.voltage.is_nan());
        assert_eq!(p.config.get(ConfigFloat::FloatChargeVoltage), 54.0);
    }

    #[test]
    fn contactor_names_follow_flavor() {
        assert_eq!(load_disconnect_name(ControllerFlavor::Ncu, 1), "Load1");
        assert_eq!(load_disconnect_name(ControllerFlavor::Acu, 1), "LVD1");
        assert_eq!(load_disconnect_name(ControllerFlavor::Ncu, 3), "LVD3");
    }
}
