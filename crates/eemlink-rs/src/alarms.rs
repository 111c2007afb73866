//! Static alarm maps: per block class, the report index decodes into a
//! `(kind, bit)` pair in one of three namespaces (plant-wide, input-scoped,
//! output-scoped). `Ignore` entries are decoded but raise nothing. NCU
//! controllers overlay a few remappings on top (see the sweep module).

use crate::registry::{BLOCK_CLASS_COUNT, BlockClass};

/// Plant-wide alarm kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemAlarm {
    Internal,
    Mains,
    Undervoltage,
    Overvoltage,
    HighTemp,
    RemoteShutdown,
    Door,
    External,
    TempSensor,
    LowTemp,
    Config,
    Can,
    MultipleLost,
    LoadShunt,
    MaintTime,
    HighLoad,
    Smoke,
    Inverter,
    DcConverter,
    Cooling,
    Diesel,
    Aviation,
    HighOutTemp,
    LowOutTemp,
    Spd,
    Fan,
    Fuse,
    BatteryFuse,
    BatTest,
    BatBad,
    BatTempSensor,
    BatHighTemp,
    BatLowTemp,
    BatShunt,
    BatCurrent,
    BatLoad,
    BatDischarge,
    BatteryDisconnect,
    Lost,
}

/// Alarm kinds scoped to one power input (rectifier, solar converter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAlarm {
    Fail,
    Mains,
    Overvoltage,
    HighTemp,
    Lost,
    Limit,
    Fan,
}

/// Alarm kinds scoped to one power output (group blocks, LVD contactors).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputAlarm {
    Mains,
    Lost,
    Fail,
    Disconnect,
    Unbalanced,
    Overvoltage,
    HighTemp,
    Limit,
    Fan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmKind {
    Plant(SystemAlarm),
    Input(InputAlarm),
    Output(OutputAlarm),
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmEntry {
    pub kind: AlarmKind,
    pub bit: u16,
}

const fn plant(kind: SystemAlarm, bit: u16) -> AlarmEntry {
    AlarmEntry {
        kind: AlarmKind::Plant(kind),
        bit,
    }
}

const fn input(kind: InputAlarm, bit: u16) -> AlarmEntry {
    AlarmEntry {
        kind: AlarmKind::Input(kind),
        bit,
    }
}

const fn output(kind: OutputAlarm, bit: u16) -> AlarmEntry {
    AlarmEntry {
        kind: AlarmKind::Output(kind),
        bit,
    }
}

const IGNORE: AlarmEntry = AlarmEntry {
    kind: AlarmKind::Ignore,
    bit: 0,
};

use InputAlarm as In;
use OutputAlarm as Out;
use SystemAlarm as Sys;

static SYSTEM_AE: &[AlarmEntry] = &[
    plant(Sys::Internal, 0), /* Opto communication failure */
    plant(Sys::Mains, 0),
    plant(Sys::Undervoltage, 0),
    plant(Sys::Undervoltage, 1),
    plant(Sys::Overvoltage, 0),
    plant(Sys::HighTemp, 0),
    plant(Sys::RemoteShutdown, 0),
    plant(Sys::Door, 0),
    plant(Sys::External, 1), /* BBS battery fuse */
    plant(Sys::External, 2), /* Fan alarm */
    plant(Sys::External, 3),
    plant(Sys::External, 4), /* AC grid is off */
    plant(Sys::External, 5),
    plant(Sys::External, 6),
    plant(Sys::External, 7),
    plant(Sys::External, 8),
    plant(Sys::External, 9),
    plant(Sys::External, 10),
    plant(Sys::External, 11),
    plant(Sys::External, 12),
    plant(Sys::External, 13),
    plant(Sys::External, 14),
    plant(Sys::External, 15),
    plant(Sys::Internal, 1), /* Supervision unit internal fault */
    plant(Sys::Internal, 2), /* Supervision unit uncalibrated */
    plant(Sys::TempSensor, 0),
    plant(Sys::LowTemp, 0),
    plant(Sys::Internal, 3), /* Outgoing alarms blocked */
    plant(Sys::Config, 0),
    plant(Sys::Can, 0),
    plant(Sys::MultipleLost, 0),
    plant(Sys::LoadShunt, 0),
    plant(Sys::Internal, 4), /* Prio 2 load disconnected */
    plant(Sys::MaintTime, 0),
    plant(Sys::HighLoad, 0),
    plant(Sys::Smoke, 0),
    IGNORE, /* Intruder alarm */
    IGNORE, /* AC mains OK */
    plant(Sys::Inverter, 0),
    plant(Sys::DcConverter, 0),
    plant(Sys::Cooling, 0),
    plant(Sys::Diesel, 0),
    plant(Sys::Aviation, 0),
    plant(Sys::DcConverter, 1),
    plant(Sys::Inverter, 1),
    plant(Sys::HighOutTemp, 0),
    plant(Sys::LowOutTemp, 0),
    plant(Sys::Spd, 0),
    plant(Sys::Fan, 0),
];

static RECTIFIER_GROUP_AE: &[AlarmEntry] = &[
    IGNORE,
    output(Out::Mains, 0),
    IGNORE, /* Mains fault */
    output(Out::Lost, 3),
    IGNORE, /* ECO mode activated */
    IGNORE,
    IGNORE,
    IGNORE,
    IGNORE,
    IGNORE,
    IGNORE,
    IGNORE,
    output(Out::Fail, 4),
];

static RECTIFIER_AE: &[AlarmEntry] = &[
    IGNORE, /* Rectifier on/off */
    input(In::Fail, 0),
    input(In::Mains, 0),
    input(In::Overvoltage, 0),
    input(In::HighTemp, 0),
    IGNORE, /* Rectifier current limit */
    input(In::Mains, 0), /* Rectifier AC fault */
    input(In::Lost, 0),
    input(In::Fail, 1),
    input(In::Limit, 0), /* Power limit (short circuit protection) */
    input(In::Fan, 0),
];

static BATTERY_GROUP_AE: &[AlarmEntry] = &[
    IGNORE, /* Battery test running */
    plant(Sys::BatTest, 0),
    IGNORE, /* Battery boost charge */
    plant(Sys::BatBad, 0),
    IGNORE, /* Manual battery test running */
    IGNORE, /* Scheduled battery test running */
    IGNORE, /* Automatic battery test running */
    IGNORE, /* Manual boost charge */
    IGNORE, /* Cyclic boost charge running */
    IGNORE, /* Automatic boost charge running */
    IGNORE, /* Battery current limitation running */
    plant(Sys::BatTempSensor, 0),
    plant(Sys::BatHighTemp, 0),
    plant(Sys::BatHighTemp, 1), /* Very high temperature */
    plant(Sys::BatLowTemp, 0),
    plant(Sys::BatShunt, 0),
    plant(Sys::BatCurrent, 0),
    IGNORE, /* Equalizing boost charge running */
    plant(Sys::BatLoad, 0),
];

static BATTERY_UNIT_AE: &[AlarmEntry] = &[
    IGNORE, /* Temperature sensor fault */
    IGNORE, /* High temperature */
    IGNORE, /* Very high temperature */
    IGNORE, /* Low temperature */
];

static DC_DISTRIBUTION_FUSE_UNIT_AE: &[AlarmEntry] = &[
    plant(Sys::Fuse, 0),
    plant(Sys::Fuse, 1),
    plant(Sys::Fuse, 2),
    plant(Sys::Fuse, 3),
    plant(Sys::Fuse, 4),
    plant(Sys::Fuse, 5),
    plant(Sys::Fuse, 6),
    plant(Sys::Fuse, 7),
    plant(Sys::Fuse, 8),
    plant(Sys::Fuse, 9),
];

static BATTERY_FUSE_UNIT_AE: &[AlarmEntry] = &[
    plant(Sys::BatteryFuse, 0),
    plant(Sys::BatteryFuse, 1),
    plant(Sys::BatteryFuse, 2),
    IGNORE, /* Uncalibrated */
    plant(Sys::BatteryFuse, 3),
];

static LVD_GROUP_AE: &[AlarmEntry] = &[
    IGNORE, /* Load disconnect error */
];

static LVD_UNIT_AE: &[AlarmEntry] = &[output(Out::Disconnect, 0)];

static RECTIFIER_AC_AE: &[AlarmEntry] = &[
    plant(Sys::Internal, 5), /* Unit uncalibrated */
    plant(Sys::Internal, 6), /* Supervision fail */
    IGNORE, /* Over voltage, phase 1-2 */
    IGNORE, /* Severe over voltage, phase 1-2 */
    IGNORE, /* Under voltage, phase 1-2 */
    IGNORE, /* Severe under voltage, phase 1-2 */
    IGNORE, /* Over voltage, phase 1-3 */
    IGNORE, /* Severe over voltage, phase 1-3 */
    IGNORE, /* Under voltage, phase 1-3 */
    IGNORE, /* Severe under voltage, phase 1-3 */
    IGNORE, /* Over voltage, phase 2-3 */
    IGNORE, /* Severe over voltage, phase 2-3 */
    IGNORE, /* Under voltage, phase 2-3 */
    IGNORE, /* Severe under voltage, phase 2-3 */
    IGNORE, /* Over voltage, phase 1 */
    IGNORE, /* Severe over voltage, phase 1 */
    IGNORE, /* Under voltage, phase 1 */
    IGNORE, /* Severe under voltage, phase 1 */
    IGNORE, /* Over voltage, phase 2 */
    IGNORE, /* Severe over voltage, phase 2 */
    IGNORE, /* Under voltage, phase 2 */
    IGNORE, /* Severe under voltage, phase 2 */
    IGNORE, /* Over voltage, phase 3 */
    IGNORE, /* Severe over voltage, phase 3 */
    IGNORE, /* Under voltage, phase 3 */
    IGNORE, /* Severe under voltage, phase 3 */
    input(In::Mains, 1), /* Mains failure */
    input(In::Mains, 2), /* Severe mains failure */
    IGNORE, /* High current, phase 1 */
    IGNORE, /* High current, phase 2 */
    IGNORE, /* High current, phase 3 */
    IGNORE, /* High frequency failure */
    IGNORE, /* High temperature failure */
    IGNORE, /* Low frequency failure */
    IGNORE, /* Low temperature failure */
];

static SOLAR_CONVERTER_GROUP_AE: &[AlarmEntry] = &[
    IGNORE, /* Double converter failure */
    IGNORE, /* Reserved */
    IGNORE, /* Converter lost */
    IGNORE, /* Capacity limitation */
    output(Out::Unbalanced, 0),
    output(Out::Overvoltage, 0),
    output(Out::Lost, 0), /* Local communication failure */
];

static SOLAR_CONVERTER_AE: &[AlarmEntry] = &[
    IGNORE, /* Converter on/off */
    input(In::Fail, 0),
    IGNORE, /* Mains failure */
    IGNORE, /* Over voltage */
    IGNORE, /* Reserved */
    IGNORE, /* Converter current limit */
    IGNORE, /* Reserved */
    input(In::Lost, 0), /* Converter communication fail */
    IGNORE, /* Reserved */
    IGNORE, /* Power limit */
    input(In::Fan, 0),
    input(In::Limit, 0), /* Limited due to high temp */
    IGNORE, /* Fans in full speed */
    IGNORE, /* WALK in */
    IGNORE, /* Equalized charging */
    IGNORE, /* Test in process */
    plant(Sys::HighTemp, 0), /* Over temperature */
    IGNORE, /* Unbalanced current */
];

static SM_IO_IB2_AE: &[AlarmEntry] = &[
    plant(Sys::External, 1),
    plant(Sys::External, 2),
    plant(Sys::External, 3),
    plant(Sys::External, 4),
    plant(Sys::External, 5),
    plant(Sys::External, 6),
    plant(Sys::External, 7),
    plant(Sys::External, 8),
];

/// NCU controllers repurpose the DC distribution fuse unit inputs.
pub static NCU_DC_FUSE_UNIT_AE: &[AlarmEntry] = &[
    plant(Sys::Cooling, 0),           /* Input DI1 */
    plant(Sys::Door, 0),              /* Input DI2 */
    plant(Sys::BatteryDisconnect, 2), /* Input DI3 */
    plant(Sys::Fuse, 0),              /* Input DI4 */
    IGNORE,
    IGNORE,
    IGNORE,
    IGNORE,
    IGNORE,
    IGNORE,
];

/// Per-class alarm tables, in `BlockClass` declaration order. Classes
/// without a table produce no alarms of their own.
static TABLES: [&[AlarmEntry]; BLOCK_CLASS_COUNT] = [
    SYSTEM_AE,
    RECTIFIER_GROUP_AE,
    RECTIFIER_AE,
    BATTERY_GROUP_AE,
    BATTERY_UNIT_AE,
    &[], /* DC distribution group */
    &[], /* EIB distribution unit */
    DC_DISTRIBUTION_FUSE_UNIT_AE,
    &[], /* Battery fuse group */
    BATTERY_FUSE_UNIT_AE,
    LVD_GROUP_AE,
    LVD_UNIT_AE,
    &[], /* AC group */
    RECTIFIER_AC_AE,
    RECTIFIER_AC_AE,
    SOLAR_CONVERTER_GROUP_AE,
    SOLAR_CONVERTER_AE,
    SM_IO_IB2_AE,
];

/// Table lookup with bounds check; out-of-range indices raise nothing.
pub fn alarm_entry(class: BlockClass, index: usize) -> Option<&'static AlarmEntry> {
    TABLES[class.index()].get(index)
}
