//! Static description of every block class: AI/AO/DI/DO arity and the
//! parameter names of the interesting indices. The tables are compile-time
//! constants; name lists may be shorter than the declared arity, in which
//! case [`param_name`] falls back to "Reserved".

use crate::types::BlockId;

/// Typed unit of a power plant, derived from the first two hex digits of a
/// block id (with `xx00` denoting the group member of a family).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum BlockClass {
    System,
    RectifierGroup,
    Rectifier,
    BatteryGroup,
    BatteryUnit,
    DcDistributionGroup,
    EibDistributionUnit,
    DcDistributionFuseUnit,
    BatteryFuseGroup,
    BatteryFuseUnit,
    LvdGroup,
    LvdUnit,
    AcGroup,
    RectifierAc,
    ObAcUnit,
    SolarConverterGroup,
    SolarConverter,
    SmIoIb2,
}

pub const BLOCK_CLASS_COUNT: usize = 18;

impl BlockClass {
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Maps a block id onto its class.
pub fn classify(id: BlockId) -> Option<BlockClass> {
    let group = id.is_group();
    Some(match id.prefix() {
        b"00" => BlockClass::System,
        b"02" if group => BlockClass::RectifierGroup,
        b"02" => BlockClass::Rectifier,
        b"03" if group => BlockClass::BatteryGroup,
        b"03" => BlockClass::BatteryUnit,
        b"04" if group => BlockClass::DcDistributionGroup,
        b"04" if &id.as_bytes()[2..] == b"01" => BlockClass::EibDistributionUnit,
        b"04" => BlockClass::DcDistributionFuseUnit,
        b"05" if group => BlockClass::BatteryFuseGroup,
        b"05" => BlockClass::BatteryFuseUnit,
        b"07" if group => BlockClass::LvdGroup,
        b"07" => BlockClass::LvdUnit,
        b"09" if group => BlockClass::AcGroup,
        b"09" if &id.as_bytes()[2..] == b"01" => BlockClass::RectifierAc,
        b"09" => BlockClass::ObAcUnit,
        b"26" if group => BlockClass::SolarConverterGroup,
        b"26" => BlockClass::SolarConverter,
        b"2A" => BlockClass::SmIoIb2,
        _ => return None,
    })
}

/// Vector arities and parameter names of one block class.
#[derive(Debug)]
pub struct BlockSpec {
    pub ai_count: usize,
    pub ao_count: usize,
    pub di_count: usize,
    pub do_count: usize,
    pub ai_params: &'static [&'static str],
    pub ao_params: &'static [&'static str],
    pub di_params: &'static [&'static str],
    pub do_params: &'static [&'static str],
}

pub fn spec(class: BlockClass) -> &'static BlockSpec {
    &BLOCKS[class.index()]
}

/// Name of a parameter index, degrading to "Reserved" past the known list.
pub fn param_name(names: &'static [&'static str], index: usize) -> &'static str {
    names.get(index).copied().unwrap_or("Reserved")
}

static SYSTEM_AI: &[&str] = &[
    "System Voltage",
    "System Current",
    "System Power",
    "Load Current",
    "Load Power",
    "Battery Current",
    "Ambient Temperature",
    "Outside Temperature",
    "Mains Voltage",
    "Mains Frequency",
    "Battery Temperature 1",
    "Battery Temperature 2",
    "Battery Temperature 3",
    "Ambient Temperature 2",
];

static SYSTEM_AO: &[&str] = &[
    "Float Charge Voltage",
    "Undervoltage 1 Level",
    "Undervoltage 1 Delay",
    "Undervoltage 2 Level",
    "Undervoltage 2 Delay",
    "Overvoltage Level",
    "Load Current Limit",
    "Battery Current Limit",
    "High Load Level",
    "High Ambient Temperature",
    "Low Ambient Temperature",
    "High Outside Temperature",
    "Low Outside Temperature",
    "Nominal Voltage",
    "Battery 1 High Temperature",
    "Battery 1 Low Temperature",
    "Battery 2 High Temperature",
    "Battery 2 Low Temperature",
    "Battery 3 High Temperature",
    "Battery 3 Low Temperature",
    "High Environment Temperature",
    "Low Environment Temperature",
];

static SYSTEM_DO: &[&str] = &[
    "Outgoing Alarms Blocked",
    "Audible Alarm",
    "Remote Shutdown",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Contactor 1",
    "Reserved",
    "Contactor 2",
    "Reserved",
    "Contactor 3",
    "Reserved",
];

static RECTIFIER_GROUP_AI: &[&str] = &[
    "Output Voltage",
    "Output Current",
    "Output Power",
    "Utilization",
    "Reserved",
    "Installed Rectifiers",
    "Communicating Rectifiers",
    "Reserved",
];

static RECTIFIER_GROUP_AO: &[&str] = &[
    "Output Voltage Setting",
    "Input Current Limit",
    "Output Current Limit",
    "Walk-In Time",
];

static RECTIFIER_GROUP_DO: &[&str] = &[
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "ECO Mode",
    "Reserved",
];

static RECTIFIER_AI: &[&str] = &[
    "Output Voltage",
    "Output Current",
    "Temperature",
    "Utilization",
    "Input Voltage",
    "Run Time",
];

static RECTIFIER_DI: &[&str] = &[
    "Rectifier Off",
    "Reserved",
    "Rectifier Failure",
    "Reserved",
    "Mains Failure",
    "Reserved",
    "Overvoltage",
    "Reserved",
    "High Temperature",
    "Reserved",
    "Current Limit",
    "Reserved",
    "AC Fault",
    "Reserved",
    "Communication Fail",
    "Reserved",
    "Severe Failure",
    "Reserved",
    "Power Limit",
    "Reserved",
    "Fan Failure",
    "Reserved",
];

static RECTIFIER_DO: &[&str] = &["Rectifier Disable", "LED Control"];

static BATTERY_GROUP_AI: &[&str] = &[
    "Battery Voltage",
    "Battery Current",
    "Battery Temperature",
    "Used Capacity",
    "Remaining Capacity",
    "Test Voltage",
    "Test Current",
];

static BATTERY_GROUP_AO: &[&str] = &[
    "Nominal Capacity",
    "Test End Voltage",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Charge Current Max",
    "Boost Charge Voltage",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Cyclic Boost Interval",
    "Reserved",
    "Reserved",
    "Reserved",
    "Nominal Battery Capacity",
    "Used Capacity Limit",
    "Reserved",
    "Reserved",
    "Battery Test Time",
];

static BATTERY_GROUP_DI: &[&str] = &[
    "Reserved",
    "Reserved",
    "Test Failure",
    "Reserved",
    "Reserved",
    "Reserved",
    "Bad Battery",
    "Reserved",
    "Manual Test Running",
    "Reserved",
    "Scheduled Test Running",
    "Reserved",
    "Automatic Test Running",
    "Reserved",
    "Manual Boost Charge",
    "Reserved",
    "Cyclic Boost Charge",
    "Reserved",
    "Automatic Boost Charge",
    "Reserved",
];

static BATTERY_GROUP_DO: &[&str] = &[
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Boost Charge Start",
    "Reserved",
    "Boost Charge Stop",
    "Reserved",
    "Reserved",
    "Reserved",
    "Battery Test Start",
    "Reserved",
    "Battery Test Stop",
    "Reserved",
    "Reserved",
    "Reserved",
    "Automatic Battery Test",
    "Reserved",
];

static BATTERY_UNIT_AI: &[&str] = &[
    "Battery Voltage",
    "Battery Current",
    "Battery Temperature",
    "Used Capacity",
];

static BATTERY_UNIT_AO: &[&str] = &["Nominal Capacity", "Current Resolution"];

static LVD_GROUP_AO: &[&str] = &[
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Battery High Temperature Major",
    "Battery High Temperature Minor",
];

static LVD_UNIT_AO: &[&str] = &[
    "Disconnect Time",
    "Disconnect Voltage",
    "Reconnect Delay",
    "Reconnect Voltage",
];

static LVD_UNIT_DI: &[&str] = &["Contactor Disconnected", "Reserved"];

static LVD_UNIT_DO: &[&str] = &[
    "LLVD Enable",
    "Reserved",
    "Disconnect Method",
    "Reserved",
];

static SOLAR_GROUP_AI: &[&str] = &[
    "Output Voltage",
    "Output Current",
    "Output Power",
    "Utilization",
    "Reserved",
    "Installed Converters",
];

static SOLAR_AI: &[&str] = &[
    "Output Voltage",
    "Output Current",
    "Output Power",
    "Reserved",
    "Reserved",
    "Run Time",
    "Reserved",
    "Input Voltage",
    "Input Current",
    "Temperature",
    "Utilization",
];

static EIB_AI: &[&str] = &[
    "Load 1 Current",
    "Load 2 Current",
    "Battery Load Current",
];

static DC_GROUP_AI: &[&str] = &[
    "Distribution Voltage",
    "Distribution Current",
];

static EMPTY: &[&str] = &[];

/// One entry per `BlockClass`, in declaration order.
pub static BLOCKS: [BlockSpec; BLOCK_CLASS_COUNT] = [
    // System
    BlockSpec {
        ai_count: 24,
        ao_count: 22,
        di_count: 98,
        do_count: 14,
        ai_params: SYSTEM_AI,
        ao_params: SYSTEM_AO,
        di_params: EMPTY,
        do_params: SYSTEM_DO,
    },
    // Rectifier group
    BlockSpec {
        ai_count: 8,
        ao_count: 4,
        di_count: 26,
        do_count: 8,
        ai_params: RECTIFIER_GROUP_AI,
        ao_params: RECTIFIER_GROUP_AO,
        di_params: EMPTY,
        do_params: RECTIFIER_GROUP_DO,
    },
    // Rectifier
    BlockSpec {
        ai_count: 6,
        ao_count: 2,
        di_count: 22,
        do_count: 2,
        ai_params: RECTIFIER_AI,
        ao_params: EMPTY,
        di_params: RECTIFIER_DI,
        do_params: RECTIFIER_DO,
    },
    // Battery group
    BlockSpec {
        ai_count: 7,
        ao_count: 55,
        di_count: 38,
        do_count: 18,
        ai_params: BATTERY_GROUP_AI,
        ao_params: BATTERY_GROUP_AO,
        di_params: BATTERY_GROUP_DI,
        do_params: BATTERY_GROUP_DO,
    },
    // Battery unit
    BlockSpec {
        ai_count: 4,
        ao_count: 2,
        di_count: 8,
        do_count: 2,
        ai_params: BATTERY_UNIT_AI,
        ao_params: BATTERY_UNIT_AO,
        di_params: EMPTY,
        do_params: EMPTY,
    },
    // DC distribution group
    BlockSpec {
        ai_count: 8,
        ao_count: 2,
        di_count: 2,
        do_count: 0,
        ai_params: DC_GROUP_AI,
        ao_params: EMPTY,
        di_params: EMPTY,
        do_params: EMPTY,
    },
    // EIB distribution unit
    BlockSpec {
        ai_count: 8,
        ao_count: 0,
        di_count: 0,
        do_count: 0,
        ai_params: EIB_AI,
        ao_params: EMPTY,
        di_params: EMPTY,
        do_params: EMPTY,
    },
    // DC distribution fuse unit
    BlockSpec {
        ai_count: 2,
        ao_count: 0,
        di_count: 20,
        do_count: 0,
        ai_params: EMPTY,
        ao_params: EMPTY,
        di_params: EMPTY,
        do_params: EMPTY,
    },
    // Battery fuse group
    BlockSpec {
        ai_count: 2,
        ao_count: 0,
        di_count: 2,
        do_count: 0,
        ai_params: EMPTY,
        ao_params: EMPTY,
        di_params: EMPTY,
        do_params: EMPTY,
    },
    // Battery fuse unit
    BlockSpec {
        ai_count: 2,
        ao_count: 0,
        di_count: 10,
        do_count: 0,
        ai_params: EMPTY,
        ao_params: EMPTY,
        di_params: EMPTY,
        do_params: EMPTY,
    },
    // LVD group
    BlockSpec {
        ai_count: 2,
        ao_count: 10,
        di_count: 2,
        do_count: 2,
        ai_params: EMPTY,
        ao_params: LVD_GROUP_AO,
        di_params: EMPTY,
        do_params: EMPTY,
    },
    // LVD unit
    BlockSpec {
        ai_count: 2,
        ao_count: 4,
        di_count: 2,
        do_count: 4,
        ai_params: EMPTY,
        ao_params: LVD_UNIT_AO,
        di_params: LVD_UNIT_DI,
        do_params: LVD_UNIT_DO,
    },
    // AC group
    BlockSpec {
        ai_count: 6,
        ao_count: 0,
        di_count: 0,
        do_count: 0,
        ai_params: EMPTY,
        ao_params: EMPTY,
        di_params: EMPTY,
        do_params: EMPTY,
    },
    // Rectifier AC
    BlockSpec {
        ai_count: 12,
        ao_count: 0,
        di_count: 72,
        do_count: 0,
        ai_params: EMPTY,
        ao_params: EMPTY,
        di_params: EMPTY,
        do_params: EMPTY,
    },
    // Ob AC unit
    BlockSpec {
        ai_count: 6,
        ao_count: 0,
        di_count: 0,
        do_count: 0,
        ai_params: EMPTY,
        ao_params: EMPTY,
        di_params: EMPTY,
        do_params: EMPTY,
    },
    // Solar converter group
    BlockSpec {
        ai_count: 6,
        ao_count: 4,
        di_count: 14,
        do_count: 2,
        ai_params: SOLAR_GROUP_AI,
        ao_params: EMPTY,
        di_params: EMPTY,
        do_params: EMPTY,
    },
    // Solar converter
    BlockSpec {
        ai_count: 11,
        ao_count: 2,
        di_count: 36,
        do_count: 2,
        ai_params: SOLAR_AI,
        ao_params: EMPTY,
        di_params: EMPTY,
        do_params: EMPTY,
    },
    // SM IO IB2
    BlockSpec {
        ai_count: 8,
        ao_count: 0,
        di_count: 16,
        do_count: 8,
        ai_params: EMPTY,
        ao_params: EMPTY,
        di_params: EMPTY,
        do_params: EMPTY,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> BlockId {
        BlockId::from_str(s).unwrap()
    }

    #[test]
    fn classification() {
        assert_eq!(classify(id("0000")), Some(BlockClass::System));
        assert_eq!(classify(id("0200")), Some(BlockClass::RectifierGroup));
        assert_eq!(classify(id("0201")), Some(BlockClass::Rectifier));
        assert_eq!(classify(id("0300")), Some(BlockClass::BatteryGroup));
        assert_eq!(classify(id("0301")), Some(BlockClass::BatteryUnit));
        assert_eq!(classify(id("0400")), Some(BlockClass::DcDistributionGroup));
        assert_eq!(classify(id("0401")), Some(BlockClass::EibDistributionUnit));
        assert_eq!(
            classify(id("0402")),
            Some(BlockClass::DcDistributionFuseUnit)
        );
        assert_eq!(classify(id("0500")), Some(BlockClass::BatteryFuseGroup));
        assert_eq!(classify(id("0501")), Some(BlockClass::BatteryFuseUnit));
        assert_eq!(classify(id("0700")), Some(BlockClass::LvdGroup));
        assert_eq!(classify(id("0701")), Some(BlockClass::LvdUnit));
        assert_eq!(classify(id("0900")), Some(BlockClass::AcGroup));
        assert_eq!(classify(id("0901")), Some(BlockClass::RectifierAc));
        assert_eq!(classify(id("0902")), Some(BlockClass::ObAcUnit));
        assert_eq!(classify(id("2600")), Some(BlockClass::SolarConverterGroup));
        assert_eq!(classify(id("2601")), Some(BlockClass::SolarConverter));
        assert_eq!(classify(id("1234")), None);
    }

    #[test]
    fn specs_are_addressable_by_class() {
        let s = spec(BlockClass::BatteryGroup);
        assert_eq!(s.ao_count, 55);
        assert_eq!(param_name(s.ao_params, 18), "Nominal Battery Capacity");
        assert_eq!(param_name(s.ao_params, 54), "Reserved");
    }

    #[test]
    fn lvd_unit_ao_layout() {
        let s = spec(BlockClass::LvdUnit);
        assert_eq!(s.ao_params[0], "Disconnect Time");
        assert_eq!(s.ao_params[1], "Disconnect Voltage");
        assert_eq!(s.ao_params[3], "Reconnect Voltage");
    }
}
