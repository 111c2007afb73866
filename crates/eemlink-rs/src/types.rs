use core::fmt;

// --- Protocol Constants ---

/// Largest frame the peer will ever emit, in octets.
pub const EEM_MTU: usize = 1536;
/// Per-request response deadline.
pub const EEM_TIMEOUT_MS: u64 = 10_000;
/// Cumulative silence after which the plant is declared lost.
pub const EEM_LOST_TIMEOUT_MS: u64 = 60_000;
/// Period of the full device re-scan (`RI`).
pub const EEM_SCAN_PERIOD_MS: u64 = 90_000;
/// Reconnect delay after a normal connection loss.
pub const RECONNECT_SHORT_MS: u64 = 5_000;
/// Reconnect delay after a control-byte storm forced the link down.
pub const RECONNECT_LONG_MS: u64 = 15_000;
/// Cadence of the NCU SNMP inventory state machine.
pub const SNMP_POLL_INTERVAL_MS: u64 = 1_000;

/// Length of an encoded Poll frame.
pub const POLL_LEN: usize = 9;
/// Select framing overhead is 18 octets.
pub const REQUEST_LEN: usize = EEM_MTU - 18;
/// Select transmissions per request before the head is released.
pub const MAX_SEND_COUNT: u8 = 2;
/// Block ids on the wire are 4 hex digits plus a revision suffix.
pub const IDLEN: usize = 5;
/// Block and system names are NUL-bounded 31-char strings on the device.
pub const NAMELEN: usize = 32;
/// Control bytes in a row that force a disconnect.
pub const SKIP_STREAK_LIMIT: u8 = 5;

// Control characters of the serial framing.
pub const SOH: u8 = 0x01;
pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;
pub const EOT: u8 = 0x04;
pub const ENQ: u8 = 0x05;
pub const ACK: u8 = 0x06;
pub const NAK: u8 = 0x15;
pub const END: u8 = b'*';
pub const FAST_SELECT: u8 = b'F';
pub const POLL: u8 = b'P';
pub const FIELD_SEP: u8 = b'!';

// Well-known block ids.
pub const CSU_ID: &str = "0000";
pub const RECTIFIER_GROUP_ID: &str = "0200";
pub const BATTERY_GROUP_ID: &str = "0300";
pub const BATTERY_UNIT_ID: &str = "0301";
pub const LVD_GROUP_ID: &str = "0700";
pub const SOLAR_GROUP_ID: &str = "2600";
pub const SOLAR_PREFIX: &str = "26";

// Load-disconnect contactors.
pub const MAIN_LD_CONTACTOR: u8 = 1;
pub const PRIO_LD_CONTACTOR: u8 = 2;
pub const BLVD_LD_CONTACTOR: u8 = 3;

/// Reconnect delay written alongside every LVD voltage update, in minutes.
pub const LVD_RECONNECT_TIME: f32 = 2.0;
pub const RECONNECT_VOLT_MIN: f32 = 40.0;
pub const RECONNECT_VOLT_MAX: f32 = 60.0;
pub const DISCONNECT_VOLT_MIN: f32 = 40.0;
pub const DISCONNECT_VOLT_MAX: f32 = 60.0;
pub const DISCONNECT_TIME_MIN: f32 = 1.0;
pub const DISCONNECT_TIME_MAX: f32 = 1000.0;

// Battery-test command bits in the battery group DO vector.
pub const BATT_TEST_START: usize = 10;
pub const BATT_TEST_STOP: usize = 12;
pub const BATT_TEST_AUTO: usize = 16;

/// The undervoltage-1 level tracks LVD1 disconnect plus this margin.
pub const UNDERVOLT1_DIFF: f32 = 1.0;
/// System AO index of the undervoltage-1 level.
pub const IDX_UNDERVOLT1: usize = 1;
/// System AO index of the undervoltage-2 level.
pub const IDX_UNDERVOLT2: usize = 3;

/// System AO vector length understood by the legacy ACU+ firmware.
pub const ACU_SYSTEM_AO_LEN: usize = 14;

/// Temperature value the controller reports for an unconfigured sensor.
pub const TEMP_NOT_CONFIGURED: f32 = -273.0;
/// Battery temperature sensors on an NCU controller.
pub const NCU_NUM_BATT_TEMP_SENS: usize = 3;
/// Load meters fed by the NCU DC distribution blocks.
pub const NCU_NUM_DC_METERS: usize = 3;

// --- Controller Flavors ---

/// The two supervisor families speaking this protocol. NCU controllers get
/// SNMP inventory enrichment and a handful of alarm remappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerFlavor {
    #[default]
    Acu,
    Ncu,
}

impl ControllerFlavor {
    pub fn is_ncu(self) -> bool {
        self == ControllerFlavor::Ncu
    }
}

// --- Alarm Severity ---

/// Perceived severity of a raised alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Critical,
    Major,
    Minor,
    Warning,
    Indeterminate,
}

impl Severity {
    /// Maps the category byte of an alarm report. Unknown categories
    /// degrade to `Warning`.
    pub fn from_category(cat: u8) -> Self {
        match cat {
            0 => Severity::Critical,
            1 => Severity::Major,
            2 => Severity::Minor,
            _ => Severity::Warning,
        }
    }
}

// --- Block Id ---

/// A 4-hex-digit block address. Copied by value everywhere; the device list
/// is the only owner of per-block state.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId([u8; 4]);

impl BlockId {
    pub const fn new(bytes: [u8; 4]) -> Self {
        BlockId(bytes)
    }

    /// Takes the leading 4 bytes of a wire field (ids arrive with a trailing
    /// revision digit). Returns `None` on short or non-ASCII input.
    pub fn parse(field: &[u8]) -> Option<Self> {
        if field.len() < 4 {
            return None;
        }
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&field[..4]);
        if !bytes.iter().all(u8::is_ascii_hexdigit) {
            return None;
        }
        Some(BlockId(bytes))
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::parse(s.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        // Constructors only admit ASCII hex digits.
        core::str::from_utf8(&self.0).unwrap_or("????")
    }

    /// Class prefix, the first two hex digits.
    pub fn prefix(&self) -> &[u8] {
        &self.0[..2]
    }

    /// True for the `xx00` member of a block family.
    pub fn is_group(&self) -> bool {
        &self.0[2..] == b"00"
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_id_parses_wire_fields() {
        let id = BlockId::parse(b"02011").unwrap();
        assert_eq!(id.as_str(), "0201");
        assert!(!id.is_group());
        assert!(BlockId::parse(b"0200").unwrap().is_group());
        assert!(BlockId::parse(b"02").is_none());
        assert!(BlockId::parse(b"02x1").is_none());
    }

    #[test]
    fn severity_category_mapping() {
        assert_eq!(Severity::from_category(0), Severity::Critical);
        assert_eq!(Severity::from_category(1), Severity::Major);
        assert_eq!(Severity::from_category(2), Severity::Minor);
        assert_eq!(Severity::from_category(3), Severity::Warning);
        assert_eq!(Severity::from_category(9), Severity::Warning);
    }
}
