//! The write path. Every setter is a read-modify-write of the cached AO or
//! DO vector of one block, serialized as `WB<id>!<AO>!<DO>`. Configuration
//! setters validate before anything is queued; a validation failure never
//! reaches the wire.

use super::{Engine, Pending};
use crate::frame::codec::{encode_float, pack_bits};
use crate::hal::PowerSink;
use crate::model::{ConfigError, ConfigFloat, DisconnectMethod};
use crate::registry::{self, BlockClass};
use crate::types::{
    ACU_SYSTEM_AO_LEN, BATT_TEST_AUTO, BATT_TEST_START, BATT_TEST_STOP, BATTERY_GROUP_ID,
    BLVD_LD_CONTACTOR, BlockId, CSU_ID, DISCONNECT_TIME_MAX, DISCONNECT_TIME_MIN,
    DISCONNECT_VOLT_MAX, IDX_UNDERVOLT1, IDX_UNDERVOLT2, LVD_RECONNECT_TIME, MAIN_LD_CONTACTOR,
    RECONNECT_VOLT_MAX, RECONNECT_VOLT_MIN, RECTIFIER_GROUP_ID, UNDERVOLT1_DIFF,
};
use alloc::format;
use alloc::vec::Vec;
use log::debug;

/// Serializes and queues one write. `None` sections are emitted empty.
pub(super) fn write_block(
    e: &mut Engine,
    id: BlockId,
    ao: Option<&[f32]>,
    dout: Option<&[u8]>,
    now_ms: u64,
) {
    let mut payload = Vec::new();
    payload.extend_from_slice(b"WB");
    payload.extend_from_slice(id.as_bytes());
    payload.push(b'!');
    if let Some(ao) = ao {
        for &f in ao {
            encode_float(f, &mut payload);
        }
    }
    payload.push(b'!');
    if let Some(d) = dout {
        pack_bits(d, &mut payload);
    }
    debug!("[EEM] Queue write to {id}");
    e.enqueue(&payload, Pending::WriteBlock(id), now_ms);
}

/// Copies the cached AO vector of `id` (clipped to `len`), applies
/// `mutate`, and queues the write. A device without a cached snapshot is
/// silently skipped; it has not been polled yet.
fn rmw_ao(e: &mut Engine, id: &str, len: usize, mutate: impl FnOnce(&mut [f32]), now_ms: u64) {
    let Some(idx) = e.find_device_str(id) else {
        return;
    };
    let Some(ao) = e.devices[idx].data.ao.as_ref() else {
        return;
    };
    if len == 0 {
        return;
    }
    let mut scratch: Vec<f32> = ao.iter().copied().take(len).collect();
    if scratch.len() < len {
        scratch.resize(len, f32::NAN);
    }
    mutate(&mut scratch);
    let dev_id = e.devices[idx].id;
    write_block(e, dev_id, Some(&scratch), None, now_ms);
}

fn rmw_do(e: &mut Engine, id: &str, mutate: impl FnOnce(&mut [u8]) -> bool, now_ms: u64) {
    let Some(idx) = e.find_device_str(id) else {
        return;
    };
    let Some(dout) = e.devices[idx].data.dout.as_ref() else {
        return;
    };
    let mut scratch = dout.clone();
    if !mutate(&mut scratch) {
        return;
    }
    let dev_id = e.devices[idx].id;
    write_block(e, dev_id, None, Some(&scratch), now_ms);
}

fn set_slot(v: &mut [f32], i: usize, value: f32) {
    if let Some(slot) = v.get_mut(i) {
        *slot = value;
    }
}

fn set_bit(v: &mut [u8], i: usize, on: bool) {
    if let Some(slot) = v.get_mut(i) {
        *slot = on as u8;
    }
}

/// System AO writes carry 14 entries on legacy controllers, the full
/// vector on NCU.
fn system_ao_len(e: &Engine) -> usize {
    if e.flavor.is_ncu() {
        registry::spec(BlockClass::System).ao_count
    } else {
        ACU_SYSTEM_AO_LEN
    }
}

fn battery_ao_len() -> usize {
    registry::spec(BlockClass::BatteryGroup).ao_count
}

fn lvd_unit_ao_len() -> usize {
    registry::spec(BlockClass::LvdUnit).ao_count
}

// --- Individual Setters ---

fn set_float_voltage(e: &mut Engine, value: f32, now_ms: u64) {
    let len = system_ao_len(e);
    rmw_ao(e, CSU_ID, len, |ao| set_slot(ao, 0, value), now_ms);
}

fn set_battery_ao(e: &mut Engine, index: usize, value: f32, now_ms: u64) {
    rmw_ao(
        e,
        BATTERY_GROUP_ID,
        battery_ao_len(),
        |ao| set_slot(ao, index, value),
        now_ms,
    );
}

/// Nominal capacity travels as amp-hours on the wire.
fn set_battery_capacity(e: &mut Engine, value: f32, now_ms: u64) {
    if value.is_nan() {
        return;
    }
    set_battery_ao(e, 0, value / 3600.0, now_ms);
}

fn set_system_ao(e: &mut Engine, kind: ConfigFloat, value: f32, now_ms: u64) {
    if value.is_nan() {
        return;
    }
    let ncu = e.flavor.is_ncu();
    let len = system_ao_len(e);
    rmw_ao(
        e,
        CSU_ID,
        len,
        |ao| match kind {
            ConfigFloat::DcVoltMax => set_slot(ao, 5, value),
            ConfigFloat::HighEnvTemp => {
                set_slot(ao, 9, value);
                if ncu {
                    set_slot(ao, 20, value);
                }
            }
            ConfigFloat::LowEnvTemp => {
                set_slot(ao, 10, value);
                if ncu {
                    set_slot(ao, 21, value);
                }
            }
            ConfigFloat::Batt1HighTemp => set_slot(ao, 14, value),
            ConfigFloat::Batt1LowTemp => set_slot(ao, 15, value),
            ConfigFloat::Batt2HighTemp => set_slot(ao, 16, value),
            ConfigFloat::Batt2LowTemp => set_slot(ao, 17, value),
            ConfigFloat::Batt3HighTemp => set_slot(ao, 18, value),
            ConfigFloat::Batt3LowTemp => set_slot(ao, 19, value),
            _ => {}
        },
        now_ms,
    );
}

fn set_lvd_group(e: &mut Engine, kind: ConfigFloat, value: f32, now_ms: u64) {
    if value.is_nan() {
        return;
    }
    rmw_ao(
        e,
        crate::types::LVD_GROUP_ID,
        registry::spec(BlockClass::LvdGroup).ao_count,
        |ao| match kind {
            ConfigFloat::BatteryHighTempMajor => set_slot(ao, 8, value),
            ConfigFloat::BatteryHighTempMinor => set_slot(ao, 9, value),
            _ => {}
        },
        now_ms,
    );
}

/// Pushes the requested disconnect/reconnect configuration of one load
/// contactor; unrequested entries keep their read-back values.
fn set_load_disconnect(e: &mut Engine, contactor: u8, now_ms: u64) {
    let time = ConfigFloat::load_disconnect_time(contactor)
        .map(|k| e.plant.config.get(k))
        .unwrap_or(f32::NAN);
    let volt = ConfigFloat::load_disconnect_volt(contactor)
        .map(|k| e.plant.config.get(k))
        .unwrap_or(f32::NAN);
    let reconnect = ConfigFloat::load_reconnect_volt(contactor)
        .map(|k| e.plant.config.get(k))
        .unwrap_or(f32::NAN);
    let id = format!("070{contactor}");
    rmw_ao(
        e,
        &id,
        lvd_unit_ao_len(),
        |ao| {
            if !time.is_nan() {
                set_slot(ao, 0, time);
            }
            if !volt.is_nan() {
                set_slot(ao, 1, volt);
            }
            set_slot(ao, 2, LVD_RECONNECT_TIME);
            if !reconnect.is_nan() {
                set_slot(ao, 3, reconnect);
            }
        },
        now_ms,
    );
}

fn set_battery_lvd(e: &mut Engine, kind: ConfigFloat, value: f32, now_ms: u64) {
    let index = match kind {
        ConfigFloat::BatteryDisconnectTime => 0,
        ConfigFloat::BatteryDisconnectVoltage => 1,
        ConfigFloat::BatteryReconnectVoltage => 3,
        _ => return,
    };
    let id = format!("070{BLVD_LD_CONTACTOR}");
    rmw_ao(
        e,
        &id,
        lvd_unit_ao_len(),
        |ao| {
            set_slot(ao, index, value);
            set_slot(ao, 2, LVD_RECONNECT_TIME);
        },
        now_ms,
    );
}

fn set_undervolt(e: &mut Engine, contactor: u8, value: f32, now_ms: u64) {
    if value.is_nan() {
        return;
    }
    let index = match contactor {
        MAIN_LD_CONTACTOR => IDX_UNDERVOLT1,
        BLVD_LD_CONTACTOR => IDX_UNDERVOLT2,
        _ => return,
    };
    let len = system_ao_len(e);
    rmw_ao(e, CSU_ID, len, |ao| set_slot(ao, index, value), now_ms);
}

/// The undervoltage levels track the LVD settings; adjust the local
/// configuration (no wire traffic) when they drift apart.
fn track_undervolt(
    e: &mut Engine,
    contactor: u8,
    value: f32,
    sink: &mut dyn PowerSink,
) {
    if value.is_nan() {
        return;
    }
    let (kind, level) = match contactor {
        MAIN_LD_CONTACTOR => (ConfigFloat::LowVoltageMinor, value + UNDERVOLT1_DIFF),
        BLVD_LD_CONTACTOR => (ConfigFloat::LowVoltageMajor, value),
        _ => return,
    };
    let current = e.plant.device_config.get(kind);
    if !current.is_nan() && round_millis(level) != round_millis(current) {
        e.plant.config.set(kind, level);
        sink.config_updated(kind, level);
    }
}

/// The battery LVD always disconnects on voltage; flip the method back
/// whenever a poll reads it as time-based.
pub(super) fn sync_blvd_method(e: &mut Engine, now_ms: u64) {
    let id = format!("070{BLVD_LD_CONTACTOR}");
    rmw_do(
        e,
        &id,
        |d| {
            if d.get(2).copied().unwrap_or(0) != 0 {
                set_bit(d, 2, false);
                true
            } else {
                false
            }
        },
        now_ms,
    );
}

/// No-std friendly rounding to three decimals.
fn round_millis(f: f32) -> f32 {
    if !f.is_finite() {
        return f;
    }
    let scaled = f64::from(f) * 1000.0;
    let r = if scaled < 0.0 {
        (scaled - 0.5) as i64
    } else {
        (scaled + 0.5) as i64
    };
    (r as f64 / 1000.0) as f32
}

fn volt_in_range(v: f32, lo: f32, hi: f32) -> bool {
    v.is_nan() || (v >= lo && v <= hi)
}

// --- Public Writer API ---

impl Engine {
    /// Central configuration dispatch. Validates, remembers the requested
    /// value, then queues the matching block write.
    pub fn set_config_float(
        &mut self,
        kind: ConfigFloat,
        value: f32,
        now_ms: u64,
        sink: &mut dyn PowerSink,
    ) -> Result<(), ConfigError> {
        if !self.can_set_config_float(kind) {
            return Err(ConfigError::NotWritable);
        }
        self.validate_config(kind, value)?;
        self.plant.config.set(kind, value);
        match kind {
            ConfigFloat::FloatChargeVoltage => set_float_voltage(self, value, now_ms),
            ConfigFloat::BoostChargeVoltage => set_battery_ao(self, 8, value, now_ms),
            ConfigFloat::LoadDisconnectVolt1
            | ConfigFloat::LoadDisconnectTime1
            | ConfigFloat::LoadReconnectVolt1 => {
                set_load_disconnect(self, MAIN_LD_CONTACTOR, now_ms)
            }
            ConfigFloat::LoadDisconnectVolt2
            | ConfigFloat::LoadDisconnectTime2
            | ConfigFloat::LoadReconnectVolt2 => {
                set_load_disconnect(self, crate::types::PRIO_LD_CONTACTOR, now_ms)
            }
            ConfigFloat::BatteryDisconnectVoltage => {
                track_undervolt(self, BLVD_LD_CONTACTOR, value, sink);
                set_battery_lvd(self, kind, value, now_ms);
            }
            ConfigFloat::BatteryDisconnectTime | ConfigFloat::BatteryReconnectVoltage => {
                set_battery_lvd(self, kind, value, now_ms)
            }
            ConfigFloat::NominalCapacity => set_battery_capacity(self, value, now_ms),
            ConfigFloat::DcVoltMax
            | ConfigFloat::HighEnvTemp
            | ConfigFloat::LowEnvTemp
            | ConfigFloat::Batt1HighTemp
            | ConfigFloat::Batt1LowTemp
            | ConfigFloat::Batt2HighTemp
            | ConfigFloat::Batt2LowTemp
            | ConfigFloat::Batt3HighTemp
            | ConfigFloat::Batt3LowTemp => set_system_ao(self, kind, value, now_ms),
            ConfigFloat::BatteryHighTempMajor | ConfigFloat::BatteryHighTempMinor => {
                set_lvd_group(self, kind, value, now_ms)
            }
            ConfigFloat::ChargeCurrentMax => set_battery_ao(self, 7, value, now_ms),
            ConfigFloat::TestTerminationTime => set_battery_ao(self, 22, value, now_ms),
            ConfigFloat::TestTerminationCapacity => set_battery_ao(self, 19, value, now_ms),
            ConfigFloat::LowVoltageMinor => set_undervolt(self, MAIN_LD_CONTACTOR, value, now_ms),
            ConfigFloat::LowVoltageMajor => set_undervolt(self, BLVD_LD_CONTACTOR, value, now_ms),
        }
        Ok(())
    }

    /// Every `ConfigFloat` kind is writable on this protocol.
    pub fn can_set_config_float(&self, _kind: ConfigFloat) -> bool {
        true
    }

    /// Voltage-like kinds are rounded to milli-units before display and
    /// comparison.
    pub fn round_config_float(&self, kind: ConfigFloat, value: f32) -> f32 {
        let _ = kind;
        round_millis(value)
    }

    fn validate_config(&self, kind: ConfigFloat, value: f32) -> Result<(), ConfigError> {
        use ConfigFloat as C;
        // Prospective view: the candidate value overlaid on what is known.
        let get = |k: C| {
            if k == kind {
                value
            } else {
                self.plant.effective_config(k)
            }
        };
        match kind {
            C::LoadDisconnectVolt1 | C::LoadDisconnectVolt2 | C::BatteryDisconnectVoltage => {
                if !volt_in_range(value, RECONNECT_VOLT_MIN, DISCONNECT_VOLT_MAX) {
                    return Err(ConfigError::DisconnectLevelOutOfRange);
                }
            }
            C::LoadReconnectVolt1 | C::LoadReconnectVolt2 | C::BatteryReconnectVoltage => {
                if !volt_in_range(value, RECONNECT_VOLT_MIN, RECONNECT_VOLT_MAX) {
                    return Err(ConfigError::ReconnectLevelOutOfRange);
                }
            }
            C::LoadDisconnectTime1 | C::LoadDisconnectTime2 | C::BatteryDisconnectTime => {
                if !volt_in_range(value, DISCONNECT_TIME_MIN, DISCONNECT_TIME_MAX) {
                    return Err(ConfigError::DelayValueOutOfRange);
                }
            }
            _ => return Ok(()),
        }

        // Per-contactor: disconnect below reconnect.
        for (disc, rec) in [
            (C::LoadDisconnectVolt1, C::LoadReconnectVolt1),
            (C::LoadDisconnectVolt2, C::LoadReconnectVolt2),
            (C::BatteryDisconnectVoltage, C::BatteryReconnectVoltage),
        ] {
            let (d, r) = (get(disc), get(rec));
            if !d.is_nan() && !r.is_nan() && d > r {
                return Err(ConfigError::DisconnectAboveReconnect);
            }
        }

        // Contactor hierarchy: LVD1 disconnects at or above LVD2.
        let (d1, d2) = (get(C::LoadDisconnectVolt1), get(C::LoadDisconnectVolt2));
        if !d1.is_nan() && !d2.is_nan() && d1 < d2 {
            return Err(ConfigError::Lvd1VoltageBelowLvd2);
        }
        let (r1, r2) = (get(C::LoadReconnectVolt1), get(C::LoadReconnectVolt2));
        if !r1.is_nan() && !r2.is_nan() && r1 < r2 {
            return Err(ConfigError::Lvd1ReconnectBelowLvd2);
        }

        // Neither load contactor may trip below the battery LVD.
        let blvd_d = get(C::BatteryDisconnectVoltage);
        let blvd_r = get(C::BatteryReconnectVoltage);
        for d in [d1, d2] {
            if !d.is_nan() && !blvd_d.is_nan() && d < blvd_d {
                return Err(ConfigError::VoltageBelowBlvd);
            }
        }
        for r in [r1, r2] {
            if !r.is_nan() && !blvd_r.is_nan() && r < blvd_r {
                return Err(ConfigError::ReconnectBelowBlvd);
            }
        }

        // Time hierarchy applies when a contactor disconnects on time.
        if self
            .plant
            .ld_method
            .iter()
            .any(|m| *m == Some(DisconnectMethod::Time))
        {
            let (t1, t2) = (get(C::LoadDisconnectTime1), get(C::LoadDisconnectTime2));
            if !t1.is_nan() && !t2.is_nan() && t1 <= t2 {
                return Err(ConfigError::Lvd1TimeBelowLvd2);
            }
        }
        Ok(())
    }

    /// Flips a load contactor's disconnect method (DO2).
    pub fn set_load_disconnect_method(
        &mut self,
        contactor: u8,
        method: DisconnectMethod,
        now_ms: u64,
    ) {
        let id = format!("070{contactor}");
        rmw_do(
            self,
            &id,
            |d| {
                set_bit(d, 2, method == DisconnectMethod::Time);
                true
            },
            now_ms,
        );
    }

    /// Contactor commands: set/clear bitmask over System DO8/10/12.
    pub fn set_contactors(&mut self, set: u8, clr: u8, now_ms: u64) {
        rmw_do(
            self,
            CSU_ID,
            |d| {
                for (mask, index) in [(1u8, 8usize), (2, 10), (4, 12)] {
                    if set & mask != 0 {
                        set_bit(d, index, true);
                    } else if clr & mask != 0 {
                        set_bit(d, index, false);
                    }
                }
                true
            },
            now_ms,
        );
    }

    pub fn set_boost_charge(&mut self, boost: bool, now_ms: u64) {
        rmw_do(
            self,
            BATTERY_GROUP_ID,
            |d| {
                set_bit(d, 4, boost);
                set_bit(d, 6, !boost);
                true
            },
            now_ms,
        );
    }

    pub fn bat_test(&mut self, active: bool, now_ms: u64, sink: &mut dyn PowerSink) {
        rmw_do(
            self,
            BATTERY_GROUP_ID,
            |d| {
                set_bit(d, BATT_TEST_START, active);
                set_bit(d, BATT_TEST_STOP, !active);
                if d.get(BATT_TEST_AUTO).copied().unwrap_or(0) != 0 {
                    set_bit(d, BATT_TEST_AUTO, false);
                }
                true
            },
            now_ms,
        );
        if active {
            sink.mode_set(crate::model::BatteryMode::Test);
        }
    }

    pub fn set_eco_mode(&mut self, eco: bool, now_ms: u64) {
        rmw_do(
            self,
            RECTIFIER_GROUP_ID,
            |d| {
                set_bit(d, 6, eco);
                true
            },
            now_ms,
        );
    }

    /// DO0 carries the inverted enable of one rectifier.
    pub fn rectifier_enable(&mut self, id: &str, enable: bool, now_ms: u64) {
        rmw_do(
            self,
            id,
            |d| {
                set_bit(d, 0, !enable);
                true
            },
            now_ms,
        );
    }

    /// Queues a raw command string, for diagnostics.
    pub fn send_command(&mut self, command: &str, now_ms: u64) {
        self.enqueue(command.as_bytes(), Pending::Command, now_ms);
    }
}
