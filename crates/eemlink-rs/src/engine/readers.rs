//! Per-class block readers. Each one projects the freshly decoded vectors
//! of a device onto the normalized plant model and the managed-object sink.

use super::{BlockData, Engine};
use crate::alarms::SystemAlarm;
use crate::hal::PowerSink;
use crate::model::{
    BatteryData, BatteryMode, ConfigFloat, ContactorState, DisconnectMethod, LoadDisconnectState,
    OutputData, RectifierData, SolarConverterData, SystemData, TempKind, ThresholdScope,
};
use crate::registry::BlockClass;
use crate::types::{
    NCU_NUM_BATT_TEMP_SENS, NCU_NUM_DC_METERS, SOLAR_PREFIX, Severity, TEMP_NOT_CONFIGURED,
};
use alloc::string::String;
use alloc::vec::Vec;

/// Classes with a reader; everything else is decoded and skipped.
pub(super) fn has_reader(class: BlockClass) -> bool {
    matches!(
        class,
        BlockClass::System
            | BlockClass::RectifierGroup
            | BlockClass::Rectifier
            | BlockClass::BatteryGroup
            | BlockClass::BatteryUnit
            | BlockClass::DcDistributionGroup
            | BlockClass::EibDistributionUnit
            | BlockClass::LvdGroup
            | BlockClass::LvdUnit
            | BlockClass::SolarConverterGroup
            | BlockClass::SolarConverter
    )
}

pub(super) fn dispatch(
    e: &mut Engine,
    class: BlockClass,
    idx: usize,
    data: &BlockData,
    sink: &mut dyn PowerSink,
) {
    match class {
        BlockClass::System => read_system(e, data, sink),
        BlockClass::RectifierGroup => read_rectifier_group(e, idx, data, sink),
        BlockClass::Rectifier => read_rectifier(e, idx, data, sink),
        BlockClass::BatteryGroup => read_battery_group(e, data, sink),
        BlockClass::BatteryUnit => read_battery(e, data, sink),
        BlockClass::DcDistributionGroup => read_dc_distribution_group(e, data, sink),
        BlockClass::EibDistributionUnit => read_eib_distribution_unit(e, data, sink),
        BlockClass::LvdGroup => read_lvd_group(e, data),
        BlockClass::LvdUnit => read_lvd_unit(e, idx, data, sink),
        BlockClass::SolarConverterGroup => read_solar_group(e, idx, data, sink),
        BlockClass::SolarConverter => read_solar_converter(e, idx, data, sink),
        _ => {}
    }
}

fn at(v: &[f32], i: usize) -> f32 {
    v.get(i).copied().unwrap_or(f32::NAN)
}

fn bit(v: &[u8], i: usize) -> bool {
    v.get(i).copied().unwrap_or(0) != 0
}

fn run_time_s(hours: f32) -> u64 {
    if hours.is_nan() || hours < 0.0 {
        return 0;
    }
    (f64::from(hours) * 3600.0 + 0.5) as u64
}

/// One temperature sample; skipped when the sensor is not configured.
/// NCU controllers also get per-sensor battery thresholds.
fn temp_sensor(e: &Engine, sink: &mut dyn PowerSink, kind: TempKind, idx: usize, t: f32) {
    if t == TEMP_NOT_CONFIGURED || idx > NCU_NUM_BATT_TEMP_SENS {
        return;
    }
    sink.temp_sensor(kind, idx, t);
    if e.flavor.is_ncu() && kind == TempKind::Battery {
        sink.ensure_threshold(ThresholdScope::TempSensor(idx), "BattTempHigh");
        sink.ensure_threshold(ThresholdScope::TempSensor(idx), "BattTempLow");
    }
}

fn read_system(e: &mut Engine, data: &BlockData, sink: &mut dyn PowerSink) {
    let ncu = e.flavor.is_ncu();
    if let Some(ai) = &data.ai {
        e.plant.enabled = true;
        e.plant.voltage = at(ai, 0);
        e.plant.current = at(ai, 1);
        e.plant.power = at(ai, 2) * 1000.0; /* kW on the wire */
        let ambient = if ncu { at(ai, 13) } else { at(ai, 6) };
        temp_sensor(e, sink, TempKind::Ambient, 0, ambient);
        if ncu {
            let mut tmax = f32::NAN;
            for i in 0..NCU_NUM_BATT_TEMP_SENS {
                let t = at(ai, 10 + i);
                e.plant.batt_temps[i] = t;
                temp_sensor(e, sink, TempKind::Battery, i, t);
                if !t.is_nan() && (tmax.is_nan() || t > tmax) {
                    tmax = t;
                }
            }
            e.plant.bat_temperature = tmax;
        }
        sink.system_data(&SystemData {
            voltage: e.plant.voltage,
            current: e.plant.current,
            power: e.plant.power,
        });
    }
    if e.plant.enabled {
        if let Some(ao) = &data.ao {
            let dc = &mut e.plant.device_config;
            dc.set(ConfigFloat::FloatChargeVoltage, at(ao, 0));
            dc.set(ConfigFloat::LowVoltageMinor, at(ao, 1));
            dc.set(ConfigFloat::LowVoltageMajor, at(ao, 3));
            dc.set(ConfigFloat::DcVoltMax, at(ao, 5));
            if ncu {
                dc.set(ConfigFloat::Batt1HighTemp, at(ao, 14));
                dc.set(ConfigFloat::Batt1LowTemp, at(ao, 15));
                dc.set(ConfigFloat::Batt2HighTemp, at(ao, 16));
                dc.set(ConfigFloat::Batt2LowTemp, at(ao, 17));
                dc.set(ConfigFloat::Batt3HighTemp, at(ao, 18));
                dc.set(ConfigFloat::Batt3LowTemp, at(ao, 19));
                dc.set(ConfigFloat::HighEnvTemp, at(ao, 20));
                dc.set(ConfigFloat::LowEnvTemp, at(ao, 21));
            } else {
                dc.set(ConfigFloat::HighEnvTemp, at(ao, 9));
                dc.set(ConfigFloat::LowEnvTemp, at(ao, 10));
            }
        }
    }
    sink.ensure_threshold(ThresholdScope::System, "HighSystemVoltage");
    sink.ensure_threshold(ThresholdScope::Battery, "TempDisconnectHigh");
    sink.ensure_threshold(ThresholdScope::Battery, "TempReconnectHigh");
}

/// Rectifiers with an active failure input.
fn faulty_rectifiers(e: &Engine) -> usize {
    e.devices
        .iter()
        .filter(|d| {
            d.id.prefix() == b"02"
                && !d.id.is_group()
                && d.data.di.as_ref().is_some_and(|di| bit(di, 2))
        })
        .count()
}

fn read_rectifier_group(e: &mut Engine, idx: usize, data: &BlockData, sink: &mut dyn PowerSink) {
    let id = e.devices[idx].id;
    if let Some(ai) = &data.ai {
        let installed = at(ai, 5);
        if installed.is_finite() && installed >= 0.0 {
            e.plant.in_count = installed as usize;
        }
        sink.output_data(
            id.as_str(),
            &OutputData {
                voltage: at(ai, 0),
                current: at(ai, 1),
                enabled: true,
            },
        );
    }
    if let Some(ao) = &data.ao {
        e.plant.input_current_limit = at(ao, 1);
    }
    e.plant.fail_count = faulty_rectifiers(e);
}

fn read_rectifier(e: &mut Engine, idx: usize, data: &BlockData, sink: &mut dyn PowerSink) {
    let id = e.devices[idx].id;
    let (Some(ai), Some(di)) = (&data.ai, &data.di) else {
        return;
    };
    let active = !(bit(di, 4) || bit(di, 14));
    sink.rectifier_data(
        id.as_str(),
        &RectifierData {
            active,
            voltage: at(ai, 0),
            current: at(ai, 1),
            temperature: at(ai, 2),
            utilization: at(ai, 3),
            input_voltage: at(ai, 4),
            run_time_s: run_time_s(at(ai, 5)),
        },
    );
}

fn read_battery_group(e: &mut Engine, data: &BlockData, sink: &mut dyn PowerSink) {
    if !e.flavor.is_ncu() {
        if let Some(ai) = &data.ai {
            e.plant.bat_temperature = at(ai, 2);
        }
    }
    if let Some(ao) = &data.ao {
        let dc = &mut e.plant.device_config;
        dc.set(ConfigFloat::ChargeCurrentMax, at(ao, 7));
        dc.set(ConfigFloat::BoostChargeVoltage, at(ao, 8));
        dc.set(ConfigFloat::NominalCapacity, 3600.0 * at(ao, 18));
    }
    let mut boost = false;
    let mut test_running = false;
    if let Some(di) = &data.di {
        boost = bit(di, 14) || bit(di, 16) || bit(di, 18);
        test_running = bit(di, 8) || bit(di, 10) || bit(di, 12);
    }
    sink.mode_set(if test_running {
        BatteryMode::Test
    } else if boost {
        BatteryMode::Boost
    } else {
        BatteryMode::Float
    });
}

fn read_battery(e: &mut Engine, data: &BlockData, sink: &mut dyn PowerSink) {
    if let Some(ai) = &data.ai {
        e.plant.bat_voltage = at(ai, 0);
        let current = at(ai, 1);
        if !e.plant.bat_current.is_nan() && !current.is_nan() {
            let negative = current < -e.current_resolution;
            if negative != e.plant.bat_discharge_active {
                sink.plant_alarm(SystemAlarm::BatDischarge, 0, Severity::Warning, negative);
                e.plant.bat_discharge_active = negative;
            }
        }
        e.plant.bat_current = current;
    } else {
        e.plant.bat_voltage = f32::NAN;
        e.plant.bat_current = f32::NAN;
        e.plant.bat_temperature = f32::NAN;
    }
    if let Some(ao) = &data.ao {
        let capacity = at(ao, 0);
        if capacity != 0.0 && !capacity.is_nan() {
            e.plant
                .device_config
                .set(ConfigFloat::NominalCapacity, 3600.0 * capacity);
        }
    }
    if !e.flavor.is_ncu() {
        temp_sensor(e, sink, TempKind::Battery, 0, e.plant.bat_temperature);
    }
    sink.battery_data(&BatteryData {
        voltage: e.plant.bat_voltage,
        current: e.plant.bat_current,
        temperature: e.plant.bat_temperature,
    });
}

fn read_lvd_group(e: &mut Engine, data: &BlockData) {
    if let Some(ao) = &data.ao {
        let dc = &mut e.plant.device_config;
        dc.set(ConfigFloat::BatteryHighTempMajor, at(ao, 8));
        dc.set(ConfigFloat::BatteryHighTempMinor, at(ao, 9));
    }
}

fn read_lvd_unit(e: &mut Engine, idx: usize, data: &BlockData, sink: &mut dyn PowerSink) {
    let id = e.devices[idx].id;
    let contactor = id.as_bytes()[3].wrapping_sub(b'0');
    if !(1..=3).contains(&contactor) {
        return;
    }
    if let Some(ao) = &data.ao {
        let dc = &mut e.plant.device_config;
        match contactor {
            1 => {
                dc.set(ConfigFloat::LoadDisconnectTime1, at(ao, 0));
                dc.set(ConfigFloat::LoadDisconnectVolt1, at(ao, 1));
                dc.set(ConfigFloat::LoadReconnectVolt1, at(ao, 3));
            }
            2 => {
                dc.set(ConfigFloat::LoadDisconnectTime2, at(ao, 0));
                dc.set(ConfigFloat::LoadDisconnectVolt2, at(ao, 1));
                dc.set(ConfigFloat::LoadReconnectVolt2, at(ao, 3));
            }
            _ => {
                // Battery LVD; the disconnect time is currently unused there.
                dc.set(ConfigFloat::BatteryDisconnectTime, at(ao, 0));
                dc.set(ConfigFloat::BatteryDisconnectVoltage, at(ao, 1));
                dc.set(ConfigFloat::BatteryReconnectVoltage, at(ao, 3));
            }
        }
    }
    if contactor > 2 {
        return;
    }
    let mut state = LoadDisconnectState {
        contactor,
        state: None,
        enabled: None,
        method: None,
    };
    if let Some(di) = &data.di {
        state.state = Some(if bit(di, 0) {
            ContactorState::Off
        } else {
            ContactorState::On
        });
    }
    if let Some(dout) = &data.dout {
        state.enabled = Some(bit(dout, 0));
        let method = if bit(dout, 2) {
            DisconnectMethod::Time
        } else {
            DisconnectMethod::Voltage
        };
        state.method = Some(method);
        e.plant.ld_method[(contactor - 1) as usize] = Some(method);
    }
    sink.load_disconnect_state(&state);
}

/// Discovered solar converters (group members excluded).
fn solar_count(e: &Engine) -> usize {
    e.devices
        .iter()
        .filter(|d| d.id.as_str().starts_with(SOLAR_PREFIX) && !d.id.is_group())
        .count()
}

fn read_solar_group(e: &mut Engine, idx: usize, data: &BlockData, sink: &mut dyn PowerSink) {
    let id = e.devices[idx].id;
    let mut enabled = true;
    if let Some(di) = &data.di {
        enabled = !bit(di, 12);
    }
    if let Some(ai) = &data.ai {
        let installed = at(ai, 5);
        if installed.is_finite() && solar_count(e) != installed as usize {
            // Some converters never showed up in discovery.
            let known: Vec<String> = sink.solar_converter_ids();
            for conv in known {
                if e.find_device_str(&conv).is_none() {
                    sink.solar_lost(&conv, true);
                }
            }
        }
        sink.output_data(
            id.as_str(),
            &OutputData {
                voltage: at(ai, 0),
                current: at(ai, 1),
                enabled,
            },
        );
    }
}

fn read_solar_converter(e: &mut Engine, idx: usize, data: &BlockData, sink: &mut dyn PowerSink) {
    let id = e.devices[idx].id;
    let mut out = SolarConverterData {
        active: false,
        failed: false,
        comm_fail: false,
        voltage: f32::NAN,
        current: f32::NAN,
        input_voltage: f32::NAN,
        input_current: f32::NAN,
        temperature: f32::NAN,
        utilization: f32::NAN,
        run_time_s: 0,
    };
    if let Some(di) = &data.di {
        out.active = !bit(di, 0);
        out.failed = bit(di, 2);
        out.comm_fail = bit(di, 14);
    }
    if let Some(ai) = &data.ai {
        out.voltage = at(ai, 0);
        out.current = at(ai, 1);
        out.run_time_s = run_time_s(at(ai, 5));
        out.input_voltage = at(ai, 7);
        out.input_current = at(ai, 8);
        out.temperature = at(ai, 9);
        out.utilization = at(ai, 10);
        if out.current > 0.1 {
            // Producing current: definitely not lost.
            sink.solar_lost(id.as_str(), false);
        }
    }
    sink.solar_converter_data(id.as_str(), &out);
}

fn dc_meter_name(i: usize) -> &'static str {
    match i {
        0 => "Load1",
        1 => "Load2",
        _ => "LoadB",
    }
}

fn read_dc_distribution_group(e: &mut Engine, data: &BlockData, sink: &mut dyn PowerSink) {
    if !e.flavor.is_ncu() {
        return;
    }
    if let Some(ai) = &data.ai {
        for i in 0..NCU_NUM_DC_METERS {
            sink.dc_meter_voltage(dc_meter_name(i), at(ai, 0));
        }
    }
}

fn read_eib_distribution_unit(e: &mut Engine, data: &BlockData, sink: &mut dyn PowerSink) {
    if !e.flavor.is_ncu() {
        return;
    }
    for i in 0..NCU_NUM_DC_METERS {
        let amps = data.ai.as_ref().map_or(f32::NAN, |ai| at(ai, i));
        sink.dc_meter_current(dc_meter_name(i), amps);
    }
}
