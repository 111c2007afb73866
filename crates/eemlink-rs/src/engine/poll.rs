//! The cyclic block poll: one `RB<id>` per device in list order, decoding
//! the four value sections and dispatching to the per-class readers. The
//! cycle ends with the alarm sweep.

use super::{BlockData, Engine, Pending, readers, sweep};
use crate::frame::codec::{at_end, next_field, parse_bits, parse_floats};
use crate::hal::PowerSink;
use crate::registry::{self, BlockClass, BlockSpec};
use crate::types::BlockId;
use alloc::format;
use log::{debug, trace, warn};

/// Starts a poll cycle at the head of the device list. A no-op while a
/// cycle is already running.
pub(super) fn read_first(e: &mut Engine, now_ms: u64, sink: &mut dyn PowerSink) {
    let _ = sink;
    if e.devices.is_empty() {
        return;
    }
    if e.rb_loop {
        debug!("[EEM] Block poll loop already active");
        return;
    }
    read_device(e, 0, now_ms);
}

fn read_device(e: &mut Engine, idx: usize, now_ms: u64) {
    e.rb_loop = true;
    let id = e.devices[idx].id;
    let command = format!("RB{id}");
    e.enqueue(command.as_bytes(), Pending::ReadBlock(id), now_ms);
}

/// `RB` completion for one device.
pub(super) fn on_read_block(
    e: &mut Engine,
    id: BlockId,
    buf: Option<&[u8]>,
    now_ms: u64,
    sink: &mut dyn PowerSink,
) {
    let Some(idx) = e.find_device(id) else {
        return;
    };
    match buf {
        None => {
            // Timeout: the cached vectors are no longer trustworthy.
            e.devices[idx].data = BlockData::default();
        }
        Some(b) if b.starts_with(b"ERR") => {
            e.devices[idx].data = BlockData::default();
        }
        Some(b) => {
            let (devid, rest) = next_field(b);
            if BlockId::parse(devid) != Some(id) {
                warn!("[EEM] Reply from wrong device (asked {id})");
            } else if let Some(class) = e.devices[idx].class {
                let spec = registry::spec(class);
                // Status register field, unused.
                let (_status, rest) = next_field(rest);
                e.devices[idx].data = parse_sections(rest, spec);
                if e.debug {
                    dump_block(&e.devices[idx].data, spec, id);
                }
                let data = e.devices[idx].data.clone();
                readers::dispatch(e, class, idx, &data, sink);
            }
        }
    }
    read_next(e, idx, now_ms, sink);
}

/// Decodes the `<AI>!<AO>!<DI>!<DO>` tail of a block response. A vector is
/// present iff its section was carried.
fn parse_sections(payload: &[u8], spec: &BlockSpec) -> BlockData {
    let mut data = BlockData::default();
    let mut rest = payload;
    if !at_end(rest) {
        let (v, r) = parse_floats(rest, spec.ai_count);
        data.ai = Some(v);
        rest = r;
    }
    if !at_end(rest) {
        let (v, r) = parse_floats(rest, spec.ao_count);
        data.ao = Some(v);
        rest = r;
    }
    if !at_end(rest) {
        let (v, r) = parse_bits(rest, spec.di_count);
        data.di = Some(v);
        rest = r;
    }
    if !at_end(rest) {
        let (v, _) = parse_bits(rest, spec.do_count);
        data.dout = Some(v);
    }
    data
}

fn dump_block(data: &BlockData, spec: &BlockSpec, id: BlockId) {
    if let Some(ai) = &data.ai {
        for (i, v) in ai.iter().enumerate() {
            trace!("[EEM] {id} AI[{i}] {}: {v}", registry::param_name(spec.ai_params, i));
        }
    }
    if let Some(ao) = &data.ao {
        for (i, v) in ao.iter().enumerate() {
            trace!("[EEM] {id} AO[{i}] {}: {v}", registry::param_name(spec.ao_params, i));
        }
    }
    if let Some(di) = &data.di {
        for (i, v) in di.iter().enumerate() {
            trace!(
                "[EEM] {id} DI[{i}] {}: {}",
                registry::param_name(spec.di_params, i),
                *v != 0
            );
        }
    }
    if let Some(dout) = &data.dout {
        for (i, v) in dout.iter().enumerate() {
            trace!(
                "[EEM] {id} DO[{i}] {}: {}",
                registry::param_name(spec.do_params, i),
                *v != 0
            );
        }
    }
}

/// Advances to the next pollable device, or ends the cycle.
fn read_next(e: &mut Engine, idx: usize, now_ms: u64, sink: &mut dyn PowerSink) {
    let mut i = idx + 1;
    while i < e.devices.len() {
        let dev = &e.devices[i];
        let skip_eib =
            dev.class == Some(BlockClass::EibDistributionUnit) && !e.flavor.is_ncu();
        if !skip_eib && dev.class.is_some_and(readers::has_reader) {
            read_device(e, i, now_ms);
            return;
        }
        i += 1;
    }
    cycle_end(e, now_ms, sink);
}

/// All readers have run: refresh the derived alarms and launch the sweep.
fn cycle_end(e: &mut Engine, now_ms: u64, sink: &mut dyn PowerSink) {
    sink.alarm_cycle_start();
    if !e.plant.bat_current.is_nan() && e.plant.bat_current < 0.0 {
        e.plant.bat_discharge_active = true;
        sink.plant_alarm(
            crate::alarms::SystemAlarm::BatDischarge,
            0,
            crate::types::Severity::Warning,
            true,
        );
    }
    if e.plant.battery_disconnect_latch {
        sink.plant_alarm(
            crate::alarms::SystemAlarm::BatteryDisconnect,
            0,
            crate::types::Severity::Indeterminate,
            true,
        );
    }
    e.rb_loop = false;
    sweep::read_alarms(e, 0, now_ms);
}
