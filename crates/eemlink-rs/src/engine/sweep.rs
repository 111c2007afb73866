//! The alarm sweep: `RC00` after every poll cycle, chunked follow-ups while
//! the report window moves by more than 9 blocks, decoding each record
//! against the static alarm maps with the NCU remap steps applied as
//! explicit composition.

use super::{Engine, Pending, poll, writers};
use crate::alarms::{AlarmEntry, AlarmKind, InputAlarm, NCU_DC_FUSE_UNIT_AE, SystemAlarm, alarm_entry};
use crate::frame::codec::next_field;
use crate::hal::PowerSink;
use crate::registry::BlockClass;
use crate::types::{BlockId, RECTIFIER_GROUP_ID, Severity};
use alloc::format;
use log::{debug, trace};

pub(super) fn read_alarms(e: &mut Engine, block: u8, now_ms: u64) {
    let command = format!("RC{block:02X}");
    e.enqueue(command.as_bytes(), Pending::ReadAlarms, now_ms);
}

/// Hex value of the leading digits of a field, `strtoul` style: parsing
/// stops at the first non-digit, no digits at all yield zero.
fn hex_prefix(field: &[u8]) -> u32 {
    let mut v: u32 = 0;
    for &b in field {
        let d = match b {
            b'0'..=b'9' => u32::from(b - b'0'),
            b'A'..=b'F' => u32::from(b - b'A' + 10),
            b'a'..=b'f' => u32::from(b - b'a' + 10),
            _ => break,
        };
        v = v.saturating_mul(16).saturating_add(d);
    }
    v
}

/// `RC` completion. Payload: `<start_index>#<rec>#<rec>…*` with records
/// `<index>!<dev_id>!I<hex_index>!<category>`.
pub(super) fn on_alarms(e: &mut Engine, buf: Option<&[u8]>, now_ms: u64, sink: &mut dyn PowerSink) {
    let Some(buf) = buf else {
        finish_cycle(e, now_ms, sink);
        return;
    };
    let Some(hash) = buf.iter().position(|&b| b == b'#') else {
        sink.alarm_clear_inactive();
        finish_cycle(e, now_ms, sink);
        return;
    };
    let start = hex_prefix(&buf[..hash]);
    if start > 0xFF {
        sink.alarm_clear_inactive();
        finish_cycle(e, now_ms, sink);
        return;
    }
    let start = start as u8;
    let mut block = start;
    let mut rectgr_mains = false;

    let mut rest = &buf[hash + 1..];
    loop {
        let n = rest
            .iter()
            .position(|&b| b == b'#' || b == b'*')
            .unwrap_or(rest.len());
        if n == 0 {
            break;
        }
        handle_record(e, sink, &rest[..n], &mut rectgr_mains);
        block = block.wrapping_add(1);
        if n >= rest.len() {
            break;
        }
        rest = &rest[n + 1..];
    }

    // Group alarms are aggregated from the individual rectifiers.
    if e.find_device_str(RECTIFIER_GROUP_ID).is_some() {
        rectifiers_alarms(e, sink, rectgr_mains);
    }

    if block.wrapping_sub(start) > 9 {
        read_alarms(e, block, now_ms);
    } else {
        sink.alarm_clear_inactive();
        finish_cycle(e, now_ms, sink);
    }
}

fn handle_record(e: &mut Engine, sink: &mut dyn PowerSink, record: &[u8], rectgr_mains: &mut bool) {
    let (_index, r1) = next_field(record);
    let (dev_field, r2) = next_field(r1);
    let (signal, r3) = next_field(r2);
    let (category, _) = next_field(r3);
    if signal.is_empty() || category.is_empty() {
        return;
    }
    let Some(id) = BlockId::parse(dev_field) else {
        return;
    };
    let Some(dev_idx) = e.find_device(id) else {
        return;
    };
    let severity = Severity::from_category(hex_prefix(category).min(0xFF) as u8);
    if signal[0] != b'I' {
        return;
    }
    let alarm_index = (hex_prefix(&signal[1..]) / 2) as usize;
    trace!("[EEM] Alarm report {id} index {alarm_index} ({severity:?})");
    route_alarm(e, sink, dev_idx, alarm_index, severity, rectgr_mains);
}

/// Routes one decoded alarm. The remapping pathway of the original decoder
/// relied on switch fall-through; here each class applies its remap step
/// first and then defers to the common plant routing.
fn route_alarm(
    e: &mut Engine,
    sink: &mut dyn PowerSink,
    dev_idx: usize,
    index: usize,
    severity: Severity,
    rectgr_mains: &mut bool,
) {
    let (id, class) = {
        let d = &e.devices[dev_idx];
        (d.id, d.class)
    };
    let Some(class) = class else {
        return;
    };
    let Some(entry) = alarm_entry(class, index) else {
        return;
    };
    let ncu = e.flavor.is_ncu();

    match class {
        BlockClass::Rectifier | BlockClass::SolarConverter => {
            if let AlarmKind::Input(kind) = entry.kind {
                sink.input_alarm(id.as_str(), kind, entry.bit, severity, true);
            }
        }
        BlockClass::RectifierGroup | BlockClass::SolarConverterGroup | BlockClass::LvdUnit => {
            if let AlarmKind::Output(kind) = entry.kind {
                sink.output_alarm(id.as_str(), kind, entry.bit, severity, true);
            }
        }
        BlockClass::SmIoIb2 => {
            // Incoming alarms start from index zero.
            sink.external_alarm(index as u16 + 1, severity, true);
        }
        BlockClass::BatteryGroup => {
            if ncu
                && entry.kind == AlarmKind::Plant(SystemAlarm::BatHighTemp)
                && entry.bit == 0
            {
                return;
            }
            plant_route(sink, entry, severity);
        }
        BlockClass::System => {
            if !ncu {
                plant_route(sink, entry, severity);
                return;
            }
            if entry.kind == AlarmKind::Plant(SystemAlarm::Undervoltage) && entry.bit == 1 {
                e.plant.battery_disconnect_latch = true;
                sink.plant_alarm_text(
                    SystemAlarm::BatteryDisconnect,
                    entry.bit,
                    Severity::Indeterminate,
                    "Low voltage initiated",
                    true,
                );
                return;
            }
            if matches!(
                entry.kind,
                AlarmKind::Plant(SystemAlarm::Door) | AlarmKind::Plant(SystemAlarm::External)
            ) {
                return;
            }
            // Remaining NCU system alarms continue through the repurposed
            // distribution-input map.
            ncu_input_remap(e, sink, index, entry);
        }
        BlockClass::DcDistributionFuseUnit => {
            if ncu {
                ncu_input_remap(e, sink, index, entry);
            } else {
                plant_route(sink, entry, severity);
            }
        }
        BlockClass::RectifierAc | BlockClass::ObAcUnit => {
            if ncu {
                if let AlarmKind::Input(InputAlarm::Mains) = entry.kind {
                    *rectgr_mains = true;
                    return;
                }
            }
            match entry.kind {
                // The AC block reports mains trouble per phase pair; for the
                // plant view they collapse onto the mains alarm.
                AlarmKind::Input(InputAlarm::Mains) => {
                    sink.plant_alarm(SystemAlarm::Mains, entry.bit, severity, true);
                }
                _ => plant_route(sink, entry, severity),
            }
        }
        _ => plant_route(sink, entry, severity),
    }
}

fn plant_route(sink: &mut dyn PowerSink, entry: &AlarmEntry, severity: Severity) {
    if let AlarmKind::Plant(kind) = entry.kind {
        sink.plant_alarm(kind, entry.bit, severity, true);
    }
}

/// NCU: indices of the DC distribution fuse unit map onto general-purpose
/// inputs; indeterminate severity throughout.
fn ncu_input_remap(e: &mut Engine, sink: &mut dyn PowerSink, index: usize, entry: &AlarmEntry) {
    let mapped = NCU_DC_FUSE_UNIT_AE.get(index).unwrap_or(entry);
    match mapped.kind {
        AlarmKind::Plant(SystemAlarm::BatteryDisconnect) => {
            e.plant.battery_disconnect_latch = true;
            sink.plant_alarm_text(
                SystemAlarm::BatteryDisconnect,
                mapped.bit,
                Severity::Indeterminate,
                "Contactor open",
                true,
            );
        }
        AlarmKind::Plant(kind) => {
            sink.plant_alarm(kind, mapped.bit, Severity::Indeterminate, true);
        }
        _ => {}
    }
}

/// Derives the rectifier-group alarms from the per-rectifier inputs.
fn rectifiers_alarms(e: &mut Engine, sink: &mut dyn PowerSink, mains_seen: bool) {
    let known = sink.rectifier_count();
    let mut lost = known as i64;
    let mut fail = 0usize;
    let mut mains = mains_seen;
    let mut overvoltage = false;
    let mut high_temp = false;
    let mut limit = false;
    let mut fan = false;

    for dev in &e.devices {
        if dev.id.prefix() != b"02" || dev.id.is_group() {
            continue;
        }
        let Some(di) = &dev.data.di else {
            continue;
        };
        let b = |i: usize| di.get(i).copied().unwrap_or(0) != 0;
        if b(2) || b(16) {
            fail += 1;
        }
        if b(4) || b(12) {
            mains = true;
        }
        if b(6) {
            overvoltage = true;
        }
        if b(8) {
            high_temp = true;
        }
        let acin_nan = dev
            .data
            .ai
            .as_ref()
            .and_then(|ai| ai.get(4))
            .is_some_and(|v| v.is_nan());
        // Alive unless it stopped talking, or its mains input reads NaN
        // while the slot claims a rectifier.
        if !(b(14) || (acin_nan && !b(0))) {
            lost -= 1;
        }
        if b(18) {
            limit = true;
        }
        if b(20) {
            fan = true;
        }
    }

    debug!("[EEM] Rectifier aggregation: {fail} failed, {lost} lost of {known}");
    sink.rectifiers_fail(e.plant.in_count, fail);
    sink.rectifiers_lost(known, lost.max(0) as usize);
    use crate::alarms::OutputAlarm as Out;
    sink.output_alarm(RECTIFIER_GROUP_ID, Out::Mains, 1, Severity::Warning, mains);
    sink.output_alarm(RECTIFIER_GROUP_ID, Out::Overvoltage, 1, Severity::Major, overvoltage);
    sink.output_alarm(RECTIFIER_GROUP_ID, Out::HighTemp, 0, Severity::Minor, high_temp);
    sink.output_alarm(RECTIFIER_GROUP_ID, Out::Limit, 0, Severity::Warning, limit);
    sink.output_alarm(RECTIFIER_GROUP_ID, Out::Fan, 0, Severity::Minor, fan);
}

/// Tail of the alarm sweep: account run time, keep the battery LVD on the
/// voltage method, and restart the poll loop.
fn finish_cycle(e: &mut Engine, now_ms: u64, sink: &mut dyn PowerSink) {
    if let Some(last) = e.last_cycle_ms {
        e.plant.run_time_ms = e
            .plant
            .run_time_ms
            .saturating_add(now_ms.saturating_sub(last));
    }
    e.last_cycle_ms = Some(now_ms);
    writers::sync_blvd_method(e, now_ms);
    poll::read_first(e, now_ms, sink);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EemConfig, EemState, Engine};
    use crate::types::ControllerFlavor;
    use alloc::string::{String, ToString};
    use alloc::vec::Vec;

    #[derive(Default)]
    struct Recorder {
        input: Vec<(String, InputAlarm, u16, Severity)>,
        plant: Vec<(SystemAlarm, u16, Severity, bool)>,
        plant_text: Vec<(SystemAlarm, String)>,
        cleared: u32,
        rect_count: usize,
    }

    impl PowerSink for Recorder {
        fn input_alarm(
            &mut self,
            id: &str,
            kind: InputAlarm,
            bit: u16,
            severity: Severity,
            _active: bool,
        ) {
            self.input.push((id.to_string(), kind, bit, severity));
        }
        fn plant_alarm(&mut self, kind: SystemAlarm, bit: u16, severity: Severity, active: bool) {
            self.plant.push((kind, bit, severity, active));
        }
        fn plant_alarm_text(
            &mut self,
            kind: SystemAlarm,
            _bit: u16,
            _severity: Severity,
            text: &str,
            _active: bool,
        ) {
            self.plant_text.push((kind, text.to_string()));
        }
        fn alarm_clear_inactive(&mut self) {
            self.cleared += 1;
        }
        fn rectifier_count(&self) -> usize {
            self.rect_count
        }
    }

    fn engine(flavor: ControllerFlavor, ids: &[&str]) -> Engine {
        let mut e = Engine::new(
            EemConfig {
                flavor,
                ..EemConfig::default()
            },
            0,
        );
        e.state = EemState::Connected;
        for id in ids {
            e.device_new(BlockId::from_str(id).unwrap(), false);
        }
        e
    }

    #[test]
    fn rectifier_fail_alarm_from_report() {
        let mut sink = Recorder::default();
        let mut e = engine(ControllerFlavor::Acu, &["0201"]);
        on_alarms(&mut e, Some(b"00#0201!I02!1*"), 0, &mut sink);
        assert_eq!(
            sink.input,
            alloc::vec![("0201".to_string(), InputAlarm::Fail, 0, Severity::Major)]
        );
        assert_eq!(sink.cleared, 1);
    }

    #[test]
    fn window_wider_than_nine_chunks_the_sweep() {
        let mut sink = Recorder::default();
        let mut e = engine(ControllerFlavor::Acu, &["0201"]);
        // Eleven records advance the window past the chunk limit.
        let mut payload = Vec::from(&b"00"[..]);
        for _ in 0..11 {
            payload.extend_from_slice(b"#00!0201!I02!1");
        }
        payload.push(b'*');
        on_alarms(&mut e, Some(&payload), 0, &mut sink);
        assert_eq!(sink.cleared, 0);
        assert_eq!(e.queue.back().unwrap().payload, b"RC0B");
    }

    #[test]
    fn unknown_device_records_are_skipped() {
        let mut sink = Recorder::default();
        let mut e = engine(ControllerFlavor::Acu, &["0201"]);
        on_alarms(&mut e, Some(b"00#0301!I02!1*"), 0, &mut sink);
        assert!(sink.input.is_empty());
        assert!(sink.plant.is_empty());
    }

    #[test]
    fn ignore_entries_raise_nothing() {
        let mut sink = Recorder::default();
        let mut e = engine(ControllerFlavor::Acu, &["0201"]);
        // Index 0 of the rectifier table is the on/off status.
        on_alarms(&mut e, Some(b"00#0201!I00!0*"), 0, &mut sink);
        assert!(sink.input.is_empty());
    }

    #[test]
    fn ncu_system_undervoltage_two_becomes_battery_disconnect() {
        let mut sink = Recorder::default();
        let mut e = engine(ControllerFlavor::Ncu, &["0000"]);
        // Hex index 06 halves to alarm index 3: undervoltage bit 1.
        on_alarms(&mut e, Some(b"00#0000!I06!1*"), 0, &mut sink);
        assert_eq!(sink.plant_text.len(), 1);
        assert_eq!(sink.plant_text[0].0, SystemAlarm::BatteryDisconnect);
        assert_eq!(sink.plant_text[0].1, "Low voltage initiated");
        assert!(e.plant.battery_disconnect_latch);
    }

    #[test]
    fn acu_system_undervoltage_two_stays_undervoltage() {
        let mut sink = Recorder::default();
        let mut e = engine(ControllerFlavor::Acu, &["0000"]);
        on_alarms(&mut e, Some(b"00#0000!I06!1*"), 0, &mut sink);
        assert_eq!(
            sink.plant,
            alloc::vec![(SystemAlarm::Undervoltage, 1, Severity::Major, true)]
        );
    }

    #[test]
    fn ncu_fuse_unit_contactor_open() {
        let mut sink = Recorder::default();
        let mut e = engine(ControllerFlavor::Ncu, &["0402"]);
        // Hex index 04 -> alarm index 2 -> battery disconnect remap.
        on_alarms(&mut e, Some(b"00#0402!I04!2*"), 0, &mut sink);
        assert_eq!(sink.plant_text.len(), 1);
        assert_eq!(sink.plant_text[0].1, "Contactor open");
    }

    #[test]
    fn acu_fuse_unit_raises_plain_fuse_alarm() {
        let mut sink = Recorder::default();
        let mut e = engine(ControllerFlavor::Acu, &["0402"]);
        on_alarms(&mut e, Some(b"00#0402!I04!2*"), 0, &mut sink);
        assert_eq!(
            sink.plant,
            alloc::vec![(SystemAlarm::Fuse, 2, Severity::Minor, true)]
        );
    }

    #[test]
    fn severity_categories() {
        let mut sink = Recorder::default();
        let mut e = engine(ControllerFlavor::Acu, &["0201"]);
        on_alarms(&mut e, Some(b"00#0201!I02!0*"), 0, &mut sink);
        on_alarms(&mut e, Some(b"00#0201!I02!9*"), 0, &mut sink);
        assert_eq!(sink.input[0].3, Severity::Critical);
        assert_eq!(sink.input[1].3, Severity::Warning);
    }
}
