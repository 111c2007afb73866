//! Discovery: `RN` (system name), `RI` (block inventory), `RP` (block
//! names), and the completion step that populates the managed-object tree
//! and hands over to the poll loop.

use super::{Engine, Pending, poll, snmp};
use crate::frame::codec::{at_end, next_field};
use crate::hal::PowerSink;
use crate::model::load_disconnect_name;
use crate::registry::BlockClass;
use crate::types::{BlockId, CSU_ID, EEM_SCAN_PERIOD_MS, IDLEN, RECTIFIER_GROUP_ID};
use alloc::format;
use log::{debug, info};

/// `RN` completion: the first field is the system product name.
pub(super) fn on_name(e: &mut Engine, buf: Option<&[u8]>) {
    let Some(buf) = buf else {
        return;
    };
    let (field, _) = next_field(buf);
    if !field.is_empty() {
        e.name = Engine::clip_name(field);
        info!("[EEM] System name {:?}", e.name);
    }
}

/// `RP<id>` completion: `<id>!<name>*`.
pub(super) fn on_param(e: &mut Engine, id: BlockId, buf: Option<&[u8]>) {
    let Some(buf) = buf else {
        return;
    };
    if buf.starts_with(b"ERR") {
        return;
    }
    let (first, rest) = next_field(buf);
    if first.len() < IDLEN - 1 && BlockId::parse(first) != Some(id) {
        return;
    }
    let (name, _) = next_field(rest);
    if !name.is_empty() {
        if let Some(idx) = e.find_device(id) {
            e.devices[idx].name = Engine::clip_name(name);
            debug!("[EEM] Block {} is {:?}", id, e.devices[idx].name);
        }
    }
}

/// `RI` completion: a `!`-separated list of 5-char block ids. Builds the
/// device list (rectifier group at the head), fetches unknown names, then
/// schedules the discovery checkpoint (or the SNMP inventory on NCU).
pub(super) fn on_identify(
    e: &mut Engine,
    buf: Option<&[u8]>,
    now_ms: u64,
    _sink: &mut dyn PowerSink,
) {
    if let Some(buf) = buf {
        let mut rest = buf;
        while !at_end(rest) {
            let (field, r) = next_field(rest);
            rest = r;
            if field.len() < IDLEN - 1 {
                continue;
            }
            let Some(id) = BlockId::parse(field) else {
                continue;
            };
            if id.as_str() == CSU_ID {
                // The supervision unit is appended after the block list.
                continue;
            }
            let add_first = crate::registry::classify(id) == Some(BlockClass::RectifierGroup);
            let idx = e.device_new(id, add_first);
            if e.devices[idx].name.is_empty() {
                let command = format!("RP{id}");
                e.enqueue(command.as_bytes(), Pending::ReadParam(id), now_ms);
            }
        }
        // Synthetic supervision-unit entry carrying the system name.
        if let Some(csu) = BlockId::from_str(CSU_ID) {
            let idx = e.device_new(csu, false);
            e.devices[idx].name = e.name.clone();
        }
        if e.flavor.is_ncu() {
            snmp::start(e, now_ms);
        } else {
            e.enqueue(b"", Pending::Checkpoint, now_ms);
        }
    }
    e.scan_at = Some(now_ms + EEM_SCAN_PERIOD_MS);
}

/// Runs once all `RP` requests of a discovery round have completed (and,
/// on NCU, the SNMP inventory finished). Populates the sink and starts the
/// poll loop.
pub(super) fn discovery_done(e: &mut Engine, now_ms: u64, sink: &mut dyn PowerSink) {
    // The rectifier group must exist before any rectifier is announced.
    for i in 0..e.devices.len() {
        match e.devices[i].class {
            Some(BlockClass::RectifierGroup) => break,
            Some(BlockClass::Rectifier) => {
                if let Some(gid) = BlockId::from_str(RECTIFIER_GROUP_ID) {
                    e.device_new(gid, true);
                }
                break;
            }
            _ => {}
        }
    }

    for i in 0..e.devices.len() {
        let (id, name, class) = {
            let d = &e.devices[i];
            (d.id, d.name.clone(), d.class)
        };
        let id_str = id.as_str();
        if id_str == CSU_ID {
            let mut info = e.controller_info();
            if info.product_name.is_empty() {
                info.product_name = name.clone();
            }
            sink.set_controller_info(&info);
            continue;
        }
        match class {
            Some(BlockClass::LvdUnit) => {
                let contactor = id.as_bytes()[3].wrapping_sub(b'0');
                if (1..=2).contains(&contactor) {
                    let ld_name = load_disconnect_name(e.flavor, contactor);
                    let problem = disconnect_problem(e, contactor);
                    sink.add_load_disconnect(contactor, &ld_name, problem);
                }
                sink.attach_battery_profile("SystemBatteryProfile");
            }
            Some(c) => sink.add_device(c, id_str, &name),
            None => {}
        }
    }

    sink.align_alarm_labels();
    sink.prune_threshold_entries();
    sink.persist_config();
    poll::read_first(e, now_ms, sink);
}

fn disconnect_problem(e: &Engine, contactor: u8) -> &'static str {
    match (e.flavor.is_ncu(), contactor) {
        (true, 1) => "Load disconnected 1",
        (true, _) => "Load disconnected 2",
        (false, 1) => "Main load disconnected",
        (false, _) => "Priority load disconnected",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EemConfig, EemState, EngineAction};
    use crate::types::RECONNECT_SHORT_MS;
    use alloc::string::ToString;
    use alloc::vec::Vec;

    struct Recorder {
        devices: Vec<(BlockClass, String, String)>,
    }

    impl PowerSink for Recorder {
        fn add_device(&mut self, class: BlockClass, id: &str, name: &str) {
            self.devices
                .push((class, id.to_string(), name.to_string()));
        }
    }

    fn engine() -> Engine {
        let mut e = Engine::new(EemConfig::default(), 0);
        e.state = EemState::Connected;
        e
    }

    #[test]
    fn identify_orders_group_before_rectifiers() {
        let mut sink = Recorder { devices: Vec::new() };
        let mut e = engine();
        on_identify(
            &mut e,
            Some(b"00000!02011!02000!02021*"),
            0,
            &mut sink,
        );
        let ids: Vec<&str> = e.devices.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["0200", "0201", "0202", "0000"]);
    }

    #[test]
    fn identify_appends_supervision_unit_last() {
        let mut sink = Recorder { devices: Vec::new() };
        let mut e = engine();
        e.name = "ACU+".to_string();
        on_identify(&mut e, Some(b"02000!02011*"), 0, &mut sink);
        let last = e.devices.last().unwrap();
        assert_eq!(last.id.as_str(), "0000");
        assert_eq!(last.name, "ACU+");
        assert!(e.scan_at.is_some());
    }

    #[test]
    fn identify_requests_names_for_unknown_blocks() {
        let mut sink = Recorder { devices: Vec::new() };
        let mut e = engine();
        on_identify(&mut e, Some(b"02000*"), 0, &mut sink);
        assert!(
            e.queue
                .iter()
                .any(|r| r.payload == b"RP0200" && matches!(r.pending, Pending::ReadParam(_)))
        );
    }

    #[test]
    fn missing_group_is_inserted_at_discovery_end() {
        let mut sink = Recorder { devices: Vec::new() };
        let mut e = engine();
        // Only individual rectifiers were discovered.
        e.device_new(BlockId::from_str("0201").unwrap(), false);
        discovery_done(&mut e, 0, &mut sink);
        assert_eq!(e.devices[0].id.as_str(), "0200");
    }

    #[test]
    fn param_response_stores_block_name() {
        let mut e = engine();
        let id = BlockId::from_str("0201").unwrap();
        e.device_new(id, false);
        on_param(&mut e, id, Some(b"02011!Rectifier1*"));
        assert_eq!(e.devices[0].name, "Rectifier1");
    }

    #[test]
    fn connect_delay_then_rescan_timer() {
        let mut sink = Recorder { devices: Vec::new() };
        let mut e = Engine::new(EemConfig::default(), 0);
        e.tick(RECONNECT_SHORT_MS, &mut sink);
        assert_eq!(e.poll_action(), Some(EngineAction::Connect));
        e.connection_up(RECONNECT_SHORT_MS, &mut sink);
        on_identify(&mut e, Some(b"00000*"), RECONNECT_SHORT_MS, &mut sink);
        assert_eq!(
            e.scan_at,
            Some(RECONNECT_SHORT_MS + EEM_SCAN_PERIOD_MS)
        );
    }
}
