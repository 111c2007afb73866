//! NCU inventory enrichment over SNMP. After discovery, the engine walks
//! the rectifier key table, then fetches the identity strings of the
//! controller and every rectifier in one multi-get. Any error skips
//! straight to the end of discovery; inventory is best effort.
//!
//! The state machine is driven by the engine's 1 s SNMP timer; each tick
//! emits at most one request, each reply advances the phase.

use super::{Engine, discovery};
use crate::hal::PowerSink;
use crate::model::RectifierInventory;
use crate::types::SNMP_POLL_INTERVAL_MS;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use log::{debug, warn};

pub mod oids {
    pub const IDENT_MODEL: &[u32] = &[1, 3, 6, 1, 4, 1, 6302, 2, 1, 1, 2, 0];
    pub const IDENT_CTRL_FW_VERSION: &[u32] = &[1, 3, 6, 1, 4, 1, 6302, 2, 1, 1, 3, 0];
    pub const IDENT_NAME: &[u32] = &[1, 3, 6, 1, 4, 1, 6302, 2, 1, 1, 4, 0];
    pub const IDENT_SERIAL_NUM: &[u32] = &[1, 3, 6, 1, 4, 1, 6302, 2, 1, 1, 6, 0];
    pub const RECT_NUM_INSTALLED: &[u32] = &[1, 3, 6, 1, 4, 1, 6302, 2, 1, 2, 11, 1, 0];
    pub const RECT_KEY: &[u32] = &[1, 3, 6, 1, 4, 1, 6302, 2, 1, 2, 11, 4, 1, 1];
    pub const RECT_PROD_NUM: &[u32] = &[1, 3, 6, 1, 4, 1, 6302, 2, 1, 2, 11, 4, 1, 2, 0];
    pub const RECT_HW_VERSION: &[u32] = &[1, 3, 6, 1, 4, 1, 6302, 2, 1, 2, 11, 4, 1, 3, 0];
    pub const RECT_SW_VERSION: &[u32] = &[1, 3, 6, 1, 4, 1, 6302, 2, 1, 2, 11, 4, 1, 4, 0];
    pub const RECT_SERIAL_NUM: &[u32] = &[1, 3, 6, 1, 4, 1, 6302, 2, 1, 2, 11, 4, 1, 5, 0];
    pub const RECT_IDENT: &[u32] = &[1, 3, 6, 1, 4, 1, 6302, 2, 1, 2, 11, 4, 1, 7, 0];
}

/// One SNMP request the driver should issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnmpGet {
    pub oid: Vec<u32>,
    /// GETNEXT instead of GET (table walks).
    pub getnext: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnmpValue {
    Int(i32),
    Str(String),
}

/// A single varbind answer: the responding OID and its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnmpVarBind {
    pub oid: Vec<u32>,
    pub value: SnmpValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnmpReply {
    VarBind(SnmpVarBind),
    /// Answers to `SnmpGetMulti`, in request order; `None` per failed OID.
    Multi(Vec<Option<String>>),
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
    #[default]
    Idle,
    RectNum,
    RectKey,
    RectId,
    MultiReq,
}

#[derive(Debug, Default)]
pub(crate) struct SnmpInventory {
    phase: Phase,
    rect_keys: Vec<u32>,
    walk_oid: Vec<u32>,
}

/// Kicks off the inventory after an NCU discovery round.
pub(super) fn start(e: &mut Engine, now_ms: u64) {
    e.snmp.phase = Phase::RectNum;
    e.snmp.rect_keys.clear();
    e.snmp_at = Some(now_ms + SNMP_POLL_INTERVAL_MS);
}

/// SNMP timer fired: emit the request of the current phase.
pub(super) fn snmp_tick(e: &mut Engine, now_ms: u64, sink: &mut dyn PowerSink) {
    match e.snmp.phase {
        Phase::Idle => {
            discovery::discovery_done(e, now_ms, sink);
            e.snmp.phase = Phase::RectNum;
        }
        Phase::RectNum => e.push_snmp(SnmpGet {
            oid: oids::RECT_NUM_INSTALLED.to_vec(),
            getnext: false,
        }),
        Phase::RectKey => e.push_snmp(SnmpGet {
            oid: oids::RECT_KEY.to_vec(),
            getnext: true,
        }),
        Phase::RectId => e.push_snmp(SnmpGet {
            oid: e.snmp.walk_oid.clone(),
            getnext: true,
        }),
        Phase::MultiReq => {
            let mut list: Vec<Vec<u32>> = Vec::new();
            list.push(oids::IDENT_MODEL.to_vec());
            list.push(oids::IDENT_CTRL_FW_VERSION.to_vec());
            list.push(oids::IDENT_NAME.to_vec());
            list.push(oids::IDENT_SERIAL_NUM.to_vec());
            for &key in &e.snmp.rect_keys {
                for base in [
                    oids::RECT_PROD_NUM,
                    oids::RECT_HW_VERSION,
                    oids::RECT_SW_VERSION,
                    oids::RECT_SERIAL_NUM,
                    oids::RECT_IDENT,
                ] {
                    let mut oid = base.to_vec();
                    if let Some(last) = oid.last_mut() {
                        *last = key;
                    }
                    list.push(oid);
                }
            }
            e.actions
                .push_back(super::EngineAction::SnmpGetMulti(list));
        }
    }
}

impl Engine {
    fn push_snmp(&mut self, get: SnmpGet) {
        self.actions.push_back(super::EngineAction::SnmpGet(get));
    }
}

fn oid_prefix(oid: &[u32], prefix: &[u32]) -> bool {
    oid.len() >= prefix.len() && &oid[..prefix.len()] == prefix
}

/// Advances the state machine on a reply from the driver.
pub(super) fn on_reply(e: &mut Engine, reply: SnmpReply, now_ms: u64, sink: &mut dyn PowerSink) {
    match reply {
        SnmpReply::Error => {
            warn!("[EEM] SNMP inventory failed, finishing discovery without it");
            e.snmp.phase = Phase::RectNum;
            discovery::discovery_done(e, now_ms, sink);
        }
        SnmpReply::Multi(values) => {
            stamp_inventory(e, &values, sink);
            e.snmp.phase = Phase::RectNum;
            discovery::discovery_done(e, now_ms, sink);
        }
        SnmpReply::VarBind(vb) => {
            match (e.snmp.phase, &vb.value) {
                (Phase::RectNum, SnmpValue::Int(n)) => {
                    if *n > 0 {
                        e.snmp.phase = Phase::RectKey;
                    } else {
                        e.snmp.phase = Phase::MultiReq;
                    }
                }
                (Phase::RectKey, SnmpValue::Int(key))
                    if oid_prefix(&vb.oid, oids::RECT_KEY) =>
                {
                    e.snmp.rect_keys.push(*key as u32);
                    e.snmp.walk_oid = vb.oid.clone();
                    e.snmp.phase = Phase::RectId;
                }
                (Phase::RectId, SnmpValue::Int(key))
                    if oid_prefix(&vb.oid, oids::RECT_KEY) =>
                {
                    e.snmp.rect_keys.push(*key as u32);
                    e.snmp.walk_oid = vb.oid.clone();
                }
                (Phase::RectId, _) => {
                    // Walked past the key column.
                    e.snmp.phase = Phase::MultiReq;
                }
                _ => {
                    warn!("[EEM] Unexpected SNMP answer in phase {:?}", e.snmp.phase);
                    e.snmp.phase = Phase::RectNum;
                    discovery::discovery_done(e, now_ms, sink);
                    return;
                }
            }
            e.snmp_at = Some(now_ms + SNMP_POLL_INTERVAL_MS);
        }
    }
}

fn trimmed(values: &[Option<String>], i: usize) -> String {
    values
        .get(i)
        .and_then(|v| v.as_ref())
        .map(|s| String::from(s.trim_end()))
        .unwrap_or_default()
}

fn stamp_inventory(e: &mut Engine, values: &[Option<String>], sink: &mut dyn PowerSink) {
    e.product_model = trimmed(values, 0);
    e.sw_revision = trimmed(values, 1);
    // Index 2 is the configured name; the RN response is authoritative.
    e.serial_num = trimmed(values, 3);
    debug!(
        "[EEM] Controller inventory: model {:?} fw {:?} serial {:?}",
        e.product_model, e.sw_revision, e.serial_num
    );
    for i in 0..e.snmp.rect_keys.len() {
        let base = 4 + i * 5;
        let inv = RectifierInventory {
            product_number: trimmed(values, base),
            hw_version: trimmed(values, base + 1),
            sw_version: trimmed(values, base + 2),
            serial_number: trimmed(values, base + 3),
            ident: trimmed(values, base + 4),
        };
        let id = format!("02{:02}", i + 1);
        sink.rectifier_inventory(&id, &inv);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EemConfig, EemState, Engine, EngineAction};
    use crate::types::ControllerFlavor;
    use alloc::string::ToString;
    use alloc::vec;

    #[derive(Default)]
    struct Recorder {
        inventories: Vec<(String, RectifierInventory)>,
        done: u32,
    }

    impl PowerSink for Recorder {
        fn rectifier_inventory(&mut self, id: &str, inv: &RectifierInventory) {
            self.inventories.push((id.to_string(), inv.clone()));
        }
        fn persist_config(&mut self) {
            // discovery_done always persists; count completions through it.
            self.done += 1;
        }
    }

    fn ncu_engine() -> Engine {
        let mut e = Engine::new(
            EemConfig {
                flavor: ControllerFlavor::Ncu,
                ..EemConfig::default()
            },
            0,
        );
        e.state = EemState::Connected;
        e
    }

    fn key_oid(key: u32) -> Vec<u32> {
        let mut oid = oids::RECT_KEY.to_vec();
        oid.push(key);
        oid
    }

    #[test]
    fn walks_keys_then_multi_fetches() {
        let mut sink = Recorder::default();
        let mut e = ncu_engine();
        start(&mut e, 0);
        let mut now = e.snmp_at.unwrap();

        e.tick(now, &mut sink);
        assert!(matches!(e.poll_action(), Some(EngineAction::SnmpGet(g)) if !g.getnext));
        e.snmp_reply(
            SnmpReply::VarBind(SnmpVarBind {
                oid: oids::RECT_NUM_INSTALLED.to_vec(),
                value: SnmpValue::Int(2),
            }),
            now,
            &mut sink,
        );

        now = e.snmp_at.unwrap();
        e.tick(now, &mut sink);
        assert!(matches!(e.poll_action(), Some(EngineAction::SnmpGet(g)) if g.getnext));
        e.snmp_reply(
            SnmpReply::VarBind(SnmpVarBind {
                oid: key_oid(1),
                value: SnmpValue::Int(1),
            }),
            now,
            &mut sink,
        );
        now = e.snmp_at.unwrap();
        e.tick(now, &mut sink);
        e.poll_action();
        e.snmp_reply(
            SnmpReply::VarBind(SnmpVarBind {
                oid: key_oid(2),
                value: SnmpValue::Int(2),
            }),
            now,
            &mut sink,
        );
        // Walk leaves the key column.
        now = e.snmp_at.unwrap();
        e.tick(now, &mut sink);
        e.poll_action();
        e.snmp_reply(
            SnmpReply::VarBind(SnmpVarBind {
                oid: vec![1, 3, 6, 1, 9],
                value: SnmpValue::Int(0),
            }),
            now,
            &mut sink,
        );

        now = e.snmp_at.unwrap();
        e.tick(now, &mut sink);
        match e.poll_action() {
            Some(EngineAction::SnmpGetMulti(list)) => {
                // 4 system OIDs + 5 per rectifier.
                assert_eq!(list.len(), 4 + 2 * 5);
                assert_eq!(list[4].last(), Some(&1));
                assert_eq!(list[9].last(), Some(&2));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn multi_reply_stamps_rectifiers_and_finishes() {
        let mut sink = Recorder::default();
        let mut e = ncu_engine();
        start(&mut e, 0);
        e.snmp.rect_keys = vec![1];
        e.snmp.phase = super::Phase::MultiReq;
        let values = vec![
            Some("NCU  ".to_string()),
            Some("5.1".to_string()),
            Some("Plant".to_string()),
            Some("SN123".to_string()),
            Some("R48-2000".to_string()),
            Some("A1".to_string()),
            Some("1.9".to_string()),
            Some("RSN9".to_string()),
            Some("ident".to_string()),
        ];
        e.snmp_reply(SnmpReply::Multi(values), 0, &mut sink);
        assert_eq!(e.product_model, "NCU");
        assert_eq!(e.serial_num, "SN123");
        assert_eq!(sink.inventories.len(), 1);
        assert_eq!(sink.inventories[0].0, "0201");
        assert_eq!(sink.inventories[0].1.serial_number, "RSN9");
        assert_eq!(sink.done, 1);
    }

    #[test]
    fn error_skips_to_discovery_end() {
        let mut sink = Recorder::default();
        let mut e = ncu_engine();
        start(&mut e, 0);
        e.snmp_reply(SnmpReply::Error, 0, &mut sink);
        assert_eq!(sink.done, 1);
    }
}
