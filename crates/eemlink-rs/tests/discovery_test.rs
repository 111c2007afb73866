//! End-to-end discovery against the scripted plant: name, inventory, block
//! names, device ordering and equipment announcements.

mod simulator;

use eemlink_rs::EemConfig;
use eemlink_rs::registry::BlockClass;
use simulator::{Harness, RecordingSink};

const SCRIPT: &[(&str, &str)] = &[
    ("RN", "ACU+!01!$*"),
    ("RI", "00000!02000!02011!02021*"),
    ("RP0200", "02000!Rectifier Group*"),
    ("RP0201", "02011!Rectifier1*"),
    ("RP0202", "02021!Rectifier2*"),
    ("RB0200", "02000!0*"),
    ("RB0201", "02011!0*"),
    ("RB0202", "02021!0*"),
    ("RB0000", "00000!0*"),
    ("RC00", "00*"),
];

#[test]
fn discovery_builds_ordered_device_list() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut sink = RecordingSink::default();
    let mut h = Harness::new(EemConfig::default(), SCRIPT);
    h.run(&mut sink, 200);

    let ids: Vec<&str> = h.engine.devices().iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, ["0200", "0201", "0202", "0000"]);
    assert_eq!(h.engine.name(), "ACU+");

    let by_id = |id: &str| {
        h.engine
            .devices()
            .iter()
            .find(|d| d.id.as_str() == id)
            .unwrap()
    };
    assert_eq!(by_id("0200").name, "Rectifier Group");
    assert_eq!(by_id("0201").name, "Rectifier1");
    assert_eq!(by_id("0202").name, "Rectifier2");
    assert_eq!(by_id("0000").name, "ACU+");
}

#[test]
fn discovery_announces_equipment_once() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut sink = RecordingSink::default();
    let mut h = Harness::new(EemConfig::default(), SCRIPT);
    h.run(&mut sink, 300);

    let controller = sink.controller.expect("controller info set");
    assert_eq!(controller.product_name, "ACU+");

    let rectifiers: Vec<&str> = sink
        .devices
        .iter()
        .filter(|(c, _, _)| *c == BlockClass::Rectifier)
        .map(|(_, id, _)| id.as_str())
        .collect();
    assert_eq!(rectifiers, ["0201", "0202"]);
    assert!(
        sink.devices
            .iter()
            .any(|(c, id, _)| *c == BlockClass::RectifierGroup && id == "0200")
    );
    assert!(sink.persist_calls >= 1);
}

#[test]
fn poll_cycle_follows_discovery() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut sink = RecordingSink::default();
    let mut h = Harness::new(EemConfig::default(), SCRIPT);
    h.run(&mut sink, 300);

    // The cyclic reads made it to the plant, in device-list order.
    let first_rb = h.sim.requests.iter().position(|r| r == "RB0200");
    let sweep = h.sim.requests.iter().position(|r| r == "RC00");
    assert!(first_rb.is_some());
    assert!(sweep.is_some());
    assert!(first_rb < sweep);
    // The alarm sweep closed the cycle.
    assert!(sink.clear_inactive_calls >= 1);
}
