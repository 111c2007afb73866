//! End-to-end poll cycle: block values flowing into the sink, the alarm
//! sweep, and the read-modify-write path back to the plant.

mod simulator;

use eemlink_rs::alarms::InputAlarm;
use eemlink_rs::frame::codec::{decode_float, encode_float};
use eemlink_rs::model::ConfigFloat;
use eemlink_rs::registry::{BlockClass, spec};
use eemlink_rs::types::Severity;
use eemlink_rs::EemConfig;
use simulator::{Harness, RecordingSink};

fn floats_field(values: &[f32]) -> String {
    let mut out = Vec::new();
    for &f in values {
        encode_float(f, &mut out);
    }
    String::from_utf8(out).unwrap()
}

/// Script with one rectifier and a battery group carrying real values.
fn script() -> Vec<(String, String)> {
    let mut rect_ai = vec![0.0f32; 6];
    rect_ai[0] = 53.75;
    rect_ai[1] = 41.5;
    rect_ai[2] = 38.0;
    rect_ai[3] = 0.5;
    rect_ai[4] = 230.0;
    rect_ai[5] = 2.0;
    // All rectifier inputs healthy.
    let rect_di = "0".repeat(spec(BlockClass::Rectifier).di_count.div_ceil(4));

    let mut bat_ao = vec![0.0f32; spec(BlockClass::BatteryGroup).ao_count];
    bat_ao[0] = 54.0;
    bat_ao[1] = 47.0;
    bat_ao[2] = 0.25;
    bat_ao[3] = 45.0;
    bat_ao[18] = 1.0;

    vec![
        ("RN".to_string(), "ACU+!01!$*".to_string()),
        ("RI".to_string(), "00000!02000!02011!03000*".to_string()),
        ("RP0200".to_string(), "02000!Rectifier Group*".to_string()),
        ("RP0201".to_string(), "02011!Rectifier1*".to_string()),
        ("RP0300".to_string(), "03000!Battery Group*".to_string()),
        ("RB0200".to_string(), "02000!0*".to_string()),
        (
            "RB0201".to_string(),
            format!("02011!0!{}!!{}*", floats_field(&rect_ai), rect_di),
        ),
        (
            "RB0300".to_string(),
            format!("03000!0!!{}*", floats_field(&bat_ao)),
        ),
        ("RB0000".to_string(), "00000!0*".to_string()),
        ("RC00".to_string(), "00#0201!I02!1*".to_string()),
    ]
}

fn harness() -> Harness {
    let script = script();
    let pairs: Vec<(&str, &str)> = script
        .iter()
        .map(|(a, b)| (a.as_str(), b.as_str()))
        .collect();
    Harness::new(EemConfig::default(), &pairs)
}

#[test]
fn rectifier_values_reach_the_sink() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut sink = RecordingSink::default();
    let mut h = harness();
    h.run(&mut sink, 300);

    let (id, data) = sink.rectifiers.first().expect("rectifier data");
    assert_eq!(id, "0201");
    assert!(data.active);
    assert_eq!(data.voltage, 53.75);
    assert_eq!(data.current, 41.5);
    assert_eq!(data.input_voltage, 230.0);
    assert_eq!(data.run_time_s, 7200);
}

#[test]
fn alarm_sweep_raises_rectifier_fail() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut sink = RecordingSink::default();
    let mut h = harness();
    h.run(&mut sink, 300);

    // Report index 02 halves to table index 1: input failure, bit 0, major.
    let fails: Vec<_> = sink
        .input_alarms
        .iter()
        .filter(|(id, kind, _, _, _)| id == "0201" && *kind == InputAlarm::Fail)
        .collect();
    assert!(!fails.is_empty());
    let (_, _, bit, severity, active) = fails[0];
    assert_eq!(*bit, 0);
    assert_eq!(*severity, Severity::Major);
    assert!(*active);
    assert!(sink.clear_inactive_calls >= 1);
}

#[test]
fn nominal_capacity_write_preserves_snapshot() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut sink = RecordingSink::default();
    let mut h = harness();
    h.run(&mut sink, 300);

    let now = h.now;
    h.engine
        .set_config_float(ConfigFloat::NominalCapacity, 100.0, now, &mut sink)
        .unwrap();
    h.run(&mut sink, 100);

    let wb = h
        .sim
        .requests
        .iter()
        .find(|r| r.starts_with("WB0300!"))
        .expect("write reached the plant");
    let sections: Vec<&str> = wb.splitn(3, '!').collect();
    assert_eq!(sections[0], "WB0300");
    let ao_hex = sections[1].as_bytes();
    let ao_count = spec(BlockClass::BatteryGroup).ao_count;
    assert_eq!(ao_hex.len(), 8 * ao_count);
    let decode = |i: usize| decode_float(&ao_hex[i * 8..(i + 1) * 8]).unwrap();
    assert!((decode(0) - 100.0 / 3600.0).abs() < 1e-6);
    assert_eq!(decode(1), 47.0);
    assert_eq!(decode(2), 0.25);
    assert_eq!(decode(3), 45.0);
    assert_eq!(decode(18), 1.0);
    // DO section empty on a float write.
    assert_eq!(sections[2], "");
}
