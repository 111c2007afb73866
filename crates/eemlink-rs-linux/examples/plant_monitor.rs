//! Connects to an EEM power plant controller and logs everything the
//! engine learns: discovered blocks, measurements, and alarms.
//!
//! Usage: plant_monitor <host> [port] [--ncu]

use eemlink_rs::alarms::{InputAlarm, OutputAlarm, SystemAlarm};
use eemlink_rs::model::{
    BatteryData, BatteryMode, RectifierData, SystemData,
};
use eemlink_rs::registry::BlockClass;
use eemlink_rs::types::{ControllerFlavor, Severity};
use eemlink_rs::{EemConfig, PowerSink};
use eemlink_rs_linux::EemDriver;
use log::info;

/// Sink that prints the plant model as it is discovered and refreshed.
#[derive(Default)]
struct LogSink;

impl PowerSink for LogSink {
    fn add_device(&mut self, class: BlockClass, id: &str, name: &str) {
        info!("device {id} ({class:?}): {name}");
    }

    fn system_data(&mut self, data: &SystemData) {
        info!(
            "system {:.2} V {:.1} A {:.0} W",
            data.voltage, data.current, data.power
        );
    }

    fn rectifier_data(&mut self, id: &str, data: &RectifierData) {
        info!(
            "rectifier {id}: active={} {:.2} V {:.1} A {:.1} C",
            data.active, data.voltage, data.current, data.temperature
        );
    }

    fn battery_data(&mut self, data: &BatteryData) {
        info!(
            "battery {:.2} V {:.1} A {:.1} C",
            data.voltage, data.current, data.temperature
        );
    }

    fn mode_set(&mut self, mode: BatteryMode) {
        info!("battery mode {mode:?}");
    }

    fn plant_alarm(&mut self, kind: SystemAlarm, bit: u16, severity: Severity, active: bool) {
        info!("plant alarm {kind:?}/{bit} {severity:?} active={active}");
    }

    fn input_alarm(&mut self, id: &str, kind: InputAlarm, bit: u16, severity: Severity, active: bool) {
        info!("input alarm {id} {kind:?}/{bit} {severity:?} active={active}");
    }

    fn output_alarm(
        &mut self,
        id: &str,
        kind: OutputAlarm,
        bit: u16,
        severity: Severity,
        active: bool,
    ) {
        info!("output alarm {id} {kind:?}/{bit} {severity:?} active={active}");
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| {
        eprintln!("usage: plant_monitor <host> [port] [--ncu]");
        std::process::exit(2);
    });
    let mut port = 2000;
    let mut flavor = ControllerFlavor::Acu;
    for arg in args {
        if arg == "--ncu" {
            flavor = ControllerFlavor::Ncu;
        } else if let Ok(p) = arg.parse() {
            port = p;
        }
    }

    let config = EemConfig {
        host,
        port,
        flavor,
        debug: true,
        ..EemConfig::default()
    };
    let mut sink = LogSink;
    EemDriver::new(config).run(&mut sink);
}
