//! Shared test harness: a scripted plant peer speaking the framed protocol,
//! and a recording sink capturing everything the engine pushes northbound.

use eemlink_rs::alarms::{InputAlarm, OutputAlarm, SystemAlarm};
use eemlink_rs::engine::snmp::SnmpReply;
use eemlink_rs::frame::codec::checksum;
use eemlink_rs::model::{
    BatteryData, BatteryMode, ControllerInfo, RectifierData, SystemData,
};
use eemlink_rs::registry::BlockClass;
use eemlink_rs::types::{ACK, ENQ, EOT, ETX, Severity, SOH, STX};
use eemlink_rs::{EemConfig, Engine, EngineAction, PowerSink};
use std::collections::HashMap;

/// Scripted peer. Select requests are answered with ACK; the follow-up
/// Poll delivers the scripted response frame plus EOT, like the plant does.
pub struct PlantSim {
    responses: HashMap<String, String>,
    pending: Option<String>,
    /// Every Select payload seen, in order.
    pub requests: Vec<String>,
}

impl PlantSim {
    pub fn new(script: &[(&str, &str)]) -> Self {
        PlantSim {
            responses: script
                .iter()
                .map(|(req, resp)| (req.to_string(), resp.trim_end_matches('*').to_string()))
                .collect(),
            pending: None,
            requests: Vec::new(),
        }
    }

    pub fn insert(&mut self, request: &str, response: &str) {
        self.responses.insert(
            request.to_string(),
            response.trim_end_matches('*').to_string(),
        );
    }

    pub fn reset(&mut self) {
        self.pending = None;
    }

    /// A response frame the way the plant emits one.
    fn data_frame(payload: &str) -> Vec<u8> {
        let mut f = vec![SOH];
        f.extend_from_slice(b"010000");
        f.push(STX);
        f.extend_from_slice(payload.as_bytes());
        f.push(b'*');
        f.push(ETX);
        let bcc = checksum(&f[1..]);
        f.push(bcc);
        f
    }

    /// Feeds one frame sent by the engine; returns the peer's reply bytes.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<u8> {
        if bytes.len() == 1 && bytes[0] == ACK {
            return Vec::new();
        }
        if let Some(stx) = bytes.iter().position(|&b| b == STX) {
            let tail = &bytes[stx + 1..];
            let end = tail.iter().position(|&b| b == b'*').unwrap_or(tail.len());
            let request = String::from_utf8_lossy(&tail[..end]).into_owned();
            self.pending = self.responses.get(&request).cloned().or_else(|| {
                // Writes are acknowledged even when not scripted.
                request.starts_with("WB").then(|| String::from("OK"))
            });
            self.requests.push(request);
            return vec![ACK];
        }
        if bytes.len() == 9 && bytes.last() == Some(&ENQ) {
            // Poll: deliver what the last Select asked for.
            let mut out = match self.pending.take() {
                Some(resp) => Self::data_frame(&resp),
                None => Vec::new(),
            };
            out.push(EOT);
            return out;
        }
        Vec::new()
    }
}

/// Records every sink call of interest.
#[derive(Default)]
pub struct RecordingSink {
    pub devices: Vec<(BlockClass, String, String)>,
    pub controller: Option<ControllerInfo>,
    pub system: Vec<SystemData>,
    pub rectifiers: Vec<(String, RectifierData)>,
    pub batteries: Vec<BatteryData>,
    pub modes: Vec<BatteryMode>,
    pub plant_alarms: Vec<(SystemAlarm, u16, Severity, bool)>,
    pub input_alarms: Vec<(String, InputAlarm, u16, Severity, bool)>,
    pub output_alarms: Vec<(String, OutputAlarm, u16, Severity, bool)>,
    pub clear_inactive_calls: u32,
    pub persist_calls: u32,
}

impl PowerSink for RecordingSink {
    fn add_device(&mut self, class: BlockClass, id: &str, name: &str) {
        let entry = (class, id.to_string(), name.to_string());
        if !self.devices.contains(&entry) {
            self.devices.push(entry);
        }
    }
    fn set_controller_info(&mut self, info: &ControllerInfo) {
        self.controller = Some(info.clone());
    }
    fn system_data(&mut self, data: &SystemData) {
        self.system.push(*data);
    }
    fn rectifier_data(&mut self, id: &str, data: &RectifierData) {
        self.rectifiers.push((id.to_string(), *data));
    }
    fn battery_data(&mut self, data: &BatteryData) {
        self.batteries.push(*data);
    }
    fn mode_set(&mut self, mode: BatteryMode) {
        self.modes.push(mode);
    }
    fn plant_alarm(&mut self, kind: SystemAlarm, bit: u16, severity: Severity, active: bool) {
        self.plant_alarms.push((kind, bit, severity, active));
    }
    fn input_alarm(
        &mut self,
        id: &str,
        kind: InputAlarm,
        bit: u16,
        severity: Severity,
        active: bool,
    ) {
        self.input_alarms
            .push((id.to_string(), kind, bit, severity, active));
    }
    fn output_alarm(
        &mut self,
        id: &str,
        kind: OutputAlarm,
        bit: u16,
        severity: Severity,
        active: bool,
    ) {
        self.output_alarms
            .push((id.to_string(), kind, bit, severity, active));
    }
    fn alarm_clear_inactive(&mut self) {
        self.clear_inactive_calls += 1;
    }
    fn persist_config(&mut self) {
        self.persist_calls += 1;
    }
}

/// Runs an engine against the simulated plant, virtual time included.
pub struct Harness {
    pub engine: Engine,
    pub sim: PlantSim,
    pub now: u64,
}

impl Harness {
    pub fn new(config: EemConfig, script: &[(&str, &str)]) -> Self {
        Harness {
            engine: Engine::new(config, 0),
            sim: PlantSim::new(script),
            now: 0,
        }
    }

    /// Processes up to `budget` actions or timer ticks. The poll loop is
    /// cyclic by design, so callers bound the run instead of waiting for
    /// quiescence.
    pub fn run(&mut self, sink: &mut dyn PowerSink, budget: usize) {
        for _ in 0..budget {
            if let Some(action) = self.engine.poll_action() {
                match action {
                    EngineAction::Connect => self.engine.connection_up(self.now, sink),
                    EngineAction::Send(bytes) => {
                        let reply = self.sim.feed(&bytes);
                        if !reply.is_empty() {
                            self.engine.receive(&reply, self.now, sink);
                        }
                    }
                    EngineAction::Close => self.sim.reset(),
                    EngineAction::SnmpGet(_) | EngineAction::SnmpGetMulti(_) => {
                        self.engine.snmp_reply(SnmpReply::Error, self.now, sink);
                    }
                    EngineAction::HttpRestart(_) => {}
                }
            } else {
                match self.engine.next_action_time() {
                    Some(t) => {
                        self.now = self.now.max(t);
                        self.engine.tick(self.now, sink);
                    }
                    None => return,
                }
            }
        }
    }
}
