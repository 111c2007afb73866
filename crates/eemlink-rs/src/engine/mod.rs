//! The protocol engine: owns the single connection, the request queue and
//! the device list, and drives discovery, polling and the alarm sweep.
//!
//! The engine is sans-I/O. It consumes received bytes, timestamps and
//! transport events, and emits [`EngineAction`]s the driver executes. No
//! method blocks; timer state is exposed through [`Engine::next_action_time`].

mod discovery;
mod poll;
mod readers;
pub mod snmp;
mod sweep;
mod writers;

use crate::frame::codec::{encode_ack, encode_poll, encode_select};
use crate::frame::scanner::{FrameScanner, ScanEvent};
use crate::hal::PowerSink;
use crate::model::{ControllerInfo, PlantState};
use crate::registry::{BlockClass, classify};
use crate::types::{
    BlockId, ControllerFlavor, EEM_TIMEOUT_MS, MAX_SEND_COUNT, NAMELEN, RECONNECT_LONG_MS,
    RECONNECT_SHORT_MS, REQUEST_LEN, Severity, SKIP_STREAK_LIMIT,
};
use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec::Vec;
use log::{debug, info, trace, warn};
use snmp::{SnmpInventory, SnmpReply};

pub use crate::alarms::SystemAlarm;

/// Connection state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EemState {
    #[default]
    Inactive,
    Connecting,
    Connected,
}

/// Engine construction parameters.
#[derive(Debug, Clone)]
pub struct EemConfig {
    pub host: String,
    pub port: u16,
    /// Station subaddress, serialized as two hex digits on the wire.
    pub sub_addr: u8,
    pub flavor: ControllerFlavor,
    /// Battery current below `-current_resolution` counts as discharging.
    pub current_resolution: f32,
    pub username: Option<String>,
    pub password: Option<String>,
    pub debug: bool,
}

impl Default for EemConfig {
    fn default() -> Self {
        EemConfig {
            host: String::new(),
            port: 2000,
            sub_addr: 1,
            flavor: ControllerFlavor::Acu,
            current_resolution: 0.0,
            username: None,
            password: None,
            debug: false,
        }
    }
}

/// Fire-and-forget restart of the controller through its web interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartRequest {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

/// What the driver should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineAction {
    /// Open the TCP connection; report back via `connection_up` /
    /// `connection_lost`.
    Connect,
    /// Write these bytes to the socket.
    Send(Vec<u8>),
    /// Close the socket.
    Close,
    /// Issue one SNMP get (NCU inventory).
    SnmpGet(snmp::SnmpGet),
    /// Issue a batch of SNMP string gets (NCU inventory).
    SnmpGetMulti(Vec<Vec<u32>>),
    HttpRestart(RestartRequest),
}

/// Typed completion tag of a queued request. Replaces the original
/// callback-plus-context pairs with something the dispatcher can match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pending {
    ReadName,
    Identify,
    ReadParam(BlockId),
    ReadBlock(BlockId),
    ReadAlarms,
    WriteBlock(BlockId),
    /// Empty-payload queue checkpoint; completes without wire traffic.
    Checkpoint,
    /// Raw command issued by the upper layer.
    Command,
}

#[derive(Debug)]
pub(crate) struct Request {
    pub payload: Vec<u8>,
    pub send_count: u8,
    pub pending: Pending,
}

/// Decoded vectors of one block, present iff the last poll carried the
/// corresponding section.
#[derive(Debug, Clone, Default)]
pub struct BlockData {
    pub ai: Option<Vec<f32>>,
    pub ao: Option<Vec<f32>>,
    pub di: Option<Vec<u8>>,
    pub dout: Option<Vec<u8>>,
}

/// One discovered block. Owned by the engine; identified elsewhere by its
/// copy-value id.
#[derive(Debug, Clone)]
pub struct Device {
    pub id: BlockId,
    pub name: String,
    pub class: Option<BlockClass>,
    pub data: BlockData,
}

pub struct Engine {
    pub(crate) state: EemState,
    pub(crate) cc_id: [u8; 2],
    pub(crate) flavor: ControllerFlavor,
    pub(crate) debug: bool,
    pub(crate) name: String,
    pub(crate) devices: Vec<Device>,
    pub(crate) queue: VecDeque<Request>,
    pub(crate) scanner: FrameScanner,
    pub(crate) actions: VecDeque<EngineAction>,
    pub(crate) plant: PlantState,
    pub(crate) current_resolution: f32,
    // Absolute millisecond deadlines.
    pub(crate) connect_at: Option<u64>,
    pub(crate) request_deadline: Option<u64>,
    pub(crate) scan_at: Option<u64>,
    pub(crate) snmp_at: Option<u64>,
    /// Timestamp of the last successfully received data frame.
    pub(crate) last_success: Option<u64>,
    /// Consecutive control bytes without a data frame.
    pub(crate) skip_streak: u8,
    /// True from the first block poll of a cycle to its alarm-sweep end.
    pub(crate) rb_loop: bool,
    pub(crate) last_cycle_ms: Option<u64>,
    pub(crate) snmp: SnmpInventory,
    pub(crate) product_model: String,
    pub(crate) sw_revision: String,
    pub(crate) serial_num: String,
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) username: Option<String>,
    pub(crate) password: Option<String>,
}

impl Engine {
    /// Creates an engine for one plant and arms the initial connect timer.
    pub fn new(config: EemConfig, now_ms: u64) -> Self {
        let mut cc_id = [0u8; 2];
        let hex = b"0123456789ABCDEF";
        cc_id[0] = hex[(config.sub_addr >> 4) as usize];
        cc_id[1] = hex[(config.sub_addr & 0xF) as usize];
        info!(
            "[EEM] New engine for {}:{} (cc {}{})",
            config.host, config.port, cc_id[0] as char, cc_id[1] as char
        );
        Engine {
            state: EemState::Inactive,
            cc_id,
            flavor: config.flavor,
            debug: config.debug,
            name: String::new(),
            devices: Vec::new(),
            queue: VecDeque::new(),
            scanner: FrameScanner::new(),
            actions: VecDeque::new(),
            plant: PlantState::default(),
            current_resolution: config.current_resolution,
            connect_at: Some(now_ms + RECONNECT_SHORT_MS),
            request_deadline: None,
            scan_at: None,
            snmp_at: None,
            last_success: None,
            skip_streak: 0,
            rb_loop: false,
            last_cycle_ms: None,
            snmp: SnmpInventory::default(),
            product_model: String::new(),
            sw_revision: String::new(),
            serial_num: String::new(),
            host: config.host,
            port: config.port,
            username: config.username,
            password: config.password,
        }
    }

    // --- Accessors ---

    pub fn state(&self) -> EemState {
        self.state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn plant(&self) -> &PlantState {
        &self.plant
    }

    pub fn flavor(&self) -> ControllerFlavor {
        self.flavor
    }

    pub fn controller_info(&self) -> ControllerInfo {
        let mut info = ControllerInfo {
            product_name: self.name.clone(),
            product_model: self.product_model.clone(),
            serial_number: self.serial_num.clone(),
            sw_revision: self.sw_revision.clone(),
            ..ControllerInfo::default()
        };
        if self.product_model == "NCU" {
            info.product_number = String::from("M830B");
        }
        info
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    /// Next action to hand to the transport, if any.
    pub fn poll_action(&mut self) -> Option<EngineAction> {
        self.actions.pop_front()
    }

    /// Earliest timestamp at which `tick` has something to do.
    pub fn next_action_time(&self) -> Option<u64> {
        [
            self.connect_at,
            self.request_deadline,
            self.scan_at,
            self.snmp_at,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    // --- Transport Events ---

    /// The driver completed the TCP connect.
    pub fn connection_up(&mut self, now_ms: u64, sink: &mut dyn PowerSink) {
        info!("[EEM] Connected");
        self.state = EemState::Connected;
        self.connect_at = None;
        self.queue.clear();
        self.scanner.clear();
        self.skip_streak = 0;
        self.rb_loop = false;
        if self.name.is_empty() {
            self.enqueue(b"RN", Pending::ReadName, now_ms);
        }
        self.enqueue(b"RI", Pending::Identify, now_ms);
        sink.plant_alarm(SystemAlarm::Lost, 0, Severity::Indeterminate, false);
        self.service_queue(now_ms, sink);
    }

    /// The driver lost the socket (EOF, error, or failed connect).
    pub fn connection_lost(&mut self, now_ms: u64, sink: &mut dyn PowerSink) {
        warn!("[EEM] Connection lost");
        self.lost(now_ms, sink);
    }

    /// Bytes received from the socket.
    pub fn receive(&mut self, bytes: &[u8], now_ms: u64, sink: &mut dyn PowerSink) {
        self.scanner.extend(bytes);
        while let Some(ev) = self.scanner.poll() {
            match ev {
                ScanEvent::JunkSkipped(n) => {
                    debug!("[EEM] Skipped {n} junk bytes");
                }
                ScanEvent::DataFrame {
                    payload,
                    ok_checksum,
                } => self.on_data_frame(payload, ok_checksum, now_ms, sink),
                ScanEvent::Ack => {
                    trace!("[EEM] ACK");
                    if self.state == EemState::Connected && !self.queue.is_empty() {
                        self.push_send(encode_poll(self.cc_id).to_vec());
                        self.request_deadline = Some(now_ms + EEM_TIMEOUT_MS);
                    }
                    if self.on_skip(now_ms, sink) {
                        return;
                    }
                }
                ScanEvent::Nak => {
                    debug!("[EEM] NAK");
                    if self.on_skip(now_ms, sink) {
                        return;
                    }
                }
                ScanEvent::Eot => {
                    trace!("[EEM] EOT");
                    self.service_queue(now_ms, sink);
                    if self.on_skip(now_ms, sink) {
                        return;
                    }
                }
            }
        }
    }

    /// Timer service. Call at (or after) `next_action_time`.
    pub fn tick(&mut self, now_ms: u64, sink: &mut dyn PowerSink) {
        if self.connect_at.is_some_and(|t| now_ms >= t) {
            self.connect_at = None;
            if self.state == EemState::Inactive {
                self.start_connect();
            }
        }
        if self.request_deadline.is_some_and(|t| now_ms >= t) {
            self.request_deadline = None;
            self.on_timeout(now_ms, sink);
        }
        if self.scan_at.is_some_and(|t| now_ms >= t) {
            self.scan_at = None;
            self.enqueue(b"RI", Pending::Identify, now_ms);
        }
        if self.snmp_at.is_some_and(|t| now_ms >= t) {
            self.snmp_at = None;
            snmp::snmp_tick(self, now_ms, sink);
        }
    }

    /// Result of an `EngineAction::SnmpGet*` handed back by the driver.
    pub fn snmp_reply(&mut self, reply: SnmpReply, now_ms: u64, sink: &mut dyn PowerSink) {
        snmp::on_reply(self, reply, now_ms, sink);
    }

    /// Requests a controller restart through its web interface.
    pub fn restart(&mut self) {
        let req = RestartRequest {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone().unwrap_or_else(|| String::from("admin")),
            password: self.password.clone().unwrap_or_else(|| String::from("1")),
        };
        self.actions.push_back(EngineAction::HttpRestart(req));
    }

    // --- Queue Internals ---

    pub(crate) fn push_send(&mut self, bytes: Vec<u8>) {
        self.actions.push_back(EngineAction::Send(bytes));
    }

    /// Appends a request. An empty payload is a checkpoint. If nothing was
    /// queued, the link is kicked: connect when down, or an immediate
    /// deadline so the next tick transmits.
    pub(crate) fn enqueue(&mut self, payload: &[u8], pending: Pending, now_ms: u64) {
        let mut payload = payload.to_vec();
        payload.truncate(REQUEST_LEN);
        let was_empty = self.queue.is_empty();
        self.queue.push_back(Request {
            payload,
            send_count: 0,
            pending,
        });
        if was_empty {
            match self.state {
                EemState::Inactive => self.start_connect(),
                EemState::Connecting => {}
                EemState::Connected => {
                    // Nothing was in flight, so any armed deadline is stale;
                    // let the next tick transmit immediately.
                    self.request_deadline = Some(now_ms);
                }
            }
        }
    }

    /// Pops checkpoints (completing them) until a transmittable request is
    /// at the head, then sends it as a Select.
    pub(crate) fn service_queue(&mut self, now_ms: u64, sink: &mut dyn PowerSink) {
        while let Some(head) = self.queue.front() {
            if !head.payload.is_empty() {
                if self.state == EemState::Connected {
                    self.send_select(now_ms);
                }
                return;
            }
            let req = self.queue.pop_front().expect("head exists");
            self.complete(req.pending, None, now_ms, sink);
        }
    }

    fn send_select(&mut self, now_ms: u64) {
        let Some(head) = self.queue.front_mut() else {
            return;
        };
        match encode_select(self.cc_id, &head.payload) {
            Ok(frame) => {
                head.send_count += 1;
                trace!(
                    "[EEM] Select {:?} (attempt {})",
                    core::str::from_utf8(&head.payload).unwrap_or("?"),
                    head.send_count
                );
                self.push_send(frame);
                self.request_deadline = Some(now_ms + EEM_TIMEOUT_MS);
            }
            Err(e) => {
                warn!("[EEM] Dropping unencodable request: {e}");
                self.queue.pop_front();
            }
        }
    }

    fn on_data_frame(
        &mut self,
        payload: Vec<u8>,
        ok_checksum: bool,
        now_ms: u64,
        sink: &mut dyn PowerSink,
    ) {
        if !ok_checksum {
            warn!("[EEM] Incorrect checksum on response frame");
        }
        // The peer is ACKed regardless; the frame was consumed.
        self.push_send(encode_ack().to_vec());
        self.skip_streak = 0;
        self.last_success = Some(now_ms);
        if let Some(req) = self.queue.pop_front() {
            if self.debug {
                debug!(
                    "[EEM] {} -> {}",
                    core::str::from_utf8(&req.payload).unwrap_or("?"),
                    String::from_utf8_lossy(&payload)
                );
            }
            self.complete(req.pending, Some(&payload), now_ms, sink);
        }
        // The next Select is pumped by the peer's EOT or by the still-armed
        // request deadline.
    }

    /// Shared tail of the bare control-byte handlers. Returns true when the
    /// streak forced the link down; the caller must stop processing.
    fn on_skip(&mut self, now_ms: u64, sink: &mut dyn PowerSink) -> bool {
        self.skip_streak = self.skip_streak.saturating_add(1);
        if self.skip_streak >= SKIP_STREAK_LIMIT {
            warn!(
                "[EEM] {} control bytes without progress, forcing reconnect",
                self.skip_streak
            );
            self.lost(now_ms, sink);
            self.connect_at = Some(now_ms + RECONNECT_LONG_MS);
            return true;
        }
        false
    }

    fn on_timeout(&mut self, now_ms: u64, sink: &mut dyn PowerSink) {
        if self.queue.is_empty() {
            return;
        }
        if self.state != EemState::Connected {
            if self.state == EemState::Inactive {
                self.start_connect();
            }
            return;
        }
        let send_count = self.queue.front().map(|r| r.send_count).unwrap_or(0);
        if send_count < MAX_SEND_COUNT {
            // First transmission, or one retransmit of a silent Select.
            self.service_queue(now_ms, sink);
            return;
        }
        match self.last_success {
            None => self.last_success = Some(now_ms),
            Some(t) => {
                if now_ms.saturating_sub(t) > crate::types::EEM_LOST_TIMEOUT_MS {
                    self.lost(now_ms, sink);
                }
            }
        }
        debug!("[EEM] Request timeout");
        if let Some(req) = self.queue.pop_front() {
            self.complete(req.pending, None, now_ms, sink);
        }
        self.service_queue(now_ms, sink);
    }

    fn start_connect(&mut self) {
        if self.state != EemState::Inactive {
            return;
        }
        self.rb_loop = false;
        self.connect_at = None;
        self.state = EemState::Connecting;
        self.actions.push_back(EngineAction::Connect);
    }

    fn close_link(&mut self, now_ms: u64) {
        if self.state != EemState::Inactive {
            self.actions.push_back(EngineAction::Close);
        }
        self.state = EemState::Inactive;
        self.request_deadline = None;
        self.scanner.clear();
        self.connect_at = Some(now_ms + RECONNECT_SHORT_MS);
    }

    /// Drops decoded state but keeps the device list.
    fn forget(&mut self, sink: &mut dyn PowerSink) {
        for dev in &mut self.devices {
            dev.data = BlockData::default();
        }
        self.rb_loop = false;
        self.plant.forget();
        sink.plant_forget();
    }

    /// The plant is unreachable: close, drop decoded state, raise the lost
    /// alarm, arm the reconnect timer.
    pub(crate) fn lost(&mut self, now_ms: u64, sink: &mut dyn PowerSink) {
        self.close_link(now_ms);
        self.forget(sink);
        self.queue.clear();
        sink.plant_alarm(SystemAlarm::Lost, 0, Severity::Indeterminate, true);
    }

    fn complete(
        &mut self,
        pending: Pending,
        payload: Option<&[u8]>,
        now_ms: u64,
        sink: &mut dyn PowerSink,
    ) {
        match pending {
            Pending::ReadName => discovery::on_name(self, payload),
            Pending::Identify => discovery::on_identify(self, payload, now_ms, sink),
            Pending::ReadParam(id) => discovery::on_param(self, id, payload),
            Pending::ReadBlock(id) => poll::on_read_block(self, id, payload, now_ms, sink),
            Pending::ReadAlarms => sweep::on_alarms(self, payload, now_ms, sink),
            Pending::WriteBlock(id) => {
                trace!("[EEM] Write to {id} acknowledged");
            }
            Pending::Checkpoint => discovery::discovery_done(self, now_ms, sink),
            Pending::Command => {
                if let Some(buf) = payload {
                    debug!("[EEM] Command reply: {}", String::from_utf8_lossy(buf));
                }
            }
        }
    }

    // --- Device List ---

    pub(crate) fn find_device(&self, id: BlockId) -> Option<usize> {
        self.devices.iter().position(|d| d.id == id)
    }

    pub(crate) fn find_device_str(&self, id: &str) -> Option<usize> {
        BlockId::from_str(id).and_then(|id| self.find_device(id))
    }

    /// Finds or creates a device; `add_first` inserts new entries at the
    /// list head (the rectifier group must precede its rectifiers).
    pub(crate) fn device_new(&mut self, id: BlockId, add_first: bool) -> usize {
        if let Some(idx) = self.find_device(id) {
            return idx;
        }
        let dev = Device {
            id,
            name: String::new(),
            class: classify(id),
            data: BlockData::default(),
        };
        if add_first {
            self.devices.insert(0, dev);
            0
        } else {
            self.devices.push(dev);
            self.devices.len() - 1
        }
    }

    /// Stores a name observed on the wire, clipped to the device limit.
    pub(crate) fn clip_name(field: &[u8]) -> String {
        let n = field.len().min(NAMELEN - 1);
        String::from_utf8_lossy(&field[..n]).into_owned()
    }
}
