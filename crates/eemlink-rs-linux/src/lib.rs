//! TCP driver for the `eemlink-rs` core on std platforms. Owns the socket,
//! executes the engine's actions, and feeds back received bytes and
//! connection events. SNMP inventory and the HTTP restart are not handled
//! by this transport; they are reported back as failed so the engine
//! proceeds without them.

use eemlink_rs::engine::snmp::SnmpReply;
use eemlink_rs::{EemConfig, Engine, EngineAction, PowerSink};
use log::{debug, info, warn};
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

/// How long a blocking connect attempt may take before it counts as failed.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Upper bound on the idle sleep between engine ticks.
const MAX_IDLE: Duration = Duration::from_millis(200);

/// Non-blocking TCP transport for one plant connection.
#[derive(Default)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new() -> Self {
        TcpTransport::default()
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Blocking connect with a bounded timeout; the stream is switched to
    /// non-blocking mode for the read loop afterwards.
    pub fn connect(&mut self, host: &str, port: u16) -> std::io::Result<()> {
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| std::io::Error::new(ErrorKind::NotFound, "no address"))?;
        let stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)?;
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        self.stream = Some(stream);
        Ok(())
    }

    pub fn close(&mut self) {
        self.stream = None;
    }

    pub fn send(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        match &mut self.stream {
            Some(s) => s.write_all(bytes),
            None => Err(std::io::Error::new(ErrorKind::NotConnected, "closed")),
        }
    }

    /// One non-blocking read. `Ok(None)` means no data right now; EOF is
    /// reported as an error.
    pub fn recv(&mut self, buf: &mut [u8]) -> std::io::Result<Option<usize>> {
        let Some(s) = &mut self.stream else {
            return Ok(None);
        };
        match s.read(buf) {
            Ok(0) => Err(std::io::Error::new(ErrorKind::UnexpectedEof, "peer closed")),
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Event loop binding one [`Engine`] to a [`TcpTransport`].
pub struct EemDriver {
    engine: Engine,
    transport: TcpTransport,
    host: String,
    port: u16,
    epoch: Instant,
}

impl EemDriver {
    pub fn new(config: EemConfig) -> Self {
        let host = config.host.clone();
        let port = config.port;
        let epoch = Instant::now();
        EemDriver {
            engine: Engine::new(config, 0),
            transport: TcpTransport::new(),
            host,
            port,
            epoch,
        }
    }

    pub fn engine(&mut self) -> &mut Engine {
        &mut self.engine
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Executes pending engine actions against the transport.
    fn run_actions(&mut self, sink: &mut dyn PowerSink) {
        let now = self.now_ms();
        while let Some(action) = self.engine.poll_action() {
            match action {
                EngineAction::Connect => match self.transport.connect(&self.host, self.port) {
                    Ok(()) => {
                        info!("Connected to {}:{}", self.host, self.port);
                        self.engine.connection_up(now, sink);
                    }
                    Err(e) => {
                        warn!("Connect to {}:{} failed: {e}", self.host, self.port);
                        self.engine.connection_lost(now, sink);
                    }
                },
                EngineAction::Send(bytes) => {
                    if let Err(e) = self.transport.send(&bytes) {
                        warn!("Send failed: {e}");
                        self.transport.close();
                        self.engine.connection_lost(now, sink);
                    }
                }
                EngineAction::Close => self.transport.close(),
                EngineAction::SnmpGet(_) | EngineAction::SnmpGetMulti(_) => {
                    // This transport speaks TCP only; let the engine finish
                    // discovery without the inventory strings.
                    debug!("SNMP inventory not supported by the TCP driver");
                    self.engine.snmp_reply(SnmpReply::Error, now, sink);
                }
                EngineAction::HttpRestart(req) => {
                    warn!(
                        "Restart of {}:{} requested; no HTTP client configured",
                        req.host, req.port
                    );
                }
            }
        }
    }

    /// One iteration of the event loop: execute actions, pull received
    /// bytes, service timers, then sleep until the next deadline.
    pub fn run_once(&mut self, sink: &mut dyn PowerSink) {
        self.run_actions(sink);

        let mut buf = [0u8; 4096];
        loop {
            match self.transport.recv(&mut buf) {
                Ok(Some(n)) => {
                    let now = self.now_ms();
                    self.engine.receive(&buf[..n], now, sink);
                    self.run_actions(sink);
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Receive failed: {e}");
                    self.transport.close();
                    let now = self.now_ms();
                    self.engine.connection_lost(now, sink);
                    break;
                }
            }
        }

        let now = self.now_ms();
        self.engine.tick(now, sink);
        self.run_actions(sink);

        let sleep = match self.engine.next_action_time() {
            Some(t) if t > now => Duration::from_millis((t - now).min(MAX_IDLE.as_millis() as u64)),
            Some(_) => Duration::from_millis(1),
            None => MAX_IDLE,
        };
        std::thread::sleep(sleep);
    }

    /// Runs the loop until the process is terminated.
    pub fn run(&mut self, sink: &mut dyn PowerSink) -> ! {
        loop {
            self.run_once(sink);
        }
    }
}
