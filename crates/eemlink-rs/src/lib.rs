#![cfg_attr(not(feature = "std"), no_std)]

// 'alloc' is used for dynamic allocation (device vectors, request payloads)
extern crate alloc;

// --- Foundation Modules ---
pub mod types;
pub mod hal;
pub mod model;

// --- Wire Layer ---
pub mod frame;

// --- Static Block Knowledge ---
pub mod registry;
pub mod alarms;

// --- Engine ---
pub mod engine;

// --- Top-level Exports ---
pub use types::{BlockId, ControllerFlavor, Severity};
pub use hal::{EemError, PowerSink};
pub use model::{ConfigError, ConfigFloat};
pub use frame::scanner::{FrameScanner, ScanEvent};
pub use engine::{EemConfig, EemState, Engine, EngineAction};
