// crates/eemlink-rs/src/frame/mod.rs

pub mod codec;
pub mod scanner;

pub use codec::{checksum, decode_float, encode_float, encode_poll, encode_select};
pub use scanner::{FrameScanner, ScanEvent};
