//! Incremental scanner over the receive stream. The peer interleaves framed
//! data (`SOH … ETX BCC`) with bare control bytes; anything else is junk to
//! be skipped. The scanner is idempotent on partial input: feeding a stream
//! one byte at a time yields the same events as feeding it whole.

use super::codec::checksum;
use crate::types::{ACK, EOT, ETX, NAK, SOH};
use alloc::vec::Vec;

/// Bytes the scanner recognises as the start of something.
fn is_delimiter(b: u8) -> bool {
    matches!(b, SOH | EOT | ACK | NAK)
}

/// One decoded element of the receive stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// Leading bytes matching no delimiter, discarded.
    JunkSkipped(usize),
    /// A complete data frame. The payload sits between the
    /// `SOH cc cc 0000 STX` header and the trailing `* ETX`; a bad BCC is
    /// reported but does not suppress delivery.
    DataFrame { payload: Vec<u8>, ok_checksum: bool },
    Ack,
    Nak,
    Eot,
}

/// Offset of the payload behind the SOH.
const HEADER_LEN: usize = 8;

#[derive(Debug, Default)]
pub struct FrameScanner {
    buf: Vec<u8>,
}

impl FrameScanner {
    pub fn new() -> Self {
        FrameScanner::default()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Consumes one prefix of the buffered stream. `None` means more bytes
    /// are needed (or nothing is buffered).
    pub fn poll(&mut self) -> Option<ScanEvent> {
        if self.buf.is_empty() {
            return None;
        }
        let Some(start) = self.buf.iter().position(|&b| is_delimiter(b)) else {
            let n = self.buf.len();
            self.buf.clear();
            return Some(ScanEvent::JunkSkipped(n));
        };
        if start > 0 {
            self.buf.drain(..start);
            return Some(ScanEvent::JunkSkipped(start));
        }
        match self.buf[0] {
            SOH => self.poll_data_frame(),
            ACK => {
                self.buf.drain(..1);
                Some(ScanEvent::Ack)
            }
            NAK => {
                self.buf.drain(..1);
                Some(ScanEvent::Nak)
            }
            EOT => {
                self.buf.drain(..1);
                Some(ScanEvent::Eot)
            }
            _ => unreachable!(),
        }
    }

    fn poll_data_frame(&mut self) -> Option<ScanEvent> {
        let etx = self.buf.iter().position(|&b| b == ETX)?;
        // The BCC trails the ETX.
        if etx + 1 >= self.buf.len() {
            return None;
        }
        let bcc = checksum(&self.buf[1..=etx]);
        let ok_checksum = bcc == self.buf[etx + 1];
        let payload_end = etx.saturating_sub(1).max(HEADER_LEN);
        let payload = if etx > HEADER_LEN {
            self.buf[HEADER_LEN..payload_end].to_vec()
        } else {
            Vec::new()
        };
        self.buf.drain(..=etx + 1);
        Some(ScanEvent::DataFrame {
            payload,
            ok_checksum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::STX;
    use alloc::vec;

    /// A response frame the way the plant emits one.
    fn data_frame(cc: &[u8; 2], payload: &[u8]) -> Vec<u8> {
        let mut f = Vec::new();
        f.push(SOH);
        f.extend_from_slice(cc);
        f.extend_from_slice(b"0000");
        f.push(STX);
        f.extend_from_slice(payload);
        f.push(b'*');
        f.push(ETX);
        let bcc = checksum(&f[1..]);
        f.push(bcc);
        f
    }

    #[test]
    fn single_frame() {
        let mut s = FrameScanner::new();
        s.extend(&data_frame(b"AB", b"ACU+!01!$"));
        match s.poll() {
            Some(ScanEvent::DataFrame {
                payload,
                ok_checksum,
            }) => {
                assert_eq!(payload, b"ACU+!01!$");
                assert!(ok_checksum);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(s.poll(), None);
    }

    #[test]
    fn junk_then_controls_then_frame() {
        let mut s = FrameScanner::new();
        let mut stream = vec![b'x', b'y'];
        stream.push(ACK);
        stream.push(NAK);
        stream.push(EOT);
        stream.extend_from_slice(&data_frame(b"01", b"00000!02000*"));
        s.extend(&stream);
        assert_eq!(s.poll(), Some(ScanEvent::JunkSkipped(2)));
        assert_eq!(s.poll(), Some(ScanEvent::Ack));
        assert_eq!(s.poll(), Some(ScanEvent::Nak));
        assert_eq!(s.poll(), Some(ScanEvent::Eot));
        assert!(matches!(s.poll(), Some(ScanEvent::DataFrame { .. })));
        assert_eq!(s.poll(), None);
    }

    #[test]
    fn incomplete_frame_waits_for_more() {
        let mut s = FrameScanner::new();
        let frame = data_frame(b"01", b"0201!Rectifier1");
        s.extend(&frame[..5]);
        assert_eq!(s.poll(), None);
        s.extend(&frame[5..frame.len() - 1]);
        // ETX present but the BCC byte is still missing.
        assert_eq!(s.poll(), None);
        s.extend(&frame[frame.len() - 1..]);
        assert!(matches!(s.poll(), Some(ScanEvent::DataFrame { .. })));
    }

    #[test]
    fn checksum_mismatch_still_delivers() {
        let mut s = FrameScanner::new();
        let mut frame = data_frame(b"01", b"0201!X");
        let last = frame.len() - 1;
        frame[last] ^= 0x01;
        s.extend(&frame);
        match s.poll() {
            Some(ScanEvent::DataFrame {
                payload,
                ok_checksum,
            }) => {
                assert_eq!(payload, b"0201!X");
                assert!(!ok_checksum);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn byte_at_a_time_equals_whole_buffer() {
        let mut stream = Vec::new();
        stream.extend_from_slice(b"??");
        stream.extend_from_slice(&data_frame(b"AB", b"0200!Rectifier Group"));
        stream.push(ACK);
        stream.extend_from_slice(&data_frame(b"AB", b"0201!Rectifier1"));
        stream.push(EOT);

        let mut whole = FrameScanner::new();
        whole.extend(&stream);
        let mut expected = Vec::new();
        while let Some(ev) = whole.poll() {
            expected.push(ev);
        }

        let mut dribble = FrameScanner::new();
        let mut got = Vec::new();
        for &b in &stream {
            dribble.extend(&[b]);
            while let Some(ev) = dribble.poll() {
                got.push(ev);
            }
        }
        // Junk may arrive split into runs when fed one byte at a time;
        // coalesce before comparing.
        let coalesce = |events: Vec<ScanEvent>| {
            let mut out: Vec<ScanEvent> = Vec::new();
            for ev in events {
                match (out.last_mut(), &ev) {
                    (Some(ScanEvent::JunkSkipped(n)), ScanEvent::JunkSkipped(m)) => *n += m,
                    _ => out.push(ev),
                }
            }
            out
        };
        assert_eq!(coalesce(got), coalesce(expected));
    }
}
