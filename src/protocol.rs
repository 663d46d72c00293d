/// Radio message protocol between the bridge and the field trigger node.
///
/// Payloads are short UTF-8 text tokens. A configured trigger token starts a
/// capture session; a configured reply token is sent back when the target was
/// seen. On air, every payload is prefixed with a 4-byte RadioHead header
/// `[to, from, id, flags]` so the bridge interoperates with RFM9x peers
/// running the stock Adafruit stack.
use core::fmt;

use heapless::{String, Vec};

use crate::board::RADIO_FIFO_LEN;

/// Length of the RadioHead header in front of every payload
pub const HEADER_LEN: usize = 4;

/// Address accepted by every node
pub const BROADCAST_ADDRESS: u8 = 0xFF;

/// Largest payload that fits in one packet after the header
pub const MAX_PAYLOAD_LEN: usize = RADIO_FIFO_LEN - HEADER_LEN;

/// Shortest on-air packet worth looking at: header plus one payload byte
const MIN_PACKET_LEN: usize = HEADER_LEN + 1;

/// Payload bytes as handed over by the radio (header already stripped)
pub type Packet = Vec<u8, MAX_PAYLOAD_LEN>;

/// Full on-air packet, header included
pub type RawPacket = Vec<u8, RADIO_FIFO_LEN>;

/// Trigger / reply token. Always fits in a single packet.
pub type Token = String<MAX_PAYLOAD_LEN>;

/// Firmware version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// An inbound payload that is not valid UTF-8.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("non-UTF-8 payload of {len} bytes (valid up to byte {valid_up_to})")]
pub struct DecodeError {
    pub len: usize,
    pub valid_up_to: usize,
}

/// Decode a payload as text, trimming only surrounding whitespace.
pub fn decode(payload: &[u8]) -> Result<&str, DecodeError> {
    core::str::from_utf8(payload)
        .map(str::trim)
        .map_err(|e| DecodeError {
            len: payload.len(),
            valid_up_to: e.valid_up_to(),
        })
}

/// Exact, case-sensitive comparison of a decoded message against a token.
pub fn is_trigger(message: &str, trigger: &str) -> bool {
    message == trigger
}

/// RadioHead header carried in front of every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub to: u8,
    pub from: u8,
    pub id: u8,
    pub flags: u8,
}

impl Header {
    pub const BROADCAST: Header = Header {
        to: BROADCAST_ADDRESS,
        from: BROADCAST_ADDRESS,
        id: 0,
        flags: 0,
    };
}

/// Prepend the broadcast header to a payload.
/// Returns None if the payload does not fit in one packet.
pub fn frame(payload: &[u8]) -> Option<RawPacket> {
    frame_with(Header::BROADCAST, payload)
}

pub fn frame_with(header: Header, payload: &[u8]) -> Option<RawPacket> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return None;
    }
    let mut raw = RawPacket::new();
    raw.extend_from_slice(&[header.to, header.from, header.id, header.flags])
        .ok()?;
    raw.extend_from_slice(payload).ok()?;
    Some(raw)
}

/// Strip the header from a received packet.
///
/// Returns None for runts and for packets addressed to another node.
/// A node listening on the broadcast address accepts everything.
pub fn unframe(raw: &[u8], node: u8) -> Option<&[u8]> {
    if raw.len() < MIN_PACKET_LEN {
        return None;
    }
    let to = raw[0];
    if node != BROADCAST_ADDRESS && to != node && to != BROADCAST_ADDRESS {
        return None;
    }
    Some(&raw[HEADER_LEN..])
}

/// Direction of a radio message, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// A decoded radio message. Ephemeral, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioMessage<'a> {
    pub payload: &'a str,
    pub direction: Direction,
}

impl<'a> RadioMessage<'a> {
    pub fn inbound(payload: &'a str) -> Self {
        Self {
            payload,
            direction: Direction::Inbound,
        }
    }

    pub fn outbound(payload: &'a str) -> Self {
        Self {
            payload,
            direction: Direction::Outbound,
        }
    }
}

impl fmt::Display for RadioMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.direction {
            Direction::Inbound => "RX",
            Direction::Outbound => "TX",
        };
        write!(f, "LoRa {dir}: '{}'", self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Decoding ────────────────────────────────────────────────────

    #[test]
    fn decode_trims_surrounding_whitespace() {
        assert_eq!(decode(b"  0.2\r\n").unwrap(), "0.2");
        assert_eq!(decode(b"\t2.0 ").unwrap(), "2.0");
    }

    #[test]
    fn decode_keeps_inner_whitespace_and_case() {
        assert_eq!(decode(b" Cam Pi ").unwrap(), "Cam Pi");
    }

    #[test]
    fn decode_rejects_invalid_utf8() {
        let err = decode(&[0x30, 0xFF, 0xFE]).unwrap_err();
        assert_eq!(err.len, 3);
        assert_eq!(err.valid_up_to, 1);
    }

    #[test]
    fn decode_empty_payload_is_empty_text() {
        assert_eq!(decode(b"").unwrap(), "");
    }

    // ── Trigger matching ────────────────────────────────────────────

    #[test]
    fn trigger_is_exact_match() {
        assert!(is_trigger("0.2", "0.2"));
        assert!(!is_trigger("0.20", "0.2"));
        assert!(!is_trigger("0.", "0.2"));
    }

    #[test]
    fn trigger_is_case_sensitive() {
        assert!(!is_trigger("GO", "go"));
    }

    #[test]
    fn padded_payload_matches_after_decode() {
        let msg = decode(b" 0.2\n").unwrap();
        assert!(is_trigger(msg, "0.2"));
    }

    // ── Framing ─────────────────────────────────────────────────────

    #[test]
    fn frame_prepends_broadcast_header() {
        let raw = frame(b"2.0").unwrap();
        assert_eq!(raw.as_slice(), &[0xFF, 0xFF, 0, 0, b'2', b'.', b'0']);
    }

    #[test]
    fn frame_rejects_oversized_payload() {
        let big = [b'x'; MAX_PAYLOAD_LEN + 1];
        assert!(frame(&big).is_none());
        let max = [b'x'; MAX_PAYLOAD_LEN];
        assert_eq!(frame(&max).unwrap().len(), RADIO_FIFO_LEN);
    }

    #[test]
    fn unframe_strips_header() {
        let raw = [0xFF, 0x01, 0x07, 0x00, b'0', b'.', b'2'];
        assert_eq!(unframe(&raw, BROADCAST_ADDRESS), Some(&b"0.2"[..]));
    }

    #[test]
    fn unframe_drops_runts() {
        assert_eq!(unframe(&[0xFF, 0xFF, 0, 0], BROADCAST_ADDRESS), None);
        assert_eq!(unframe(&[], BROADCAST_ADDRESS), None);
    }

    #[test]
    fn unframe_filters_by_destination() {
        let to_node_2 = [0x02, 0x01, 0, 0, b'x'];
        assert_eq!(unframe(&to_node_2, 0x03), None);
        assert_eq!(unframe(&to_node_2, 0x02), Some(&b"x"[..]));
        // Broadcast listener sees everything
        assert_eq!(unframe(&to_node_2, BROADCAST_ADDRESS), Some(&b"x"[..]));
        // Broadcast packets reach every node
        let broadcast = [0xFF, 0x01, 0, 0, b'y'];
        assert_eq!(unframe(&broadcast, 0x03), Some(&b"y"[..]));
    }

    // ── Logging format ──────────────────────────────────────────────

    #[test]
    fn radio_message_display() {
        let rx = RadioMessage::inbound("0.2");
        let tx = RadioMessage::outbound("2.0");
        assert_eq!(format!("{rx}"), "LoRa RX: '0.2'");
        assert_eq!(format!("{tx}"), "LoRa TX: '2.0'");
    }
}
