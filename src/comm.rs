/// Communication layer — the LoRa link to the field trigger node.
///
/// The bridge only ever does two things with the radio: poll for an inbound
/// payload without blocking, and fire off a short text token. There is no
/// acknowledgement, sequencing or retransmission; a send returns once the
/// packet has been handed to the transceiver.

use crate::error::Result;
use crate::protocol::{Packet, RadioMessage};

/// Upper bound on packets discarded by [`drain`] in one go
pub const MAX_DRAIN: usize = 16;

/// A half-duplex packet radio.
pub trait Radio {
    /// Return the next pending payload, or `None` immediately if there is none.
    ///
    /// The payload has any link-layer header already stripped. Errors here
    /// are hardware faults and are not retried.
    fn receive(&mut self) -> Result<Option<Packet>>;

    /// Transmit a payload. Fire-and-forget: no delivery confirmation.
    fn send(&mut self, payload: &[u8]) -> Result<()>;
}

impl<R: Radio + ?Sized> Radio for &mut R {
    fn receive(&mut self) -> Result<Option<Packet>> {
        (**self).receive()
    }

    fn send(&mut self, payload: &[u8]) -> Result<()> {
        (**self).send(payload)
    }
}

/// Send a text token as one packet.
pub fn send_token<R: Radio + ?Sized>(radio: &mut R, token: &str) -> Result<()> {
    radio.send(token.as_bytes())?;
    log::info!("{}", RadioMessage::outbound(token));
    Ok(())
}

/// One-shot status ping, independent of the capture pipeline.
pub fn send_status<R: Radio + ?Sized>(radio: &mut R, text: &str) -> Result<()> {
    send_token(radio, text)?;
    log::info!("Status ping sent");
    Ok(())
}

/// Discard packets the transport buffered while the bridge was busy.
/// Returns how many were dropped.
pub fn drain<R: Radio + ?Sized>(radio: &mut R) -> Result<usize> {
    let mut dropped = 0;
    while dropped < MAX_DRAIN {
        match radio.receive()? {
            Some(_) => dropped += 1,
            None => break,
        }
    }
    if dropped > 0 {
        log::info!("Dropped {} packet(s) received during session", dropped);
    }
    Ok(dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct LoopbackRadio {
        inbox: VecDeque<Packet>,
        sent: Vec<Vec<u8>>,
    }

    impl Radio for LoopbackRadio {
        fn receive(&mut self) -> Result<Option<Packet>> {
            Ok(self.inbox.pop_front())
        }

        fn send(&mut self, payload: &[u8]) -> Result<()> {
            self.sent.push(payload.to_vec());
            Ok(())
        }
    }

    fn packet(bytes: &[u8]) -> Packet {
        Packet::from_slice(bytes).unwrap()
    }

    #[test]
    fn send_token_transmits_exact_bytes() {
        let mut radio = LoopbackRadio::default();
        send_token(&mut radio, "2.0").unwrap();
        assert_eq!(radio.sent, vec![b"2.0".to_vec()]);
    }

    #[test]
    fn status_ping_sends_once() {
        let mut radio = LoopbackRadio::default();
        send_status(&mut radio, "CamPi Status 1").unwrap();
        assert_eq!(radio.sent, vec![b"CamPi Status 1".to_vec()]);
    }

    #[test]
    fn drain_empties_pending_packets() {
        let mut radio = LoopbackRadio::default();
        radio.inbox.push_back(packet(b"0.2"));
        radio.inbox.push_back(packet(b"0.2"));
        assert_eq!(drain(&mut radio).unwrap(), 2);
        assert!(radio.receive().unwrap().is_none());
    }

    #[test]
    fn drain_is_bounded() {
        let mut radio = LoopbackRadio::default();
        for _ in 0..MAX_DRAIN + 3 {
            radio.inbox.push_back(packet(b"x"));
        }
        assert_eq!(drain(&mut radio).unwrap(), MAX_DRAIN);
        assert_eq!(radio.inbox.len(), 3);
    }

    #[test]
    fn mut_ref_forwards() {
        let mut radio = LoopbackRadio::default();
        {
            let mut borrowed = &mut radio;
            send_token(&mut borrowed, "hi").unwrap();
        }
        assert_eq!(radio.sent.len(), 1);
    }
}
