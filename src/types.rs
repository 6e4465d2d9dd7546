//! Wire protocol shapes handshake/DATA/ACK frames and flags.

/// Bitmask flags carried in the second byte of ACK / handshake frames.
pub mod flags {
    pub const SYN: u8 = 1;
    pub const ACK: u8 = 2;
    #[allow(dead_code)]
    pub const RTR: u8 = 4;
}

/// A logical wire frame as exchanged over the acoustic link, pre-FEC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WirePacket {
    /// `[seq][payload...]`, payload length in `[1, Cmax-1]`.
    Data { seq: u8, payload: Vec<u8> },
    /// `[seq][flags]`.
    Ack { seq: u8, flags: u8 },
}

impl WirePacket {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            WirePacket::Data { seq, payload } => {
                let mut out = Vec::with_capacity(1 + payload.len());
                out.push(*seq);
                out.extend_from_slice(payload);
                out
            }
            WirePacket::Ack { seq, flags } => vec![*seq, *flags],
        }
    }

    /// Decodes an ACK-shaped 2-byte frame. DATA frames are never decoded
    /// generically — the transceiver knows from context how many payload
    /// bytes to expect and reads them directly off the buffered stream.
    pub fn decode_ack(bytes: &[u8]) -> Option<WirePacket> {
        if bytes.len() != 2 {
            return None;
        }

        Some(WirePacket::Ack { seq: bytes[0], flags: bytes[1] })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_round_trips_through_encode() {
        let pkt = WirePacket::Data { seq: 7, payload: vec![1, 2, 3] };
        assert_eq!(pkt.encode(), vec![7, 1, 2, 3]);
    }

    #[test]
    fn ack_round_trips() {
        let pkt = WirePacket::Ack { seq: 9, flags: flags::ACK };
        let bytes = pkt.encode();
        assert_eq!(WirePacket::decode_ack(&bytes), Some(pkt));
    }
}
