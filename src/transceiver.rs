//! Reliable transceiver (component D): a mini-TCP layered on the buffered
//! half-duplex stream.
//!
//! Grounded in the prototype's `alternative.py` `ReliableTransceiver`:
//! `read`, `write`, `read_equals`, `connect_init_sender`/`connect_init_receiver`.
//! One behavioral change from the prototype :
//! where Python's `read` returns either `bytes` or `tuple[bytes, bytes]`
//! depending on `send_ack`, [`Transceiver::read_insecure`] always returns a
//! [`ReadOutcome`], so callers don't need to inspect `send_ack` to know the
//! shape of what they got back.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::buffers::BufferedStream;
use crate::config::Config;
use crate::errors::{AircomError, ProtocolError, Result};
use crate::logging::LogSink;
use crate::types::{flags, WirePacket};

/// Result of [`Transceiver::read_insecure`]. Mirrors the prototype's
/// `send_ack` branch but as a tagged enum instead of a shape-shifting tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `send_ack` was true: the ACK was already sent, here's the payload.
    Delivered(Vec<u8>),
    /// `send_ack` was false: caller owns sending `ack_packet` themselves.
    PendingAck { ack_packet: Vec<u8>, payload: Vec<u8> },
}

impl ReadOutcome {
    pub fn into_payload(self) -> Vec<u8> {
        match self {
            ReadOutcome::Delivered(p) => p,
            ReadOutcome::PendingAck { payload, .. } => payload,
        }
    }
}

pub struct Transceiver {
    pub stream: Arc<BufferedStream>,
    last_received_packet: i32,
    last_sent_packet: i32,
    config: Config,
    log: LogSink,
}

impl Transceiver {
    pub fn new(stream: Arc<BufferedStream>, config: Config, log: LogSink) -> Self {
        Self { stream, last_received_packet: -1, last_sent_packet: -1, config, log }
    }

    /// Reads exactly `data.len()` bytes and compares them to `data`,
    /// switching the stream to read first. Used by the handshake's
    /// ACK-equality checks.
    pub fn read_equals(&self, timeout: Duration, data: &[u8]) -> bool {
        let size = data.len();
        let deadline = Instant::now() + timeout;
        let mut result = Vec::new();
        self.stream.turn_read();

        loop {
            if Instant::now() >= deadline {
                return false;
            }

            let buffer = self.stream.read(size - result.len(), false, None);
            result.extend(buffer);

            if result.len() > size {
                return false;
            }
            if result.len() == size {
                return result == data;
            }

            std::thread::sleep(self.config.read_precision);
        }
    }

    /// Reads a `[seq][payload; size]` frame. Duplicate seqs (re-delivery of
    /// an already-ACKed packet) are silently re-ACKed and skipped; a seq
    /// strictly ahead of expected aborts the connection (an open question
    /// (b): a more lenient discard-and-wait policy is possible but not
    /// mandated here).
    pub fn read_insecure(&mut self, size: usize, abort_timeout: Duration, send_ack: bool) -> Result<ReadOutcome> {
        if size == 0 {
            return Err(AircomError::Protocol(ProtocolError::UnexpectedFlags(0)));
        }

        self.last_received_packet = (self.last_received_packet + 1) % 256;
        let expected = self.last_received_packet;

        let start = Instant::now();
        self.stream.turn_read();

        let seq = loop {
            if start.elapsed() >= abort_timeout {
                return Err(AircomError::ConnectionAborted);
            }

            let buffer = self.stream.read(1, false, None);
            if buffer.is_empty() {
                std::thread::sleep(self.config.read_precision);
                continue;
            }

            let batch_id = buffer[0] as i32;

            if batch_id > expected {
                self.log.warning("transceiver", &format!("seq skew: got {batch_id}, expected {expected}"));
                std::thread::sleep(Duration::from_millis(500));
                return Err(AircomError::Protocol(ProtocolError::SeqSkew { got: batch_id as u8, expected: expected as u8 }));
            }

            if batch_id < expected {
                std::thread::sleep(Duration::from_millis(500));
                self.stream.clear_input_buffer();
                self.stream.turn_write();
                self.stream.write(WirePacket::Ack { seq: batch_id as u8, flags: flags::ACK }.encode(), true, Some(abort_timeout));
                self.stream.turn_read();
                continue;
            }

            break batch_id as u8;
        };

        let ack_packet = WirePacket::Ack { seq, flags: flags::ACK }.encode();
        let mut result = Vec::with_capacity(size);

        while result.len() < size {
            if start.elapsed() >= abort_timeout {
                return Err(AircomError::ConnectionAborted);
            }

            let buffer = self.stream.read(size - result.len(), false, None);
            result.extend(buffer);

            if result.len() < size {
                std::thread::sleep(self.config.read_precision);
            }
        }

        if send_ack {
            self.stream.turn_write();
            self.stream.write(ack_packet, true, Some(abort_timeout));
            self.stream.turn_read();
            Ok(ReadOutcome::Delivered(result))
        } else {
            Ok(ReadOutcome::PendingAck { ack_packet, payload: result })
        }
    }

    /// Writes `[seq]data` and blocks until the matching ACK arrives,
    /// resending on `resend_timeout` up to `abort_retries` times.
    pub fn write_insecure(&mut self, data: &[u8]) -> Result<()> {
        self.last_sent_packet = (self.last_sent_packet + 1) % 256;
        let seq = self.last_sent_packet as u8;

        let mut full = Vec::with_capacity(1 + data.len());
        full.push(seq);
        full.extend_from_slice(data);

        self.stream.turn_write();
        self.stream.write(full.clone(), true, Some(self.config.abort_timeout));

        let mut retries = 0u32;
        let mut last_resend = Instant::now();

        loop {
            if last_resend.elapsed() >= self.config.resend_timeout {
                self.stream.turn_write();
                self.stream.write(full.clone(), true, Some(self.config.abort_timeout));
                retries += 1;
                if retries >= self.config.abort_retries {
                    return Err(AircomError::ConnectionAborted);
                }
                last_resend = Instant::now();
            }

            self.stream.turn_read();
            let response = self.stream.read(2, false, None);
            if response.len() < 2 {
                std::thread::sleep(self.config.read_precision);
                continue;
            }

            let WirePacket::Ack { seq: resp_seq, flags: resp_flags } = WirePacket::decode_ack(&response)
                .expect("response.len() == 2 checked above")
            else {
                unreachable!("decode_ack never returns a Data variant")
            };
            if resp_flags == flags::ACK && resp_seq == seq {
                return Ok(());
            }

            self.log.warning("transceiver", &format!("unexpected ack (seq {resp_seq}, flags {resp_flags:#04x})"));
            self.stream.turn_write();
            self.stream.write(full.clone(), true, Some(self.config.abort_timeout));
            retries += 1;
            if retries >= self.config.abort_retries {
                return Err(AircomError::ConnectionAborted);
            }
            last_resend = Instant::now();
        }
    }

    /// Sender side of the SYN/SYN|ACK/ACK handshake. Blocks until
    /// established, retrying the whole exchange indefinitely in batches of
    /// `handshake_retries`.
    pub fn connect_init_sender(&mut self) -> Instant {
        loop {
            self.stream.clear_input_buffer();
            self.stream.clear_output_buffer();
            self.last_sent_packet = -1;
            self.last_received_packet = -1;
            self.stream.turn_write();

            let mut retries = self.config.handshake_retries as i32;

            while retries >= 0 {
                self.stream.turn_write();
                self.stream.write(vec![flags::SYN], true, Some(self.config.handshake_abort_timeout));
                self.log.verbose("transceiver", "sent SYN");
                self.stream.turn_read();

                match self.read_insecure(1, self.config.handshake_abort_timeout, false) {
                    Ok(ReadOutcome::PendingAck { ack_packet, payload }) => {
                        if payload.first() != Some(&(flags::SYN | flags::ACK)) {
                            self.log.warning("transceiver", "peer did not respond with SYN|ACK");
                            std::thread::sleep(self.config.reconnect_interval_sender);
                            retries -= 1;
                            continue;
                        }

                        self.stream.turn_write();
                        self.stream.write(ack_packet, true, Some(self.config.handshake_abort_timeout));
                        self.log.verbose("transceiver", "sent ACK, handshake complete");
                        let now = Instant::now();
                        self.stream.set_first_packet_time(now);
                        return now;
                    }
                    Ok(ReadOutcome::Delivered(_)) => unreachable!("send_ack=false always yields PendingAck"),
                    Err(_) => {
                        retries = -1;
                    }
                }
            }
        }
    }

    /// Receiver side of the SYN/SYN|ACK/ACK handshake.
    pub fn connect_init_receiver(&mut self) -> Instant {
        loop {
            self.stream.clear_input_buffer();
            self.stream.clear_output_buffer();
            self.last_sent_packet = -1;
            self.last_received_packet = -1;
            self.stream.turn_read();

            let syn = self.stream.read(1, true, None);
            if syn.first() != Some(&flags::SYN) {
                self.log.warning("transceiver", "expected SYN, got something else");
                continue;
            }

            self.log.verbose("transceiver", "received SYN, sending SYN|ACK");
            let mut retries = self.config.handshake_retries as i32;
            self.last_sent_packet += 1;
            let syn_ack = WirePacket::Ack { seq: self.last_sent_packet as u8, flags: flags::SYN | flags::ACK }.encode();

            let established = loop {
                if retries < 0 {
                    break false;
                }

                self.stream.turn_write();
                self.stream.write(syn_ack.clone(), true, Some(self.config.handshake_abort_timeout));
                self.stream.turn_read();

                let expected_ack = WirePacket::Ack { seq: self.last_sent_packet as u8, flags: flags::ACK }.encode();
                if self.read_equals(self.config.reconnect_interval_receiver, &expected_ack) {
                    self.log.verbose("transceiver", "received ACK, handshake complete");
                    break true;
                }

                retries -= 1;
            };

            if established {
                let now = Instant::now();
                self.stream.set_first_packet_time(now);
                return now;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogSink;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn pair() -> (Arc<BufferedStream>, Arc<BufferedStream>) {
        (Arc::new(BufferedStream::new(true)), Arc::new(BufferedStream::new(false)))
    }

    /// Shuttles each stream's popped output into the other's input, so a
    /// `Transceiver` built on `a` and a peer poking `b` directly are
    /// actually talking to each other rather than two disconnected buffers.
    fn bridge_streams(a: Arc<BufferedStream>, b: Arc<BufferedStream>) -> Arc<AtomicBool> {
        let running = Arc::new(AtomicBool::new(true));
        let running_thread = running.clone();
        thread::spawn(move || {
            while running_thread.load(Ordering::Relaxed) {
                if let Some(chunk) = a.pop_output() {
                    b.push_input(&chunk);
                }
                if let Some(chunk) = b.pop_output() {
                    a.push_input(&chunk);
                }
                thread::sleep(Duration::from_millis(1));
            }
        });
        running
    }

    #[test]
    fn write_insecure_completes_when_peer_acks() {
        let (a, b) = pair();
        let bridge_running = bridge_streams(a.clone(), b.clone());
        let cfg = Config::fast_for_tests();
        let log = LogSink::disabled();

        let mut tx = Transceiver::new(a.clone(), cfg.clone(), log.clone());
        let handle = thread::spawn(move || tx.write_insecure(b"hi").map(|_| ()));

        // Peer: read the [seq]data frame that arrived via the bridge and ack it.
        let frame = b.read(1 + 2, true, Some(Duration::from_secs(1)));
        let seq = frame[0];
        b.write(vec![seq, flags::ACK], false, None);

        assert!(handle.join().unwrap().is_ok());
        bridge_running.store(false, Ordering::Relaxed);
    }

    #[test]
    fn read_insecure_acks_and_returns_delivered() {
        let (a, b) = pair();
        let bridge_running = bridge_streams(a.clone(), b.clone());
        let cfg = Config::fast_for_tests();
        let log = LogSink::disabled();
        let mut rx = Transceiver::new(a.clone(), cfg.clone(), log);

        b.write(vec![0u8, b'h', b'i'], false, None);

        let outcome = rx.read_insecure(2, Duration::from_secs(1), true).unwrap();
        assert_eq!(outcome, ReadOutcome::Delivered(vec![b'h', b'i']));

        let ack = b.read(2, true, Some(Duration::from_secs(1)));
        assert_eq!(ack, vec![0u8, flags::ACK]);
        bridge_running.store(false, Ordering::Relaxed);
    }
}
