//! Tunable parameters (component G), consolidated onto one struct.
//!
//! The teacher scatters these as module-level constants (`audio.rs`'s
//! `DEFAULT_BUFFER_SIZE`, `client.rs`'s `HEART_INTERVAL`/`HEART_TIMEOUT`);
//! here they live on one struct so a session can be constructed with
//! non-default timing for tests (fast retries, short timeouts) without
//! touching the transport code.

use std::time::Duration;

/// Maximum size of a single wire chunk handed to the modem (`Cmax`).
pub const CMAX: usize = 140;

/// Reed–Solomon data bytes per FEC block.
pub const FEC_DATA_BYTES: usize = 10;
/// Reed–Solomon parity bytes per FEC block.
pub const FEC_PARITY_BYTES: usize = 6;
/// `FEC_DATA_BYTES + FEC_PARITY_BYTES`.
pub const FEC_BLOCK_SIZE: usize = FEC_DATA_BYTES + FEC_PARITY_BYTES;

/// Chunk payload budget left for the session layer once the length byte
/// (`main.rs::prepare_for_air`), the `write_insecure` seq byte, and the FEC
/// codec's block expansion are all accounted for.
///
/// A wire chunk of `n` pre-FEC bytes encodes to
/// `ceil(n / FEC_DATA_BYTES) * FEC_BLOCK_SIZE` bytes, which must fit in
/// `CMAX`. The largest `n` that stays within budget is
/// `(CMAX / FEC_BLOCK_SIZE) * FEC_DATA_BYTES`; two of those bytes are
/// spent on the length byte and the seq byte before the session payload
/// ever sees them.
const MAX_PRE_FEC_FRAME_BYTES: usize = (CMAX / FEC_BLOCK_SIZE) * FEC_DATA_BYTES;
pub const SESSION_CHUNK_SIZE: usize = MAX_PRE_FEC_FRAME_BYTES - 2;

#[derive(Debug, Clone)]
pub struct Config {
    /// Poll precision used as the condvar wait granularity in `BufferedStream::read`.
    pub read_precision: Duration,
    /// Retry interval for `write_insecure`.
    pub resend_timeout: Duration,
    /// Retries before `write_insecure` gives up with `ConnectionAborted`.
    pub abort_retries: u32,
    /// Overall deadline for a single `read_insecure` call.
    pub abort_timeout: Duration,
    /// Delay between handshake retries.
    pub reconnect_interval_sender: Duration,
    pub reconnect_interval_receiver: Duration,
    /// Handshake retries before giving up and restarting from `INIT`.
    pub handshake_retries: u32,
    /// `abort_timeout` used specifically during the SYN/SYN|ACK exchange.
    pub handshake_abort_timeout: Duration,
    /// Idle session timeout after a failed read (session lifecycle).
    pub idle_timeout: Duration,
    /// Overall deadline for `Session::receive`.
    pub receive_timeout: Duration,

    /// Initiator's send-window offset within each second since `first_packet_time`.
    pub sender_window: (Duration, Duration),
    /// Responder's send-window offset within each second since `first_packet_time`.
    pub receiver_window: (Duration, Duration),
    /// Forced stop of an in-flight reception to recover from a false lock.
    pub max_receiving_time: Duration,
    /// Sleep after a successful demodulation, letting the peer finish speaking.
    pub post_decode_settle: Duration,

    /// Hello-phase liveness plaintexts .
    pub hello_sender: &'static [u8],
    pub hello_receiver: &'static [u8],
}

impl Default for Config {
    fn default() -> Self {
        Self {
            read_precision: Duration::from_millis(10),
            resend_timeout: Duration::from_secs(3),
            abort_retries: 5,
            abort_timeout: Duration::from_secs(15),
            reconnect_interval_sender: Duration::from_millis(1500),
            reconnect_interval_receiver: Duration::from_secs(1),
            handshake_retries: 3,
            handshake_abort_timeout: Duration::from_millis(2500),
            idle_timeout: Duration::from_secs(15),
            receive_timeout: Duration::from_secs(600),
            sender_window: (Duration::from_millis(200), Duration::from_millis(300)),
            receiver_window: (Duration::from_millis(700), Duration::from_millis(800)),
            max_receiving_time: Duration::from_secs(6),
            post_decode_settle: Duration::from_millis(150),
            hello_sender: b"Hello",
            hello_receiver: b"Hi",
        }
    }
}

impl Config {
    /// Shrinks every timing-sensitive field for fast in-memory loopback tests.
    #[cfg(test)]
    pub fn fast_for_tests() -> Self {
        Self {
            read_precision: Duration::from_millis(1),
            resend_timeout: Duration::from_millis(50),
            abort_timeout: Duration::from_millis(500),
            reconnect_interval_sender: Duration::from_millis(20),
            reconnect_interval_receiver: Duration::from_millis(15),
            handshake_abort_timeout: Duration::from_millis(200),
            idle_timeout: Duration::from_millis(500),
            receive_timeout: Duration::from_secs(5),
            max_receiving_time: Duration::from_millis(200),
            post_decode_settle: Duration::from_millis(1),
            ..Self::default()
        }
    }
}
