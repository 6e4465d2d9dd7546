//! Authenticated-liveness encrypted session (component E).
//!
//! Key exchange and key wiping are grounded in `other_examples`'
//! `summit-core/crypto.rs` (`x25519_dalek` + `zeroize`) rather than the
//! prototype's `monocypher` bindings, since `x25519-dalek` is the idiomatic
//! Rust equivalent for ephemeral Curve25519 exchange. The raw stream cipher,
//! nonce discipline and Hello/Hi liveness check are grounded directly in
//! `cryptoec.py`'s `SymmetricKey`/`KeyExchanger` and `alternative.py`'s
//! `key_exchange_sender`/`key_exchange_receiver`.

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20Legacy;
use rand_core::OsRng;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::config::{Config, SESSION_CHUNK_SIZE};
use crate::errors::{AircomError, ProtocolError, Result};
use crate::logging::LogSink;
use crate::transceiver::Transceiver;
use crate::types::flags;

/// A session's symmetric key plus its monotonic nonce counter. The key
/// bytes are wiped on drop; `monocypher.wipe` in the prototype, `Zeroizing`
/// here.
pub struct SessionKey {
    key: Zeroizing<[u8; 32]>,
    nonce_counter: u64,
}

impl SessionKey {
    fn new(key: [u8; 32]) -> Self {
        Self { key: Zeroizing::new(key), nonce_counter: 0 }
    }

    /// Next 8-byte little-endian nonce. Wraps at 2^64, same as the
    /// prototype's `% 256**8` (which is exactly `u64::MAX + 1`).
    fn next_nonce(&mut self) -> [u8; 8] {
        let nonce = self.nonce_counter.to_le_bytes();
        self.nonce_counter = self.nonce_counter.wrapping_add(1);
        nonce
    }

    /// Encrypts with a fresh nonce, prepending it: `nonce(8) ∥ ciphertext`.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Vec<u8> {
        let nonce = self.next_nonce();
        let mut buf = plaintext.to_vec();
        let mut cipher = ChaCha20Legacy::new((&*self.key).into(), (&nonce).into());
        cipher.apply_keystream(&mut buf);

        let mut out = Vec::with_capacity(8 + buf.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&buf);
        out
    }

    /// Decrypts a `nonce(8) ∥ ciphertext` blob produced by [`Self::encrypt`].
    /// The nonce is read from the wire, not from `self` — this is a raw
    /// stream cipher, not an AEAD, so the caller authenticates liveness
    /// out-of-band.
    pub fn decrypt(&self, framed: &[u8]) -> Vec<u8> {
        let (nonce, ciphertext) = framed.split_at(8);
        let nonce: [u8; 8] = nonce.try_into().expect("split_at(8) guarantees an 8-byte slice");
        let mut buf = ciphertext.to_vec();
        let mut cipher = ChaCha20Legacy::new((&*self.key).into(), (&nonce).into());
        cipher.apply_keystream(&mut buf);
        buf
    }
}

/// Base85-encoded fingerprint of a public key, meant for out-of-band
/// verification by the two human operators (the
/// Hello exchange alone does not authenticate against an active attacker).
pub fn fingerprint(pubkey: &X25519PublicKey) -> String {
    base85::encode(pubkey.as_bytes())
}

fn generate_ephemeral() -> (StaticSecret, X25519PublicKey) {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public = X25519PublicKey::from(&secret);
    (secret, public)
}

/// Sends `bytes` as a reliable length-prefixed unit: a 4-byte LE length
/// header in its own frame, then `bytes` itself split into
/// `SESSION_CHUNK_SIZE`-byte wire chunks, each its own `write_insecure`
/// frame.
fn send_framed(tx: &mut Transceiver, bytes: &[u8]) -> Result<()> {
    let len = (bytes.len() as u32).to_le_bytes();
    tx.write_insecure(&len)?;
    for chunk in bytes.chunks(SESSION_CHUNK_SIZE) {
        tx.write_insecure(chunk)?;
    }
    Ok(())
}

/// Reverses [`send_framed`]: reads the 4-byte length header, then
/// accumulates chunks of up to `SESSION_CHUNK_SIZE` bytes until all `L`
/// payload bytes have arrived.
fn recv_framed(tx: &mut Transceiver, abort_timeout: std::time::Duration) -> Result<Vec<u8>> {
    let len_bytes = tx.read_insecure(4, abort_timeout, true)?.into_payload();
    let len = u32::from_le_bytes(len_bytes.try_into().expect("read_insecure(4) returns 4 bytes")) as usize;

    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        let chunk_size = (len - out.len()).min(SESSION_CHUNK_SIZE);
        out.extend(tx.read_insecure(chunk_size, abort_timeout, true)?.into_payload());
    }
    Ok(out)
}

/// Initiator side: publish our ephemeral public key, receive theirs, derive
/// the shared secret, then prove liveness with the Hello/Hi/ACK exchange.
pub fn key_exchange_sender(tx: &mut Transceiver, cfg: &Config, log: &LogSink) -> Result<SessionKey> {
    let (secret, public) = generate_ephemeral();
    log.info("session", &format!("my fingerprint: {}", fingerprint(&public)));
    tx.write_insecure(public.as_bytes())?;

    let their_bytes = tx.read_insecure(32, cfg.handshake_abort_timeout, true)?.into_payload();
    let their_pubkey = decode_pubkey(&their_bytes)?;
    log.info("session", &format!("their fingerprint: {}", fingerprint(&their_pubkey)));

    let shared = secret.diffie_hellman(&their_pubkey);
    let mut key = SessionKey::new(*shared.as_bytes());

    let hello_ct = key.encrypt(cfg.hello_sender);
    send_framed(tx, &hello_ct)?;

    let hi_ct = recv_framed(tx, cfg.handshake_abort_timeout)?;
    if key.decrypt(&hi_ct) != cfg.hello_receiver {
        return Err(AircomError::Protocol(ProtocolError::HelloMismatch));
    }

    let ack_ct = key.encrypt(&[flags::ACK]);
    send_framed(tx, &ack_ct)?;

    log.info("session", "connection established");
    Ok(key)
}

/// Responder side, mirroring [`key_exchange_sender`].
pub fn key_exchange_receiver(tx: &mut Transceiver, cfg: &Config, log: &LogSink) -> Result<SessionKey> {
    let their_bytes = tx.read_insecure(32, cfg.handshake_abort_timeout, true)?.into_payload();
    let their_pubkey = decode_pubkey(&their_bytes)?;
    log.info("session", &format!("their fingerprint: {}", fingerprint(&their_pubkey)));

    let (secret, public) = generate_ephemeral();
    log.info("session", &format!("my fingerprint: {}", fingerprint(&public)));
    tx.write_insecure(public.as_bytes())?;

    let shared = secret.diffie_hellman(&their_pubkey);
    let mut key = SessionKey::new(*shared.as_bytes());

    let hello_ct = recv_framed(tx, cfg.handshake_abort_timeout)?;
    if key.decrypt(&hello_ct) != cfg.hello_sender {
        return Err(AircomError::Protocol(ProtocolError::HelloMismatch));
    }

    let hi_ct = key.encrypt(cfg.hello_receiver);
    send_framed(tx, &hi_ct)?;

    let ack_ct = recv_framed(tx, cfg.handshake_abort_timeout)?;
    if key.decrypt(&ack_ct).first() != Some(&flags::ACK) {
        return Err(AircomError::Protocol(ProtocolError::UnexpectedFlags(0)));
    }

    log.info("session", "connection established");
    Ok(key)
}

fn decode_pubkey(bytes: &[u8]) -> Result<X25519PublicKey> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| AircomError::Protocol(ProtocolError::UnexpectedFlags(0)))?;
    Ok(X25519PublicKey::from(arr))
}

/// Encrypts `plaintext` once into `nonce(8) ∥ ciphertext` and reliably
/// transmits that payload length-prefixed, wire-chunked at
/// `SESSION_CHUNK_SIZE` bytes.
pub fn send(tx: &mut Transceiver, key: &mut SessionKey, plaintext: &[u8]) -> Result<()> {
    let payload = key.encrypt(plaintext);
    send_framed(tx, &payload)
}

/// Reassembles a message sent by [`send`]: reads the length-prefixed
/// `nonce ∥ ciphertext` payload back from its wire chunks and decrypts it
/// once.
pub fn receive(tx: &mut Transceiver, key: &SessionKey, cfg: &Config) -> Result<Vec<u8>> {
    let framed = recv_framed(tx, cfg.receive_timeout)?;
    Ok(key.decrypt(&framed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::BufferedStream;
    use crate::logging::LogSink;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn encrypt_decrypt_round_trips() {
        let mut key = SessionKey::new([7u8; 32]);
        let ct = key.encrypt(b"hello, session!");
        let pt = key.decrypt(&ct);
        assert_eq!(pt, b"hello, session!");
    }

    #[test]
    fn nonces_never_repeat_across_calls() {
        let mut key = SessionKey::new([1u8; 32]);
        let a = key.encrypt(b"a");
        let b = key.encrypt(b"a");
        assert_ne!(&a[..8], &b[..8]);
    }

    #[test]
    fn fingerprint_is_stable_for_same_key() {
        let (_, public) = generate_ephemeral();
        assert_eq!(fingerprint(&public), fingerprint(&public));
    }

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

    /// A 200-byte plaintext is one encryption (one nonce), framed as
    /// `len(4) ∥ nonce(8) ∥ ciphertext(200)` — 212 bytes, split into two
    /// `SESSION_CHUNK_SIZE` wire chunks — and reassembled with one decrypt.
    #[test]
    fn send_receive_round_trips_a_multi_chunk_message() {
        let a = Arc::new(BufferedStream::new(true));
        let b = Arc::new(BufferedStream::new(false));
        let bridge_running = bridge_streams(a.clone(), b.clone());
        let cfg = Config::fast_for_tests();
        let log = LogSink::disabled();

        let mut tx = Transceiver::new(a, cfg.clone(), log.clone());
        let mut rx = Transceiver::new(b, cfg, log);

        let plaintext = vec![0x42u8; 200];
        let mut send_key = SessionKey::new([3u8; 32]);
        let recv_key = SessionKey::new([3u8; 32]);

        let sender = {
            let plaintext = plaintext.clone();
            thread::spawn(move || send(&mut tx, &mut send_key, &plaintext))
        };
        let received = receive(&mut rx, &recv_key, &Config::fast_for_tests()).unwrap();

        sender.join().unwrap().unwrap();
        assert_eq!(received, plaintext);
        bridge_running.store(false, Ordering::Relaxed);
    }

    #[test]
    fn send_receive_round_trips_an_empty_message() {
        let a = Arc::new(BufferedStream::new(true));
        let b = Arc::new(BufferedStream::new(false));
        let bridge_running = bridge_streams(a.clone(), b.clone());
        let cfg = Config::fast_for_tests();
        let log = LogSink::disabled();

        let mut tx = Transceiver::new(a, cfg.clone(), log.clone());
        let mut rx = Transceiver::new(b, cfg, log);

        let mut send_key = SessionKey::new([9u8; 32]);
        let recv_key = SessionKey::new([9u8; 32]);

        let sender = thread::spawn(move || send(&mut tx, &mut send_key, &[]));
        let received = receive(&mut rx, &recv_key, &Config::fast_for_tests()).unwrap();

        sender.join().unwrap().unwrap();
        assert_eq!(received, Vec::<u8>::new());
        bridge_running.store(false, Ordering::Relaxed);
    }
}
