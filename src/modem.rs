//! Acoustic modem (component B, modulation half).
//!
//! No Rust crate wraps ggwave, the FSK library the prototype's
//! `alternative.py` built `AlternativeStream` on top of. This module
//! self-implements a simple binary-FSK (BFSK) tone codec instead, carrying
//! forward the *design* of the earlier tone-based prototype
//! (`soundcom/audioconsts.py`'s evenly-spaced channel tones,
//! `main.py`'s `Freq`) rather than its multi-channel framing: one marker tone
//! for frame start, two data tones for bit 0 / bit 1, decoded with a
//! Goertzel per-bit energy comparison instead of a full FFT.

use crate::config::CMAX;

const MARKER_HZ: f32 = 1985.0;
const BIT0_HZ: f32 = 4315.0;
const BIT1_HZ: f32 = 6468.0;
const MARKER_DURATION_S: f32 = 0.08;
const BIT_DURATION_S: f32 = 0.02;

/// Turns byte chunks into tone bursts and back. `Cmax`-sized chunks are the
/// unit the transceiver hands the modem — one wire frame per call.
pub struct ToneModem {
    sample_rate: u32,
    volume: f32,
}

impl ToneModem {
    pub fn new(sample_rate: u32, volume: f32) -> Self {
        Self { sample_rate, volume }
    }

    fn samples_per_bit(&self) -> usize {
        (self.sample_rate as f32 * BIT_DURATION_S) as usize
    }

    fn samples_per_marker(&self) -> usize {
        (self.sample_rate as f32 * MARKER_DURATION_S) as usize
    }

    fn tone(&self, freq: f32, n_samples: usize) -> Vec<f32> {
        (0..n_samples)
            .map(|i| {
                let t = i as f32 / self.sample_rate as f32;
                self.volume * (2.0 * std::f32::consts::PI * freq * t).sin()
            })
            .collect()
    }

    /// Encodes `chunk` (at most `Cmax` bytes) into a marker-prefixed tone
    /// burst, MSB-first per byte. The chunk's length is itself encoded as
    /// the first data byte, so [`Self::decode`] is self-describing and
    /// never needs the caller to already know how many bytes are coming —
    /// matching the modem façade's `decode(samples) -> optional chunk`
    /// signature, with no separate length channel.
    pub fn encode(&self, chunk: &[u8]) -> Vec<f32> {
        debug_assert!(chunk.len() <= CMAX);
        let mut out = self.tone(MARKER_HZ, self.samples_per_marker());
        out.extend(self.encode_byte(chunk.len() as u8));
        for &byte in chunk {
            out.extend(self.encode_byte(byte));
        }
        out
    }

    fn encode_byte(&self, byte: u8) -> Vec<f32> {
        let mut out = Vec::with_capacity(8 * self.samples_per_bit());
        for bit_idx in (0..8).rev() {
            let bit = (byte >> bit_idx) & 1;
            let freq = if bit == 1 { BIT1_HZ } else { BIT0_HZ };
            out.extend(self.tone(freq, self.samples_per_bit()));
        }
        out
    }

    fn decode_byte(&self, window: &[f32]) -> u8 {
        let bit_len = self.samples_per_bit();
        let mut byte = 0u8;
        for i in 0..8 {
            let bit_window = &window[i * bit_len..(i + 1) * bit_len];
            let e0 = goertzel_energy(bit_window, self.sample_rate, BIT0_HZ);
            let e1 = goertzel_energy(bit_window, self.sample_rate, BIT1_HZ);
            byte = (byte << 1) | if e1 > e0 { 1 } else { 0 };
        }
        byte
    }

    /// Whether `samples` contains a marker tone without yet containing a
    /// complete chunk — used to gate the send-window scheduler so a peer
    /// doesn't start talking over an in-flight reception.
    pub fn is_receiving(&self, samples: &[f32]) -> bool {
        let marker_len = self.samples_per_marker();
        if samples.len() < marker_len {
            return false;
        }
        find_marker(samples, marker_len, self.sample_rate, MARKER_HZ).is_some() && self.decode(samples).is_none()
    }

    /// Finds the marker tone in `samples`, decodes the length byte that
    /// follows it, then decodes that many data bytes. Returns `None` if no
    /// marker is found yet, or the buffer ends before the full chunk has
    /// arrived — the caller retries on the next call with more samples.
    pub fn decode(&self, samples: &[f32]) -> Option<Vec<u8>> {
        let marker_len = self.samples_per_marker();
        let bit_len = self.samples_per_bit();
        if bit_len == 0 || samples.len() < marker_len {
            return None;
        }

        let marker_start = find_marker(samples, marker_len, self.sample_rate, MARKER_HZ)?;
        let len_start = marker_start + marker_len;
        if samples.len() < len_start + 8 * bit_len {
            return None;
        }

        let len = self.decode_byte(&samples[len_start..len_start + 8 * bit_len]) as usize;
        let data_start = len_start + 8 * bit_len;
        let needed = len * 8 * bit_len;
        if samples.len() < data_start + needed {
            return None;
        }

        let mut out = Vec::with_capacity(len);
        let mut pos = data_start;
        for _ in 0..len {
            out.push(self.decode_byte(&samples[pos..pos + 8 * bit_len]));
            pos += 8 * bit_len;
        }
        Some(out)
    }
}

/// Slides a marker-length window across `samples` looking for a strong
/// `target_hz` tone, returning the window's start index.
fn find_marker(samples: &[f32], marker_len: usize, sample_rate: u32, target_hz: f32) -> Option<usize> {
    let step = (marker_len / 4).max(1);
    let mut best: Option<(usize, f32)> = None;

    let mut pos = 0;
    while pos + marker_len <= samples.len() {
        let window = &samples[pos..pos + marker_len];
        let energy = goertzel_energy(window, sample_rate, target_hz);
        if energy > 0.02 && best.map(|(_, e)| energy > e).unwrap_or(true) {
            best = Some((pos, energy));
        }
        pos += step;
    }
    best.map(|(idx, _)| idx)
}

/// Single-bin Goertzel power estimate of `target_hz` within `window`.
fn goertzel_energy(window: &[f32], sample_rate: u32, target_hz: f32) -> f32 {
    let n = window.len() as f32;
    let k = (n * target_hz / sample_rate as f32).round();
    let omega = 2.0 * std::f32::consts::PI * k / n;
    let coeff = 2.0 * omega.cos();

    let (mut s0, mut s1, mut s2) = (0.0f32, 0.0f32, 0.0f32);
    for &x in window {
        s0 = x + coeff * s1 - s2;
        s2 = s1;
        s1 = s0;
    }
    s1 * s1 + s2 * s2 - coeff * s1 * s2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_chunk() {
        let modem = ToneModem::new(48_000, 0.8);
        let chunk = b"hi!";
        let samples = modem.encode(chunk);
        let decoded = modem.decode(&samples).unwrap();
        assert_eq!(decoded, chunk);
    }

    #[test]
    fn tolerates_leading_silence_before_marker() {
        let modem = ToneModem::new(48_000, 0.8);
        let chunk = [0xAAu8, 0x55];
        let mut samples = vec![0.0f32; 4_000];
        samples.extend(modem.encode(&chunk));
        let decoded = modem.decode(&samples).unwrap();
        assert_eq!(decoded, chunk);
    }

    #[test]
    fn returns_none_on_partial_buffer() {
        let modem = ToneModem::new(48_000, 0.8);
        let samples = modem.encode(b"hello");
        let decoded = modem.decode(&samples[..samples.len() - 10]);
        assert!(decoded.is_none());
    }

    #[test]
    fn returns_none_on_empty_input() {
        let modem = ToneModem::new(48_000, 0.8);
        assert!(modem.decode(&[]).is_none());
    }
}
