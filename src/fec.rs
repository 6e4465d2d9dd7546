//! Reed–Solomon chunk codec (component A).
//!
//! Grounded in the original prototype's `error_corrector.py`: fixed
//! `FEC_DATA_BYTES`-byte data blocks each padded out to `FEC_BLOCK_SIZE` bytes
//! with `FEC_PARITY_BYTES` parity bytes, correcting up to
//! `FEC_PARITY_BYTES / 2` corrupted bytes per block. Uses the `reed-solomon`
//! crate in place of Python's `reedsolo.RSCodec`.

use reed_solomon::{Decoder, Encoder};

use crate::config::{FEC_BLOCK_SIZE, FEC_DATA_BYTES, FEC_PARITY_BYTES};
use crate::errors::FecError;

/// Splits `data` into `FEC_DATA_BYTES`-sized pieces (last one zero-padded)
/// and RS-encodes each into a `FEC_BLOCK_SIZE`-byte block.
///
/// Mirrors `ErrorCorrector.break_into_frames` followed by per-frame encode.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let encoder = Encoder::new(FEC_PARITY_BYTES);
    let mut out = Vec::with_capacity(encoded_len(data.len()));

    for chunk in data.chunks(FEC_DATA_BYTES) {
        let mut block = [0u8; FEC_DATA_BYTES];
        block[..chunk.len()].copy_from_slice(chunk);
        let encoded = encoder.encode(&block);
        out.extend_from_slice(&encoded);
    }

    out
}

/// Reverses [`encode`] without trimming zero padding from the last block —
/// useful when the caller carries its own in-band length byte (the
/// mic-reader loop does, see `main.rs`) rather than knowing `original_len`
/// up front.
pub fn decode_full(blocks: &[u8]) -> Result<Vec<u8>, FecError> {
    if blocks.len() % FEC_BLOCK_SIZE != 0 {
        return Err(FecError::Undecodable);
    }

    let decoder = Decoder::new(FEC_PARITY_BYTES);
    let mut out = Vec::with_capacity(blocks.len());

    for block in blocks.chunks(FEC_BLOCK_SIZE) {
        let corrected = decoder
            .correct(block, None)
            .map_err(|_| FecError::Undecodable)?;
        out.extend_from_slice(corrected.data());
    }

    Ok(out)
}

/// Reverses [`encode`]. `original_len` is required since the last data block
/// may have been zero-padded and RS blocks carry no explicit length field.
pub fn decode(blocks: &[u8], original_len: usize) -> Result<Vec<u8>, FecError> {
    let mut out = decode_full(blocks)?;
    out.truncate(original_len);
    Ok(out)
}

/// Encoded length in bytes for a plaintext chunk of `data_len` bytes.
pub fn encoded_len(data_len: usize) -> usize {
    let blocks = data_len.div_ceil(FEC_DATA_BYTES).max(1);
    blocks * FEC_BLOCK_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_short_input() {
        let data = b"hello, aircom!";
        let encoded = encode(data);
        let decoded = decode(&encoded, data.len()).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn round_trips_exact_block_multiple() {
        let data = vec![7u8; FEC_DATA_BYTES * 3];
        let encoded = encode(&data);
        let decoded = decode(&encoded, data.len()).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn tolerates_up_to_half_parity_corrupted_bytes() {
        let data = b"0123456789";
        let mut encoded = encode(data);
        encoded[0] ^= 0xFF;
        encoded[3] ^= 0xFF;
        encoded[6] ^= 0xFF;
        let decoded = decode(&encoded, data.len()).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn rejects_malformed_length() {
        assert!(decode(&[0u8; 3], 3).is_err());
    }
}
