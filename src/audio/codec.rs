//! PCM16 <-> base64 conversion for `input_audio_buffer.append` and
//! `response.audio.delta` payloads.

use base64::Engine;

use super::chunk::AudioChunk;
use crate::error::DecodeError;

/// Encode samples as base64 of their little-endian byte buffer.
pub fn encode_pcm16(samples: &[i16]) -> String {
    let pcm_bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    base64::engine::general_purpose::STANDARD.encode(pcm_bytes)
}

/// Decode a base64 PCM16LE payload into a sample buffer.
///
/// Fails on malformed base64 or an odd byte count; the caller drops the frame.
pub fn decode_pcm16(payload: &str) -> Result<AudioChunk, DecodeError> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(payload)?;
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddLength(bytes.len()));
    }

    let samples = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    Ok(AudioChunk::new(samples))
}
