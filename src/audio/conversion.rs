// Sample format conversion for inbound frames
//
// Frames arrive as raw little-endian bytes. The rendering unit only speaks
// signed 16-bit PCM, so float frames are converted on the way in.

use super::types::{AudioFrame, SampleFormat};

/// Convert one float sample to signed 16-bit.
///
/// Clamped to [-1, 1], then scaled by 32768 below zero and 32767 above, so the
/// full i16 range is reachable without ever producing +32768. The cast
/// truncates toward zero. NaN maps to silence.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    let clamped = sample.clamp(-1.0, 1.0);
    if clamped < 0.0 {
        (clamped * 32768.0) as i16
    } else {
        (clamped * 32767.0) as i16
    }
}

/// Convert a float slice to 16-bit PCM
pub fn convert_f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples.iter().map(|&s| f32_to_i16(s)).collect()
}

/// Decode little-endian i16 samples; a trailing odd byte is ignored
pub fn decode_pcm16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

/// Decode little-endian f32 samples; trailing partial samples are ignored
pub fn decode_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Turn any inbound frame into the 16-bit buffer the renderer consumes
pub fn frame_to_pcm16(frame: &AudioFrame) -> Vec<i16> {
    match frame.format {
        SampleFormat::I16 => decode_pcm16(&frame.buffer),
        SampleFormat::F32 => convert_f32_to_i16(&decode_f32(&frame.buffer)),
    }
}
