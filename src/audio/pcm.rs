//! PCM sample conversions shared by both directions.

/// Convert a normalized float sample to 16-bit PCM.
///
/// Scales by 32767 and clamps to the int16 range, so clipping saturates
/// instead of wrapping. NaN maps to 0.
pub fn quantize(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Quantize a float buffer to 16-bit PCM.
pub fn quantize_all(samples: &[f32]) -> Vec<i16> {
    samples.iter().map(|&s| quantize(s)).collect()
}

/// Convert 16-bit PCM to floats normalized to [-1.0, 1.0).
pub fn to_float(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

/// Decode little-endian S16 bytes. A trailing odd byte is ignored.
pub fn decode_s16le(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Encode samples as little-endian S16 bytes.
pub fn encode_s16le(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}
