// 16-bit little-endian PCM → f32 samples in [-1.0, 1.0].

/// Convert interleaved i16 LE bytes to f32 samples, appending to `out`.
///
/// A trailing odd byte is ignored.
pub fn i16_le_to_f32_into(pcm: &[u8], out: &mut Vec<f32>) {
    out.extend(pcm.chunks_exact(2).map(|b| {
        let s = i16::from_le_bytes([b[0], b[1]]);
        (s as f32 / i16::MAX as f32).max(-1.0)
    }));
}

/// Largest absolute sample value.
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}
