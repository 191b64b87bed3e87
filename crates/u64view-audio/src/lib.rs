pub mod jitter;
pub mod pcm;
pub mod playback;

use bytes::Bytes;

pub use u64view_protocol::audio::{
    AUDIO_BITS_PER_SAMPLE, AUDIO_CHANNELS, AUDIO_FRAMES_PER_PACKET, AUDIO_PAYLOAD_SIZE,
    AUDIO_SAMPLE_RATE,
};

/// One packet's worth of PCM in playout order.
///
/// Always 48 kHz, 2 channels, 16-bit little-endian interleaved. Silent chunks
/// stand in for packets that never arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub sequence: u16,
    pub pcm: Bytes,
    pub silent: bool,
}

impl AudioChunk {
    pub fn new(sequence: u16, pcm: Bytes) -> Self {
        Self {
            sequence,
            pcm,
            silent: false,
        }
    }

    /// A chunk of zeros with the nominal packet length.
    pub fn silence(sequence: u16) -> Self {
        Self {
            sequence,
            pcm: Bytes::from(vec![0u8; AUDIO_PAYLOAD_SIZE]),
            silent: true,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        AUDIO_SAMPLE_RATE
    }

    pub fn channels(&self) -> u16 {
        AUDIO_CHANNELS
    }

    pub fn bits_per_sample(&self) -> u16 {
        AUDIO_BITS_PER_SAMPLE
    }

    /// Number of stereo sample frames carried.
    pub fn frames(&self) -> usize {
        self.pcm.len() / (AUDIO_CHANNELS as usize * AUDIO_BITS_PER_SAMPLE as usize / 8)
    }
}
