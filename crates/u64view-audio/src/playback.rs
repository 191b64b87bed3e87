use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::debug;

use crate::{pcm, AudioChunk, AUDIO_CHANNELS, AUDIO_SAMPLE_RATE};

/// Size of the playback ring buffer in samples (~200ms of stereo at 48kHz).
pub const PLAYBACK_BUFFER_SIZE: usize = AUDIO_SAMPLE_RATE as usize / 5 * AUDIO_CHANNELS as usize;

/// Samples faded out at the end of the available data on underrun.
const FADE_LEN: usize = 32;

/// Where ordered audio chunks go once they leave the jitter buffer.
pub trait AudioSink: Send {
    fn play(&mut self, chunk: &AudioChunk);
}

/// Create the sample queue between the audio task and the output device.
pub fn playback_queue(capacity: usize) -> (PcmProducer, PcmConsumer) {
    let rb = HeapRb::<f32>::new(capacity.max(1));
    let (producer, consumer) = rb.split();
    (
        PcmProducer {
            producer,
            scratch: Vec::new(),
            dropped: 0,
        },
        PcmConsumer {
            consumer,
            underruns: 0,
        },
    )
}

/// Writing half: converts PCM chunks and queues the samples.
pub struct PcmProducer {
    producer: HeapProd<f32>,
    scratch: Vec<f32>,
    dropped: u64,
}

impl PcmProducer {
    /// Samples that did not fit because the device fell behind.
    pub fn dropped_samples(&self) -> u64 {
        self.dropped
    }

    pub fn queued_samples(&self) -> usize {
        self.producer.occupied_len()
    }
}

impl AudioSink for PcmProducer {
    fn play(&mut self, chunk: &AudioChunk) {
        self.scratch.clear();
        pcm::i16_le_to_f32_into(&chunk.pcm, &mut self.scratch);
        let written = self.producer.push_slice(&self.scratch);
        if written < self.scratch.len() {
            let lost = (self.scratch.len() - written) as u64;
            self.dropped += lost;
            debug!(sequence = chunk.sequence, lost, "playback queue full, samples dropped");
        }
    }
}

/// Reading half, driven by the output device clock.
pub struct PcmConsumer {
    consumer: HeapCons<f32>,
    underruns: u64,
}

impl PcmConsumer {
    /// Fill `out` with interleaved samples. On underrun the tail of the real
    /// data is faded out and the rest zero-filled. Returns samples read.
    pub fn fill(&mut self, out: &mut [f32]) -> usize {
        let read = self.consumer.pop_slice(out);
        if read < out.len() {
            self.underruns += 1;
            if read > 0 {
                let fade_len = read.min(FADE_LEN);
                let fade_start = read - fade_len;
                for i in 0..fade_len {
                    out[fade_start + i] *= 1.0 - (i as f32 / fade_len as f32);
                }
            }
            for sample in &mut out[read..] {
                *sample = 0.0;
            }
        }
        read
    }

    pub fn queued_samples(&self) -> usize {
        self.consumer.occupied_len()
    }

    pub fn underruns(&self) -> u64 {
        self.underruns
    }
}
