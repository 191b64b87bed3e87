// Headless audio output: drains the playback queue at the device sample rate
// and publishes a peak meter. A sound card backend would replace this loop
// with its own callback calling `PcmConsumer::fill`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use u64view_audio::pcm;
use u64view_audio::playback::PcmConsumer;
use u64view_audio::{AUDIO_CHANNELS, AUDIO_SAMPLE_RATE};

use crate::state::ViewerState;

/// Device period.
pub const OUTPUT_PERIOD: Duration = Duration::from_millis(20);

/// Interleaved samples consumed per period (960 frames × 2 channels).
pub const SAMPLES_PER_PERIOD: usize =
    AUDIO_SAMPLE_RATE as usize / 50 * AUDIO_CHANNELS as usize;

pub fn spawn_output_clock(
    mut consumer: PcmConsumer,
    state: Arc<ViewerState>,
    shutting_down: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(OUTPUT_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut buf = vec![0.0f32; SAMPLES_PER_PERIOD];
        let mut reported_underruns = 0;
        info!(period = ?OUTPUT_PERIOD, "audio output started");

        loop {
            ticker.tick().await;
            if shutting_down.load(Ordering::Acquire) {
                break;
            }
            consumer.fill(&mut buf);
            state.set_audio_level(pcm::peak(&buf));

            let underruns = consumer.underruns();
            if underruns != reported_underruns && underruns % 50 == 0 {
                debug!(underruns, "audio output underruns");
                reported_underruns = underruns;
            }
        }
        info!("audio output stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use u64view_audio::playback::{playback_queue, AudioSink};
    use u64view_audio::AudioChunk;

    #[tokio::test(start_paused = true)]
    async fn meters_queued_audio() {
        let (mut producer, consumer) = playback_queue(SAMPLES_PER_PERIOD * 4);
        let state = Arc::new(ViewerState::new());
        let shutting_down = Arc::new(AtomicBool::new(false));

        let pcm: Vec<u8> = (0..SAMPLES_PER_PERIOD)
            .flat_map(|_| (i16::MAX / 2).to_le_bytes())
            .collect();
        producer.play(&AudioChunk::new(0, Bytes::from(pcm)));

        let task = spawn_output_clock(consumer, state.clone(), shutting_down.clone());
        tokio::time::sleep(Duration::from_millis(5)).await;
        let level = state.snapshot().audio_level;
        assert!((level - 0.5).abs() < 0.01, "level was {}", level);

        // Queue exhausted: the meter falls to zero.
        tokio::time::sleep(OUTPUT_PERIOD * 2).await;
        assert_eq!(state.snapshot().audio_level, 0.0);

        shutting_down.store(true, Ordering::Release);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("output task should stop")
            .unwrap();
    }
}
