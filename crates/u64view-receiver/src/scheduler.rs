use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};
use u64view_video::VideoFrame;

use crate::config::ViewerConfig;
use crate::state::ViewerState;

/// Window over which the delivery rate is measured.
pub const FPS_WINDOW: Duration = Duration::from_secs(1);

/// Bounded hand-off between frame assembly and the display tick.
///
/// Pushing into a full queue evicts the oldest frame.
pub struct FrameQueue {
    frames: Mutex<VecDeque<VideoFrame>>,
    capacity: usize,
    evicted: AtomicU64,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            evicted: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<VideoFrame>> {
        self.frames.lock().unwrap_or_else(|poisoned| {
            warn!("frame queue mutex poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Enqueue a frame. Returns true if an older frame was evicted for it.
    pub fn push(&self, frame: VideoFrame) -> bool {
        let mut frames = self.lock();
        let mut evicted = false;
        while frames.len() >= self.capacity {
            if let Some(old) = frames.pop_front() {
                trace!(frame = old.frame_number(), "frame queue full, evicting oldest");
                self.evicted.fetch_add(1, Ordering::Relaxed);
                evicted = true;
            }
        }
        frames.push_back(frame);
        evicted
    }

    /// Take the newest frame and discard the rest. Also returns how many
    /// older frames were skipped.
    pub fn take_latest(&self) -> Option<(VideoFrame, usize)> {
        let mut frames = self.lock();
        let latest = frames.pop_back()?;
        let skipped = frames.len();
        frames.clear();
        Some((latest, skipped))
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub connection_timeout: Duration,
    pub fps_window: Duration,
}

impl From<&ViewerConfig> for SchedulerConfig {
    fn from(config: &ViewerConfig) -> Self {
        Self {
            tick_interval: config.display_interval(),
            connection_timeout: config.connection_timeout(),
            fps_window: FPS_WINDOW,
        }
    }
}

/// What one display tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A frame was published; `skipped` older frames were discarded.
    Delivered { frame_number: u16, skipped: usize },
    /// Nothing new to show.
    Idle,
    /// The stream went quiet this tick.
    Disconnected,
}

/// Fixed-cadence consumer of the frame queue.
///
/// Each tick publishes the newest queued frame, updates the delivery rate and
/// checks connection liveness. Time is passed in, so the policy runs the same
/// under a test clock.
pub struct PlayoutScheduler {
    config: SchedulerConfig,
    queue: Arc<FrameQueue>,
    state: Arc<ViewerState>,
    deliveries: VecDeque<Instant>,
    delivered: u64,
    skipped: u64,
}

impl PlayoutScheduler {
    pub fn new(config: SchedulerConfig, queue: Arc<FrameQueue>, state: Arc<ViewerState>) -> Self {
        Self {
            config,
            queue,
            state,
            deliveries: VecDeque::new(),
            delivered: 0,
            skipped: 0,
        }
    }

    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        if self.state.check_liveness(now, self.config.connection_timeout) {
            self.queue.clear();
            self.deliveries.clear();
            return TickOutcome::Disconnected;
        }

        let outcome = match self.queue.take_latest() {
            Some((frame, skipped)) => {
                let frame_number = frame.frame_number();
                self.state.set_current_frame(Arc::new(frame));
                self.deliveries.push_back(now);
                self.delivered += 1;
                self.skipped += skipped as u64;
                TickOutcome::Delivered {
                    frame_number,
                    skipped,
                }
            }
            None => TickOutcome::Idle,
        };

        let fps = self.fps(now);
        self.state.set_fps(fps);
        outcome
    }

    /// Deliveries within the window ending at `now`, per second.
    pub fn fps(&mut self, now: Instant) -> f32 {
        while let Some(&oldest) = self.deliveries.front() {
            if now.saturating_duration_since(oldest) < self.config.fps_window {
                break;
            }
            self.deliveries.pop_front();
        }
        self.deliveries.len() as f32 / self.config.fps_window.as_secs_f32()
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

/// Drive `scheduler` from a tokio interval until `shutting_down` is set.
pub fn spawn(mut scheduler: PlayoutScheduler, shutting_down: Arc<AtomicBool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(scheduler.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval = ?scheduler.config.tick_interval, "playout scheduler started");

        loop {
            ticker.tick().await;
            if shutting_down.load(Ordering::Acquire) {
                break;
            }
            match scheduler.tick(tokio::time::Instant::now().into_std()) {
                TickOutcome::Delivered {
                    frame_number,
                    skipped,
                } if skipped > 0 => {
                    trace!(frame = frame_number, skipped, "display tick skipped stale frames");
                }
                TickOutcome::Disconnected => debug!("pending frames cleared after disconnect"),
                _ => {}
            }
        }

        info!(
            delivered = scheduler.delivered(),
            skipped = scheduler.skipped(),
            evicted = scheduler.queue.evicted(),
            "playout scheduler stopped"
        );
    })
}
