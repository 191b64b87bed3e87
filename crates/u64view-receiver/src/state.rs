use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{info, warn};
use u64view_video::VideoFrame;

/// Whether the device is currently streaming to us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No packet seen yet.
    Waiting,
    Connected,
    /// Packets stopped for longer than the connection timeout.
    Disconnected,
}

/// Point-in-time copy of everything a presentation layer shows.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerSnapshot {
    pub status: ConnectionStatus,
    pub source: Option<SocketAddr>,
    pub fps: f32,
    pub current_frame: Option<u16>,
    pub frames_received: u64,
    pub frames_lost: u64,
    pub audio_packets_received: u64,
    pub audio_packets_lost: u64,
    pub audio_late_packets: u64,
    pub audio_level: f32,
    pub datagrams_dropped: u64,
    pub malformed_packets: u64,
    pub last_error: Option<String>,
}

struct Inner {
    status: ConnectionStatus,
    last_packet: Option<Instant>,
    source: Option<SocketAddr>,
    current_frame: Option<Arc<VideoFrame>>,
    fps: f32,
    frames_received: u64,
    frames_lost: u64,
    audio_packets_received: u64,
    audio_packets_lost: u64,
    audio_late_packets: u64,
    audio_level: f32,
    datagrams_dropped: u64,
    malformed_packets: u64,
    last_error: Option<String>,
}

/// Everything the receive side publishes, behind one lock.
///
/// Writers are the stream processing tasks and the playout scheduler; readers
/// take a [`ViewerSnapshot`] or the current frame handle and release the lock
/// immediately.
pub struct ViewerState {
    inner: Mutex<Inner>,
}

impl Default for ViewerState {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewerState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                status: ConnectionStatus::Waiting,
                last_packet: None,
                source: None,
                current_frame: None,
                fps: 0.0,
                frames_received: 0,
                frames_lost: 0,
                audio_packets_received: 0,
                audio_packets_lost: 0,
                audio_late_packets: 0,
                audio_level: 0.0,
                datagrams_dropped: 0,
                malformed_packets: 0,
                last_error: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("viewer state mutex poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Note an inbound datagram. Returns true when this (re)connects the stream.
    pub fn record_packet(&self, now: Instant, source: SocketAddr) -> bool {
        let mut inner = self.lock();
        inner.last_packet = Some(now);
        if inner.source != Some(source) {
            info!(%source, "receiving from device");
            inner.source = Some(source);
        }
        if inner.status == ConnectionStatus::Connected {
            return false;
        }
        info!(%source, previous = ?inner.status, "stream connected");
        inner.status = ConnectionStatus::Connected;
        true
    }

    /// Mark the stream disconnected if nothing arrived within `timeout`.
    ///
    /// Returns true on the transition; the current frame is cleared then.
    pub fn check_liveness(&self, now: Instant, timeout: Duration) -> bool {
        let mut inner = self.lock();
        if inner.status != ConnectionStatus::Connected {
            return false;
        }
        let Some(last) = inner.last_packet else {
            return false;
        };
        if now.saturating_duration_since(last) <= timeout {
            return false;
        }
        inner.status = ConnectionStatus::Disconnected;
        inner.current_frame = None;
        inner.fps = 0.0;
        warn!(
            silent_for = ?now.saturating_duration_since(last),
            "no packets within connection timeout, disconnected"
        );
        true
    }

    pub fn status(&self) -> ConnectionStatus {
        self.lock().status
    }

    pub fn set_current_frame(&self, frame: Arc<VideoFrame>) {
        self.lock().current_frame = Some(frame);
    }

    /// Latest presented frame. Cheap: clones the handle, not the pixels.
    pub fn current_frame(&self) -> Option<Arc<VideoFrame>> {
        self.lock().current_frame.clone()
    }

    pub fn set_fps(&self, fps: f32) {
        self.lock().fps = fps;
    }

    pub fn update_video_stats(&self, frames_received: u64, frames_lost: u64) {
        let mut inner = self.lock();
        inner.frames_received = frames_received;
        inner.frames_lost = frames_lost;
    }

    pub fn update_audio_stats(&self, received: u64, lost: u64, late: u64) {
        let mut inner = self.lock();
        inner.audio_packets_received = received;
        inner.audio_packets_lost = lost;
        inner.audio_late_packets = late;
    }

    pub fn set_audio_level(&self, level: f32) {
        self.lock().audio_level = level;
    }

    pub fn record_dropped_datagram(&self) {
        self.lock().datagrams_dropped += 1;
    }

    pub fn record_malformed(&self) {
        self.lock().malformed_packets += 1;
    }

    pub fn set_error(&self, message: impl Into<String>) {
        self.lock().last_error = Some(message.into());
    }

    pub fn snapshot(&self) -> ViewerSnapshot {
        let inner = self.lock();
        ViewerSnapshot {
            status: inner.status,
            source: inner.source,
            fps: inner.fps,
            current_frame: inner.current_frame.as_ref().map(|f| f.frame_number()),
            frames_received: inner.frames_received,
            frames_lost: inner.frames_lost,
            audio_packets_received: inner.audio_packets_received,
            audio_packets_lost: inner.audio_packets_lost,
            audio_late_packets: inner.audio_late_packets,
            audio_level: inner.audio_level,
            datagrams_dropped: inner.datagrams_dropped,
            malformed_packets: inner.malformed_packets,
            last_error: inner.last_error.clone(),
        }
    }
}
