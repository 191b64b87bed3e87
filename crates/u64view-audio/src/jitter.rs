use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, trace};
use u64view_protocol::audio::AudioPacket;
use u64view_protocol::seq;
use u64view_protocol::stats::{LossCounter, LossReport};

use crate::AudioChunk;

/// Default number of packets the buffer is sized for (~64 ms at 4 ms/packet).
pub const DEFAULT_JITTER_CAPACITY: usize = 16;

/// Reorders audio packets and fills holes with silence.
///
/// Sequence numbers are unwrapped to a monotonic `i64` so the map stays
/// ordered across the 65535 → 0 wrap. Playback starts once half the capacity
/// is resident; from then on every [`pop`](Self::pop) yields the next
/// sequence, substituting a silent chunk when it is missing but later data
/// already arrived.
pub struct JitterBuffer {
    /// Buffered packets: unwrapped sequence → PCM.
    buffer: BTreeMap<i64, Bytes>,
    capacity: usize,
    /// Highest unwrapped sequence seen so far.
    highest: Option<i64>,
    /// Next unwrapped sequence to hand out.
    playout: Option<i64>,
    filled: bool,
    late: u64,
    reordered: u64,
    stats: LossCounter,
}

impl JitterBuffer {
    pub fn new(capacity: usize, now: Instant) -> Self {
        Self {
            buffer: BTreeMap::new(),
            capacity: capacity.max(1),
            highest: None,
            playout: None,
            filled: false,
            late: 0,
            reordered: 0,
            stats: LossCounter::new(now),
        }
    }

    /// Resident packets needed before playback begins.
    pub fn fill_level(&self) -> usize {
        (self.capacity / 2).max(1)
    }

    fn horizon(&self) -> i64 {
        2 * self.capacity as i64
    }

    pub fn push_packet(&mut self, packet: AudioPacket) {
        self.push(packet.sequence, packet.pcm);
    }

    /// Admit one packet.
    pub fn push(&mut self, sequence: u16, pcm: Bytes) {
        self.stats.record_received();

        let Some(highest) = self.highest else {
            self.begin(sequence, pcm);
            return;
        };

        let ext = highest + seq::distance(highest as u16, sequence) as i64;

        if let Some(playout) = self.playout {
            if ext - playout > self.horizon() {
                let resident = self.buffer.range(playout..).count() as u64;
                let missing = (ext - playout) as u64 - resident;
                debug!(
                    sequence,
                    ahead = ext - playout,
                    missing,
                    "audio sequence jumped ahead, resynchronising"
                );
                self.stats.record_lost(missing);
                self.reset();
                self.begin(sequence, pcm);
                return;
            }
            if self.filled && ext < playout {
                if playout - ext > self.horizon() {
                    debug!(
                        sequence,
                        behind = playout - ext,
                        "audio sequence jumped back, resynchronising"
                    );
                    self.reset();
                    self.begin(sequence, pcm);
                    return;
                }
                self.late += 1;
                trace!(sequence, "late audio packet discarded");
                return;
            }
        }

        if ext < highest {
            self.reordered += 1;
            trace!(sequence, "reordered audio packet");
        } else if ext > highest {
            self.highest = Some(ext);
        }

        self.buffer.insert(ext, pcm);
        self.prune();
        self.check_filled();
    }

    /// First packet after creation or reset anchors the playout point.
    fn begin(&mut self, sequence: u16, pcm: Bytes) {
        let start = sequence as i64;
        self.highest = Some(start);
        self.playout = Some(start);
        self.buffer.insert(start, pcm);
        self.check_filled();
    }

    fn prune(&mut self) {
        let Some(playout) = self.playout else {
            return;
        };
        let floor = playout - self.horizon();
        while let Some((&oldest, _)) = self.buffer.first_key_value() {
            if oldest >= floor {
                break;
            }
            self.buffer.pop_first();
        }
    }

    fn check_filled(&mut self) {
        if self.filled || self.buffer.len() < self.fill_level() {
            return;
        }
        self.filled = true;
        // Rewind to anything older that arrived out of order during warm-up.
        if let Some((&oldest, _)) = self.buffer.first_key_value() {
            self.playout = Some(oldest);
        }
        debug!(
            resident = self.buffer.len(),
            start = self.playout.map(|p| p as u16),
            "jitter buffer filled, starting playout"
        );
    }

    /// Next chunk in playout order, or `None` while warming up or starved.
    pub fn pop(&mut self) -> Option<AudioChunk> {
        if !self.filled {
            return None;
        }
        let next = self.playout?;

        if let Some(pcm) = self.buffer.remove(&next) {
            self.playout = Some(next + 1);
            return Some(AudioChunk::new(next as u16, pcm));
        }

        self.buffer.range(next + 1..).next()?;

        trace!(sequence = next as u16, "audio packet missing, inserting silence");
        self.stats.record_lost(1);
        self.playout = Some(next + 1);
        Some(AudioChunk::silence(next as u16))
    }

    /// Pop everything currently ready.
    ///
    /// Unlike [`pop`](Self::pop), a missing sequence is only given up once
    /// the stream has moved `fill_level` packets past it, so reordering
    /// within that window is delivered rather than replaced by silence.
    pub fn drain(&mut self) -> Vec<AudioChunk> {
        let mut out = Vec::new();
        while self.filled {
            let (Some(next), Some(highest)) = (self.playout, self.highest) else {
                break;
            };
            if !self.buffer.contains_key(&next) && highest - next < self.fill_level() as i64 {
                break;
            }
            match self.pop() {
                Some(chunk) => out.push(chunk),
                None => break,
            }
        }
        out
    }

    /// Drop buffered audio and warm up again on the next packet.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.highest = None;
        self.playout = None;
        self.filled = false;
    }

    pub fn is_filled(&self) -> bool {
        self.filled
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Packets that arrived after their slot was already played.
    pub fn late_packets(&self) -> u64 {
        self.late
    }

    pub fn reordered_packets(&self) -> u64 {
        self.reordered
    }

    pub fn packets_received(&self) -> u64 {
        self.stats.total_received()
    }

    pub fn packets_lost(&self) -> u64 {
        self.stats.total_lost()
    }

    pub fn take_report(&mut self, now: Instant, interval: Duration) -> Option<LossReport> {
        self.stats.take_report(now, interval)
    }
}
