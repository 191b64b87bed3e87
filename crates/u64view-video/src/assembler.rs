use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, trace};
use u64view_protocol::seq;
use u64view_protocol::stats::{LossCounter, LossReport};
use u64view_protocol::video::VideoPacket;

use crate::{convert, VideoFrame, FRAME_HEIGHT, FRAME_RGB_SIZE, FRAME_WIDTH, PACKETS_PER_FRAME};

/// How long a frame may stay in collection before it is abandoned.
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_millis(100);

/// Fraction of line groups a frame needs to be emitted when the next frame starts.
pub const DEFAULT_COMPLETENESS_THRESHOLD: f32 = 0.75;

/// A frame number this far behind the last finished frame means the device
/// restarted its counter, not that a packet arrived late.
const RESYNC_DISTANCE: i32 = 64;

/// Tuning for [`FrameAssembler`].
#[derive(Debug, Clone, Copy)]
pub struct AssemblerConfig {
    pub frame_timeout: Duration,
    pub completeness_threshold: f32,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
            completeness_threshold: DEFAULT_COMPLETENESS_THRESHOLD,
        }
    }
}

/// Result of feeding a video packet into the assembler.
#[derive(Debug)]
pub struct AssembleResult {
    /// Assembled frame, if one was finished by this packet.
    pub frame: Option<VideoFrame>,
    /// Whether an in-progress frame was given up (too few lines or timed out).
    pub frame_dropped: bool,
}

impl AssembleResult {
    fn empty(frame_dropped: bool) -> Self {
        Self {
            frame: None,
            frame_dropped,
        }
    }
}

/// Lines collected so far for the frame in flight.
struct Collecting {
    frame_number: u16,
    /// First scan line → packed payload. Duplicates overwrite.
    lines: BTreeMap<u16, Bytes>,
    deadline: Instant,
}

/// Groups line-group datagrams into RGB frames.
///
/// Holds at most one frame in flight. Line groups are keyed by line number, so
/// arrival order within a frame does not matter. A frame is emitted as soon as
/// all line groups are in, or when the next frame starts and enough of it
/// arrived; anything else is counted as lost.
pub struct FrameAssembler {
    config: AssemblerConfig,
    current: Option<Collecting>,
    /// Last frame number that was emitted, dropped or abandoned.
    last_finished: Option<u16>,
    stats: LossCounter,
}

impl FrameAssembler {
    pub fn new(config: AssemblerConfig, now: Instant) -> Self {
        Self {
            config,
            current: None,
            last_finished: None,
            stats: LossCounter::new(now),
        }
    }

    /// Line groups a frame needs to be emitted on a frame switch.
    pub fn required_line_groups(&self) -> usize {
        let needed = (PACKETS_PER_FRAME as f32 * self.config.completeness_threshold).ceil();
        (needed as usize).clamp(1, PACKETS_PER_FRAME)
    }

    /// Feed one parsed video packet received at `now`.
    pub fn add_packet(&mut self, packet: &VideoPacket, now: Instant) -> AssembleResult {
        let frame_number = packet.header.frame_number;
        let mut frame_dropped = false;

        if let Some(cur) = self.current.take() {
            if now >= cur.deadline {
                debug!(
                    frame = cur.frame_number,
                    lines = cur.lines.len(),
                    "frame timed out, abandoning"
                );
                frame_dropped |= self.finish_lost(&cur);
            } else {
                self.current = Some(cur);
            }
        }

        if let Some(last) = self.last_finished {
            if seq::distance(last, frame_number) <= -RESYNC_DISTANCE {
                debug!(last, frame = frame_number, "frame counter jumped back, resynchronising");
                self.last_finished = None;
            } else if !seq::is_newer(frame_number, last) {
                trace!(last, frame = frame_number, "ignoring packet for finished frame");
                return AssembleResult::empty(frame_dropped);
            }
        }

        let mut emitted = None;

        match self.current.take() {
            Some(cur) if cur.frame_number == frame_number => {
                self.current = Some(cur);
            }
            Some(cur) => {
                let d = seq::distance(cur.frame_number, frame_number);
                if d < 0 && d > -RESYNC_DISTANCE {
                    trace!(
                        current = cur.frame_number,
                        frame = frame_number,
                        "ignoring packet for older frame"
                    );
                    self.current = Some(cur);
                    return AssembleResult::empty(frame_dropped);
                }
                if cur.lines.len() >= self.required_line_groups() {
                    emitted = Some(self.finish_emitted(cur, now));
                } else {
                    debug!(
                        frame = cur.frame_number,
                        lines = cur.lines.len(),
                        required = self.required_line_groups(),
                        "incomplete frame replaced by next frame"
                    );
                    frame_dropped |= self.finish_lost(&cur);
                }
                self.start(frame_number, now);
            }
            None => self.start(frame_number, now),
        }

        if let Some(cur) = self.current.as_mut() {
            cur.lines
                .insert(packet.header.first_line(), packet.payload.clone());

            if cur.lines.len() >= PACKETS_PER_FRAME {
                if let Some(cur) = self.current.take() {
                    emitted = Some(self.finish_emitted(cur, now));
                }
            }
        }

        AssembleResult {
            frame: emitted,
            frame_dropped,
        }
    }

    fn start(&mut self, frame_number: u16, now: Instant) {
        self.current = Some(Collecting {
            frame_number,
            lines: BTreeMap::new(),
            deadline: now + self.config.frame_timeout,
        });
    }

    fn finish_emitted(&mut self, cur: Collecting, now: Instant) -> VideoFrame {
        let mut pixels = vec![0u8; FRAME_RGB_SIZE];
        for (&line, payload) in &cur.lines {
            convert::decode_line_group(payload, line as usize, &mut pixels, FRAME_WIDTH, FRAME_HEIGHT);
        }
        self.stats.record_received();
        self.last_finished = Some(cur.frame_number);
        VideoFrame::new(cur.frame_number, pixels, now)
    }

    /// Returns whether anything was actually lost.
    fn finish_lost(&mut self, cur: &Collecting) -> bool {
        self.last_finished = Some(cur.frame_number);
        if cur.lines.is_empty() {
            return false;
        }
        self.stats.record_lost(1);
        true
    }

    /// Frame number in flight, if any.
    pub fn current_frame(&self) -> Option<u16> {
        self.current.as_ref().map(|c| c.frame_number)
    }

    pub fn frames_received(&self) -> u64 {
        self.stats.total_received()
    }

    pub fn frames_lost(&self) -> u64 {
        self.stats.total_lost()
    }

    /// Close the statistics interval if `interval` has passed.
    pub fn take_report(&mut self, now: Instant, interval: Duration) -> Option<LossReport> {
        self.stats.take_report(now, interval)
    }

    /// Drop the frame in flight and forget frame history (e.g. on stream stop).
    pub fn reset(&mut self) {
        self.current = None;
        self.last_finished = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::rgb;
    use u64view_protocol::video::{LINES_PER_PACKET, VIDEO_PAYLOAD_SIZE};

    fn payload_for(group: usize) -> Vec<u8> {
        (0..VIDEO_PAYLOAD_SIZE)
            .map(|i| ((group * 7 + i) % 256) as u8)
            .collect()
    }

    /// Packet `group` of a frame, with the device's line numbering.
    fn group_packet(frame: u16, group: usize) -> VideoPacket {
        VideoPacket::line_group(
            group as u16,
            frame,
            (group * LINES_PER_PACKET) as u16,
            payload_for(group),
        )
    }

    fn assembler(start: Instant) -> FrameAssembler {
        FrameAssembler::new(AssemblerConfig::default(), start)
    }

    fn feed(
        asm: &mut FrameAssembler,
        frame: u16,
        groups: impl IntoIterator<Item = usize>,
        now: Instant,
    ) -> Vec<VideoFrame> {
        groups
            .into_iter()
            .filter_map(|g| asm.add_packet(&group_packet(frame, g), now).frame)
            .collect()
    }

    #[test]
    fn complete_frame_emitted_once() {
        let t0 = Instant::now();
        let mut asm = assembler(t0);
        let frames = feed(&mut asm, 10, 0..PACKETS_PER_FRAME, t0);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame_number(), 10);
        assert_eq!(asm.frames_received(), 1);
        assert_eq!(asm.current_frame(), None);

        // A retransmitted group of the same frame does not start a second copy.
        let r = asm.add_packet(&group_packet(10, 3), t0);
        assert!(r.frame.is_none());
        assert_eq!(asm.current_frame(), None);
    }

    #[test]
    fn permutation_does_not_change_pixels() {
        let t0 = Instant::now();

        let mut a = assembler(t0);
        let in_order = feed(&mut a, 1, 0..PACKETS_PER_FRAME, t0);

        let mut b = assembler(t0);
        let reversed = feed(&mut b, 1, (0..PACKETS_PER_FRAME).rev(), t0);

        // 7 is coprime with 68, so this visits every group once.
        let mut c = assembler(t0);
        let strided = feed(&mut c, 1, (0..PACKETS_PER_FRAME).map(|i| i * 7 % 68), t0);

        assert_eq!(in_order.len(), 1);
        assert_eq!(reversed.len(), 1);
        assert_eq!(strided.len(), 1);
        assert_eq!(in_order[0].pixels(), reversed[0].pixels());
        assert_eq!(in_order[0].pixels(), strided[0].pixels());
    }

    #[test]
    fn sequential_line_numbers_also_complete() {
        // Line numbers 0..67 instead of scan lines 0, 4, 8, ...
        let t0 = Instant::now();
        let mut fwd = assembler(t0);
        let mut rev = assembler(t0);
        let mk = |line: usize| VideoPacket::line_group(0, 9, line as u16, payload_for(line));

        let a: Vec<_> = (0..68)
            .filter_map(|l| fwd.add_packet(&mk(l), t0).frame)
            .collect();
        let b: Vec<_> = (0..68)
            .rev()
            .filter_map(|l| rev.add_packet(&mk(l), t0).frame)
            .collect();
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
        assert_eq!(a[0].frame_number(), 9);
        assert_eq!(a[0].pixels(), b[0].pixels());
    }

    #[test]
    fn mostly_complete_frame_emitted_on_switch() {
        let t0 = Instant::now();
        let mut asm = assembler(t0);
        assert!(feed(&mut asm, 20, 0..60, t0).is_empty());

        let r = asm.add_packet(&group_packet(21, 0), t0);
        let frame = r.frame.expect("60 of 68 groups should be emitted");
        assert_eq!(frame.frame_number(), 20);
        assert!(!r.frame_dropped);
        assert_eq!(asm.current_frame(), Some(21));
        assert_eq!(asm.frames_lost(), 0);
    }

    #[test]
    fn sparse_frame_dropped_on_switch() {
        let t0 = Instant::now();
        let mut asm = assembler(t0);
        assert!(feed(&mut asm, 20, 0..40, t0).is_empty());

        let r = asm.add_packet(&group_packet(21, 0), t0);
        assert!(r.frame.is_none());
        assert!(r.frame_dropped);
        assert_eq!(asm.frames_lost(), 1);
        assert_eq!(asm.frames_received(), 0);
    }

    #[test]
    fn threshold_boundary() {
        let t0 = Instant::now();
        let mut asm = assembler(t0);
        assert_eq!(asm.required_line_groups(), 51);

        feed(&mut asm, 1, 0..51, t0);
        assert!(asm.add_packet(&group_packet(2, 0), t0).frame.is_some());

        feed(&mut asm, 2, 1..50, t0);
        assert!(asm.add_packet(&group_packet(3, 0), t0).frame.is_none());
    }

    #[test]
    fn frame_number_wraps_to_zero() {
        let t0 = Instant::now();
        let mut asm = assembler(t0);
        let frames = feed(&mut asm, 65535, 0..PACKETS_PER_FRAME, t0);
        assert_eq!(frames[0].frame_number(), 65535);

        let frames = feed(&mut asm, 0, 0..PACKETS_PER_FRAME, t0);
        assert_eq!(frames.len(), 1, "frame 0 after 65535 is the next frame");
        assert_eq!(frames[0].frame_number(), 0);
    }

    #[test]
    fn partial_frame_before_wrap_is_finalized() {
        let t0 = Instant::now();
        let mut asm = assembler(t0);
        feed(&mut asm, 65535, 0..60, t0);
        let r = asm.add_packet(&group_packet(0, 0), t0);
        assert_eq!(r.frame.map(|f| f.frame_number()), Some(65535));
        assert_eq!(asm.current_frame(), Some(0));
    }

    #[test]
    fn late_packets_for_older_frame_ignored() {
        let t0 = Instant::now();
        let mut asm = assembler(t0);
        feed(&mut asm, 5, 0..10, t0);
        feed(&mut asm, 6, 0..10, t0);
        assert_eq!(asm.frames_lost(), 1);

        let r = asm.add_packet(&group_packet(5, 20), t0);
        assert!(r.frame.is_none());
        assert!(!r.frame_dropped);
        assert_eq!(asm.current_frame(), Some(6));
        assert_eq!(asm.frames_lost(), 1);
    }

    #[test]
    fn timeout_abandons_frame() {
        let t0 = Instant::now();
        let mut asm = assembler(t0);
        feed(&mut asm, 7, 0..60, t0);

        let late = t0 + Duration::from_millis(150);
        let r = asm.add_packet(&group_packet(7, 60), late);
        assert!(r.frame.is_none());
        assert!(r.frame_dropped);
        assert_eq!(asm.frames_lost(), 1);
        // Stragglers of the abandoned frame do not restart it.
        assert_eq!(asm.current_frame(), None);

        let r = asm.add_packet(&group_packet(8, 0), late);
        assert!(!r.frame_dropped);
        assert_eq!(asm.current_frame(), Some(8));
    }

    #[test]
    fn timeout_then_new_frame_in_same_packet() {
        let t0 = Instant::now();
        let mut asm = assembler(t0);
        feed(&mut asm, 7, 0..60, t0);
        let r = asm.add_packet(&group_packet(8, 0), t0 + Duration::from_millis(200));
        assert!(r.frame.is_none(), "timed out frames are never emitted");
        assert!(r.frame_dropped);
        assert_eq!(asm.current_frame(), Some(8));
    }

    #[test]
    fn duplicate_lines_overwrite() {
        let t0 = Instant::now();
        let mut asm = assembler(t0);

        let first = VideoPacket::line_group(0, 1, 0, vec![0x11; VIDEO_PAYLOAD_SIZE]);
        let again = VideoPacket::line_group(1, 1, 0, vec![0x22; VIDEO_PAYLOAD_SIZE]);
        asm.add_packet(&first, t0);
        asm.add_packet(&again, t0);

        let frames = feed(&mut asm, 1, 1..PACKETS_PER_FRAME, t0);
        assert_eq!(frames.len(), 1, "duplicates do not count twice");
        assert_eq!(&frames[0].pixels()[..3], &rgb(2));
    }

    #[test]
    fn missing_groups_stay_black() {
        let t0 = Instant::now();
        let mut asm = assembler(t0);
        let frame = {
            feed(&mut asm, 1, 1..PACKETS_PER_FRAME, t0);
            asm.add_packet(&group_packet(2, 0), t0).frame.unwrap()
        };
        assert!(frame.pixels()[..FRAME_WIDTH * 4 * 3].iter().all(|&b| b == 0));
    }

    #[test]
    fn last_packet_flag_does_not_shift_lines() {
        let t0 = Instant::now();
        let mut asm = assembler(t0);
        feed(&mut asm, 3, 0..PACKETS_PER_FRAME - 1, t0);
        let last = VideoPacket::line_group(
            67,
            3,
            268 | u64view_protocol::video::LAST_PACKET_FLAG,
            vec![0x55; VIDEO_PAYLOAD_SIZE],
        );
        let frame = asm.add_packet(&last, t0).frame.expect("frame complete");
        let off = (271 * FRAME_WIDTH + 383) * 3;
        assert_eq!(&frame.pixels()[off..off + 3], &rgb(5));
    }

    #[test]
    fn counter_restart_resynchronises() {
        let t0 = Instant::now();
        let mut asm = assembler(t0);
        feed(&mut asm, 30_000, 0..PACKETS_PER_FRAME, t0);
        let frames = feed(&mut asm, 0, 0..PACKETS_PER_FRAME, t0);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn reset_forgets_history() {
        let t0 = Instant::now();
        let mut asm = assembler(t0);
        feed(&mut asm, 4, 0..PACKETS_PER_FRAME, t0);
        feed(&mut asm, 5, 0..3, t0);
        asm.reset();
        assert_eq!(asm.current_frame(), None);

        let frames = feed(&mut asm, 4, 0..PACKETS_PER_FRAME, t0);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn report_covers_interval() {
        let t0 = Instant::now();
        let mut asm = assembler(t0);
        feed(&mut asm, 1, 0..PACKETS_PER_FRAME, t0);
        feed(&mut asm, 2, 0..10, t0);
        feed(&mut asm, 3, 0..1, t0);

        let report = asm
            .take_report(t0 + Duration::from_secs(5), Duration::from_secs(5))
            .unwrap();
        assert_eq!(report.received, 1);
        assert_eq!(report.lost, 1);
    }
}
