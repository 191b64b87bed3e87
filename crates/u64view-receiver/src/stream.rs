use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use u64view_audio::jitter::JitterBuffer;
use u64view_audio::playback::AudioSink;
use u64view_protocol::audio::AudioPacket;
use u64view_protocol::video::VideoPacket;
use u64view_video::assembler::FrameAssembler;

use crate::config::ViewerConfig;
use crate::scheduler::FrameQueue;
use crate::state::ViewerState;

/// Receive buffer size; comfortably above both streams' largest datagram.
const MAX_DATAGRAM_SIZE: usize = 2048;

/// One datagram as handed from the receive task to the processing task.
#[derive(Debug, Clone)]
pub struct Datagram {
    pub payload: Bytes,
    pub source: SocketAddr,
    pub received_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    fn name(self) -> &'static str {
        match self {
            StreamKind::Video => "video",
            StreamKind::Audio => "audio",
        }
    }
}

/// Reassembly state owned by a running stream.
enum Pipeline {
    Video(Arc<Mutex<FrameAssembler>>),
    Audio(Arc<Mutex<JitterBuffer>>),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("stream mutex poisoned, recovering");
        poisoned.into_inner()
    })
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// A running stream: receive task, processing task and their shared state.
pub struct StreamHandle {
    kind: StreamKind,
    shutting_down: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
    pipeline: Pipeline,
}

impl StreamHandle {
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Stop both tasks (dropping the socket) and clear reassembly state.
    /// Calling it again is a no-op.
    pub fn stop(&mut self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        match &self.pipeline {
            Pipeline::Video(assembler) => lock(assembler).reset(),
            Pipeline::Audio(jitter) => lock(jitter).reset(),
        }
        info!(stream = self.kind.name(), "stream stopped");
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start receiving video on `socket`; assembled frames go to `queue`.
pub fn start_video(
    socket: UdpSocket,
    config: &ViewerConfig,
    queue: Arc<FrameQueue>,
    state: Arc<ViewerState>,
) -> StreamHandle {
    let shutting_down = Arc::new(AtomicBool::new(false));
    let assembler = Arc::new(Mutex::new(FrameAssembler::new(
        config.assembler_config(),
        now(),
    )));
    let (tx, rx) = mpsc::channel(config.channel_capacity);

    let recv = tokio::spawn(recv_loop(
        socket,
        tx,
        StreamKind::Video,
        state.clone(),
        shutting_down.clone(),
    ));
    let process = tokio::spawn(process_video(
        rx,
        assembler.clone(),
        queue,
        state,
        config.stats_interval(),
    ));

    StreamHandle {
        kind: StreamKind::Video,
        shutting_down,
        tasks: vec![recv, process],
        pipeline: Pipeline::Video(assembler),
    }
}

/// Start receiving audio on `socket`; ordered chunks go to `sink`.
pub fn start_audio(
    socket: UdpSocket,
    config: &ViewerConfig,
    sink: Box<dyn AudioSink>,
    state: Arc<ViewerState>,
) -> StreamHandle {
    let shutting_down = Arc::new(AtomicBool::new(false));
    let jitter = Arc::new(Mutex::new(JitterBuffer::new(config.jitter_capacity, now())));
    let (tx, rx) = mpsc::channel(config.channel_capacity);

    let recv = tokio::spawn(recv_loop(
        socket,
        tx,
        StreamKind::Audio,
        state.clone(),
        shutting_down.clone(),
    ));
    let process = tokio::spawn(process_audio(
        rx,
        jitter.clone(),
        sink,
        state,
        config.stats_interval(),
    ));

    StreamHandle {
        kind: StreamKind::Audio,
        shutting_down,
        tasks: vec![recv, process],
        pipeline: Pipeline::Audio(jitter),
    }
}

/// Read datagrams off `socket` and forward them without waiting on processing.
pub async fn recv_loop(
    socket: UdpSocket,
    tx: mpsc::Sender<Datagram>,
    kind: StreamKind,
    state: Arc<ViewerState>,
    shutting_down: Arc<AtomicBool>,
) {
    let stream = kind.name();
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    let mut recv_count: u64 = 0;

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((n, source)) => {
                if shutting_down.load(Ordering::Acquire) {
                    break;
                }
                recv_count += 1;
                if recv_count == 1 {
                    info!(stream, %source, len = n, "first datagram received");
                }
                let datagram = Datagram {
                    payload: Bytes::copy_from_slice(&buf[..n]),
                    source,
                    received_at: now(),
                };
                match tx.try_send(datagram) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        state.record_dropped_datagram();
                        warn!(stream, "processing channel full, dropping datagram");
                    }
                    Err(TrySendError::Closed(_)) => break,
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) => {
                error!(stream, "UDP recv error: {}", e);
                state.set_error(format!("{} socket: {}", stream, e));
                break;
            }
        }
    }
    debug!(stream, received = recv_count, "receive task ended");
}

/// Feed video datagrams through the assembler into the frame queue.
pub async fn process_video(
    mut rx: mpsc::Receiver<Datagram>,
    assembler: Arc<Mutex<FrameAssembler>>,
    queue: Arc<FrameQueue>,
    state: Arc<ViewerState>,
    stats_interval: Duration,
) {
    while let Some(datagram) = rx.recv().await {
        state.record_packet(datagram.received_at, datagram.source);

        let packet = match VideoPacket::from_datagram(datagram.payload) {
            Ok(p) => p,
            Err(e) => {
                trace!(source = %datagram.source, "invalid video packet: {}", e);
                state.record_malformed();
                continue;
            }
        };

        let (result, report, received, lost) = {
            let mut asm = lock(&assembler);
            let result = asm.add_packet(&packet, datagram.received_at);
            let report = asm.take_report(datagram.received_at, stats_interval);
            (result, report, asm.frames_received(), asm.frames_lost())
        };

        if let Some(frame) = result.frame {
            trace!(frame = frame.frame_number(), "frame assembled");
            queue.push(frame);
        }
        if result.frame_dropped {
            debug!(received, lost, "video frame dropped");
        }
        state.update_video_stats(received, lost);

        if let Some(report) = report {
            info!(
                received = report.received,
                lost = report.lost,
                loss_pct = format!("{:.1}", report.loss_rate() * 100.0),
                "video frames"
            );
        }
    }
    debug!("video processing task ended");
}

/// Feed audio datagrams through the jitter buffer into `sink`.
pub async fn process_audio(
    mut rx: mpsc::Receiver<Datagram>,
    jitter: Arc<Mutex<JitterBuffer>>,
    mut sink: Box<dyn AudioSink>,
    state: Arc<ViewerState>,
    stats_interval: Duration,
) {
    while let Some(datagram) = rx.recv().await {
        state.record_packet(datagram.received_at, datagram.source);

        let packet = match AudioPacket::from_datagram(datagram.payload) {
            Ok(p) => p,
            Err(e) => {
                trace!(source = %datagram.source, "invalid audio packet: {}", e);
                state.record_malformed();
                continue;
            }
        };

        let (chunks, report, received, lost, late) = {
            let mut jb = lock(&jitter);
            jb.push_packet(packet);
            let chunks = jb.drain();
            let report = jb.take_report(datagram.received_at, stats_interval);
            (
                chunks,
                report,
                jb.packets_received(),
                jb.packets_lost(),
                jb.late_packets(),
            )
        };

        for chunk in &chunks {
            sink.play(chunk);
        }
        state.update_audio_stats(received, lost, late);

        if let Some(report) = report {
            info!(
                received = report.received,
                lost = report.lost,
                loss_pct = format!("{:.1}", report.loss_rate() * 100.0),
                "audio packets"
            );
        }
    }
    debug!("audio processing task ended");
}
