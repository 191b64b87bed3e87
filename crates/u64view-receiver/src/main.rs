use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::task::JoinHandle;
use tracing::{error, info};
use u64view_audio::playback::{playback_queue, PLAYBACK_BUFFER_SIZE};

mod config;
mod output;
mod scheduler;
mod socket;
mod state;
mod stream;

use config::ViewerConfig;
use scheduler::{FrameQueue, PlayoutScheduler, SchedulerConfig};
use state::ViewerState;
use stream::StreamHandle;

#[derive(Parser)]
#[command(name = "u64view", about = "Ultimate 64 video and audio stream viewer")]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<String>,

    /// Multicast group, overrides config
    #[arg(long)]
    group: Option<String>,

    /// Video UDP port, overrides config
    #[arg(long)]
    video_port: Option<u16>,

    /// Audio UDP port, overrides config
    #[arg(long)]
    audio_port: Option<u16>,

    /// Do not receive the audio stream
    #[arg(long)]
    no_audio: bool,

    /// Display refresh rate in Hz, overrides config
    #[arg(long)]
    display_hz: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "u64view=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = if let Some(config_path) = &args.config {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read config file: {}", config_path))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", config_path))?
    } else {
        ViewerConfig::default()
    };

    if let Some(group) = args.group {
        config.multicast_group = group;
    }
    if let Some(port) = args.video_port {
        config.video_port = port;
    }
    if let Some(port) = args.audio_port {
        config.audio_port = port;
    }
    if args.no_audio {
        config.audio_enabled = false;
    }
    if let Some(hz) = args.display_hz {
        config.display_hz = hz;
    }
    config.validate().context("invalid configuration")?;

    info!("u64view starting");
    info!(
        group = %config.multicast_group,
        video_port = config.video_port,
        audio_port = config.audio_port,
        audio = config.audio_enabled,
        display_hz = config.display_hz,
    );

    let group = config.group_addr()?;
    let interface = config.interface_addr()?;
    let state = Arc::new(ViewerState::new());
    let queue = Arc::new(FrameQueue::new(config.frame_queue_capacity));
    let shutting_down = Arc::new(AtomicBool::new(false));

    let video_socket =
        socket::bind_multicast(group, interface, config.video_port, config.recv_buffer_size)
            .context("failed to open video stream")?;
    let mut streams: Vec<StreamHandle> = vec![stream::start_video(
        video_socket,
        &config,
        queue.clone(),
        state.clone(),
    )];

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    if config.audio_enabled {
        match socket::bind_multicast(group, interface, config.audio_port, config.recv_buffer_size)
        {
            Ok(audio_socket) => {
                let (producer, consumer) = playback_queue(PLAYBACK_BUFFER_SIZE);
                streams.push(stream::start_audio(
                    audio_socket,
                    &config,
                    Box::new(producer),
                    state.clone(),
                ));
                tasks.push(output::spawn_output_clock(
                    consumer,
                    state.clone(),
                    shutting_down.clone(),
                ));
            }
            Err(e) => {
                // Video keeps running without sound.
                error!("failed to open audio stream: {:#}", e);
                state.set_error(format!("audio: {:#}", e));
            }
        }
    }

    let playout = PlayoutScheduler::new(SchedulerConfig::from(&config), queue, state.clone());
    tasks.push(scheduler::spawn(playout, shutting_down.clone()));
    tasks.push(spawn_status_reporter(
        state.clone(),
        config.stats_interval(),
        shutting_down.clone(),
    ));

    info!("viewer ready, waiting for stream");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("shutting down");
    shutting_down.store(true, Ordering::Release);
    for stream in &mut streams {
        info!(stream = ?stream.kind(), "stopping stream");
        stream.stop();
    }
    for task in tasks {
        task.abort();
    }

    let snap = state.snapshot();
    info!(
        status = ?state.status(),
        frames = snap.frames_received,
        frames_lost = snap.frames_lost,
        audio_lost = snap.audio_packets_lost,
        "stopped"
    );
    Ok(())
}

/// Log the viewer snapshot every `interval`.
fn spawn_status_reporter(
    state: Arc<ViewerState>,
    interval: std::time::Duration,
    shutting_down: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if shutting_down.load(Ordering::Acquire) {
                break;
            }
            let snap = state.snapshot();
            info!(
                status = ?snap.status,
                source = ?snap.source,
                fps = format!("{:.1}", snap.fps),
                frame = ?snap.current_frame,
                frames_received = snap.frames_received,
                frames_lost = snap.frames_lost,
                audio_received = snap.audio_packets_received,
                audio_lost = snap.audio_packets_lost,
                audio_late = snap.audio_late_packets,
                audio_level = format!("{:.2}", snap.audio_level),
                dropped = snap.datagrams_dropped,
                malformed = snap.malformed_packets,
                "status"
            );
        }
    })
}
