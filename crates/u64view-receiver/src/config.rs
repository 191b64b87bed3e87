use std::net::Ipv4Addr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use u64view_video::assembler::AssemblerConfig;

/// Viewer configuration, loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct ViewerConfig {
    /// Multicast group the device streams to.
    #[serde(default = "default_multicast_group")]
    pub multicast_group: String,

    /// Local interface used to join the group (default "0.0.0.0", any).
    #[serde(default = "default_interface")]
    pub interface: String,

    #[serde(default = "default_video_port")]
    pub video_port: u16,

    #[serde(default = "default_audio_port")]
    pub audio_port: u16,

    /// Receive the audio stream at all.
    #[serde(default = "default_audio_enabled")]
    pub audio_enabled: bool,

    /// Presentation cadence in Hz (50 for PAL machines, 60 for NTSC).
    #[serde(default = "default_display_hz")]
    pub display_hz: u32,

    /// How long a frame may stay incomplete before it is abandoned.
    #[serde(default = "default_frame_timeout_ms")]
    pub frame_timeout_ms: u64,

    /// Fraction of line groups a frame needs to be shown when the next one starts.
    #[serde(default = "default_completeness_threshold")]
    pub completeness_threshold: f32,

    /// Assembled frames waiting for the next display tick.
    #[serde(default = "default_frame_queue_capacity")]
    pub frame_queue_capacity: usize,

    /// Silence after which the stream is reported disconnected.
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,

    /// Audio packets the jitter buffer is sized for; playback starts at half.
    #[serde(default = "default_jitter_capacity")]
    pub jitter_capacity: usize,

    /// Interval between loss statistics reports.
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,

    /// Datagrams queued between a socket and its processing task.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Kernel receive buffer requested for each socket, in bytes.
    #[serde(default = "default_recv_buffer_size")]
    pub recv_buffer_size: usize,
}

fn default_multicast_group() -> String {
    "239.0.1.64".into()
}

fn default_interface() -> String {
    "0.0.0.0".into()
}

fn default_video_port() -> u16 {
    11000
}

fn default_audio_port() -> u16 {
    11001
}

fn default_audio_enabled() -> bool {
    true
}

fn default_display_hz() -> u32 {
    50
}

fn default_frame_timeout_ms() -> u64 {
    100
}

fn default_completeness_threshold() -> f32 {
    0.75
}

fn default_frame_queue_capacity() -> usize {
    3
}

fn default_connection_timeout_secs() -> u64 {
    5
}

fn default_jitter_capacity() -> usize {
    16
}

fn default_stats_interval_secs() -> u64 {
    5
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_recv_buffer_size() -> usize {
    2 * 1024 * 1024 // 2MB
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            multicast_group: default_multicast_group(),
            interface: default_interface(),
            video_port: default_video_port(),
            audio_port: default_audio_port(),
            audio_enabled: default_audio_enabled(),
            display_hz: default_display_hz(),
            frame_timeout_ms: default_frame_timeout_ms(),
            completeness_threshold: default_completeness_threshold(),
            frame_queue_capacity: default_frame_queue_capacity(),
            connection_timeout_secs: default_connection_timeout_secs(),
            jitter_capacity: default_jitter_capacity(),
            stats_interval_secs: default_stats_interval_secs(),
            channel_capacity: default_channel_capacity(),
            recv_buffer_size: default_recv_buffer_size(),
        }
    }
}

impl ViewerConfig {
    pub fn group_addr(&self) -> Result<Ipv4Addr> {
        let addr: Ipv4Addr = self
            .multicast_group
            .parse()
            .with_context(|| format!("invalid multicast group: {}", self.multicast_group))?;
        if !addr.is_multicast() {
            bail!("{} is not a multicast address", addr);
        }
        Ok(addr)
    }

    pub fn interface_addr(&self) -> Result<Ipv4Addr> {
        self.interface
            .parse()
            .with_context(|| format!("invalid interface address: {}", self.interface))
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.group_addr()?;
        self.interface_addr()?;
        if self.display_hz == 0 {
            bail!("display_hz must be at least 1");
        }
        if !(self.completeness_threshold > 0.0 && self.completeness_threshold <= 1.0) {
            bail!(
                "completeness_threshold must be in (0, 1], got {}",
                self.completeness_threshold
            );
        }
        if self.frame_queue_capacity == 0 || self.jitter_capacity == 0 || self.channel_capacity == 0
        {
            bail!("queue capacities must be non-zero");
        }
        if self.connection_timeout_secs == 0 {
            bail!("connection_timeout_secs must be at least 1");
        }
        if self.stats_interval_secs == 0 {
            bail!("stats_interval_secs must be at least 1");
        }
        if self.video_port == self.audio_port && self.audio_enabled {
            bail!("video and audio ports must differ ({})", self.video_port);
        }
        Ok(())
    }

    pub fn display_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.display_hz.max(1) as u64)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }

    pub fn assembler_config(&self) -> AssemblerConfig {
        AssemblerConfig {
            frame_timeout: self.frame_timeout(),
            completeness_threshold: self.completeness_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = ViewerConfig::default();
        assert_eq!(config.multicast_group, "239.0.1.64");
        assert_eq!(config.video_port, 11000);
        assert_eq!(config.audio_port, 11001);
        assert_eq!(config.display_hz, 50);
        assert_eq!(config.frame_queue_capacity, 3);
        assert_eq!(config.jitter_capacity, 16);
        assert_eq!(config.frame_timeout(), Duration::from_millis(100));
        assert_eq!(config.connection_timeout(), Duration::from_secs(5));
        assert_eq!(config.display_interval(), Duration::from_millis(20));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_toml_deserialization() {
        let toml = r#"
            multicast_group = "239.0.1.65"
            video_port = 12000
            display_hz = 60
            completeness_threshold = 0.9
        "#;
        let config: ViewerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.group_addr().unwrap(), Ipv4Addr::new(239, 0, 1, 65));
        assert_eq!(config.video_port, 12000);
        assert_eq!(config.audio_port, 11001);
        assert_eq!(config.display_hz, 60);
        assert!((config.assembler_config().completeness_threshold - 0.9).abs() < 1e-6);
    }

    #[test]
    fn empty_toml_is_default() {
        let config: ViewerConfig = toml::from_str("").unwrap();
        assert_eq!(config.stats_interval(), Duration::from_secs(5));
        assert!(config.audio_enabled);
    }

    #[test]
    fn rejects_unicast_group() {
        let config = ViewerConfig {
            multicast_group: "192.168.1.64".into(),
            ..ViewerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_threshold_and_rate() {
        let config = ViewerConfig {
            completeness_threshold: 0.0,
            ..ViewerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ViewerConfig {
            display_hz: 0,
            ..ViewerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_intervals() {
        let config: ViewerConfig = toml::from_str("stats_interval_secs = 0").unwrap();
        assert!(config.validate().is_err());

        let config = ViewerConfig {
            connection_timeout_secs: 0,
            ..ViewerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn same_ports_allowed_without_audio() {
        let mut config = ViewerConfig {
            audio_port: 11000,
            ..ViewerConfig::default()
        };
        assert!(config.validate().is_err());
        config.audio_enabled = false;
        assert!(config.validate().is_ok());
    }
}
