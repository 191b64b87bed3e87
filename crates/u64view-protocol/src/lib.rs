//! Wire format of the Ultimate 64 video and audio multicast streams.
//!
//! Both streams are plain UDP datagrams with a fixed little-endian header
//! followed by raw payload. Nothing here allocates beyond the payload handle
//! and nothing here keeps state across packets, except [`stats::LossCounter`].

pub mod audio;
pub mod error;
pub mod seq;
pub mod stats;
pub mod video;

pub use error::ProtocolError;
