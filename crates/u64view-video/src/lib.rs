pub mod assembler;
pub mod convert;
pub mod palette;

use std::time::Instant;

pub use u64view_protocol::video::{FRAME_HEIGHT, FRAME_WIDTH, PACKETS_PER_FRAME};

/// Size in bytes of one RGB888 frame.
pub const FRAME_RGB_SIZE: usize = FRAME_WIDTH * FRAME_HEIGHT * 3;

/// A fully assembled RGB888 frame. Immutable once built.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    frame_number: u16,
    pixels: Vec<u8>,
    created_at: Instant,
}

impl VideoFrame {
    /// Wrap an RGB888 buffer of `FRAME_WIDTH` × `FRAME_HEIGHT` pixels.
    pub fn new(frame_number: u16, pixels: Vec<u8>, created_at: Instant) -> Self {
        debug_assert_eq!(pixels.len(), FRAME_RGB_SIZE);
        Self {
            frame_number,
            pixels,
            created_at,
        }
    }

    pub fn frame_number(&self) -> u16 {
        self.frame_number
    }

    /// RGB888, row-major, no padding.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn width(&self) -> usize {
        FRAME_WIDTH
    }

    pub fn height(&self) -> usize {
        FRAME_HEIGHT
    }

    /// Opaque RGBA8888 copy for rendering surfaces that need an alpha channel.
    pub fn to_rgba(&self) -> Vec<u8> {
        convert::rgb_to_rgba(&self.pixels)
    }
}
