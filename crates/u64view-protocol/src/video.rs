use bytes::Bytes;

use crate::error::ProtocolError;

/// Header size: 2 (sequence) + 2 (frame) + 2 (line) + 2 (width)
///            + 1 (lines per packet) + 1 (bits per pixel) + 2 (encoding) = 12 bytes.
pub const VIDEO_HEADER_SIZE: usize = 12;

/// Visible frame geometry of the VIC-II output as streamed by the device.
pub const FRAME_WIDTH: usize = 384;
pub const FRAME_HEIGHT: usize = 272;

/// Scan lines carried by one datagram.
pub const LINES_PER_PACKET: usize = 4;

/// Pixels are 4-bit palette indices, two per byte, low nibble first.
pub const BITS_PER_PIXEL: usize = 4;

/// Bytes of one packed scan line (192).
pub const LINE_BYTES: usize = FRAME_WIDTH * BITS_PER_PIXEL / 8;

/// Payload of one datagram: four packed scan lines (768 bytes).
pub const VIDEO_PAYLOAD_SIZE: usize = LINE_BYTES * LINES_PER_PACKET;

/// Datagrams per complete frame (272 / 4 = 68).
pub const PACKETS_PER_FRAME: usize = FRAME_HEIGHT / LINES_PER_PACKET;

/// Largest datagram the device emits on the video port.
pub const MAX_VIDEO_PACKET_SIZE: usize = VIDEO_HEADER_SIZE + VIDEO_PAYLOAD_SIZE;

/// Set in `line_number` on the final datagram of a frame.
pub const LAST_PACKET_FLAG: u16 = 0x8000;

/// Fixed header at the front of every video datagram.
///
/// Wire format (all fields little-endian):
/// ```text
/// [sequence: u16] [frame_number: u16] [line_number: u16] [frame_width: u16]
/// [lines_per_packet: u8] [bits_per_pixel: u8] [encoding: u16] [payload: variable]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoPacketHeader {
    pub sequence: u16,
    pub frame_number: u16,
    pub line_number: u16,
    pub frame_width: u16,
    pub lines_per_packet: u8,
    pub bits_per_pixel: u8,
    pub encoding: u16,
}

impl VideoPacketHeader {
    /// Parse the header and return it with the payload that follows.
    pub fn parse(data: &[u8]) -> Result<(Self, &[u8]), ProtocolError> {
        if data.len() < VIDEO_HEADER_SIZE {
            return Err(ProtocolError::PacketTooShort {
                expected: VIDEO_HEADER_SIZE,
                got: data.len(),
            });
        }

        let header = Self {
            sequence: u16::from_le_bytes([data[0], data[1]]),
            frame_number: u16::from_le_bytes([data[2], data[3]]),
            line_number: u16::from_le_bytes([data[4], data[5]]),
            frame_width: u16::from_le_bytes([data[6], data[7]]),
            lines_per_packet: data[8],
            bits_per_pixel: data[9],
            encoding: u16::from_le_bytes([data[10], data[11]]),
        };
        Ok((header, &data[VIDEO_HEADER_SIZE..]))
    }

    /// Serialize into the 12-byte wire layout.
    pub fn to_bytes(&self) -> [u8; VIDEO_HEADER_SIZE] {
        let mut buf = [0u8; VIDEO_HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.sequence.to_le_bytes());
        buf[2..4].copy_from_slice(&self.frame_number.to_le_bytes());
        buf[4..6].copy_from_slice(&self.line_number.to_le_bytes());
        buf[6..8].copy_from_slice(&self.frame_width.to_le_bytes());
        buf[8] = self.lines_per_packet;
        buf[9] = self.bits_per_pixel;
        buf[10..12].copy_from_slice(&self.encoding.to_le_bytes());
        buf
    }

    /// First scan line carried by this datagram, without the last-packet flag.
    pub fn first_line(&self) -> u16 {
        self.line_number & !LAST_PACKET_FLAG
    }

    /// Whether the device marked this as the final datagram of its frame.
    pub fn is_last_packet(&self) -> bool {
        self.line_number & LAST_PACKET_FLAG != 0
    }
}

/// A parsed video datagram. The payload shares the receive buffer.
#[derive(Debug, Clone)]
pub struct VideoPacket {
    pub header: VideoPacketHeader,
    pub payload: Bytes,
}

impl VideoPacket {
    /// Build a packet for a frame line group with the device's default geometry.
    pub fn line_group(sequence: u16, frame_number: u16, line_number: u16, payload: Vec<u8>) -> Self {
        Self {
            header: VideoPacketHeader {
                sequence,
                frame_number,
                line_number,
                frame_width: FRAME_WIDTH as u16,
                lines_per_packet: LINES_PER_PACKET as u8,
                bits_per_pixel: BITS_PER_PIXEL as u8,
                encoding: 0,
            },
            payload: Bytes::from(payload),
        }
    }

    /// Parse a received datagram without copying the payload.
    pub fn from_datagram(datagram: Bytes) -> Result<Self, ProtocolError> {
        let (header, _) = VideoPacketHeader::parse(&datagram)?;
        let payload = datagram.slice(VIDEO_HEADER_SIZE..);
        Ok(Self { header, payload })
    }

    /// Parse from a borrowed buffer, copying the payload.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        let (header, payload) = VideoPacketHeader::parse(data)?;
        Ok(Self {
            header,
            payload: Bytes::copy_from_slice(payload),
        })
    }

    /// Serialize to bytes as the device would send it.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(VIDEO_HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&self.header.to_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }
}
