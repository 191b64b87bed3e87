use bytes::Bytes;

use crate::error::ProtocolError;

/// Header size: 2 (sequence) bytes.
pub const AUDIO_HEADER_SIZE: usize = 2;

/// PCM parameters of the device's audio stream.
pub const AUDIO_SAMPLE_RATE: u32 = 48_000;
pub const AUDIO_CHANNELS: u16 = 2;
pub const AUDIO_BITS_PER_SAMPLE: u16 = 16;

/// Nominal stereo sample frames per datagram.
pub const AUDIO_FRAMES_PER_PACKET: usize = 192;

/// Bytes of PCM in one nominal datagram (192 frames × 2 channels × 2 bytes).
pub const AUDIO_PAYLOAD_SIZE: usize =
    AUDIO_FRAMES_PER_PACKET * AUDIO_CHANNELS as usize * (AUDIO_BITS_PER_SAMPLE as usize / 8);

/// Fixed header at the front of every audio datagram.
///
/// Wire format:
/// ```text
/// [sequence: u16 LE] [pcm: i16 LE interleaved L/R, variable]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioPacketHeader {
    pub sequence: u16,
}

impl AudioPacketHeader {
    /// Parse the header and return it with the PCM that follows.
    pub fn parse(data: &[u8]) -> Result<(Self, &[u8]), ProtocolError> {
        if data.len() < AUDIO_HEADER_SIZE {
            return Err(ProtocolError::PacketTooShort {
                expected: AUDIO_HEADER_SIZE,
                got: data.len(),
            });
        }
        let sequence = u16::from_le_bytes([data[0], data[1]]);
        Ok((Self { sequence }, &data[AUDIO_HEADER_SIZE..]))
    }

    pub fn to_bytes(&self) -> [u8; AUDIO_HEADER_SIZE] {
        self.sequence.to_le_bytes()
    }
}

/// A parsed audio datagram.
#[derive(Debug, Clone)]
pub struct AudioPacket {
    pub sequence: u16,
    pub pcm: Bytes,
}

impl AudioPacket {
    pub fn new(sequence: u16, pcm: Vec<u8>) -> Self {
        Self {
            sequence,
            pcm: Bytes::from(pcm),
        }
    }

    /// Parse a received datagram without copying the PCM.
    pub fn from_datagram(datagram: Bytes) -> Result<Self, ProtocolError> {
        let (header, _) = AudioPacketHeader::parse(&datagram)?;
        Ok(Self {
            sequence: header.sequence,
            pcm: datagram.slice(AUDIO_HEADER_SIZE..),
        })
    }

    /// Parse from a borrowed buffer, copying the PCM.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        let (header, pcm) = AudioPacketHeader::parse(data)?;
        Ok(Self {
            sequence: header.sequence,
            pcm: Bytes::copy_from_slice(pcm),
        })
    }

    /// Serialize to bytes as the device would send it.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(AUDIO_HEADER_SIZE + self.pcm.len());
        buf.extend_from_slice(&self.sequence.to_le_bytes());
        buf.extend_from_slice(&self.pcm);
        buf
    }
}
