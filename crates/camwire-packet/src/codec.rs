use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::crc::checksum;
use crate::error::{PacketError, Result};
use crate::plan::chunk_count;

/// Packet marker as a 32-bit value.
pub const MAGIC: u32 = 0xA5A5_A5A5;

/// Packet marker as it appears on the wire (little-endian).
pub const MAGIC_BYTES: [u8; 4] = MAGIC.to_le_bytes();

/// Tag of the frame header packet.
pub const TAG_HEADER: u8 = 0x01;

/// Tag of a chunk packet.
pub const TAG_CHUNK: u8 = 0x02;

/// Header packet: magic (4) + tag (1) + total size (4) + chunk size (2) +
/// chunk count (2) = 13 bytes.
pub const HEADER_PACKET_SIZE: usize = 13;

/// Chunk prefix: magic (4) + tag (1) + index (2) + length (2) + crc (4) =
/// 13 bytes, followed by the payload.
pub const CHUNK_PREFIX_SIZE: usize = 13;

/// Chunk payload size used by the camera firmware.
pub const DEFAULT_CHUNK_SIZE: u16 = 512;

/// Largest frame the 32-bit size field can describe.
pub const MAX_FRAME_SIZE: usize = u32::MAX as usize;

/// Byte the host sends to request a capture (ASCII `R`).
pub const TRIGGER_CAPTURE: u8 = b'R';

/// Byte the device answers a capture request with, before the header.
pub const TRIGGER_ACK: u8 = 0xFE;

const TAG_OFFSET: usize = 4;

/// Append `value` as two little-endian bytes.
pub fn write_le16(value: u16, dst: &mut impl BufMut) {
    dst.put_slice(&value.to_le_bytes());
}

/// Append `value` as four little-endian bytes.
pub fn write_le32(value: u32, dst: &mut impl BufMut) {
    dst.put_slice(&value.to_le_bytes());
}

/// Describes the frame that follows: its size and how it is split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Frame length in bytes.
    pub total_size: u32,
    /// Maximum payload per chunk packet.
    pub chunk_size: u16,
    /// Number of chunk packets that follow.
    pub total_chunks: u16,
}

impl FrameHeader {
    /// Build the header for a frame of `total_size` bytes.
    ///
    /// Fails when `chunk_size` is zero or the frame does not fit the wire
    /// fields at this chunk size.
    pub fn for_frame(total_size: usize, chunk_size: u16) -> Result<Self> {
        if chunk_size == 0 {
            return Err(PacketError::ZeroChunkSize);
        }
        let max = MAX_FRAME_SIZE.min(u16::MAX as usize * chunk_size as usize);
        if total_size > max {
            return Err(PacketError::FrameTooLarge {
                size: total_size,
                max,
            });
        }
        Ok(Self {
            total_size: total_size as u32,
            chunk_size,
            total_chunks: chunk_count(total_size, chunk_size) as u16,
        })
    }

    /// Check that `total_chunks` is the count `total_size` and `chunk_size`
    /// imply. A zero chunk size is only accepted for an empty frame.
    pub fn validate(&self) -> Result<()> {
        let expected = match self.chunk_size {
            0 if self.total_size == 0 => 0,
            0 => usize::MAX,
            chunk_size => chunk_count(self.total_size as usize, chunk_size),
        };
        if expected != self.total_chunks as usize {
            return Err(PacketError::InconsistentHeader {
                total_size: self.total_size,
                chunk_size: self.chunk_size,
                total_chunks: self.total_chunks,
            });
        }
        Ok(())
    }

    /// Payload length the chunk at `index` must carry, or `None` when the
    /// index is past the last chunk or past the end of the frame.
    pub fn expected_len(&self, index: u16) -> Option<usize> {
        if index >= self.total_chunks {
            return None;
        }
        let offset = index as usize * self.chunk_size as usize;
        let left = (self.total_size as usize).checked_sub(offset)?;
        (left > 0).then(|| left.min(self.chunk_size as usize))
    }
}

/// One slice of a frame, with its checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPacket {
    /// Position of this chunk within the frame, starting at 0.
    pub index: u16,
    /// CRC-32 as carried on the wire.
    pub crc32: u32,
    /// Chunk bytes.
    pub payload: Bytes,
}

impl ChunkPacket {
    /// Create a chunk, computing its checksum.
    pub fn new(index: u16, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        Self {
            index,
            crc32: checksum(&payload),
            payload,
        }
    }

    /// Whether the carried checksum matches the payload.
    pub fn verify(&self) -> bool {
        checksum(&self.payload) == self.crc32
    }

    /// The total wire size of this packet (prefix + payload).
    pub fn wire_size(&self) -> usize {
        CHUNK_PREFIX_SIZE + self.payload.len()
    }
}

/// Packet type as named by its tag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Header,
    Chunk,
}

impl PacketKind {
    /// Map a tag byte to a packet kind.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            TAG_HEADER => Some(Self::Header),
            TAG_CHUNK => Some(Self::Chunk),
            _ => None,
        }
    }

    /// The tag byte for this kind.
    pub fn tag(self) -> u8 {
        match self {
            Self::Header => TAG_HEADER,
            Self::Chunk => TAG_CHUNK,
        }
    }
}

/// A decoded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Header(FrameHeader),
    Chunk(ChunkPacket),
}

/// Encode a frame header packet.
///
/// Wire format:
/// ```text
/// ┌─────────────┬─────┬────────────┬────────────┬──────────────┐
/// │ Magic (4B)  │ Tag │ Total size │ Chunk size │ Total chunks │
/// │ A5 A5 A5 A5 │ 01  │ (4B LE)    │ (2B LE)    │ (2B LE)      │
/// └─────────────┴─────┴────────────┴────────────┴──────────────┘
/// ```
pub fn encode_header(header: &FrameHeader, dst: &mut BytesMut) {
    dst.reserve(HEADER_PACKET_SIZE);
    dst.put_slice(&MAGIC_BYTES);
    dst.put_u8(TAG_HEADER);
    write_le32(header.total_size, dst);
    write_le16(header.chunk_size, dst);
    write_le16(header.total_chunks, dst);
}

/// Encode a chunk packet; the CRC-32 is computed over `payload`.
///
/// Wire format:
/// ```text
/// ┌─────────────┬─────┬─────────┬─────────┬─────────┬─────────────────┐
/// │ Magic (4B)  │ Tag │ Index   │ Length  │ CRC-32  │ Payload         │
/// │ A5 A5 A5 A5 │ 02  │ (2B LE) │ (2B LE) │ (4B LE) │ (Length bytes)  │
/// └─────────────┴─────┴─────────┴─────────┴─────────┴─────────────────┘
/// ```
pub fn encode_chunk(index: u16, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u16::MAX as usize {
        return Err(PacketError::ChunkTooLarge {
            size: payload.len(),
            max: u16::MAX as usize,
        });
    }
    dst.reserve(CHUNK_PREFIX_SIZE + payload.len());
    dst.put_slice(&MAGIC_BYTES);
    dst.put_u8(TAG_CHUNK);
    write_le16(index, dst);
    write_le16(payload.len() as u16, dst);
    write_le32(checksum(payload), dst);
    dst.put_slice(payload);
    Ok(())
}

/// Decode one packet from the start of a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete packet yet.
/// On success, consumes the packet bytes from the buffer. The checksum is not
/// verified here; see [`ChunkPacket::verify`].
pub fn decode_packet(src: &mut BytesMut, max_chunk_payload: usize) -> Result<Option<Packet>> {
    if src.len() < TAG_OFFSET + 1 {
        return Ok(None);
    }
    if src[..TAG_OFFSET] != MAGIC_BYTES {
        return Err(PacketError::InvalidMagic);
    }

    let tag = src[TAG_OFFSET];
    match PacketKind::from_tag(tag) {
        Some(PacketKind::Header) => {
            if src.len() < HEADER_PACKET_SIZE {
                return Ok(None);
            }
            src.advance(TAG_OFFSET + 1);
            let header = FrameHeader {
                total_size: src.get_u32_le(),
                chunk_size: src.get_u16_le(),
                total_chunks: src.get_u16_le(),
            };
            Ok(Some(Packet::Header(header)))
        }
        Some(PacketKind::Chunk) => {
            if src.len() < CHUNK_PREFIX_SIZE {
                return Ok(None);
            }
            let payload_len = u16::from_le_bytes([src[7], src[8]]) as usize;
            if payload_len > max_chunk_payload {
                return Err(PacketError::ChunkTooLarge {
                    size: payload_len,
                    max: max_chunk_payload,
                });
            }
            if src.len() < CHUNK_PREFIX_SIZE + payload_len {
                return Ok(None);
            }

            src.advance(TAG_OFFSET + 1);
            let index = src.get_u16_le();
            src.advance(2);
            let crc32 = src.get_u32_le();
            let payload = src.split_to(payload_len).freeze();
            Ok(Some(Packet::Chunk(ChunkPacket {
                index,
                crc32,
                payload,
            })))
        }
        None => Err(PacketError::UnknownTag(tag)),
    }
}

/// Configuration for packet readers and writers.
#[derive(Debug, Clone)]
pub struct PacketConfig {
    /// Largest chunk payload accepted when decoding. Default: 65535.
    pub max_chunk_payload: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for PacketConfig {
    fn default() -> Self {
        Self {
            max_chunk_payload: u16::MAX as usize,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
