//! Chunked frame packets for serial links.
//!
//! This is the protocol core of camwire. A frame travels as one header
//! packet followed by checksummed chunk packets:
//! - A 4-byte magic marker (`A5 A5 A5 A5`) for stream synchronization
//! - A 1-byte packet tag (`0x01` header, `0x02` chunk)
//! - Little-endian length/index fields, and a CRC-32 per chunk payload
//!
//! The device side writes packets with [`PacketWriter`]; the host side reads
//! them back with [`PacketReader`], which resynchronizes on the marker.

pub mod codec;
pub mod crc;
pub mod error;
pub mod plan;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_packet, encode_chunk, encode_header, write_le16, write_le32, ChunkPacket, FrameHeader,
    Packet, PacketConfig, PacketKind, CHUNK_PREFIX_SIZE, DEFAULT_CHUNK_SIZE, HEADER_PACKET_SIZE,
    MAGIC, MAGIC_BYTES, MAX_FRAME_SIZE, TAG_CHUNK, TAG_HEADER, TRIGGER_ACK, TRIGGER_CAPTURE,
};
pub use crc::checksum;
pub use error::{PacketError, Result};
pub use plan::{chunk_count, ChunkPlan, ChunkSpan};
pub use reader::PacketReader;
pub use writer::PacketWriter;
