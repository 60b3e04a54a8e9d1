/// Errors that can occur during packet encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    /// The buffer does not start with the packet marker.
    #[error("invalid packet magic (expected 0xA5A5A5A5)")]
    InvalidMagic,

    /// The byte after the marker is not a known packet tag.
    #[error("unknown packet tag 0x{0:02X}")]
    UnknownTag(u8),

    /// A chunk payload exceeds the configured maximum.
    #[error("chunk payload too large ({size} bytes, max {max})")]
    ChunkTooLarge { size: usize, max: usize },

    /// A frame is larger than the header's 32-bit size field or 16-bit chunk
    /// counter can describe.
    #[error("frame too large ({size} bytes, max {max} at this chunk size)")]
    FrameTooLarge { size: usize, max: usize },

    /// The header's chunk count does not match its frame and chunk sizes.
    #[error(
        "inconsistent frame header: {total_size} bytes in {chunk_size}-byte chunks, {total_chunks} chunks announced"
    )]
    InconsistentHeader {
        total_size: u32,
        chunk_size: u16,
        total_chunks: u16,
    },

    /// Chunk size must be at least one byte.
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    /// An I/O error occurred while reading or writing packets.
    #[error("packet I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The link was closed before a complete packet was transferred.
    #[error("connection closed (incomplete packet)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, PacketError>;
