use bytes::{Bytes, BytesMut};
use camwire_packet::{ChunkPacket, FrameHeader};
use tracing::{debug, warn};

use crate::error::HostError;

/// What happened to a chunk handed to [`FrameAssembler::accept`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkDisposition {
    /// The chunk was new and valid.
    Stored,
    /// The carried CRC-32 does not match the payload.
    CrcMismatch { expected: u32, actual: u32 },
    /// The index is past the announced chunk count.
    OutOfRange,
    /// The payload length differs from what the header implies.
    LengthMismatch { expected: usize, actual: usize },
    /// That index was already filled.
    Duplicate,
}

/// Counters describing one received transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    pub total_size: u32,
    pub chunk_size: u16,
    pub total_chunks: u16,
    pub received_chunks: u16,
    pub crc_failures: u32,
    pub rejected_chunks: u32,
    pub duplicate_chunks: u32,
    /// Bytes dropped while searching for packet markers.
    pub skipped_bytes: u64,
    /// Whether the device acknowledged the trigger.
    pub ack_received: bool,
}

impl TransferReport {
    /// Chunks announced but never stored.
    pub fn missing_chunks(&self) -> u16 {
        self.total_chunks - self.received_chunks
    }
}

/// Collects the chunks of one frame, in any order, and checks each one.
pub struct FrameAssembler {
    header: FrameHeader,
    chunks: Vec<Option<Bytes>>,
    report: TransferReport,
}

impl FrameAssembler {
    /// Start assembling the frame `header` announces.
    ///
    /// Fails with [`HostError::InvalidHeader`] when the chunk count does not
    /// match the frame and chunk sizes.
    pub fn new(header: FrameHeader) -> Result<Self, HostError> {
        header
            .validate()
            .map_err(|err| HostError::InvalidHeader(err.to_string()))?;
        Ok(Self {
            header,
            chunks: vec![None; header.total_chunks as usize],
            report: TransferReport {
                total_size: header.total_size,
                chunk_size: header.chunk_size,
                total_chunks: header.total_chunks,
                ..TransferReport::default()
            },
        })
    }

    /// Check a chunk and store it if it belongs to this frame.
    pub fn accept(&mut self, chunk: ChunkPacket) -> ChunkDisposition {
        let disposition = self.classify(&chunk);
        match disposition {
            ChunkDisposition::Stored => {
                debug!(
                    index = chunk.index,
                    len = chunk.payload.len(),
                    received = self.report.received_chunks + 1,
                    total = self.header.total_chunks,
                    "chunk received"
                );
                self.chunks[chunk.index as usize] = Some(chunk.payload);
                self.report.received_chunks += 1;
            }
            ChunkDisposition::CrcMismatch { expected, actual } => {
                warn!(
                    index = chunk.index,
                    expected = format_args!("{expected:#010x}"),
                    actual = format_args!("{actual:#010x}"),
                    "chunk crc mismatch"
                );
                self.report.crc_failures += 1;
            }
            ChunkDisposition::Duplicate => {
                debug!(index = chunk.index, "duplicate chunk ignored");
                self.report.duplicate_chunks += 1;
            }
            ChunkDisposition::OutOfRange | ChunkDisposition::LengthMismatch { .. } => {
                warn!(index = chunk.index, ?disposition, "chunk rejected");
                self.report.rejected_chunks += 1;
            }
        }
        disposition
    }

    fn classify(&self, chunk: &ChunkPacket) -> ChunkDisposition {
        let Some(expected_len) = self.header.expected_len(chunk.index) else {
            return ChunkDisposition::OutOfRange;
        };
        let actual = camwire_packet::checksum(&chunk.payload);
        if actual != chunk.crc32 {
            return ChunkDisposition::CrcMismatch {
                expected: chunk.crc32,
                actual,
            };
        }
        if chunk.payload.len() != expected_len {
            return ChunkDisposition::LengthMismatch {
                expected: expected_len,
                actual: chunk.payload.len(),
            };
        }
        if self.chunks[chunk.index as usize].is_some() {
            return ChunkDisposition::Duplicate;
        }
        ChunkDisposition::Stored
    }

    /// Whether every announced chunk has been stored.
    pub fn is_complete(&self) -> bool {
        self.report.received_chunks == self.header.total_chunks
    }

    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    pub fn report(&self) -> &TransferReport {
        &self.report
    }

    /// Record bytes the packet reader dropped while resynchronizing.
    pub fn set_skipped_bytes(&mut self, skipped: u64) {
        self.report.skipped_bytes = skipped;
    }

    /// Record whether the trigger was acknowledged.
    pub fn set_ack_received(&mut self, ack: bool) {
        self.report.ack_received = ack;
    }

    /// Concatenate the chunks in index order.
    ///
    /// Fails with [`HostError::Incomplete`] unless every chunk arrived.
    pub fn finish(self) -> Result<(Bytes, TransferReport), HostError> {
        if !self.is_complete() {
            return Err(HostError::Incomplete(self.report));
        }

        let mut frame = BytesMut::with_capacity(self.header.total_size as usize);
        for chunk in self.chunks.into_iter().flatten() {
            frame.extend_from_slice(&chunk);
        }
        if frame.len() != self.header.total_size as usize {
            return Err(HostError::InvalidHeader(format!(
                "assembled {} bytes, header announced {}",
                frame.len(),
                self.header.total_size
            )));
        }
        Ok((frame.freeze(), self.report))
    }
}
