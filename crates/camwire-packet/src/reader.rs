use std::io::{ErrorKind, Read};

use bytes::{Buf, BytesMut};
use camwire_transport::SerialStream;
use tracing::{debug, warn};

use crate::codec::{decode_packet, Packet, PacketConfig, MAGIC_BYTES};
use crate::error::{PacketError, Result};
use crate::writer::transport_to_packet_error;

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;
const READ_CHUNK_SIZE: usize = 1024;

/// Reads complete packets from any `Read` stream.
///
/// The reader hunts for the magic marker before every packet. Bytes that are
/// not part of a packet (line noise, leftovers of a truncated packet, an
/// unknown tag, or a chunk whose declared length exceeds the limit) are
/// dropped and counted in [`skipped_bytes`](Self::skipped_bytes).
pub struct PacketReader<T> {
    inner: T,
    buf: BytesMut,
    config: PacketConfig,
    skipped: u64,
}

impl<T: Read> PacketReader<T> {
    /// Create a new packet reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, PacketConfig::default())
    }

    /// Create a new packet reader with explicit configuration.
    pub fn with_config(inner: T, config: PacketConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            skipped: 0,
        }
    }

    /// Read the next complete packet (blocking).
    ///
    /// Returns `Err(PacketError::ConnectionClosed)` when EOF is reached.
    /// Read timeouts of the underlying stream surface as `PacketError::Io`
    /// and leave already-buffered bytes intact, so the call can be retried.
    pub fn read_packet(&mut self) -> Result<Packet> {
        loop {
            self.sync_to_marker();

            match decode_packet(&mut self.buf, self.config.max_chunk_payload) {
                Ok(Some(packet)) => return Ok(packet),
                Ok(None) => {}
                Err(err @ (PacketError::UnknownTag(_) | PacketError::ChunkTooLarge { .. })) => {
                    warn!(error = %err, "dropping malformed packet, resynchronizing");
                    self.discard(1);
                    continue;
                }
                Err(err) => return Err(err),
            }

            self.fill()?;
        }
    }

    /// Drop everything before the next marker candidate.
    ///
    /// When no full marker is buffered, up to three trailing bytes are kept
    /// because they may be the start of one.
    fn sync_to_marker(&mut self) {
        let found = self
            .buf
            .windows(MAGIC_BYTES.len())
            .position(|window| window == MAGIC_BYTES);

        let drop = match found {
            Some(pos) => pos,
            None => {
                let keep = (1..MAGIC_BYTES.len())
                    .rev()
                    .find(|&n| self.buf.len() >= n && self.buf.ends_with(&MAGIC_BYTES[..n]))
                    .unwrap_or(0);
                self.buf.len() - keep
            }
        };

        if drop > 0 {
            debug!(bytes = drop, "skipping bytes before packet marker");
            self.discard(drop);
        }
    }

    fn discard(&mut self, n: usize) {
        self.buf.advance(n);
        self.skipped += n as u64;
    }

    fn fill(&mut self) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => return Err(PacketError::ConnectionClosed),
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    return Ok(());
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(PacketError::Io(err)),
            }
        }
    }

    /// Queue bytes already taken off the stream ahead of everything buffered.
    pub fn unread(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut buf = BytesMut::with_capacity(bytes.len() + self.buf.len());
        buf.extend_from_slice(bytes);
        buf.extend_from_slice(&self.buf);
        self.buf = buf;
    }

    /// Number of bytes discarded while hunting for packet markers.
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    ///
    /// Buffered bytes that did not form a packet yet are lost.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum chunk payload for subsequent decoding.
    pub fn set_max_chunk_payload(&mut self, max_chunk_payload: usize) {
        self.config.max_chunk_payload = max_chunk_payload;
    }

    /// Current packet reader configuration.
    pub fn config(&self) -> &PacketConfig {
        &self.config
    }
}

impl PacketReader<SerialStream> {
    /// Create a packet reader for a serial link and apply the read timeout
    /// from config.
    pub fn with_config_serial(mut inner: SerialStream, config: PacketConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_packet_error)?;
        Ok(Self::with_config(inner, config))
    }
}
