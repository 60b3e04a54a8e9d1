use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use camwire_transport::SerialStream;
use tracing::trace;

use crate::codec::{encode_chunk, encode_header, FrameHeader, PacketConfig, CHUNK_PREFIX_SIZE};
use crate::error::{PacketError, Result};

/// Writes protocol packets to any `Write` stream.
///
/// Header packets are only buffered by the stream; every chunk packet is
/// followed by a flush so its bytes are on the wire before `send_chunk`
/// returns.
pub struct PacketWriter<T> {
    inner: T,
    buf: BytesMut,
    config: PacketConfig,
}

impl<T: Write> PacketWriter<T> {
    /// Create a new packet writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, PacketConfig::default())
    }

    /// Create a new packet writer with explicit configuration.
    pub fn with_config(inner: T, config: PacketConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(CHUNK_PREFIX_SIZE + u16::MAX as usize),
            config,
        }
    }

    /// Write the frame header packet.
    pub fn send_header(&mut self, header: &FrameHeader) -> Result<()> {
        self.buf.clear();
        encode_header(header, &mut self.buf);
        self.write_buffered()?;
        trace!(
            total_size = header.total_size,
            chunk_size = header.chunk_size,
            total_chunks = header.total_chunks,
            "header packet written"
        );
        Ok(())
    }

    /// Write one chunk packet and flush the stream.
    pub fn send_chunk(&mut self, index: u16, payload: &[u8]) -> Result<()> {
        if payload.len() > self.config.max_chunk_payload {
            return Err(PacketError::ChunkTooLarge {
                size: payload.len(),
                max: self.config.max_chunk_payload,
            });
        }

        self.buf.clear();
        encode_chunk(index, payload, &mut self.buf)?;
        self.write_buffered()?;
        self.flush()?;
        trace!(index, len = payload.len(), "chunk packet written");
        Ok(())
    }

    /// Write raw bytes outside the packet format (e.g. the trigger
    /// acknowledgment) and flush.
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.buf.clear();
        self.buf.extend_from_slice(bytes);
        self.write_buffered()?;
        self.flush()
    }

    fn write_buffered(&mut self) -> Result<()> {
        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(PacketError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(PacketError::Io(err)),
            }
        }
        Ok(())
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(PacketError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current packet writer configuration.
    pub fn config(&self) -> &PacketConfig {
        &self.config
    }
}

impl PacketWriter<SerialStream> {
    /// Create a packet writer for a serial link and apply the write timeout
    /// from config.
    pub fn with_config_serial(mut inner: SerialStream, config: PacketConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_packet_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_packet_error(err: camwire_transport::TransportError) -> PacketError {
    match err {
        camwire_transport::TransportError::Io(io) => PacketError::Io(io),
        camwire_transport::TransportError::Open { source, .. }
        | camwire_transport::TransportError::Configure { source, .. } => PacketError::Io(source),
        other => PacketError::Io(std::io::Error::other(other.to_string())),
    }
}
