use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use bytes::Bytes;
use camwire_packet::{
    Packet, PacketConfig, PacketError, PacketReader, PacketWriter, TRIGGER_ACK, TRIGGER_CAPTURE,
};
use camwire_transport::SerialStream;
use tracing::{debug, info, warn};

use crate::assembly::{FrameAssembler, TransferReport};
use crate::error::{HostError, Result};

/// A byte link whose read timeout can be adjusted between reads.
pub trait Link: Read + Write {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> camwire_transport::Result<()>;
}

impl Link for SerialStream {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> camwire_transport::Result<()> {
        SerialStream::set_read_timeout(self, timeout)
    }
}

/// Receive behavior.
#[derive(Debug, Clone)]
pub struct ReceiveConfig {
    /// How long to wait for the trigger acknowledgment. Default: 2 s.
    pub ack_timeout: Duration,
    /// How long to wait for the frame header. Default: 2 s.
    pub header_timeout: Duration,
    /// Longest silence tolerated between chunks. Default: 5 s.
    pub chunk_timeout: Duration,
    /// Largest frame accepted. Default: 16 MiB.
    pub max_frame_size: usize,
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(2),
            header_timeout: Duration::from_secs(2),
            chunk_timeout: Duration::from_secs(5),
            max_frame_size: 16 * 1024 * 1024,
        }
    }
}

/// A completely received frame.
#[derive(Debug, Clone)]
pub struct ReceivedFrame {
    pub data: Bytes,
    pub report: TransferReport,
}

/// Trigger one capture on `link` and reassemble the frame the device sends.
///
/// A missing acknowledgment is only logged; the header may still follow.
/// Chunks that fail their checksum are dropped, so a damaged transfer ends in
/// [`HostError::Incomplete`] once the link goes quiet for `chunk_timeout`.
pub fn receive_frame<L: Link>(mut link: L, config: &ReceiveConfig) -> Result<ReceivedFrame> {
    {
        let mut trigger = PacketWriter::new(&mut link);
        trigger.send_raw(&[TRIGGER_CAPTURE])?;
    }
    debug!("capture trigger sent");

    let ack = wait_for_ack(&mut link, config.ack_timeout)?;
    let ack_received = ack == AckWait::Acked;
    match ack {
        AckWait::Acked => debug!("trigger acknowledged"),
        AckWait::Missing => {
            warn!(timeout = ?config.ack_timeout, "no trigger acknowledgment, waiting for header anyway")
        }
        AckWait::Other(byte) => {
            warn!(byte, "expected trigger acknowledgment, waiting for header anyway")
        }
    }

    let mut reader = PacketReader::with_config(link, PacketConfig::default());
    if let AckWait::Other(byte) = ack {
        reader.unread(&[byte]);
    }
    let header = loop {
        match read_within(&mut reader, config.header_timeout, "frame header")? {
            Some(Packet::Header(header)) => break header,
            Some(Packet::Chunk(chunk)) => {
                debug!(index = chunk.index, "chunk before header ignored");
            }
            None => {
                return Err(HostError::Timeout {
                    waiting_for: "frame header",
                    after: config.header_timeout,
                })
            }
        }
    };
    check_frame_size(&header, config)?;
    info!(
        total_size = header.total_size,
        total_chunks = header.total_chunks,
        chunk_size = header.chunk_size,
        "frame header received"
    );
    reader.set_max_chunk_payload(header.chunk_size as usize);

    let mut assembler = FrameAssembler::new(header)?;
    assembler.set_ack_received(ack_received);

    while !assembler.is_complete() {
        match read_within(&mut reader, config.chunk_timeout, "chunk") {
            Ok(Some(Packet::Chunk(chunk))) => {
                assembler.accept(chunk);
            }
            Ok(Some(Packet::Header(other))) => {
                warn!(?other, "unexpected header during transfer ignored");
            }
            Ok(None) => {
                warn!(timeout = ?config.chunk_timeout, "link went quiet before frame was complete");
                break;
            }
            Err(HostError::Packet(PacketError::ConnectionClosed)) => {
                warn!("link closed before frame was complete");
                break;
            }
            Err(err) => return Err(err),
        }
    }

    assembler.set_skipped_bytes(reader.skipped_bytes());
    let (data, report) = assembler.finish()?;
    info!(
        size = data.len(),
        crc_failures = report.crc_failures,
        "frame received"
    );
    Ok(ReceivedFrame { data, report })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AckWait {
    Acked,
    Missing,
    /// The first byte back was not the acknowledgment.
    Other(u8),
}

/// Wait for the first byte after the trigger.
///
/// Exactly one byte is taken off the link so a device that skips the
/// acknowledgment does not lose the start of its header.
fn wait_for_ack<L: Link>(link: &mut L, timeout: Duration) -> Result<AckWait> {
    let deadline = Instant::now() + timeout;
    let mut byte = [0u8; 1];
    loop {
        let Some(remaining) = remaining(deadline) else {
            return Ok(AckWait::Missing);
        };
        link.set_read_timeout(Some(remaining))?;
        match link.read(&mut byte) {
            Ok(0) => return Err(PacketError::ConnectionClosed.into()),
            Ok(_) if byte[0] == TRIGGER_ACK => return Ok(AckWait::Acked),
            Ok(_) => return Ok(AckWait::Other(byte[0])),
            Err(err) if is_timeout(&err) || err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(PacketError::Io(err).into()),
        }
    }
}

/// Read the next packet, giving up after `timeout`. `Ok(None)` means the
/// deadline passed.
fn read_within<L: Link>(
    reader: &mut PacketReader<L>,
    timeout: Duration,
    waiting_for: &'static str,
) -> Result<Option<Packet>> {
    let deadline = Instant::now() + timeout;
    loop {
        let Some(remaining) = remaining(deadline) else {
            debug!(waiting_for, "read deadline passed");
            return Ok(None);
        };
        reader.get_mut().set_read_timeout(Some(remaining))?;
        match reader.read_packet() {
            Ok(packet) => return Ok(Some(packet)),
            Err(PacketError::Io(err)) if is_timeout(&err) => {}
            Err(err) => return Err(err.into()),
        }
    }
}

fn check_frame_size(header: &camwire_packet::FrameHeader, config: &ReceiveConfig) -> Result<()> {
    if header.total_size as usize > config.max_frame_size {
        return Err(HostError::FrameTooLarge {
            size: header.total_size as usize,
            max: config.max_frame_size,
        });
    }
    Ok(())
}

fn remaining(deadline: Instant) -> Option<Duration> {
    let left = deadline.saturating_duration_since(Instant::now());
    // A zero timeout means "block forever" to the OS, never pass it through.
    (left >= Duration::from_millis(1)).then_some(left)
}

fn is_timeout(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}
