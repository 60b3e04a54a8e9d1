use std::time::Duration;

use crate::assembly::TransferReport;

/// Errors that can occur while receiving a frame.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] camwire_transport::TransportError),

    /// Packet-level error.
    #[error("packet error: {0}")]
    Packet(#[from] camwire_packet::PacketError),

    /// Nothing arrived within the allowed time.
    #[error("timed out after {after:?} waiting for {waiting_for}")]
    Timeout {
        waiting_for: &'static str,
        after: Duration,
    },

    /// The frame header is self-contradictory.
    #[error("invalid frame header: {0}")]
    InvalidHeader(String),

    /// The announced frame exceeds the configured limit.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The transfer ended with chunks missing.
    #[error("incomplete frame: got {}/{} chunks", .0.received_chunks, .0.total_chunks)]
    Incomplete(TransferReport),
}

pub type Result<T> = std::result::Result<T, HostError>;
