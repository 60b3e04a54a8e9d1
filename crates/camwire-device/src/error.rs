/// Errors that can occur on the device side.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] camwire_transport::TransportError),

    /// Packet-level error while writing to the link.
    #[error("packet error: {0}")]
    Packet(#[from] camwire_packet::PacketError),

    /// The transfer configuration cannot be used.
    #[error("invalid transfer config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, DeviceError>;
