//! Chunked, CRC-checked transfer of camera frames over a serial link.
//!
//! A device waits for a one-byte capture trigger, acknowledges it, and sends
//! the captured frame as a header packet followed by paced chunk packets,
//! each carrying a CRC-32 of its payload. A host sends the trigger and
//! reassembles the frame.
//!
//! # Crate Structure
//!
//! - [`transport`]: serial link (raw tty, in-process pairs)
//! - [`packet`]: wire format, CRC-32, chunk planning, packet reader/writer
//! - [`device`]: capture sources, paced transfer, trigger loop
//! - [`host`]: trigger, receive, reassemble

/// Re-export transport types.
pub mod transport {
    pub use camwire_transport::*;
}

/// Re-export packet types.
pub mod packet {
    pub use camwire_packet::*;
}

/// Re-export device types.
pub mod device {
    pub use camwire_device::*;
}

/// Re-export host types.
pub mod host {
    pub use camwire_host::*;
}
