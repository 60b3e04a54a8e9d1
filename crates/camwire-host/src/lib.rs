//! Host side of camwire.
//!
//! Sends the capture trigger, waits for the device's acknowledgment and frame
//! header, then collects chunk packets into a [`FrameAssembler`] until the
//! frame is complete or the link goes quiet.

pub mod assembly;
pub mod error;
pub mod session;

pub use assembly::{ChunkDisposition, FrameAssembler, TransferReport};
pub use error::{HostError, Result};
pub use session::{receive_frame, Link, ReceiveConfig, ReceivedFrame};
