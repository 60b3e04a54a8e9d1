//! Device side of camwire.
//!
//! Waits for a capture trigger on the serial link, grabs one frame from a
//! [`FrameSource`], and streams it as a header packet plus paced chunk
//! packets. Capture hardware stays behind the [`FrameSource`] trait; wall
//! clock delays stay behind the [`Pacer`] trait.

pub mod capture;
pub mod error;
pub mod pacing;
pub mod server;
pub mod transfer;

pub use capture::{CaptureError, DirectorySource, FileSource, FrameSource};
pub use error::{DeviceError, Result};
pub use pacing::{Pacer, RecordingPacer, ThreadPacer};
pub use server::{Device, ServeStats};
pub use transfer::{TransferConfig, TransferOrchestrator, TransferOutcome, TransferState, TransferSummary};
