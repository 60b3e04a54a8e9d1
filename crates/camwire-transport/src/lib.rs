//! Serial link abstraction.
//!
//! The camwire protocol only needs an ordered byte stream between the device
//! and the host. This crate provides one:
//! - tty devices opened in raw 8N1 mode (unix)
//! - connected in-process pairs for simulation and tests
//!
//! Everything above this layer talks to a [`SerialStream`].

#[cfg(not(unix))]
compile_error!("camwire-transport supports unix targets only");

pub mod error;
pub mod stream;

#[cfg(unix)]
pub mod tty;

pub use error::{Result, TransportError};
pub use stream::SerialStream;

#[cfg(unix)]
pub use tty::{SerialPort, DEFAULT_BAUD, SUPPORTED_BAUD_RATES};
