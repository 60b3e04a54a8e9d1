use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// A connected serial link. Implements `Read + Write`.
///
/// On unix this wraps either an open tty device or one end of a socket pair
/// standing in for a cable. Timeouts surface as `ErrorKind::TimedOut` or
/// `ErrorKind::WouldBlock` from `read`/`write`, depending on the backend.
pub struct SerialStream {
    inner: SerialStreamInner,
}

enum SerialStreamInner {
    #[cfg(unix)]
    Tty(TtyHandle),
    #[cfg(unix)]
    Pair(std::os::unix::net::UnixStream),
}

#[cfg(unix)]
struct TtyHandle {
    file: std::fs::File,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl Read for SerialStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            SerialStreamInner::Tty(tty) => {
                wait_ready(&tty.file, libc::POLLIN, tty.read_timeout)?;
                tty.file.read(buf)
            }
            #[cfg(unix)]
            SerialStreamInner::Pair(stream) => stream.read(buf),
        }
    }
}

impl Write for SerialStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            SerialStreamInner::Tty(tty) => {
                wait_ready(&tty.file, libc::POLLOUT, tty.write_timeout)?;
                tty.file.write(buf)
            }
            #[cfg(unix)]
            SerialStreamInner::Pair(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            SerialStreamInner::Tty(tty) => drain(&tty.file),
            #[cfg(unix)]
            SerialStreamInner::Pair(stream) => stream.flush(),
        }
    }
}

impl SerialStream {
    #[cfg(unix)]
    pub(crate) fn from_tty(file: std::fs::File) -> Self {
        Self {
            inner: SerialStreamInner::Tty(TtyHandle {
                file,
                read_timeout: None,
                write_timeout: None,
            }),
        }
    }

    /// Create a connected pair of links, as if joined by a null-modem cable.
    ///
    /// Bytes written to one end are read from the other, in order.
    #[cfg(unix)]
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = std::os::unix::net::UnixStream::pair()?;
        Ok((
            Self {
                inner: SerialStreamInner::Pair(left),
            },
            Self {
                inner: SerialStreamInner::Pair(right),
            },
        ))
    }

    /// Set read timeout. `None` blocks indefinitely.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            SerialStreamInner::Tty(tty) => {
                tty.read_timeout = timeout;
                Ok(())
            }
            #[cfg(unix)]
            SerialStreamInner::Pair(stream) => {
                stream.set_read_timeout(timeout).map_err(Into::into)
            }
        }
    }

    /// Set write timeout. `None` blocks indefinitely.
    pub fn set_write_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            SerialStreamInner::Tty(tty) => {
                tty.write_timeout = timeout;
                Ok(())
            }
            #[cfg(unix)]
            SerialStreamInner::Pair(stream) => {
                stream.set_write_timeout(timeout).map_err(Into::into)
            }
        }
    }

    /// Try to clone this link (duplicates the file descriptor).
    ///
    /// Timeouts on a tty clone start unset.
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            #[cfg(unix)]
            SerialStreamInner::Tty(tty) => Ok(Self::from_tty(tty.file.try_clone()?)),
            #[cfg(unix)]
            SerialStreamInner::Pair(stream) => Ok(Self {
                inner: SerialStreamInner::Pair(stream.try_clone()?),
            }),
        }
    }

    /// Discard any bytes buffered by the driver in both directions.
    ///
    /// A no-op for in-process pairs.
    pub fn discard_buffers(&self) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            SerialStreamInner::Tty(tty) => {
                use std::os::fd::AsRawFd;

                // SAFETY: the descriptor is an open tty owned by `tty.file`.
                let rc = unsafe { libc::tcflush(tty.file.as_raw_fd(), libc::TCIOFLUSH) };
                if rc != 0 {
                    return Err(std::io::Error::last_os_error().into());
                }
                Ok(())
            }
            #[cfg(unix)]
            SerialStreamInner::Pair(_) => Ok(()),
        }
    }
}

/// Block until `fd` is ready for `events` or the timeout elapses.
#[cfg(unix)]
fn wait_ready(
    file: &std::fs::File,
    events: libc::c_short,
    timeout: Option<Duration>,
) -> std::io::Result<()> {
    use std::os::fd::AsRawFd;

    let Some(timeout) = timeout else {
        return Ok(());
    };
    let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
    let mut pfd = libc::pollfd {
        fd: file.as_raw_fd(),
        events,
        revents: 0,
    };

    // SAFETY: `pfd` is a valid pollfd for the duration of the call and the
    // count matches the single entry passed.
    let rc = unsafe { libc::poll(&mut pfd, 1, millis) };
    match rc {
        0 => Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "serial link timed out",
        )),
        n if n < 0 => Err(std::io::Error::last_os_error()),
        _ => Ok(()),
    }
}

/// Wait until every queued byte has left the UART.
#[cfg(unix)]
fn drain(file: &std::fs::File) -> std::io::Result<()> {
    use std::os::fd::AsRawFd;

    // SAFETY: the descriptor is an open tty owned by `file`.
    let rc = unsafe { libc::tcdrain(file.as_raw_fd()) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

impl std::fmt::Debug for SerialStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            #[cfg(unix)]
            SerialStreamInner::Tty(_) => {
                f.debug_struct("SerialStream").field("type", &"tty").finish()
            }
            #[cfg(unix)]
            SerialStreamInner::Pair(_) => {
                f.debug_struct("SerialStream").field("type", &"pair").finish()
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::ErrorKind;

    use super::*;

    #[test]
    fn pair_carries_bytes_in_order() {
        let (mut device, mut host) = SerialStream::pair().unwrap();

        device.write_all(b"\xA5\xA5\xA5\xA5\x01").unwrap();
        device.flush().unwrap();

        let mut buf = [0u8; 5];
        host.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"\xA5\xA5\xA5\xA5\x01");
    }

    #[test]
    fn pair_is_bidirectional() {
        let (mut device, mut host) = SerialStream::pair().unwrap();

        host.write_all(b"R").unwrap();
        let mut trigger = [0u8; 1];
        device.read_exact(&mut trigger).unwrap();
        assert_eq!(trigger[0], b'R');

        device.write_all(&[0xFE]).unwrap();
        let mut ack = [0u8; 1];
        host.read_exact(&mut ack).unwrap();
        assert_eq!(ack[0], 0xFE);
    }

    #[test]
    fn read_timeout_expires_on_silent_link() {
        let (_device, mut host) = SerialStream::pair().unwrap();
        host.set_read_timeout(Some(Duration::from_millis(20))).unwrap();

        let mut buf = [0u8; 1];
        let err = host.read(&mut buf).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::WouldBlock | ErrorKind::TimedOut
        ));
    }

    #[test]
    fn cloned_end_shares_the_link() {
        let (device, mut host) = SerialStream::pair().unwrap();
        let mut writer = device.try_clone().unwrap();

        writer.write_all(b"xy").unwrap();
        let mut buf = [0u8; 2];
        host.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"xy");
        drop(device);
    }

    #[test]
    fn discard_buffers_is_noop_for_pairs() {
        let (device, _host) = SerialStream::pair().unwrap();
        assert!(device.discard_buffers().is_ok());
    }

    #[test]
    fn debug_names_backend() {
        let (device, _host) = SerialStream::pair().unwrap();
        assert_eq!(format!("{device:?}"), "SerialStream { type: \"pair\" }");
    }
}
