use std::fs::OpenOptions;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::SerialStream;

/// Default line speed of the camera firmware.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Baud rates accepted by [`SerialPort::open`].
#[cfg(target_os = "linux")]
pub const SUPPORTED_BAUD_RATES: &[u32] = &[
    9_600, 19_200, 38_400, 57_600, 115_200, 230_400, 460_800, 921_600,
];
#[cfg(not(target_os = "linux"))]
pub const SUPPORTED_BAUD_RATES: &[u32] = &[9_600, 19_200, 38_400, 57_600, 115_200, 230_400];

/// A tty device configured for raw 8N1 transfer.
pub struct SerialPort {
    path: PathBuf,
    baud: u32,
}

impl SerialPort {
    /// Open `path`, switch it to raw mode at `baud`, and discard stale input.
    pub fn open(path: impl AsRef<Path>, baud: u32) -> Result<SerialStream> {
        let port = Self {
            path: path.as_ref().to_path_buf(),
            baud,
        };
        let speed = speed_constant(baud).ok_or(TransportError::UnsupportedBaud(baud))?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(&port.path)
            .map_err(|e| TransportError::Open {
                path: port.path.clone(),
                source: e,
            })?;

        let fd = file.as_raw_fd();
        // SAFETY: `fd` is an open descriptor owned by `file`.
        if unsafe { libc::isatty(fd) } != 1 {
            return Err(TransportError::NotATty(port.path));
        }

        port.configure(fd, speed)?;

        let stream = SerialStream::from_tty(file);
        stream.discard_buffers()?;
        info!(path = %port.path.display(), baud = port.baud, "serial port open");
        Ok(stream)
    }

    fn configure(&self, fd: libc::c_int, speed: libc::speed_t) -> Result<()> {
        // SAFETY: termios is plain old data; zeroed is a valid starting value
        // that tcgetattr overwrites.
        let mut tio: libc::termios = unsafe { std::mem::zeroed() };

        // SAFETY: `fd` is an open tty and `tio` is a valid writable termios.
        if unsafe { libc::tcgetattr(fd, &mut tio) } != 0 {
            return Err(self.configure_error());
        }

        // SAFETY: `tio` is a valid termios obtained from tcgetattr.
        unsafe {
            libc::cfmakeraw(&mut tio);
            if libc::cfsetispeed(&mut tio, speed) != 0 || libc::cfsetospeed(&mut tio, speed) != 0 {
                return Err(self.configure_error());
            }
        }

        // 8 data bits, no parity, one stop bit, receiver on, ignore modem lines.
        tio.c_cflag &= !(libc::PARENB | libc::CSTOPB | libc::CSIZE);
        tio.c_cflag |= libc::CS8 | libc::CREAD | libc::CLOCAL;
        tio.c_cc[libc::VMIN] = 1;
        tio.c_cc[libc::VTIME] = 0;

        // SAFETY: `fd` is an open tty and `tio` is fully initialized.
        if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &tio) } != 0 {
            return Err(self.configure_error());
        }

        debug!(path = %self.path.display(), baud = self.baud, "applied raw 8N1 line settings");
        Ok(())
    }

    fn configure_error(&self) -> TransportError {
        TransportError::Configure {
            path: self.path.clone(),
            source: std::io::Error::last_os_error(),
        }
    }
}

fn speed_constant(baud: u32) -> Option<libc::speed_t> {
    let speed = match baud {
        9_600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        #[cfg(target_os = "linux")]
        460_800 => libc::B460800,
        #[cfg(target_os = "linux")]
        921_600 => libc::B921600,
        _ => return None,
    };
    Some(speed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_supported_rate_maps_to_a_speed() {
        for &baud in SUPPORTED_BAUD_RATES {
            assert!(speed_constant(baud).is_some(), "{baud} should be supported");
        }
    }

    #[test]
    fn odd_rates_are_rejected() {
        assert!(speed_constant(12_345).is_none());
        let err = SerialPort::open("/dev/null", 12_345).unwrap_err();
        assert!(matches!(err, TransportError::UnsupportedBaud(12_345)));
    }

    #[test]
    fn missing_device_reports_open_error() {
        let err = SerialPort::open("/nonexistent/camwire-tty", DEFAULT_BAUD).unwrap_err();
        assert!(matches!(err, TransportError::Open { .. }));
    }

    #[test]
    fn regular_file_is_not_a_tty() {
        let path = std::env::temp_dir().join(format!("camwire-not-tty-{}", std::process::id()));
        std::fs::write(&path, b"").unwrap();

        let err = SerialPort::open(&path, DEFAULT_BAUD).unwrap_err();
        assert!(matches!(err, TransportError::NotATty(_)));
        let _ = std::fs::remove_file(&path);
    }
}
