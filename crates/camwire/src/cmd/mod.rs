use std::path::PathBuf;
use std::time::Duration;

use camwire_transport::SerialStream;
use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod inspect;
pub mod receive;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Act as the camera device: answer capture triggers with frames.
    Serve(ServeArgs),
    /// Trigger one capture and save the received frame.
    Receive(ReceiveArgs),
    /// Decode a raw wire dump and list its packets.
    Inspect(InspectArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Receive(args) => receive::run(args, format),
        Command::Inspect(args) => inspect::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Serial device to serve on.
    pub device: PathBuf,
    /// Image file, or directory of images served in name order.
    #[arg(long, short = 's', value_name = "PATH")]
    pub source: PathBuf,
    /// Line speed.
    #[arg(long, short = 'b', default_value = "115200")]
    pub baud: u32,
    /// Maximum payload per chunk packet.
    #[arg(long, default_value = "512")]
    pub chunk_size: u16,
    /// Pause after every chunk packet (e.g. 5ms, 0ms).
    #[arg(long, default_value = "5ms")]
    pub chunk_delay: String,
    /// Frames captured and dropped before each real capture. A camera
    /// sensor wants 3; file sources skip warm-up, since every warm-up
    /// capture advances a directory source to its next file.
    #[arg(long, default_value = "0")]
    pub warmup: u32,
    /// Exit after answering one trigger.
    #[arg(long)]
    pub once: bool,
}

#[derive(Args, Debug)]
pub struct ReceiveArgs {
    /// Serial device the camera is attached to.
    pub device: PathBuf,
    /// Line speed.
    #[arg(long, short = 'b', default_value = "115200")]
    pub baud: u32,
    /// Output file. Default: image_<UTC timestamp>.jpg in the current directory.
    #[arg(long, short = 'o', value_name = "FILE")]
    pub out: Option<PathBuf>,
    /// Time allowed for the trigger acknowledgment (e.g. 2s, 500ms).
    #[arg(long, default_value = "2s")]
    pub ack_timeout: String,
    /// Time allowed for the frame header.
    #[arg(long, default_value = "2s")]
    pub header_timeout: String,
    /// Longest silence tolerated between chunks.
    #[arg(long, default_value = "5s")]
    pub chunk_timeout: String,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// File holding bytes captured from the link.
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse a timeout such as `5s`, `500ms` or `3` (seconds). Zero is rejected.
pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let duration = parse_delay(input)?;
    if duration.is_zero() {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }
    Ok(duration)
}

/// Parse a pause such as `5ms`; zero is allowed.
pub(crate) fn parse_delay(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

pub(crate) fn open_port(device: &std::path::Path, baud: u32) -> CliResult<SerialStream> {
    camwire_transport::SerialPort::open(device, baud)
        .map_err(|err| crate::exit::transport_error("open failed", err))
}
