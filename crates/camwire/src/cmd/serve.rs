use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use camwire_device::{
    Device, DirectorySource, FileSource, FrameSource, ThreadPacer, TransferConfig,
    TransferOrchestrator,
};
use camwire_packet::{PacketConfig, PacketWriter};
use tracing::info;

use crate::cmd::{open_port, parse_delay, ServeArgs};
use crate::exit::{
    device_error, packet_error, transport_error, CliError, CliResult, DATA_INVALID, INTERNAL,
    SUCCESS, USAGE,
};
use crate::output::{print_serve_stats, OutputFormat};

/// How often the trigger loop wakes up to check for Ctrl-C.
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

/// Longest a single write may block before the link is considered stuck.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = TransferConfig {
        chunk_size: args.chunk_size,
        chunk_delay: parse_delay(&args.chunk_delay)?,
        warmup_frames: args.warmup,
        ..TransferConfig::default()
    };
    let mut source = open_source(&args)?;

    let orchestrator = TransferOrchestrator::new(&mut *source, ThreadPacer, config)
        .map_err(|err| device_error("invalid transfer settings", err))?;
    let mut device = Device::new(orchestrator);
    if args.once {
        device = device.with_transfer_limit(1);
    }

    let link = open_port(&args.device, args.baud)?;
    let mut input = link
        .try_clone()
        .map_err(|err| transport_error("clone failed", err))?;
    input
        .set_read_timeout(Some(SHUTDOWN_POLL))
        .map_err(|err| transport_error("configure failed", err))?;
    let packet_config = PacketConfig {
        write_timeout: Some(WRITE_TIMEOUT),
        ..PacketConfig::default()
    };
    let mut output = PacketWriter::with_config_serial(link, packet_config)
        .map_err(|err| packet_error("configure failed", err))?;

    let shutdown = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(shutdown.clone())?;

    info!(device = %args.device.display(), baud = args.baud, "serving frames");
    let stats = device
        .serve(input, &mut output, &shutdown)
        .map_err(|err| device_error("serve failed", err))?;

    print_serve_stats(&stats, format);
    Ok(SUCCESS)
}

fn open_source(args: &ServeArgs) -> CliResult<Box<dyn FrameSource<Frame = Vec<u8>>>> {
    if args.source.is_dir() {
        let source = DirectorySource::open(&args.source)
            .map_err(|err| CliError::new(DATA_INVALID, format!("source unusable: {err}")))?;
        info!(dir = %args.source.display(), files = source.len(), "serving directory");
        return Ok(Box::new(source));
    }
    if !args.source.is_file() {
        return Err(CliError::new(
            USAGE,
            format!("source not found: {}", args.source.display()),
        ));
    }
    Ok(Box::new(FileSource::new(&args.source)))
}

fn install_ctrlc_handler(shutdown: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        shutdown.store(true, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
