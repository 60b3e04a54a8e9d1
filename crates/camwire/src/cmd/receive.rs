use std::path::PathBuf;

use camwire_host::{receive_frame, HostError, ReceiveConfig};
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

use crate::cmd::{open_port, parse_duration, ReceiveArgs};
use crate::exit::{host_error, io_error, CliResult, SUCCESS};
use crate::output::{print_received, OutputFormat};

pub fn run(args: ReceiveArgs, format: OutputFormat) -> CliResult<i32> {
    let config = ReceiveConfig {
        ack_timeout: parse_duration(&args.ack_timeout)?,
        header_timeout: parse_duration(&args.header_timeout)?,
        chunk_timeout: parse_duration(&args.chunk_timeout)?,
        ..ReceiveConfig::default()
    };

    let link = open_port(&args.device, args.baud)?;
    let frame = receive_frame(link, &config).map_err(|err| {
        if let HostError::Incomplete(report) = &err {
            warn!(
                missing = report.missing_chunks(),
                crc_failures = report.crc_failures,
                "frame discarded"
            );
        }
        host_error("receive failed", err)
    })?;

    let received_at = Utc::now();
    let path = args.out.unwrap_or_else(|| default_image_name(received_at));
    std::fs::write(&path, &frame.data)
        .map_err(|err| io_error(&format!("failed writing {}", path.display()), err))?;

    print_received(
        &path,
        &frame.report,
        &received_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        format,
    );
    Ok(SUCCESS)
}

/// `image_YYYY-MM-DD_HH-MM-SS.jpg` for the given instant.
pub(crate) fn default_image_name(at: DateTime<Utc>) -> PathBuf {
    PathBuf::from(at.format("image_%Y-%m-%d_%H-%M-%S.jpg").to_string())
}
