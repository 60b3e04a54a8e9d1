use std::io::Cursor;

use camwire_host::FrameAssembler;
use camwire_packet::{Packet, PacketError, PacketReader};
use tracing::{debug, warn};

use crate::cmd::InspectArgs;
use crate::exit::{io_error, packet_error, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_inspect, InspectSummary, OutputFormat, PacketRow};

/// Exits with `DATA_INVALID` when the dump holds no packets, the first header
/// is inconsistent, or a chunk fails its CRC.
pub fn run(args: InspectArgs, format: OutputFormat) -> CliResult<i32> {
    let wire = std::fs::read(&args.file)
        .map_err(|err| io_error(&format!("failed reading {}", args.file.display()), err))?;
    let summary = inspect_bytes(&wire).map_err(|err| packet_error("decode failed", err))?;

    print_inspect(&summary, format);
    if summary.packets.is_empty() || !summary.header_valid || summary.crc_failures > 0 {
        return Ok(DATA_INVALID);
    }
    Ok(SUCCESS)
}

pub(crate) fn inspect_bytes(wire: &[u8]) -> Result<InspectSummary, PacketError> {
    let mut reader = PacketReader::new(Cursor::new(wire));
    let mut packets = Vec::new();
    let mut crc_failures = 0;
    let mut assembler: Option<FrameAssembler> = None;
    let mut header_seen = false;
    let mut header_valid = true;

    loop {
        let packet = match reader.read_packet() {
            Ok(packet) => packet,
            Err(PacketError::ConnectionClosed) => break,
            Err(err) => return Err(err),
        };

        match packet {
            Packet::Header(header) => {
                packets.push(PacketRow::Header {
                    total_size: header.total_size,
                    chunk_size: header.chunk_size,
                    total_chunks: header.total_chunks,
                });
                if header_seen {
                    debug!("additional header in dump");
                    continue;
                }
                header_seen = true;
                match FrameAssembler::new(header) {
                    Ok(first) => assembler = Some(first),
                    Err(err) => {
                        warn!(error = %err, "first header is inconsistent");
                        header_valid = false;
                    }
                }
            }
            Packet::Chunk(chunk) => {
                let crc_ok = chunk.verify();
                if !crc_ok {
                    crc_failures += 1;
                }
                packets.push(PacketRow::Chunk {
                    index: chunk.index,
                    size: chunk.payload.len(),
                    crc32: format!("{:#010x}", chunk.crc32),
                    crc_ok,
                });
                if let Some(assembler) = assembler.as_mut() {
                    assembler.accept(chunk);
                }
            }
        }
    }

    Ok(InspectSummary {
        packets,
        skipped_bytes: reader.skipped_bytes(),
        crc_failures,
        header_valid,
        frame_complete: assembler.is_some_and(|assembler| assembler.is_complete()),
    })
}
