use std::io::IsTerminal;
use std::path::Path;

use camwire_device::ServeStats;
use camwire_host::TransferReport;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ReceiveOutput<'a> {
    path: String,
    size: u32,
    chunk_size: u16,
    total_chunks: u16,
    crc_failures: u32,
    rejected_chunks: u32,
    duplicate_chunks: u32,
    skipped_bytes: u64,
    ack_received: bool,
    received_at: &'a str,
}

pub fn print_received(
    path: &Path,
    report: &TransferReport,
    received_at: &str,
    format: OutputFormat,
) {
    let out = ReceiveOutput {
        path: path.display().to_string(),
        size: report.total_size,
        chunk_size: report.chunk_size,
        total_chunks: report.total_chunks,
        crc_failures: report.crc_failures,
        rejected_chunks: report.rejected_chunks,
        duplicate_chunks: report.duplicate_chunks,
        skipped_bytes: report.skipped_bytes,
        ack_received: report.ack_received,
        received_at,
    };

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FILE", "SIZE", "CHUNKS", "CRC FAILURES", "SKIPPED", "ACK"])
                .add_row(vec![
                    out.path.clone(),
                    out.size.to_string(),
                    format!("{} x {}", out.total_chunks, out.chunk_size),
                    out.crc_failures.to_string(),
                    out.skipped_bytes.to_string(),
                    yes_no(out.ack_received).to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "saved {} ({} bytes, {} chunks of {}) crc_failures={} skipped={} ack={}",
                out.path,
                out.size,
                out.total_chunks,
                out.chunk_size,
                out.crc_failures,
                out.skipped_bytes,
                yes_no(out.ack_received)
            );
        }
    }
}

#[derive(Serialize)]
struct ServeOutput {
    triggers: u64,
    frames_sent: u64,
    capture_failures: u64,
    ignored_bytes: u64,
}

pub fn print_serve_stats(stats: &ServeStats, format: OutputFormat) {
    let out = ServeOutput {
        triggers: stats.triggers,
        frames_sent: stats.frames_sent,
        capture_failures: stats.capture_failures,
        ignored_bytes: stats.ignored_bytes,
    };

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec!["TRIGGERS", "FRAMES SENT", "CAPTURE FAILURES", "IGNORED BYTES"])
                .add_row(vec![
                    out.triggers.to_string(),
                    out.frames_sent.to_string(),
                    out.capture_failures.to_string(),
                    out.ignored_bytes.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "triggers={} frames_sent={} capture_failures={} ignored_bytes={}",
                out.triggers, out.frames_sent, out.capture_failures, out.ignored_bytes
            );
        }
    }
}

/// One decoded packet of a wire dump.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PacketRow {
    Header {
        total_size: u32,
        chunk_size: u16,
        total_chunks: u16,
    },
    Chunk {
        index: u16,
        size: usize,
        crc32: String,
        crc_ok: bool,
    },
}

#[derive(Serialize, Debug)]
pub struct InspectSummary {
    pub packets: Vec<PacketRow>,
    pub skipped_bytes: u64,
    pub crc_failures: u32,
    /// Whether the first header's chunk count matches its sizes.
    pub header_valid: bool,
    /// Whether the dump holds every chunk of the first header's frame.
    pub frame_complete: bool,
}

pub fn print_inspect(summary: &InspectSummary, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(summary),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "KIND", "INDEX", "SIZE", "CRC32", "CRC OK"]);
            for (n, row) in summary.packets.iter().enumerate() {
                table.add_row(match row {
                    PacketRow::Header {
                        total_size,
                        chunk_size,
                        total_chunks,
                    } => vec![
                        n.to_string(),
                        format!("header ({total_chunks} x {chunk_size})"),
                        "-".to_string(),
                        total_size.to_string(),
                        "-".to_string(),
                        "-".to_string(),
                    ],
                    PacketRow::Chunk {
                        index,
                        size,
                        crc32,
                        crc_ok,
                    } => vec![
                        n.to_string(),
                        "chunk".to_string(),
                        index.to_string(),
                        size.to_string(),
                        crc32.clone(),
                        yes_no(*crc_ok).to_string(),
                    ],
                });
            }
            println!("{table}");
            println!(
                "skipped_bytes={} crc_failures={} header_valid={} frame_complete={}",
                summary.skipped_bytes,
                summary.crc_failures,
                yes_no(summary.header_valid),
                yes_no(summary.frame_complete)
            );
        }
        OutputFormat::Pretty => {
            for row in &summary.packets {
                match row {
                    PacketRow::Header {
                        total_size,
                        chunk_size,
                        total_chunks,
                    } => println!(
                        "header size={total_size} chunk_size={chunk_size} chunks={total_chunks}"
                    ),
                    PacketRow::Chunk {
                        index,
                        size,
                        crc32,
                        crc_ok,
                    } => println!(
                        "chunk  index={index} size={size} crc32={crc32} ok={}",
                        yes_no(*crc_ok)
                    ),
                }
            }
            println!(
                "skipped_bytes={} crc_failures={} header_valid={} frame_complete={}",
                summary.skipped_bytes,
                summary.crc_failures,
                yes_no(summary.header_valid),
                yes_no(summary.frame_complete)
            );
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
