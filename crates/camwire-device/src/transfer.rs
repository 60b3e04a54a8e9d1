use std::io::Write;
use std::time::Duration;

use camwire_packet::{ChunkPlan, FrameHeader, PacketError, PacketWriter, DEFAULT_CHUNK_SIZE};
use tracing::{debug, info, warn};

use crate::capture::{CaptureError, FrameSource};
use crate::error::{DeviceError, Result};
use crate::pacing::Pacer;

/// Transfer behavior.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Maximum payload per chunk packet. Default: 512.
    pub chunk_size: u16,
    /// Pause after every chunk packet. Default: 5 ms.
    pub chunk_delay: Duration,
    /// Pause between the trigger acknowledgment and the capture. Default: 50 ms.
    pub trigger_settle: Duration,
    /// Frames captured and dropped before the real capture so the sensor
    /// delivers a fresh image. Default: 3.
    pub warmup_frames: u32,
    /// Pause after each warm-up frame. Default: 30 ms.
    pub warmup_delay: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_delay: Duration::from_millis(5),
            trigger_settle: Duration::from_millis(50),
            warmup_frames: 3,
            warmup_delay: Duration::from_millis(30),
        }
    }
}

/// Where the orchestrator is in a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Capturing,
    HeaderSent,
    SendingChunks { next: u16 },
    Done,
    Failed,
}

/// Shape of a frame that went out on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSummary {
    pub total_size: u32,
    pub chunk_size: u16,
    pub total_chunks: u16,
}

/// How a transfer ended, when the link itself stayed healthy.
#[derive(Debug)]
pub enum TransferOutcome {
    /// Header and every chunk were written.
    Sent(TransferSummary),
    /// No frame could be captured; nothing was written.
    CaptureFailed(CaptureError),
    /// The frame does not fit the header fields; nothing was written.
    FrameTooLarge { size: usize, max: usize },
}

/// Runs one frame transfer per call: capture, header, paced chunks, release.
///
/// Transfers never overlap: [`run`](Self::run) takes `&mut self` and returns
/// only after the frame was released.
pub struct TransferOrchestrator<S, P> {
    source: S,
    pacer: P,
    config: TransferConfig,
    state: TransferState,
}

impl<S: FrameSource, P: Pacer> TransferOrchestrator<S, P> {
    /// Create an orchestrator. Fails when `config.chunk_size` is zero.
    pub fn new(source: S, pacer: P, config: TransferConfig) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(DeviceError::InvalidConfig(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            source,
            pacer,
            config,
            state: TransferState::Idle,
        })
    }

    /// Capture one frame and stream it to `writer`.
    ///
    /// Capture problems are reported through [`TransferOutcome`] and leave the
    /// wire untouched. A write failure aborts the transfer midway and is
    /// returned as an error; the frame is released either way.
    pub fn run<W: Write>(&mut self, writer: &mut PacketWriter<W>) -> Result<TransferOutcome> {
        let outcome = self.transfer(writer);
        self.state = TransferState::Idle;
        outcome
    }

    fn transfer<W: Write>(&mut self, writer: &mut PacketWriter<W>) -> Result<TransferOutcome> {
        self.set_state(TransferState::Capturing);
        self.warm_up();

        let frame = match self.source.acquire() {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "capture failed, skipping transfer");
                self.set_state(TransferState::Failed);
                return Ok(TransferOutcome::CaptureFailed(err));
            }
        };

        let sent = self.send_frame(frame.as_ref(), writer);
        self.source.release(frame);

        match sent {
            Ok(summary) => {
                self.set_state(TransferState::Done);
                info!(
                    total_size = summary.total_size,
                    total_chunks = summary.total_chunks,
                    "frame sent"
                );
                Ok(TransferOutcome::Sent(summary))
            }
            Err(PacketError::FrameTooLarge { size, max }) => {
                warn!(size, max, "frame too large for the wire format, skipping transfer");
                self.set_state(TransferState::Failed);
                Ok(TransferOutcome::FrameTooLarge { size, max })
            }
            Err(err) => {
                self.set_state(TransferState::Failed);
                Err(err.into())
            }
        }
    }

    fn send_frame<W: Write>(
        &mut self,
        frame: &[u8],
        writer: &mut PacketWriter<W>,
    ) -> std::result::Result<TransferSummary, PacketError> {
        let header = FrameHeader::for_frame(frame.len(), self.config.chunk_size)?;
        let largest_chunk = frame.len().min(self.config.chunk_size as usize);
        let max = writer.config().max_chunk_payload;
        if largest_chunk > max {
            return Err(PacketError::ChunkTooLarge {
                size: largest_chunk,
                max,
            });
        }
        writer.send_header(&header)?;
        self.set_state(TransferState::HeaderSent);

        for span in ChunkPlan::new(frame.len(), self.config.chunk_size) {
            self.set_state(TransferState::SendingChunks { next: span.index });
            writer.send_chunk(span.index, &frame[span.range()])?;
            self.pacer.pause(self.config.chunk_delay);
        }

        Ok(TransferSummary {
            total_size: header.total_size,
            chunk_size: header.chunk_size,
            total_chunks: header.total_chunks,
        })
    }

    fn warm_up(&mut self) {
        for i in 0..self.config.warmup_frames {
            match self.source.acquire() {
                Ok(stale) => self.source.release(stale),
                Err(err) => debug!(frame = i, error = %err, "warm-up capture failed"),
            }
            self.pacer.pause(self.config.warmup_delay);
        }
    }

    fn set_state(&mut self, state: TransferState) {
        debug!(from = ?self.state, to = ?state, "transfer state");
        self.state = state;
    }

    /// Current state; `Idle` whenever no transfer is running.
    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Pause the configured trigger settle time.
    pub fn settle(&mut self) {
        self.pacer.pause(self.config.trigger_settle);
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn pacer(&self) -> &P {
        &self.pacer
    }

    /// Consume the orchestrator and return its source and pacer.
    pub fn into_parts(self) -> (S, P) {
        (self.source, self.pacer)
    }
}
