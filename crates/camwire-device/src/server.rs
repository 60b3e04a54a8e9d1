use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use camwire_packet::{PacketWriter, TRIGGER_ACK, TRIGGER_CAPTURE};
use tracing::{debug, info, warn};

use crate::capture::FrameSource;
use crate::error::Result;
use crate::pacing::Pacer;
use crate::transfer::{TransferOrchestrator, TransferOutcome};

/// Counters for one [`Device::serve`] session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServeStats {
    /// Capture triggers received.
    pub triggers: u64,
    /// Frames fully sent.
    pub frames_sent: u64,
    /// Triggers that produced no frame.
    pub capture_failures: u64,
    /// Bytes received that were not a trigger.
    pub ignored_bytes: u64,
}

/// The device command loop: wait for a trigger byte, acknowledge it, send a
/// frame, repeat.
pub struct Device<S, P> {
    orchestrator: TransferOrchestrator<S, P>,
    max_transfers: Option<u64>,
}

impl<S: FrameSource, P: Pacer> Device<S, P> {
    pub fn new(orchestrator: TransferOrchestrator<S, P>) -> Self {
        Self {
            orchestrator,
            max_transfers: None,
        }
    }

    /// Stop serving after `count` triggers have been handled.
    pub fn with_transfer_limit(mut self, count: u64) -> Self {
        self.max_transfers = Some(count);
        self
    }

    /// Serve triggers read from `input`, answering on `output`.
    ///
    /// Returns when `input` reaches EOF, the transfer limit is hit, or
    /// `shutdown` is set. `shutdown` is checked whenever a read times out, so
    /// give `input` a read timeout if the loop must be stoppable. A write
    /// failure on `output` ends the loop with an error.
    pub fn serve<R: Read, W: Write>(
        &mut self,
        mut input: R,
        output: &mut PacketWriter<W>,
        shutdown: &AtomicBool,
    ) -> Result<ServeStats> {
        let mut stats = ServeStats::default();
        let mut byte = [0u8; 1];

        info!("waiting for capture triggers");
        while !shutdown.load(Ordering::SeqCst) {
            if self.max_transfers.is_some_and(|max| stats.triggers >= max) {
                break;
            }

            match input.read(&mut byte) {
                Ok(0) => {
                    debug!("link closed");
                    break;
                }
                Ok(_) => {}
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
                    ) =>
                {
                    continue
                }
                Err(err) => return Err(camwire_packet::PacketError::Io(err).into()),
            }

            if byte[0] != TRIGGER_CAPTURE {
                stats.ignored_bytes += 1;
                continue;
            }

            stats.triggers += 1;
            debug!(trigger = stats.triggers, "capture trigger received");
            output.send_raw(&[TRIGGER_ACK])?;
            self.orchestrator.settle();

            match self.orchestrator.run(output)? {
                TransferOutcome::Sent(_) => stats.frames_sent += 1,
                TransferOutcome::CaptureFailed(_) | TransferOutcome::FrameTooLarge { .. } => {
                    stats.capture_failures += 1
                }
            }
        }

        if stats.ignored_bytes > 0 {
            warn!(bytes = stats.ignored_bytes, "ignored non-trigger bytes");
        }
        info!(
            triggers = stats.triggers,
            frames_sent = stats.frames_sent,
            capture_failures = stats.capture_failures,
            "device loop finished"
        );
        Ok(stats)
    }

    pub fn orchestrator(&self) -> &TransferOrchestrator<S, P> {
        &self.orchestrator
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;
    use camwire_packet::{decode_packet, Packet};

    use super::*;
    use crate::capture::CaptureError;
    use crate::pacing::RecordingPacer;
    use crate::transfer::TransferConfig;

    struct CountingSource {
        frame: Vec<u8>,
        fail_every_other: bool,
        calls: usize,
    }

    impl FrameSource for CountingSource {
        type Frame = Vec<u8>;

        fn acquire(&mut self) -> std::result::Result<Vec<u8>, CaptureError> {
            self.calls += 1;
            if self.fail_every_other && self.calls % 2 == 0 {
                return Err(CaptureError::Driver("sensor timeout".to_string()));
            }
            Ok(self.frame.clone())
        }

        fn release(&mut self, _frame: Vec<u8>) {}
    }

    fn device(frame: &[u8], fail_every_other: bool) -> Device<CountingSource, RecordingPacer> {
        let config = TransferConfig {
            chunk_size: 4,
            warmup_frames: 0,
            ..TransferConfig::default()
        };
        let source = CountingSource {
            frame: frame.to_vec(),
            fail_every_other,
            calls: 0,
        };
        Device::new(TransferOrchestrator::new(source, RecordingPacer::new(), config).unwrap())
    }

    #[test]
    fn trigger_is_acked_then_frame_follows() {
        let mut device = device(b"abcdefghij", false);
        let mut output = PacketWriter::new(Cursor::new(Vec::<u8>::new()));
        let stop = AtomicBool::new(false);

        let stats = device
            .serve(Cursor::new(b"R".to_vec()), &mut output, &stop)
            .unwrap();

        assert_eq!(stats.triggers, 1);
        assert_eq!(stats.frames_sent, 1);

        let wire = output.into_inner().into_inner();
        assert_eq!(wire[0], TRIGGER_ACK);

        let mut buf = BytesMut::from(&wire[1..]);
        let Packet::Header(header) = decode_packet(&mut buf, 512).unwrap().unwrap() else {
            panic!("expected header after ack");
        };
        assert_eq!((header.total_size, header.total_chunks), (10, 3));

        let pauses = device.orchestrator().pacer().pauses();
        assert_eq!(pauses[0], std::time::Duration::from_millis(50));
        assert_eq!(pauses.len(), 4);
    }

    #[test]
    fn other_bytes_are_ignored() {
        let mut device = device(b"xy", false);
        let mut output = PacketWriter::new(Cursor::new(Vec::<u8>::new()));
        let stop = AtomicBool::new(false);

        let stats = device
            .serve(Cursor::new(b"r\nQ\xFE".to_vec()), &mut output, &stop)
            .unwrap();

        assert_eq!(stats.triggers, 0);
        assert_eq!(stats.ignored_bytes, 4);
        assert!(output.get_ref().get_ref().is_empty());
    }

    #[test]
    fn capture_failure_sends_only_ack() {
        let mut device = device(b"frame", true);
        let mut output = PacketWriter::new(Cursor::new(Vec::<u8>::new()));
        let stop = AtomicBool::new(false);

        let stats = device
            .serve(Cursor::new(b"RR".to_vec()), &mut output, &stop)
            .unwrap();

        assert_eq!(stats.triggers, 2);
        assert_eq!(stats.frames_sent, 1);
        assert_eq!(stats.capture_failures, 1);

        let wire = output.into_inner().into_inner();
        assert_eq!(*wire.last().unwrap(), TRIGGER_ACK);
    }

    #[test]
    fn transfer_limit_stops_loop() {
        let mut device = device(b"abc", false).with_transfer_limit(1);
        let mut output = PacketWriter::new(Cursor::new(Vec::<u8>::new()));
        let stop = AtomicBool::new(false);

        let stats = device
            .serve(Cursor::new(b"RRR".to_vec()), &mut output, &stop)
            .unwrap();
        assert_eq!(stats.triggers, 1);
    }

    #[test]
    fn shutdown_flag_stops_before_reading() {
        let mut device = device(b"abc", false);
        let mut output = PacketWriter::new(Cursor::new(Vec::<u8>::new()));
        let stop = AtomicBool::new(true);

        let stats = device
            .serve(Cursor::new(b"R".to_vec()), &mut output, &stop)
            .unwrap();
        assert_eq!(stats, ServeStats::default());
    }

    #[test]
    #[cfg(unix)]
    fn serves_over_serial_pair() {
        use camwire_transport::SerialStream;

        let (device_end, mut host_end) = SerialStream::pair().unwrap();
        let input = device_end.try_clone().unwrap();
        let mut output = PacketWriter::new(device_end);

        let server = std::thread::spawn(move || {
            let mut device = device(b"0123456789", false).with_transfer_limit(1);
            let stop = AtomicBool::new(false);
            device.serve(input, &mut output, &stop).unwrap()
        });

        host_end.write_all(b"R").unwrap();
        let mut wire = vec![0u8; 1 + 13 + 3 * 13 + 10];
        host_end.read_exact(&mut wire).unwrap();
        assert_eq!(wire[0], TRIGGER_ACK);

        let stats = server.join().unwrap();
        assert_eq!(stats.frames_sent, 1);
    }
}
