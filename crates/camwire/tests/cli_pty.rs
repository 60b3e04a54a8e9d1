#![cfg(all(target_os = "linux", feature = "cli"))]

use std::ffi::CStr;
use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::os::fd::{AsRawFd, FromRawFd};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use camwire::packet::{
    encode_chunk, encode_header, FrameHeader, Packet, PacketReader, TRIGGER_ACK, TRIGGER_CAPTURE,
};

/// Open a pseudo-terminal and return the master side plus the slave path.
fn open_pty() -> (File, PathBuf) {
    // SAFETY: plain libc calls on a descriptor this function owns; `name` is
    // large enough for any pts path and ptsname_r NUL-terminates it.
    unsafe {
        let fd = libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY);
        assert!(fd >= 0, "posix_openpt failed");
        assert_eq!(libc::grantpt(fd), 0, "grantpt failed");
        assert_eq!(libc::unlockpt(fd), 0, "unlockpt failed");
        let mut name = [0 as libc::c_char; 128];
        assert_eq!(libc::ptsname_r(fd, name.as_mut_ptr(), name.len()), 0);
        let path = CStr::from_ptr(name.as_ptr()).to_string_lossy().into_owned();
        (File::from_raw_fd(fd), PathBuf::from(path))
    }
}

fn readable_within(file: &File, timeout: Duration) -> bool {
    let mut pfd = libc::pollfd {
        fd: file.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    // SAFETY: `pfd` is a valid pollfd for an open descriptor.
    let rc = unsafe { libc::poll(&mut pfd, 1, timeout.as_millis() as libc::c_int) };
    rc > 0 && pfd.revents & libc::POLLIN != 0
}

/// Block until the process on the slave side has put the line in raw mode.
fn wait_for_raw_mode(master: &File, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    loop {
        // SAFETY: termios is plain old data; tcgetattr on a pty master reports
        // the line settings of its slave.
        let mut tio: libc::termios = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::tcgetattr(master.as_raw_fd(), &mut tio) };
        assert_eq!(rc, 0, "tcgetattr failed");
        if tio.c_lflag & (libc::ICANON | libc::ECHO) == 0 {
            return;
        }
        assert!(Instant::now() < deadline, "port never switched to raw mode");
        std::thread::sleep(Duration::from_millis(20));
    }
}

fn read_exact_within(master: &mut File, buf: &mut [u8], timeout: Duration) {
    let deadline = Instant::now() + timeout;
    let mut filled = 0;
    while filled < buf.len() {
        let left = deadline.saturating_duration_since(Instant::now());
        assert!(
            readable_within(master, left),
            "timed out after {filled} of {} bytes",
            buf.len()
        );
        let n = master.read(&mut buf[filled..]).expect("master read");
        assert!(n > 0, "pty closed");
        filled += n;
    }
}

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/camwire-pty-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

#[test]
fn receive_saves_frame_sent_over_pty() {
    let dir = unique_temp_dir("receive");
    let out = dir.join("shot.jpg");
    let (mut master, slave) = open_pty();
    let frame: Vec<u8> = (0..1500u32).map(|i| (i * 31 % 256) as u8).collect();

    let child = Command::new(env!("CARGO_BIN_EXE_camwire"))
        .args(["--log-level", "error", "--format", "json", "receive"])
        .arg(&slave)
        .arg("--out")
        .arg(&out)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("receive should start");

    let mut trigger = [0u8; 1];
    read_exact_within(&mut master, &mut trigger, Duration::from_secs(5));
    assert_eq!(trigger[0], TRIGGER_CAPTURE);

    let mut wire = BytesMut::new();
    wire.extend_from_slice(&[TRIGGER_ACK]);
    encode_header(
        &FrameHeader::for_frame(frame.len(), 512).expect("frame should fit"),
        &mut wire,
    );
    for (index, part) in frame.chunks(512).enumerate() {
        encode_chunk(index as u16, part, &mut wire).expect("chunk should encode");
    }
    master.write_all(&wire).expect("master write");

    let output = child.wait_with_output().expect("receive should finish");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(std::fs::read(&out).expect("image should exist"), frame);

    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be json");
    assert_eq!(report["size"], 1500);
    assert_eq!(report["total_chunks"], 3);
    assert_eq!(report["ack_received"], true);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn serve_answers_trigger_over_pty() {
    let dir = unique_temp_dir("serve");
    let source = dir.join("frame.jpg");
    let frame: Vec<u8> = (0..700u32).map(|i| (i % 199) as u8).collect();
    std::fs::write(&source, &frame).expect("source should be writable");
    let (mut master, slave) = open_pty();

    let mut child = Command::new(env!("CARGO_BIN_EXE_camwire"))
        .args(["--log-level", "error", "serve"])
        .arg(&slave)
        .arg("--source")
        .arg(&source)
        .args(["--chunk-delay", "0ms"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve should start");

    wait_for_raw_mode(&master, Duration::from_secs(5));
    // The port may still be flushing its buffers when the first trigger
    // lands, so keep triggering until the acknowledgment comes back.
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        assert!(Instant::now() < deadline, "no acknowledgment from serve");
        master.write_all(&[TRIGGER_CAPTURE]).expect("master write");
        if readable_within(&master, Duration::from_millis(300)) {
            break;
        }
    }

    let mut wire = vec![0u8; 1 + 13 + 2 * 13 + frame.len()];
    read_exact_within(&mut master, &mut wire, Duration::from_secs(5));
    let _ = child.kill();
    let _ = child.wait();

    assert_eq!(wire[0], TRIGGER_ACK);
    let mut reader = PacketReader::new(Cursor::new(&wire[1..]));
    let Packet::Header(header) = reader.read_packet().expect("header") else {
        panic!("expected header first");
    };
    assert_eq!(header.total_size, 700);
    assert_eq!(header.total_chunks, 2);

    let mut received = Vec::new();
    for _ in 0..2 {
        let Packet::Chunk(chunk) = reader.read_packet().expect("chunk") else {
            panic!("expected chunk");
        };
        assert!(chunk.verify());
        received.extend_from_slice(&chunk.payload);
    }
    assert_eq!(received, frame);

    let _ = std::fs::remove_dir_all(&dir);
}
