//! Frame acquisition.
//!
//! The transfer code only needs "give me the bytes of one frame, or fail".
//! Camera drivers, sensor setup and buffer placement live behind
//! [`FrameSource`].

use std::path::{Path, PathBuf};

use tracing::debug;

/// Errors a capture source can report.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The capture hardware has no frame available.
    #[error("capture device not ready")]
    NotReady,

    /// The capture driver failed.
    #[error("capture driver error: {0}")]
    Driver(String),

    /// A file-backed source could not read its frame.
    #[error("failed to read frame from {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A directory-backed source found no files to serve.
    #[error("no frame files in {0}")]
    Empty(PathBuf),
}

/// Produces frame buffers on request.
///
/// Every frame handed out by [`acquire`](Self::acquire) is given back
/// through [`release`](Self::release) exactly once, after the last byte of
/// it has been sent. A transfer also acquires and immediately releases
/// `warmup_frames` stale frames before the one it sends, so `acquire` runs
/// `warmup_frames + 1` times per transfer.
pub trait FrameSource {
    /// One captured frame.
    type Frame: AsRef<[u8]>;

    /// Capture one frame.
    fn acquire(&mut self) -> Result<Self::Frame, CaptureError>;

    /// Return a frame buffer to the source.
    fn release(&mut self, frame: Self::Frame);
}

impl<S: FrameSource + ?Sized> FrameSource for &mut S {
    type Frame = S::Frame;

    fn acquire(&mut self) -> Result<Self::Frame, CaptureError> {
        (**self).acquire()
    }

    fn release(&mut self, frame: Self::Frame) {
        (**self).release(frame);
    }
}

/// Serves the current contents of one file as every frame.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSource for FileSource {
    type Frame = Vec<u8>;

    fn acquire(&mut self) -> Result<Vec<u8>, CaptureError> {
        read_frame(&self.path)
    }

    fn release(&mut self, _frame: Vec<u8>) {}
}

/// Serves the files of a directory one per capture, in name order, wrapping
/// around after the last one.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
}

impl DirectorySource {
    /// Scan `dir` for regular files. Fails when there are none.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let dir = dir.as_ref().to_path_buf();
        let entries = std::fs::read_dir(&dir).map_err(|source| CaptureError::Read {
            path: dir.clone(),
            source,
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| CaptureError::Read {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.is_file() {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(CaptureError::Empty(dir));
        }
        files.sort();

        debug!(dir = %dir.display(), files = files.len(), "directory source ready");
        Ok(Self {
            dir,
            files,
            next: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of files in the rotation.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for DirectorySource {
    type Frame = Vec<u8>;

    fn acquire(&mut self) -> Result<Vec<u8>, CaptureError> {
        let path = &self.files[self.next];
        self.next = (self.next + 1) % self.files.len();
        read_frame(path)
    }

    fn release(&mut self, _frame: Vec<u8>) {}
}

fn read_frame(path: &Path) -> Result<Vec<u8>, CaptureError> {
    let frame = std::fs::read(path).map_err(|source| CaptureError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), size = frame.len(), "frame read from file");
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "camwire-capture-{tag}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn file_source_rereads_each_capture() {
        let dir = temp_dir("file");
        let path = dir.join("frame.jpg");
        std::fs::write(&path, b"first").unwrap();

        let mut source = FileSource::new(&path);
        assert_eq!(source.acquire().unwrap(), b"first");

        std::fs::write(&path, b"second").unwrap();
        let frame = source.acquire().unwrap();
        assert_eq!(frame, b"second");
        source.release(frame);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn file_source_missing_file() {
        let mut source = FileSource::new("/nonexistent/camwire/frame.jpg");
        assert!(matches!(
            source.acquire().unwrap_err(),
            CaptureError::Read { .. }
        ));
    }

    #[test]
    fn directory_source_cycles_in_name_order() {
        let dir = temp_dir("dir");
        std::fs::write(dir.join("b.jpg"), b"bbb").unwrap();
        std::fs::write(dir.join("a.jpg"), b"a").unwrap();
        std::fs::create_dir_all(dir.join("nested")).unwrap();

        let mut source = DirectorySource::open(&dir).unwrap();
        assert_eq!(source.len(), 2);
        assert!(!source.is_empty());

        let frames: Vec<_> = (0..3).map(|_| source.acquire().unwrap()).collect();
        assert_eq!(frames, vec![b"a".to_vec(), b"bbb".to_vec(), b"a".to_vec()]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn directory_source_rejects_empty_dir() {
        let dir = temp_dir("empty");
        assert!(matches!(
            DirectorySource::open(&dir).unwrap_err(),
            CaptureError::Empty(_)
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
