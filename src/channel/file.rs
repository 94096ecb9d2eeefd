//! File-backed channel
//!
//! Wraps a `std::fs::File` and classifies its failures into the
//! transient/permanent taxonomy. Detects the backing resource kind at
//! open time (regular file, FIFO, terminal).

use crate::channel::{Channel, ChannelKind, OpenMode};
use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, IsTerminal, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::fd::{AsRawFd, RawFd};

/// Channel over a file descriptor obtained from a path
///
/// The handle is exclusively owned; dropping it releases the descriptor.
/// Operations after `close()` fail with a protocol error rather than
/// touching a stale descriptor.
#[derive(Debug)]
pub struct FileChannel {
    path: PathBuf,
    mode: OpenMode,
    kind: ChannelKind,
    /// `None` once closed; close is idempotent via `Option::take`
    file: Option<File>,
}

impl FileChannel {
    /// Open an existing file in the given mode.
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(mode.readable())
            .write(mode.writable())
            .open(&path)
            .map_err(|e| Error::from_io("open", e))?;
        Ok(Self::from_file(path, mode, file))
    }

    /// Create (or truncate) a file and open it for writing.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| Error::from_io("open", e))?;
        Ok(Self::from_file(path, OpenMode::Write, file))
    }

    /// Create a file that must not already exist, opened for writing.
    ///
    /// Used for temp files in atomic write sessions, where clobbering an
    /// existing temp would mix two writers' content.
    pub fn create_new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| Error::from_io("open", e))?;
        Ok(Self::from_file(path, OpenMode::Write, file))
    }

    fn from_file(path: PathBuf, mode: OpenMode, file: File) -> Self {
        let kind = detect_kind(&file);
        FileChannel {
            path,
            mode,
            kind,
            file: Some(file),
        }
    }

    /// Path this channel was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mode this channel was opened in.
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Whether `close()` has already run.
    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    fn file_mut(&mut self, op: &'static str) -> Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| Error::protocol(op, "channel is closed"))
    }
}

fn detect_kind(file: &File) -> ChannelKind {
    if file.is_terminal() {
        return ChannelKind::Interactive;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        if let Ok(meta) = file.metadata() {
            if meta.file_type().is_fifo() {
                return ChannelKind::Pipe;
            }
        }
    }
    ChannelKind::File
}

impl Channel for FileChannel {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.file_mut("read")?
            .read(buf)
            .map_err(|e| Error::from_io("read", e))
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.file_mut("write")?
            .write(buf)
            .map_err(|e| Error::from_io("write", e))
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.file_mut("seek")?
            .seek(pos)
            .map_err(|e| Error::from_io("seek", e))
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the File releases the descriptor; a second call finds
        // None and is a no-op.
        drop(self.file.take());
        Ok(())
    }

    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn commit(&mut self) -> Result<()> {
        let file = self.file_mut("commit")?;
        file.sync_all().map_err(|e| {
            if e.kind() == io::ErrorKind::Unsupported {
                Error::durability("commit", "storage does not support a durability barrier")
            } else {
                Error::from_io("commit", e)
            }
        })
    }

    #[cfg(unix)]
    fn raw_fd(&self) -> Option<RawFd> {
        self.file.as_ref().map(|f| f.as_raw_fd())
    }
}
