//! Raw byte channels
//!
//! A [`Channel`] is a thin handle over a byte-addressable resource (file,
//! pipe, terminal). It exposes read/write/seek/close primitives and
//! nothing else; buffering lives one layer up in
//! [`BufferedStream`](crate::buffered::BufferedStream).
//!
//! Channels are exclusively owned by the component that opened them.
//! `close` is idempotent and never errors on a double close.

mod file;

pub use file::FileChannel;

use crate::error::{Error, Result};
use std::io::SeekFrom;

#[cfg(unix)]
use std::os::fd::RawFd;

/// What kind of resource backs a channel
///
/// The kind matters for buffering policy: line-buffered streams only
/// auto-flush on a line terminator when the channel is interactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelKind {
    /// Regular seekable file
    #[default]
    File,
    /// Pipe or FIFO; sequential, no durability barrier
    Pipe,
    /// Terminal or other interactive endpoint
    Interactive,
}

/// Access mode requested when opening a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read-only
    Read,
    /// Write-only
    Write,
    /// Read and write
    ReadWrite,
}

impl OpenMode {
    /// Whether reads are permitted in this mode.
    pub fn readable(&self) -> bool {
        matches!(self, OpenMode::Read | OpenMode::ReadWrite)
    }

    /// Whether writes are permitted in this mode.
    pub fn writable(&self) -> bool {
        matches!(self, OpenMode::Write | OpenMode::ReadWrite)
    }
}

/// Thin handle over a raw byte-addressable resource
///
/// Implementations perform no buffering. Any operation may fail with a
/// transient error (caller may retry the identical call) or a permanent
/// one (caller must not). A channel's position only advances through its
/// own `read`/`write`/`seek`.
pub trait Channel {
    /// Read up to `buf.len()` bytes; returns 0 only at end-of-data.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write bytes; may accept fewer than `buf.len()` (partial write).
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Reposition the channel; returns the new absolute position.
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;

    /// Release the underlying resource.
    ///
    /// Idempotent: a second close is a no-op and never errors.
    fn close(&mut self) -> Result<()>;

    /// What kind of resource backs this channel.
    fn kind(&self) -> ChannelKind;

    /// Device-level durability barrier.
    ///
    /// Blocks until every byte previously handed to the kernel cache for
    /// this channel is acknowledged as stable. The default implementation
    /// refuses: a channel without a durability primitive must surface
    /// that, never downgrade to a flush-only guarantee.
    fn commit(&mut self) -> Result<()> {
        Err(Error::durability(
            "commit",
            "channel has no durability primitive",
        ))
    }

    /// Raw descriptor for kernel-assisted transfer, if one exists.
    ///
    /// Returning `None` opts the channel out of the zero-copy fast path.
    #[cfg(unix)]
    fn raw_fd(&self) -> Option<RawFd> {
        None
    }

    /// Write an entire slice, looping over partial writes.
    ///
    /// A write that returns 0 before the slice is consumed is reported as
    /// a permanent `WriteZero` failure.
    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < buf.len() {
            match self.write(&buf[written..])? {
                0 => {
                    return Err(Error::from_io_at(
                        "write",
                        written as u64,
                        std::io::Error::new(
                            std::io::ErrorKind::WriteZero,
                            "channel accepted no bytes",
                        ),
                    ))
                }
                n => written += n,
            }
        }
        Ok(())
    }
}
