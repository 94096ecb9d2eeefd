//! Bulk transfer between channels
//!
//! Moves bytes from one channel to another without going through a
//! [`BufferedStream`](crate::buffered::BufferedStream). On Linux, when
//! both channels expose raw descriptors, the kernel moves the bytes
//! directly (`copy_file_range(2)`); otherwise a chunked read/write loop
//! through one reusable scratch buffer does the work. Both paths loop
//! over short transfers, and an error reports the bytes moved so far in
//! its offset.

use crate::channel::Channel;
use crate::error::{Error, Result};
use std::io::{self, SeekFrom};
#[cfg(target_os = "linux")]
use tracing::debug;

/// Bulk transfer parameters.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Scratch buffer size for the chunked fallback path
    /// (default: 64KB).
    pub chunk_size: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        TransferConfig {
            chunk_size: 64 * 1024,
        }
    }
}

impl TransferConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scratch buffer size (builder pattern).
    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::protocol(
                "config",
                "transfer chunk size must be a positive integer",
            ));
        }
        Ok(())
    }

    /// Configuration with a tiny scratch buffer so tests cross chunk
    /// boundaries fast.
    pub fn for_testing() -> Self {
        TransferConfig { chunk_size: 64 }
    }
}

/// Outcome of attempting the kernel-assisted path.
#[cfg(target_os = "linux")]
enum KernelCopy {
    /// Moved this many bytes; source ended or count reached
    Complete(u64),
    /// Kernel path unsupported for these descriptors; this many bytes
    /// moved before finding out
    Fallback(u64),
    /// Hard failure after moving this many bytes
    Failed(Error),
}

/// Bulk byte mover with a reusable scratch buffer
///
/// Independent of buffered streams; channel positions advance exactly by
/// the bytes moved.
pub struct ZeroCopyTransfer {
    config: TransferConfig,
    scratch: Vec<u8>,
}

impl ZeroCopyTransfer {
    /// Create a transfer engine with the given configuration.
    pub fn new(config: TransferConfig) -> Result<Self> {
        config.validate()?;
        let scratch = vec![0u8; config.chunk_size];
        Ok(ZeroCopyTransfer { config, scratch })
    }

    /// Create a transfer engine with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(TransferConfig::default()).expect("default config is valid")
    }

    /// Move up to `count` bytes from `src` (starting at `offset`) to
    /// `dst` at its current position.
    ///
    /// Loops until `count` bytes are moved or the source ends; returns
    /// the bytes moved. On error, the error's offset carries the bytes
    /// moved before the failure.
    pub fn transfer<S: Channel, D: Channel>(
        &mut self,
        src: &mut S,
        dst: &mut D,
        offset: u64,
        count: u64,
    ) -> Result<u64> {
        if count == 0 {
            return Ok(0);
        }

        #[cfg(target_os = "linux")]
        let moved = {
            match (src.raw_fd(), dst.raw_fd()) {
                (Some(src_fd), Some(dst_fd)) => {
                    match kernel_copy(src_fd, dst_fd, offset, count) {
                        KernelCopy::Complete(n) => return Ok(n),
                        KernelCopy::Failed(e) => return Err(e),
                        KernelCopy::Fallback(n) => {
                            debug!(
                                target: "penstock::transfer",
                                moved = n,
                                "kernel copy unavailable, falling back to chunked path"
                            );
                            n
                        }
                    }
                }
                _ => 0,
            }
        };
        #[cfg(not(target_os = "linux"))]
        let moved = 0u64;

        self.chunked(src, dst, offset + moved, count - moved, moved)
    }

    /// Chunked read/write fallback; `already` bytes were moved by a
    /// kernel attempt and are included in offsets and the return value.
    fn chunked<S: Channel, D: Channel>(
        &mut self,
        src: &mut S,
        dst: &mut D,
        start: u64,
        count: u64,
        already: u64,
    ) -> Result<u64> {
        if count == 0 {
            return Ok(already);
        }

        // Sequential channels at offset zero read from where they stand;
        // everything else repositions explicitly.
        let must_seek = start > 0 || src.kind() == crate::channel::ChannelKind::File;
        if must_seek {
            src.seek(SeekFrom::Start(start))
                .map_err(|e| e.at("transfer").with_offset(already))?;
        }

        let mut moved = already;
        let target = already + count;
        while moved < target {
            let want = self.scratch.len().min((target - moved) as usize);
            let got = match src.read(&mut self.scratch[..want]) {
                Ok(0) => break, // source ended early
                Ok(n) => n,
                // Transient included: the caller decides whether to
                // retry, resuming from the reported offset.
                Err(e) => return Err(e.at("transfer").with_offset(moved)),
            };

            let mut written = 0;
            while written < got {
                match dst.write(&self.scratch[written..got]) {
                    Ok(0) => {
                        return Err(Error::from_io_at(
                            "transfer",
                            moved + written as u64,
                            io::Error::new(
                                io::ErrorKind::WriteZero,
                                "destination accepted no bytes",
                            ),
                        ))
                    }
                    Ok(n) => written += n,
                    Err(e) => return Err(e.at("transfer").with_offset(moved + written as u64)),
                }
            }
            moved += got as u64;
        }
        Ok(moved)
    }

    /// Configured scratch buffer size.
    pub fn chunk_size(&self) -> usize {
        self.config.chunk_size
    }
}

/// Drive `copy_file_range(2)` until `count` bytes moved or the source
/// ends; classifies unsupported-descriptor errnos as fallback.
#[cfg(target_os = "linux")]
fn kernel_copy(src_fd: i32, dst_fd: i32, offset: u64, count: u64) -> KernelCopy {
    let mut off_in = offset as libc::off_t;
    let mut moved: u64 = 0;
    while moved < count {
        let want = (count - moved).min(1 << 30) as usize;
        let ret = unsafe {
            libc::copy_file_range(
                src_fd,
                &mut off_in,
                dst_fd,
                std::ptr::null_mut(), // advance dst's own file offset
                want,
                0,
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::ENOSYS)
                | Some(libc::EOPNOTSUPP)
                | Some(libc::EXDEV)
                | Some(libc::EINVAL) => KernelCopy::Fallback(moved),
                _ => KernelCopy::Failed(Error::from_io_at("transfer", moved, err)),
            };
        }
        if ret == 0 {
            break; // end of source
        }
        moved += ret as u64;
    }
    KernelCopy::Complete(moved)
}
