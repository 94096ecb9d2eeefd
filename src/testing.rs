//! Test channels: in-memory backing and scripted fault injection
//!
//! These live in the library (not behind `cfg(test)`) so downstream
//! crates can exercise their own retry and cleanup paths against
//! deterministic failures.

use crate::channel::{Channel, ChannelKind};
use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::io::{self, SeekFrom};

/// In-memory channel with an observation ledger
///
/// Backs reads and writes with a byte vector and records the size of
/// every physical write call, so tests can assert exactly when a
/// buffered stream flushed.
#[derive(Debug, Default)]
pub struct MemChannel {
    data: Vec<u8>,
    pos: usize,
    kind: ChannelKind,
    closed: bool,
    supports_commit: bool,
    write_calls: Vec<usize>,
    commit_calls: u32,
}

impl MemChannel {
    /// Empty channel that reports itself as a regular file.
    pub fn new() -> Self {
        MemChannel {
            supports_commit: true,
            ..Default::default()
        }
    }

    /// Empty channel that reports itself as interactive (terminal-like).
    pub fn interactive() -> Self {
        MemChannel {
            kind: ChannelKind::Interactive,
            ..Self::new()
        }
    }

    /// Channel pre-seeded with content, positioned at the start.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        MemChannel {
            data,
            ..Self::new()
        }
    }

    /// Pretend the backing store has no durability primitive.
    pub fn deny_commit(mut self) -> Self {
        self.supports_commit = false;
        self
    }

    /// Everything written so far.
    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    /// Sizes of the physical write calls, in order.
    pub fn write_calls(&self) -> &[usize] {
        &self.write_calls
    }

    /// How many durability barriers were requested.
    pub fn commit_calls(&self) -> u32 {
        self.commit_calls
    }

    /// Whether `close()` has run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Reposition to the start without going through `seek`.
    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    fn ensure_open(&self, op: &'static str) -> Result<()> {
        if self.closed {
            return Err(Error::protocol(op, "channel is closed"));
        }
        Ok(())
    }
}

impl Channel for MemChannel {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_open("read")?;
        let avail = &self.data[self.pos.min(self.data.len())..];
        let n = avail.len().min(buf.len());
        buf[..n].copy_from_slice(&avail[..n]);
        self.pos += n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.ensure_open("write")?;
        let end = self.pos + buf.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.pos..end].copy_from_slice(buf);
        self.pos = end;
        self.write_calls.push(buf.len());
        Ok(buf.len())
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.ensure_open("seek")?;
        let base = match pos {
            SeekFrom::Start(n) => n as i64,
            SeekFrom::End(delta) => self.data.len() as i64 + delta,
            SeekFrom::Current(delta) => self.pos as i64 + delta,
        };
        if base < 0 {
            return Err(Error::from_io(
                "seek",
                io::Error::new(io::ErrorKind::InvalidInput, "seek before start"),
            ));
        }
        self.pos = base as usize;
        Ok(self.pos as u64)
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }

    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn commit(&mut self) -> Result<()> {
        self.ensure_open("commit")?;
        if !self.supports_commit {
            return Err(Error::durability(
                "commit",
                "backing store has no durability primitive",
            ));
        }
        self.commit_calls += 1;
        Ok(())
    }
}

/// What kind of failure to inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Interrupted-style failure; safe to retry the identical call
    Transient,
    /// Permission-denied-style failure; must not be retried
    Permanent,
}

impl Fault {
    fn into_error(self, op: &'static str) -> Error {
        let io_err = match self {
            Fault::Transient => io::Error::new(io::ErrorKind::Interrupted, "injected transient"),
            Fault::Permanent => {
                io::Error::new(io::ErrorKind::PermissionDenied, "injected permanent")
            }
        };
        Error::from_io(op, io_err)
    }
}

/// Channel wrapper that fails on a script
///
/// Each operation consumes the front of its fault queue: a `Some` entry
/// injects that failure, a `None` entry lets the call through. An empty
/// queue always lets calls through. `write_limit` additionally caps how
/// many bytes any single write accepts, to exercise partial-write
/// handling.
#[derive(Debug)]
pub struct FaultChannel {
    inner: MemChannel,
    read_faults: VecDeque<Option<Fault>>,
    write_faults: VecDeque<Option<Fault>>,
    commit_faults: VecDeque<Fault>,
    write_limit: Option<usize>,
}

impl FaultChannel {
    /// Wrap an in-memory channel with an empty fault script.
    pub fn new(inner: MemChannel) -> Self {
        FaultChannel {
            inner,
            read_faults: VecDeque::new(),
            write_faults: VecDeque::new(),
            commit_faults: VecDeque::new(),
            write_limit: None,
        }
    }

    /// Fail the next write call.
    pub fn fail_write(mut self, fault: Fault) -> Self {
        self.write_faults.push_back(Some(fault));
        self
    }

    /// Let `calls` write calls through, then fail the one after.
    pub fn fail_write_after(mut self, calls: usize, fault: Fault) -> Self {
        for _ in 0..calls {
            self.write_faults.push_back(None);
        }
        self.write_faults.push_back(Some(fault));
        self
    }

    /// Fail the next read call.
    pub fn fail_read(mut self, fault: Fault) -> Self {
        self.read_faults.push_back(Some(fault));
        self
    }

    /// Fail the next commit call.
    pub fn fail_commit(mut self, fault: Fault) -> Self {
        self.commit_faults.push_back(fault);
        self
    }

    /// Cap how many bytes a single write call accepts.
    pub fn write_limit(mut self, bytes: usize) -> Self {
        self.write_limit = Some(bytes);
        self
    }

    /// Everything written so far.
    pub fn contents(&self) -> &[u8] {
        self.inner.contents()
    }

    /// Sizes of the physical write calls that got through.
    pub fn write_calls(&self) -> &[usize] {
        self.inner.write_calls()
    }

    /// Whether `close()` has run.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl Channel for FaultChannel {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if let Some(Some(fault)) = self.read_faults.pop_front() {
            return Err(fault.into_error("read"));
        }
        self.inner.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if let Some(Some(fault)) = self.write_faults.pop_front() {
            return Err(fault.into_error("write"));
        }
        let cap = self.write_limit.unwrap_or(buf.len()).min(buf.len());
        self.inner.write(&buf[..cap])
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.inner.seek(pos)
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }

    fn kind(&self) -> ChannelKind {
        self.inner.kind()
    }

    fn commit(&mut self) -> Result<()> {
        if let Some(fault) = self.commit_faults.pop_front() {
            return Err(fault.into_error("commit"));
        }
        self.inner.commit()
    }
}
