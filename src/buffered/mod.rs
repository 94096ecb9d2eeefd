//! Buffered streams
//!
//! [`BufferedStream`] wraps one [`Channel`] with one [`BufferPolicy`],
//! amortizing small reads and writes into policy-sized channel
//! operations. Flushing here means "hand bytes to the channel" only; it
//! carries no durability guarantee (see
//! [`DurabilityController`](crate::durability::DurabilityController)).

mod decode;
mod policy;

pub use decode::{DecodeError, Utf8Decoder};
pub use policy::{BufferPolicy, BufferedConfig, PolicyError};

use crate::channel::{Channel, ChannelKind};
use crate::error::{Error, Result};
use std::io;

/// Buffered wrapper around a single channel
///
/// Owns the channel and two byte buffers (write side, read side); the
/// buffers are never shared across streams. Position accounting is
/// logical: it equals the bytes consumed and produced through this
/// stream, independent of when physical flushes happen.
pub struct BufferedStream<C: Channel> {
    /// `None` only after `into_inner` hands the channel back
    channel: Option<C>,
    policy: BufferPolicy,
    refill_chunk: usize,
    /// Write-side buffer; under `Block(n)` its fill stays below `n`
    /// between calls
    write_buf: Vec<u8>,
    /// Read-side buffer, refilled in policy-sized chunks
    read_buf: Vec<u8>,
    read_pos: usize,
    logical_pos: u64,
    closed: bool,
}

impl<C: Channel> BufferedStream<C> {
    /// Wrap a channel with the given policy and default refill chunk.
    pub fn new(channel: C, policy: BufferPolicy) -> Result<Self> {
        Self::with_config(channel, BufferedConfig::new().with_policy(policy))
    }

    /// Wrap a channel with a full configuration.
    pub fn with_config(channel: C, config: BufferedConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::protocol("new", e.to_string()))?;
        Ok(BufferedStream {
            channel: Some(channel),
            policy: config.policy,
            refill_chunk: config.refill_chunk,
            write_buf: Vec::new(),
            read_buf: Vec::new(),
            read_pos: 0,
            logical_pos: 0,
            closed: false,
        })
    }

    /// The stream's immutable buffering policy.
    pub fn policy(&self) -> BufferPolicy {
        self.policy
    }

    /// Logical position: bytes consumed and produced through this stream.
    pub fn position(&self) -> u64 {
        self.logical_pos
    }

    /// Bytes currently buffered on the write side.
    pub fn buffered_len(&self) -> usize {
        self.write_buf.len()
    }

    /// Borrow the underlying channel.
    pub fn get_ref(&self) -> Option<&C> {
        self.channel.as_ref()
    }

    /// Mutably borrow the underlying channel.
    ///
    /// Bypassing the buffer while bytes are pending desynchronizes
    /// position accounting; flush first.
    pub fn get_mut(&mut self) -> Option<&mut C> {
        self.channel.as_mut()
    }

    /// Append data to the stream.
    ///
    /// Accepts all of `data` on success; automatic flushing per the
    /// policy is not caller-visible except through timing. An error
    /// means none of `data` was accepted, so a transient failure may be
    /// retried with the identical call without duplicating bytes.
    /// Bytes buffered by earlier calls always stay buffered until a
    /// flush hands them to the channel.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.ensure_open("write")?;
        let pre_len = self.write_buf.len();
        self.write_buf.extend_from_slice(data);

        let flushed = match self.policy {
            BufferPolicy::Block(size) => {
                let mut result = Ok(());
                while self.write_buf.len() >= size {
                    result = self.flush_upto(size);
                    if result.is_err() {
                        break;
                    }
                }
                result
            }
            BufferPolicy::None | BufferPolicy::Line => {
                let kind = self
                    .channel
                    .as_ref()
                    .map(|c| c.kind())
                    .unwrap_or(ChannelKind::File);
                if self.policy.triggers_flush(data, kind) {
                    self.flush()
                } else {
                    Ok(())
                }
            }
        };

        if let Err(e) = flushed {
            let drained = pre_len + data.len() - self.write_buf.len();
            if drained <= pre_len {
                // The channel saw none of `data`, only previously
                // buffered bytes. Un-buffer `data` so the identical
                // call can be retried without duplication.
                self.write_buf.truncate(self.write_buf.len() - data.len());
                return Err(e.at("write"));
            }
            if !e.is_transient() {
                self.logical_pos += data.len() as u64;
                return Err(e.at("write"));
            }
            // A prefix of `data` already reached the channel and the
            // remainder is buffered, so the stream has accepted the
            // whole slice; the next flush retries the remainder.
        }
        self.logical_pos += data.len() as u64;
        Ok(data.len())
    }

    /// Read up to `max_len` bytes; shorter only at end-of-data.
    pub fn read(&mut self, max_len: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; max_len];
        let n = self.read_into(&mut out)?;
        out.truncate(n);
        Ok(out)
    }

    /// Fill `out` from the stream; returns bytes read, short only at
    /// end-of-data.
    pub fn read_into(&mut self, out: &mut [u8]) -> Result<usize> {
        self.ensure_open("read")?;
        if out.is_empty() {
            return Ok(0);
        }
        // Reads issued after a write must observe it.
        if !self.write_buf.is_empty() {
            self.flush().map_err(|e| e.at("read"))?;
        }

        let mut filled = 0;
        while filled < out.len() {
            if self.read_pos == self.read_buf.len() && !self.refill()? {
                break;
            }
            let avail = &self.read_buf[self.read_pos..];
            let n = avail.len().min(out.len() - filled);
            out[filled..filled + n].copy_from_slice(&avail[..n]);
            self.read_pos += n;
            filled += n;
        }
        self.logical_pos += filled as u64;
        Ok(filled)
    }

    /// Push all buffered, unwritten bytes to the channel.
    ///
    /// Does not imply durability. On failure, bytes the channel already
    /// accepted are drained and everything else stays buffered, so the
    /// caller may retry; the underlying error kind is unmodified.
    pub fn flush(&mut self) -> Result<()> {
        if self.closed {
            return if self.write_buf.is_empty() {
                Ok(())
            } else {
                Err(Error::protocol("flush", "stream is closed"))
            };
        }
        let len = self.write_buf.len();
        self.flush_upto(len)
    }

    /// Flush, then close the underlying channel. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.flush()?;
        if let Some(ch) = self.channel.as_mut() {
            ch.close()?;
        }
        self.closed = true;
        Ok(())
    }

    /// Flush and hand back the channel without closing it.
    pub fn into_inner(mut self) -> Result<C> {
        self.flush()?;
        self.channel
            .take()
            .ok_or_else(|| Error::protocol("into_inner", "stream is detached"))
    }

    /// Drop buffered write-side bytes without flushing them.
    ///
    /// Used by aborting write sessions, where the temp file is removed
    /// anyway.
    pub(crate) fn discard(&mut self) {
        self.write_buf.clear();
    }

    fn ensure_open(&self, op: &'static str) -> Result<()> {
        if self.closed {
            return Err(Error::protocol(op, "stream is closed"));
        }
        if self.channel.is_none() {
            return Err(Error::protocol(op, "stream is detached"));
        }
        Ok(())
    }

    /// Write the first `limit` buffered bytes to the channel, draining
    /// exactly the bytes the channel accepted.
    fn flush_upto(&mut self, limit: usize) -> Result<()> {
        let mut written = 0;
        let result = loop {
            if written >= limit {
                break Ok(());
            }
            let ch = match self.channel.as_mut() {
                Some(c) => c,
                None => break Err(Error::protocol("flush", "stream is detached")),
            };
            match ch.write(&self.write_buf[written..limit]) {
                Ok(0) => {
                    break Err(Error::from_io_at(
                        "flush",
                        written as u64,
                        io::Error::new(io::ErrorKind::WriteZero, "channel accepted no bytes"),
                    ))
                }
                Ok(n) => written += n,
                Err(e) => break Err(e.at("flush").with_offset(written as u64)),
            }
        };
        // Accepted bytes are gone either way; unaccepted bytes stay
        // buffered so a failed flush can be retried.
        self.write_buf.drain(..written);
        result
    }

    fn refill(&mut self) -> Result<bool> {
        let chunk = self.policy.chunk_size(self.refill_chunk);
        self.read_buf.resize(chunk, 0);
        self.read_pos = 0;
        let ch = self
            .channel
            .as_mut()
            .ok_or_else(|| Error::protocol("read", "stream is detached"))?;
        match ch.read(&mut self.read_buf) {
            Ok(n) => {
                self.read_buf.truncate(n);
                Ok(n > 0)
            }
            Err(e) => {
                self.read_buf.clear();
                Err(e)
            }
        }
    }
}

impl<C: Channel> Drop for BufferedStream<C> {
    fn drop(&mut self) {
        if !self.closed && !self.write_buf.is_empty() {
            let _ = self.flush();
        }
    }
}
