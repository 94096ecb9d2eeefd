//! Buffering policy configuration.
//!
//! Policies form a small closed set, represented as a tagged variant with
//! exhaustive matching rather than an open extension point.

use crate::channel::ChannelKind;

/// When a buffered stream pushes accumulated bytes to its channel
///
/// Immutable once a stream is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferPolicy {
    /// Flush on every write call
    None,
    /// Flush when written data contains a line terminator (`\n`) and the
    /// underlying channel is interactive
    Line,
    /// Flush in fixed-size blocks once the buffer fill reaches the block
    /// size; the remainder stays buffered
    Block(usize),
}

impl BufferPolicy {
    /// Validate the policy.
    pub fn validate(&self) -> Result<(), PolicyError> {
        match self {
            BufferPolicy::Block(0) => Err(PolicyError::ZeroBlockSize),
            _ => Ok(()),
        }
    }

    /// Chunk size used when refilling the read buffer.
    ///
    /// Block policies refill in their own block size; the others use the
    /// configured default.
    pub fn chunk_size(&self, default: usize) -> usize {
        match self {
            BufferPolicy::Block(size) => *size,
            BufferPolicy::None | BufferPolicy::Line => default,
        }
    }

    /// Whether a write of `data` to a channel of `kind` triggers an
    /// automatic flush under this policy.
    pub(crate) fn triggers_flush(&self, data: &[u8], kind: ChannelKind) -> bool {
        match self {
            BufferPolicy::None => true,
            BufferPolicy::Line => kind == ChannelKind::Interactive && data.contains(&b'\n'),
            // Block flushing is threshold-driven, handled by the stream.
            BufferPolicy::Block(_) => false,
        }
    }
}

impl Default for BufferPolicy {
    fn default() -> Self {
        BufferPolicy::Block(8192)
    }
}

/// Buffered stream construction parameters.
#[derive(Debug, Clone)]
pub struct BufferedConfig {
    /// Buffering policy for the write side.
    pub policy: BufferPolicy,
    /// Read-side refill chunk size for the None and Line policies
    /// (default: 8KB). Block policies refill in their block size.
    pub refill_chunk: usize,
}

impl Default for BufferedConfig {
    fn default() -> Self {
        BufferedConfig {
            policy: BufferPolicy::default(),
            refill_chunk: 8192,
        }
    }
}

impl BufferedConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the buffering policy (builder pattern).
    pub fn with_policy(mut self, policy: BufferPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the read-side refill chunk size (builder pattern).
    pub fn with_refill_chunk(mut self, bytes: usize) -> Self {
        self.refill_chunk = bytes;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PolicyError> {
        self.policy.validate()?;
        if self.refill_chunk == 0 {
            return Err(PolicyError::ZeroRefillChunk);
        }
        Ok(())
    }

    /// Configuration with tiny buffers so tests hit flush boundaries fast.
    pub fn for_testing() -> Self {
        BufferedConfig {
            policy: BufferPolicy::Block(8),
            refill_chunk: 8,
        }
    }
}

/// Buffering policy validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// Block size must be a positive integer.
    #[error("block size must be a positive integer")]
    ZeroBlockSize,

    /// Refill chunk must be a positive integer.
    #[error("refill chunk must be a positive integer")]
    ZeroRefillChunk,
}
