//! Penstock: layered buffered I/O and durable writes
//!
//! This crate is the I/O plumbing a storage system sits on top of,
//! layered leaves-first:
//!
//! - [`channel`]: thin handles over raw byte resources (read/write/seek/
//!   close, nothing else)
//! - [`buffered`]: configurable buffering (none / line / fixed-block)
//!   over one channel, plus incremental UTF-8 decoding across refill
//!   boundaries
//! - [`durability`]: the flush-versus-commit split; commit blocks until
//!   the device acknowledges durability and mints an ordering token
//! - [`atomic`]: write-temp / commit / atomic-rename sessions; readers
//!   see the old or the new file in full, never a torn mix
//! - [`transfer`]: bulk channel-to-channel moves, kernel-assisted when
//!   the descriptors allow it, chunked otherwise
//! - [`backpressure`]: bounded producer/consumer queue with high/low
//!   water mark flow control
//! - [`testing`]: in-memory and fault-injecting channels for exercising
//!   failure paths
//!
//! Everything except `backpressure` is synchronous and blocking; the
//! backpressure queue's producer and consumer suspend exactly at `push`
//! (when full) and `pop` (when empty). No component retries
//! automatically except the durability controller's bounded retry of
//! transient commit failures.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod atomic;
pub mod backpressure;
pub mod buffered;
pub mod channel;
pub mod durability;
pub mod error;
pub mod testing;
pub mod transfer;

pub use atomic::{AtomicWriteConfig, AtomicWriter, SessionState, TempWriteSession};
pub use backpressure::{
    bounded, Consumer, Popped, Producer, PushError, QueueConfig, QueueConfigError,
};
pub use buffered::{
    BufferPolicy, BufferedConfig, BufferedStream, DecodeError, PolicyError, Utf8Decoder,
};
pub use channel::{Channel, ChannelKind, FileChannel, OpenMode};
pub use durability::{CommitConfig, CommitToken, DurabilityController, DurabilityCounters};
pub use error::{Error, Result};
pub use testing::{Fault, FaultChannel, MemChannel};
pub use transfer::{TransferConfig, ZeroCopyTransfer};
