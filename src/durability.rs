//! Flush-versus-commit distinction
//!
//! `flush` moves bytes from the process buffer into the kernel cache and
//! guarantees nothing about a crash. `commit` blocks until the device
//! layer acknowledges durability for everything previously flushed on
//! the channel, and mints an ordering token for the checkpoint.

use crate::buffered::BufferedStream;
use crate::channel::Channel;
use crate::error::Result;
use std::time::Instant;
use tracing::warn;

/// Opaque marker ordering durable checkpoints
///
/// Everything written and flushed before the commit that produced this
/// token is durable. Tokens have no identity beyond their ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CommitToken {
    seq: u64,
}

impl CommitToken {
    /// Position of this token in the controller's commit order.
    pub fn sequence(&self) -> u64 {
        self.seq
    }
}

/// Commit retry parameters.
#[derive(Debug, Clone)]
pub struct CommitConfig {
    /// How many times a transient failure during commit is retried
    /// before giving up (default: 3). Permanent and durability failures
    /// are never retried.
    pub max_transient_retries: u32,
}

impl Default for CommitConfig {
    fn default() -> Self {
        CommitConfig {
            max_transient_retries: 3,
        }
    }
}

impl CommitConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the transient retry bound (builder pattern).
    pub fn with_max_transient_retries(mut self, retries: u32) -> Self {
        self.max_transient_retries = retries;
        self
    }

    /// Configuration with no retries, so tests observe first failures.
    pub fn for_testing() -> Self {
        CommitConfig {
            max_transient_retries: 0,
        }
    }
}

/// Cumulative commit counters.
///
/// These accumulate over the lifetime of the controller and are never
/// reset. Use them to observe how many durability barriers a workload
/// triggers.
#[derive(Debug, Clone, Default)]
pub struct DurabilityCounters {
    /// Successful commit calls
    pub commits: u64,
    /// Transient failures that were retried
    pub transient_retries: u64,
    /// Total nanoseconds spent waiting on the durability barrier
    pub sync_nanos: u64,
}

/// Issues durability barriers and orders them
///
/// Wraps a channel's `commit` primitive with a bounded retry of
/// transient failures. A channel whose storage has no durability
/// primitive fails the commit outright; the controller never downgrades
/// to a flush-only guarantee.
pub struct DurabilityController {
    config: CommitConfig,
    next_seq: u64,
    counters: DurabilityCounters,
}

impl DurabilityController {
    /// Create a controller with the given retry policy.
    pub fn new(config: CommitConfig) -> Self {
        DurabilityController {
            config,
            next_seq: 0,
            counters: DurabilityCounters::default(),
        }
    }

    /// Push a stream's buffered bytes to its channel.
    ///
    /// Returns once the bytes are handed to the kernel cache; this is
    /// the flush half of the flush/commit split.
    pub fn flush<C: Channel>(&self, stream: &mut BufferedStream<C>) -> Result<()> {
        stream.flush()
    }

    /// Block until the channel acknowledges durability for all
    /// previously flushed bytes.
    ///
    /// Transient failures are retried up to the configured bound; a
    /// permanent or durability failure is returned on first sight.
    pub fn commit<C: Channel>(&mut self, channel: &mut C) -> Result<CommitToken> {
        let mut attempt: u32 = 0;
        loop {
            let start = Instant::now();
            match channel.commit() {
                Ok(()) => {
                    self.counters.sync_nanos += start.elapsed().as_nanos() as u64;
                    self.counters.commits += 1;
                    self.next_seq += 1;
                    return Ok(CommitToken { seq: self.next_seq });
                }
                Err(e) if e.is_transient() && attempt < self.config.max_transient_retries => {
                    attempt += 1;
                    self.counters.transient_retries += 1;
                    warn!(
                        target: "penstock::durability",
                        attempt,
                        max = self.config.max_transient_retries,
                        error = %e,
                        "transient failure during commit, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Get a snapshot of cumulative commit counters.
    pub fn counters(&self) -> DurabilityCounters {
        self.counters.clone()
    }
}

impl Default for DurabilityController {
    fn default() -> Self {
        Self::new(CommitConfig::default())
    }
}
