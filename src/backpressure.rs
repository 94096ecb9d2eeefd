//! Bounded producer/consumer streaming with flow control
//!
//! One logical producer and one logical consumer share a bounded queue.
//! The producer suspends when the queue is full (high-water mark =
//! capacity) and resumes only once the consumer has drained it to the
//! low-water mark; the consumer suspends when the queue is empty.
//! Suspension points are exactly `push` and `pop`, implemented as
//! condvar waits so producer and consumer can live on worker threads.
//!
//! `close` is the orderly shutdown: the consumer drains what remains and
//! then observes end-of-stream. `cancel` unblocks both sides
//! immediately; it is a signal, not an error.

use crate::error::Error;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Bounded queue parameters.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum queued items; the producer suspends strictly before an
    /// insertion would exceed this (default: 64).
    pub capacity: usize,
    /// Queue length at which a suspended producer resumes; must be below
    /// capacity (default: 16).
    pub low_water: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            capacity: 64,
            low_water: 16,
        }
    }
}

impl QueueConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the capacity (builder pattern).
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the low-water mark (builder pattern).
    pub fn with_low_water(mut self, low_water: usize) -> Self {
        self.low_water = low_water;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), QueueConfigError> {
        if self.capacity == 0 {
            return Err(QueueConfigError::ZeroCapacity);
        }
        if self.low_water >= self.capacity {
            return Err(QueueConfigError::LowWaterAtOrAboveCapacity);
        }
        Ok(())
    }

    /// Tiny queue so tests hit the suspension thresholds immediately.
    ///
    /// Low water sits one below capacity, so a single pop resumes a
    /// suspended producer.
    pub fn for_testing() -> Self {
        QueueConfig {
            capacity: 3,
            low_water: 2,
        }
    }
}

/// Queue configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueConfigError {
    /// Capacity must be at least 1.
    #[error("queue capacity must be at least 1")]
    ZeroCapacity,

    /// The low-water mark must be strictly below capacity.
    #[error("low-water mark must be strictly below capacity")]
    LowWaterAtOrAboveCapacity,
}

/// Why a push was refused; the rejected item is handed back.
#[derive(Debug, PartialEq, Eq)]
pub enum PushError<T> {
    /// The stream was closed; pushing after close is a protocol
    /// violation
    Closed(T),
    /// The stream was canceled; not a misuse, just a signal
    Canceled(T),
}

impl<T> PushError<T> {
    /// Recover the item that was not enqueued.
    pub fn into_item(self) -> T {
        match self {
            PushError::Closed(item) | PushError::Canceled(item) => item,
        }
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Closed(_) => write!(f, "push on closed stream"),
            PushError::Canceled(_) => write!(f, "push on canceled stream"),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for PushError<T> {}

impl<T> From<PushError<T>> for Error {
    fn from(e: PushError<T>) -> Self {
        match e {
            PushError::Closed(_) => Error::protocol("push", "push after close"),
            PushError::Canceled(_) => Error::protocol("push", "push after cancel"),
        }
    }
}

/// What a pop produced.
#[derive(Debug, PartialEq, Eq)]
pub enum Popped<T> {
    /// The next item in order
    Item(T),
    /// Producer closed and the queue is drained: end-of-stream
    Closed,
    /// The stream was canceled; no further items will be delivered
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Open,
    Closed,
    Canceled,
}

struct QueueState<T> {
    queue: VecDeque<T>,
    lifecycle: Lifecycle,
    /// Producer hit the high-water mark and stays suspended until the
    /// queue drains to the low-water mark
    gated: bool,
}

struct Shared<T> {
    state: Mutex<QueueState<T>>,
    /// Producer waits here for space
    space: Condvar,
    /// Consumer waits here for items
    items: Condvar,
    capacity: usize,
    low_water: usize,
}

impl<T> Shared<T> {
    fn cancel(&self) {
        let mut state = self.state.lock();
        state.lifecycle = Lifecycle::Canceled;
        // Canceled delivery stops immediately; drop whatever is queued.
        state.queue.clear();
        drop(state);
        self.space.notify_all();
        self.items.notify_all();
    }
}

/// Create a connected producer/consumer pair over a bounded queue.
pub fn bounded<T>(config: QueueConfig) -> Result<(Producer<T>, Consumer<T>), QueueConfigError> {
    config.validate()?;
    let shared = Arc::new(Shared {
        state: Mutex::new(QueueState {
            queue: VecDeque::with_capacity(config.capacity),
            lifecycle: Lifecycle::Open,
            gated: false,
        }),
        space: Condvar::new(),
        items: Condvar::new(),
        capacity: config.capacity,
        low_water: config.low_water,
    });
    let producer = Producer {
        shared: Arc::clone(&shared),
    };
    let consumer = Consumer { shared };
    Ok((producer, consumer))
}

/// Producing half of a backpressure stream
///
/// Single logical producer: the handle is `Send` but not `Clone`;
/// multiple producers require external serialization.
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Producer<T> {
    /// Enqueue an item, suspending while the queue is at capacity.
    ///
    /// A suspended push resumes only once the consumer has drained the
    /// queue to the low-water mark, then inserts and returns.
    pub fn push(&self, item: T) -> Result<(), PushError<T>> {
        let mut state = self.shared.state.lock();
        loop {
            match state.lifecycle {
                Lifecycle::Closed => return Err(PushError::Closed(item)),
                Lifecycle::Canceled => return Err(PushError::Canceled(item)),
                Lifecycle::Open => {}
            }
            if state.gated {
                if state.queue.len() <= self.shared.low_water {
                    state.gated = false;
                    break;
                }
            } else if state.queue.len() < self.shared.capacity {
                break;
            } else {
                state.gated = true;
            }
            self.shared.space.wait(&mut state);
        }
        state.queue.push_back(item);
        drop(state);
        self.shared.items.notify_one();
        Ok(())
    }

    /// Signal end-of-stream.
    ///
    /// The consumer drains remaining items, then observes
    /// [`Popped::Closed`]. Further pushes fail. Dropping the producer
    /// closes implicitly.
    pub fn close(&self) {
        let mut state = self.shared.state.lock();
        if state.lifecycle == Lifecycle::Open {
            state.lifecycle = Lifecycle::Closed;
        }
        drop(state);
        self.shared.space.notify_all();
        self.shared.items.notify_all();
    }

    /// Unblock both sides immediately; no further items are delivered.
    pub fn cancel(&self) {
        self.shared.cancel();
    }
}

impl<T> Drop for Producer<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Consuming half of a backpressure stream
///
/// Single logical consumer: the handle is `Send` but not `Clone`.
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Consumer<T> {
    /// Dequeue the next item, suspending while the queue is empty and
    /// the stream is open.
    pub fn pop(&self) -> Popped<T> {
        let mut state = self.shared.state.lock();
        loop {
            if state.lifecycle == Lifecycle::Canceled {
                return Popped::Canceled;
            }
            if let Some(item) = state.queue.pop_front() {
                // Wake a gated producer once the drain reaches the
                // low-water mark.
                if state.gated && state.queue.len() <= self.shared.low_water {
                    self.shared.space.notify_one();
                }
                return Popped::Item(item);
            }
            if state.lifecycle == Lifecycle::Closed {
                return Popped::Closed;
            }
            self.shared.items.wait(&mut state);
        }
    }

    /// Items currently queued (racy; for observation only).
    pub fn len(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Whether the queue is currently empty (racy; for observation only).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unblock both sides immediately; no further items are delivered.
    pub fn cancel(&self) {
        self.shared.cancel();
    }
}

impl<T> Drop for Consumer<T> {
    fn drop(&mut self) {
        // A producer blocked on a vanished consumer would never wake;
        // treat consumer loss as cancellation.
        self.shared.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_push_pop_in_order() {
        let (tx, rx) = bounded(QueueConfig::default()).unwrap();
        tx.push(1).unwrap();
        tx.push(2).unwrap();
        tx.push(3).unwrap();
        assert_eq!(rx.pop(), Popped::Item(1));
        assert_eq!(rx.pop(), Popped::Item(2));
        assert_eq!(rx.pop(), Popped::Item(3));
    }

    #[test]
    fn test_close_drains_then_ends() {
        let (tx, rx) = bounded(QueueConfig::default()).unwrap();
        tx.push("a").unwrap();
        tx.push("b").unwrap();
        tx.close();
        assert_eq!(rx.pop(), Popped::Item("a"));
        assert_eq!(rx.pop(), Popped::Item("b"));
        assert_eq!(rx.pop(), Popped::Closed);
        assert_eq!(rx.pop(), Popped::Closed);
    }

    #[test]
    fn test_push_after_close_is_refused() {
        let (tx, _rx) = bounded::<u8>(QueueConfig::default()).unwrap();
        tx.close();
        let err = tx.push(9).unwrap_err();
        assert_eq!(err, PushError::Closed(9));
        assert_eq!(err.into_item(), 9);
        let crate_err: Error = tx.push(9).unwrap_err().into();
        assert!(matches!(crate_err, Error::Protocol { .. }));
    }

    #[test]
    fn test_cancel_unblocks_consumer() {
        let (tx, rx) = bounded::<u8>(QueueConfig::default()).unwrap();
        let waiter = thread::spawn(move || rx.pop());
        thread::sleep(Duration::from_millis(20));
        tx.cancel();
        assert_eq!(waiter.join().unwrap(), Popped::Canceled);
    }

    #[test]
    fn test_cancel_drops_queued_items() {
        let (tx, rx) = bounded(QueueConfig::default()).unwrap();
        tx.push(1).unwrap();
        tx.cancel();
        assert_eq!(rx.pop(), Popped::Canceled);
    }

    #[test]
    fn test_dropping_producer_closes() {
        let (tx, rx) = bounded(QueueConfig::default()).unwrap();
        tx.push(42).unwrap();
        drop(tx);
        assert_eq!(rx.pop(), Popped::Item(42));
        assert_eq!(rx.pop(), Popped::Closed);
    }

    #[test]
    fn test_low_water_validation() {
        assert!(bounded::<u8>(QueueConfig::new().with_capacity(0)).is_err());
        assert!(bounded::<u8>(
            QueueConfig::new().with_capacity(4).with_low_water(4)
        )
        .is_err());
        assert!(bounded::<u8>(
            QueueConfig::new().with_capacity(4).with_low_water(3)
        )
        .is_ok());
    }
}
