//! Bounded FIFO work queue with backpressure.
//!
//! [`WorkQueue`] connects the prefetch producer to its worker pool:
//!
//! 1. `push` waits while the queue is full
//! 2. `pull` waits while the queue is empty
//! 3. after `close`, pushes fail and pulls drain what is left, then end
//!
//! # Example
//!
//! ```ignore
//! use quadfetch::executor::WorkQueue;
//!
//! let queue = WorkQueue::new(2);
//! queue.push(1).await?;
//! queue.push(2).await?;
//! queue.close();
//!
//! assert_eq!(queue.pull().await, Some(1));
//! assert_eq!(queue.pull().await, Some(2));
//! assert_eq!(queue.pull().await, None);
//! ```

use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;
use tokio::sync::{Semaphore, TryAcquireError};

// =============================================================================
// Errors
// =============================================================================

/// Returned by [`WorkQueue::push`] once the queue is closed.
///
/// Carries the rejected item back to the caller.
#[derive(Debug, PartialEq, Eq)]
pub struct QueueClosed<T>(pub T);

impl<T> fmt::Display for QueueClosed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "work queue is closed")
    }
}

impl<T: fmt::Debug> std::error::Error for QueueClosed<T> {}

/// Returned by [`WorkQueue::try_push`].
#[derive(Debug, PartialEq, Eq)]
pub enum TryPushError<T> {
    /// No free slot right now.
    Full(T),
    /// The queue is closed.
    Closed(T),
}

impl<T> TryPushError<T> {
    /// Recovers the rejected item.
    pub fn into_inner(self) -> T {
        match self {
            TryPushError::Full(item) | TryPushError::Closed(item) => item,
        }
    }
}

impl<T> fmt::Display for TryPushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryPushError::Full(_) => write!(f, "work queue is full"),
            TryPushError::Closed(_) => write!(f, "work queue is closed"),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for TryPushError<T> {}

// =============================================================================
// Work Queue
// =============================================================================

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Bounded multi-producer multi-consumer FIFO.
///
/// Two semaphores track free slots and ready items; the deque itself sits
/// behind a mutex that is only held for a push or pop. The closed flag is
/// changed under the same mutex, so an item is either accepted before
/// `close` (and will be drained) or rejected.
pub struct WorkQueue<T> {
    state: Mutex<State<T>>,
    slots: Semaphore,
    ready: Semaphore,
    capacity: usize,
}

impl<T> WorkQueue<T> {
    /// Creates a queue holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            slots: Semaphore::new(capacity),
            ready: Semaphore::new(0),
            capacity,
        }
    }

    /// Appends an item, waiting for a free slot.
    ///
    /// # Errors
    ///
    /// Returns the item in [`QueueClosed`] if the queue is closed before or
    /// while waiting.
    pub async fn push(&self, item: T) -> Result<(), QueueClosed<T>> {
        match self.slots.acquire().await {
            Ok(permit) => permit.forget(),
            Err(_) => return Err(QueueClosed(item)),
        }
        self.enqueue(item).map_err(QueueClosed)
    }

    /// Appends an item if a slot is free right now.
    pub fn try_push(&self, item: T) -> Result<(), TryPushError<T>> {
        match self.slots.try_acquire() {
            Ok(permit) => permit.forget(),
            Err(TryAcquireError::NoPermits) => return Err(TryPushError::Full(item)),
            Err(TryAcquireError::Closed) => return Err(TryPushError::Closed(item)),
        }
        self.enqueue(item).map_err(TryPushError::Closed)
    }

    /// Pushes under the lock once a slot permit is held.
    fn enqueue(&self, item: T) -> Result<(), T> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(item);
        }
        state.items.push_back(item);
        drop(state);

        self.ready.add_permits(1);
        Ok(())
    }

    /// Removes the oldest item, waiting until one is available.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn pull(&self) -> Option<T> {
        loop {
            match self.ready.acquire().await {
                Ok(permit) => {
                    permit.forget();
                    if let Some(item) = self.dequeue() {
                        return Some(item);
                    }
                    // Permit raced with a drain after close; wait again
                }
                // Closed: hand out leftovers, then report the end
                Err(_) => return self.dequeue(),
            }
        }
    }

    fn dequeue(&self) -> Option<T> {
        let item = self.state.lock().items.pop_front();
        if item.is_some() {
            self.slots.add_permits(1);
        }
        item
    }

    /// Closes the queue.
    ///
    /// Waiting and future pushes fail; pulls drain the remaining items and
    /// then return `None`. Closing twice is a no-op.
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.slots.close();
        self.ready.close();
    }

    /// Returns true once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Returns true if no items are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("closed", &self.is_closed())
            .finish()
    }
}
