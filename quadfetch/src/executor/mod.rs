//! Execution primitives shared by the prefetch engine.
//!
//! - [`WorkQueue`]: bounded FIFO between the producer and the worker pool
//! - [`RetryPolicy`]: back-off schedule for transient failures

mod policy;
mod queue;

pub use policy::{
    RetryPolicy, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_DELAY_SECS,
};
pub use queue::{QueueClosed, TryPushError, WorkQueue};
