//! Collection of item results and callback delivery.
//!
//! Workers report results concurrently. The aggregator serializes them:
//! the per-item callback runs under the aggregator lock, so callbacks
//! never overlap, and the completion callback is taken out of its slot on
//! the first [`finish`](ResultAggregator::finish), so it runs exactly once.
//!
//! The orchestrator calls `finish` only after the producer and every worker
//! have stopped, which puts the completion callback after all item
//! callbacks.

use std::panic::{self, AssertUnwindSafe};

use parking_lot::Mutex;
use tracing::{error, warn};

use super::types::{
    PrefetchAggregateResult, PrefetchCounts, PrefetchItemResult, PrefetchState,
};
use crate::provider::FetchError;

/// Called once per item as its result arrives.
pub type ItemCallback = Box<dyn FnMut(&PrefetchItemResult) + Send>;

/// Called once with the final result.
pub type CompletionCallback = Box<dyn FnOnce(PrefetchAggregateResult) + Send>;

struct State {
    on_item: Option<ItemCallback>,
    on_complete: Option<CompletionCallback>,
    items: Vec<PrefetchItemResult>,
    counts: PrefetchCounts,
}

/// Accumulates item results and fires callbacks.
pub struct ResultAggregator {
    state: Mutex<State>,
}

impl ResultAggregator {
    pub fn new(on_item: Option<ItemCallback>, on_complete: CompletionCallback) -> Self {
        Self {
            state: Mutex::new(State {
                on_item,
                on_complete: Some(on_complete),
                items: Vec::new(),
                counts: PrefetchCounts::default(),
            }),
        }
    }

    /// Records a result and runs the item callback.
    ///
    /// Results arriving after [`finish`](Self::finish) are dropped.
    pub fn record(&self, result: PrefetchItemResult) {
        let mut state = self.state.lock();
        if state.on_complete.is_none() {
            warn!(target = %result.target, "Item result after completion dropped");
            return;
        }

        state.counts.record(&result.outcome);
        if let Some(on_item) = state.on_item.as_mut() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| on_item(&result)));
            if outcome.is_err() {
                error!(target = %result.target, "Item callback panicked");
            }
        }
        state.items.push(result);
    }

    /// Tallies so far.
    pub fn counts(&self) -> PrefetchCounts {
        self.state.lock().counts
    }

    /// Returns true once the completion callback has run.
    pub fn is_finished(&self) -> bool {
        self.state.lock().on_complete.is_none()
    }

    /// Builds the aggregate and runs the completion callback.
    ///
    /// Only the first call has an effect; it returns true.
    pub fn finish(&self, final_state: PrefetchState, error: Option<FetchError>) -> bool {
        let mut state = self.state.lock();
        let Some(on_complete) = state.on_complete.take() else {
            return false;
        };
        state.on_item = None;

        let result = PrefetchAggregateResult {
            items: std::mem::take(&mut state.items),
            state: final_state,
            error,
            counts: state.counts,
        };

        if panic::catch_unwind(AssertUnwindSafe(|| on_complete(result))).is_err() {
            error!("Completion callback panicked");
        }
        true
    }
}
