//! Request validation errors.

use thiserror::Error;

use crate::coord::CoordError;

/// Errors reported synchronously when a prefetch cannot start.
///
/// Failures of individual items are not errors of the operation; they are
/// reported through [`ItemOutcome`](super::ItemOutcome).
#[derive(Debug, Error)]
pub enum PrefetchError {
    /// The request resolves to no targets.
    #[error("Empty prefetch request: {0}")]
    EmptyRequest(String),

    /// The requested area is malformed.
    #[error("Invalid area: {0}")]
    InvalidArea(#[from] CoordError),

    /// Tiled request against a partitioned layer, or the reverse.
    #[error("Layer '{layer}' is {layer_mode}, request is {request_mode}")]
    AddressingMismatch {
        layer: String,
        layer_mode: &'static str,
        request_mode: &'static str,
    },

    /// `prefetch` was called outside a tokio runtime.
    #[error("No tokio runtime available to run the prefetch")]
    NoRuntime,

    /// The operation ended without delivering its result, e.g. because the
    /// runtime shut down.
    #[error("Prefetch operation {0} ended without a result")]
    Aborted(u64),
}
