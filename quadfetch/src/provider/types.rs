//! Fetcher trait and error classification.

use std::fmt;

use bytes::Bytes;
use thiserror::Error;

use crate::cache::BoxFuture;
use crate::prefetch::PrefetchTarget;

/// Category of a fetch failure.
///
/// The category decides how the orchestrator reacts: global kinds stop the
/// whole operation, retryable kinds go through the retry policy, the rest
/// fail only the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    /// Connection or transport failure
    Network,
    /// Request timed out
    Timeout,
    /// The unit does not exist in the layer
    NotFound,
    /// Credentials missing or rejected
    Unauthorized,
    /// Credentials lack access to the layer
    Forbidden,
    /// The layer does not exist or cannot serve this addressing mode
    InvalidLayer,
    /// Rate limited by the service
    TooManyRequests,
    /// Service temporarily unavailable
    ServiceUnavailable,
    /// Response body could not be read
    Decode,
    Other,
}

impl FetchErrorKind {
    /// Short name used in logs and summaries.
    pub fn name(&self) -> &'static str {
        match self {
            FetchErrorKind::Network => "network",
            FetchErrorKind::Timeout => "timeout",
            FetchErrorKind::NotFound => "not_found",
            FetchErrorKind::Unauthorized => "unauthorized",
            FetchErrorKind::Forbidden => "forbidden",
            FetchErrorKind::InvalidLayer => "invalid_layer",
            FetchErrorKind::TooManyRequests => "too_many_requests",
            FetchErrorKind::ServiceUnavailable => "service_unavailable",
            FetchErrorKind::Decode => "decode",
            FetchErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned by a [`Fetcher`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classifies a non-success HTTP status code.
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            401 => FetchErrorKind::Unauthorized,
            403 => FetchErrorKind::Forbidden,
            404 | 410 => FetchErrorKind::NotFound,
            408 => FetchErrorKind::Timeout,
            429 => FetchErrorKind::TooManyRequests,
            500 | 502 | 503 | 504 => FetchErrorKind::ServiceUnavailable,
            _ => FetchErrorKind::Other,
        };
        Self::new(kind, message)
    }

    /// Returns true if this error invalidates the whole operation.
    ///
    /// Every other item would fail the same way, so scheduling stops.
    pub fn is_global(&self) -> bool {
        matches!(
            self.kind,
            FetchErrorKind::Unauthorized | FetchErrorKind::Forbidden | FetchErrorKind::InvalidLayer
        )
    }

    /// Returns true if trying again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            FetchErrorKind::Network
                | FetchErrorKind::Timeout
                | FetchErrorKind::TooManyRequests
                | FetchErrorKind::ServiceUnavailable
        )
    }
}

/// Retrieves the payload of one prefetch target from a remote layer.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; workers call `fetch` concurrently.
pub trait Fetcher: Send + Sync {
    /// Fetches the payload for `target`.
    fn fetch<'a>(&'a self, target: &'a PrefetchTarget) -> BoxFuture<'a, Result<Bytes, FetchError>>;
}
