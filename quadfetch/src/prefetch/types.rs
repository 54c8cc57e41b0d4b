//! Prefetch targets, per-item outcomes and the aggregate result.

use std::fmt;

use bytes::Bytes;
use serde::Serialize;

use crate::cache::keys;
use crate::provider::FetchError;
use crate::tile::TileAddress;

/// One addressable unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrefetchTarget {
    /// A quadtree tile
    Tile(TileAddress),
    /// An opaque partition id
    Partition(String),
}

impl PrefetchTarget {
    /// Cache key of this target within `layer`.
    pub fn cache_key(&self, layer: &str) -> String {
        match self {
            PrefetchTarget::Tile(tile) => keys::tile_key(layer, tile),
            PrefetchTarget::Partition(id) => keys::partition_key(layer, id),
        }
    }

    pub fn as_tile(&self) -> Option<&TileAddress> {
        match self {
            PrefetchTarget::Tile(tile) => Some(tile),
            PrefetchTarget::Partition(_) => None,
        }
    }

    pub fn as_partition(&self) -> Option<&str> {
        match self {
            PrefetchTarget::Tile(_) => None,
            PrefetchTarget::Partition(id) => Some(id),
        }
    }
}

impl From<TileAddress> for PrefetchTarget {
    fn from(tile: TileAddress) -> Self {
        PrefetchTarget::Tile(tile)
    }
}

impl fmt::Display for PrefetchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefetchTarget::Tile(tile) => write!(f, "tile {}", tile),
            PrefetchTarget::Partition(id) => write!(f, "partition {}", id),
        }
    }
}

/// Why an item was not fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The caller cancelled the operation.
    Requested,
    /// A global error stopped the operation.
    GlobalFailure,
}

/// Outcome of a single target.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Succeeded(Bytes),
    Failed(FetchError),
    Cancelled(CancelReason),
}

/// Result reported for one target.
#[derive(Debug, Clone, PartialEq)]
pub struct PrefetchItemResult {
    pub target: PrefetchTarget,
    pub outcome: ItemOutcome,
}

impl PrefetchItemResult {
    pub fn succeeded(target: PrefetchTarget, payload: Bytes) -> Self {
        Self {
            target,
            outcome: ItemOutcome::Succeeded(payload),
        }
    }

    pub fn failed(target: PrefetchTarget, error: FetchError) -> Self {
        Self {
            target,
            outcome: ItemOutcome::Failed(error),
        }
    }

    pub fn cancelled(target: PrefetchTarget, reason: CancelReason) -> Self {
        Self {
            target,
            outcome: ItemOutcome::Cancelled(reason),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ItemOutcome::Succeeded(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, ItemOutcome::Failed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome, ItemOutcome::Cancelled(_))
    }

    /// The payload, if the fetch succeeded.
    pub fn payload(&self) -> Option<&Bytes> {
        match &self.outcome {
            ItemOutcome::Succeeded(payload) => Some(payload),
            _ => None,
        }
    }

    /// The error, if the fetch failed.
    pub fn error(&self) -> Option<&FetchError> {
        match &self.outcome {
            ItemOutcome::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// Lifecycle of a prefetch operation.
///
/// ```text
/// Pending ──► Running ──┬──► Completed
///                       ├──► Cancelled
///                       └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefetchState {
    Pending,
    Running,
    /// Every target was processed (individual failures allowed)
    Completed,
    /// The caller cancelled the operation
    Cancelled,
    /// A global error stopped the operation
    Failed,
}

impl PrefetchState {
    /// Returns true for `Completed`, `Cancelled` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PrefetchState::Completed | PrefetchState::Cancelled | PrefetchState::Failed
        )
    }
}

impl fmt::Display for PrefetchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrefetchState::Pending => "pending",
            PrefetchState::Running => "running",
            PrefetchState::Completed => "completed",
            PrefetchState::Cancelled => "cancelled",
            PrefetchState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Item tallies of an operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PrefetchCounts {
    /// Items handed to the fetcher
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items never handed to the fetcher
    pub cancelled: usize,
}

impl PrefetchCounts {
    /// Every item reported so far.
    pub fn total(&self) -> usize {
        self.attempted + self.cancelled
    }

    pub(crate) fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Succeeded(_) => {
                self.attempted += 1;
                self.succeeded += 1;
            }
            ItemOutcome::Failed(_) => {
                self.attempted += 1;
                self.failed += 1;
            }
            ItemOutcome::Cancelled(_) => self.cancelled += 1,
        }
    }
}

/// Combined result of a prefetch operation.
#[derive(Debug, Clone, PartialEq)]
pub struct PrefetchAggregateResult {
    /// Item results in arrival order
    pub items: Vec<PrefetchItemResult>,
    pub state: PrefetchState,
    /// The global error that failed the operation, if any
    pub error: Option<FetchError>,
    pub counts: PrefetchCounts,
}

impl PrefetchAggregateResult {
    /// Returns true if the caller cancelled the operation.
    pub fn is_cancelled(&self) -> bool {
        self.state == PrefetchState::Cancelled
    }

    /// Returns true if every item succeeded.
    pub fn is_complete_success(&self) -> bool {
        self.state == PrefetchState::Completed && self.counts.succeeded == self.items.len()
    }

    /// Serializable overview without payloads.
    pub fn summary(&self) -> PrefetchSummary {
        PrefetchSummary {
            state: self.state,
            counts: self.counts,
            error: self.error.as_ref().map(|e| e.to_string()),
        }
    }
}

/// Payload-free overview of an aggregate result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrefetchSummary {
    pub state: PrefetchState,
    #[serde(flatten)]
    pub counts: PrefetchCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::FetchErrorKind;

    #[test]
    fn test_target_cache_keys() {
        let tile = PrefetchTarget::Tile(TileAddress::new(2, 1, 1).unwrap());
        assert_eq!(tile.cache_key("terrain"), "terrain::tile::19");

        let partition = PrefetchTarget::Partition("377".to_string());
        assert_eq!(partition.cache_key("roads"), "roads::partition::377");
    }

    #[test]
    fn test_target_display() {
        let tile = PrefetchTarget::Tile(TileAddress::new(2, 1, 1).unwrap());
        assert_eq!(tile.to_string(), "tile 2/1/1");
        assert_eq!(
            PrefetchTarget::Partition("a".into()).to_string(),
            "partition a"
        );
    }

    #[test]
    fn test_counts_record() {
        let mut counts = PrefetchCounts::default();
        counts.record(&ItemOutcome::Succeeded(Bytes::new()));
        counts.record(&ItemOutcome::Failed(FetchError::new(FetchErrorKind::NotFound, "")));
        counts.record(&ItemOutcome::Cancelled(CancelReason::Requested));

        assert_eq!(counts.attempted, 2);
        assert_eq!(counts.succeeded, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.cancelled, 1);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!PrefetchState::Pending.is_terminal());
        assert!(!PrefetchState::Running.is_terminal());
        assert!(PrefetchState::Completed.is_terminal());
        assert!(PrefetchState::Cancelled.is_terminal());
        assert!(PrefetchState::Failed.is_terminal());
    }

    #[test]
    fn test_summary_json() {
        let result = PrefetchAggregateResult {
            items: Vec::new(),
            state: PrefetchState::Failed,
            error: Some(FetchError::new(FetchErrorKind::Unauthorized, "bad token")),
            counts: PrefetchCounts {
                attempted: 1,
                succeeded: 0,
                failed: 1,
                cancelled: 3,
            },
        };

        let json = serde_json::to_value(result.summary()).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["cancelled"], 3);
        assert_eq!(json["error"], "unauthorized: bad token");
    }
}
