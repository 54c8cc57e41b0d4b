//! Expansion of a prefetch request into concrete targets.
//!
//! # Spatial requests
//!
//! The requested levels are first filtered against the layer's depth range
//! and the request's own clamp. Dropped levels produce a [`LevelWarning`].
//!
//! Enumeration then starts from the tiles covering the area at the
//! coarsest remaining level (row-major) and descends depth-first to the
//! finest one. A tile is yielded when its level was requested; a child is
//! visited only if it intersects the area. Intersection is half-open, so
//! tiles that only share an edge with the area are skipped, and an area of
//! zero width or height still selects the tiles containing it.
//!
//! A tile intersects the area exactly when it lies in the covering
//! [`TileRange`] of its level, so those ranges are computed once up front
//! and the total number of targets is known before iteration starts.
//!
//! # Partition requests
//!
//! Ids are yielded in input order with duplicates removed; empty ids are
//! skipped.

use std::collections::HashSet;
use std::fmt;

use tracing::{debug, warn};

use super::error::PrefetchError;
use super::request::{Addressing, LayerConfig, PrefetchRequest, TileRequest};
use super::types::PrefetchTarget;
use crate::coord::{GeoRectangle, TileRange, TileRangeIter, TilingScheme, MAX_LEVEL};
use crate::tile::TileAddress;

/// Why a requested level was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelWarningReason {
    /// Deeper than the layer serves
    AboveLayerMax { max: u8 },
    /// Shallower than the layer serves
    BelowLayerMin { min: u8 },
    /// Outside the request's own clamp
    OutsideClamp { min: u8, max: u8 },
}

/// A requested level that will not be enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelWarning {
    pub level: u8,
    pub reason: LevelWarningReason,
}

impl fmt::Display for LevelWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            LevelWarningReason::AboveLayerMax { max } => {
                write!(f, "level {} dropped: layer max level is {}", self.level, max)
            }
            LevelWarningReason::BelowLayerMin { min } => {
                write!(f, "level {} dropped: layer min level is {}", self.level, min)
            }
            LevelWarningReason::OutsideClamp { min, max } => write!(
                f,
                "level {} dropped: outside requested range {}..={}",
                self.level, min, max
            ),
        }
    }
}

/// A validated request: the target sequence plus any dropped levels.
#[derive(Debug)]
pub struct Enumeration {
    pub sequence: AddressSequence,
    pub warnings: Vec<LevelWarning>,
}

/// Expands `request` against `layer`.
///
/// # Errors
///
/// - [`PrefetchError::AddressingMismatch`] if the request's addressing mode
///   differs from the layer's
/// - [`PrefetchError::InvalidArea`] if the area is malformed
/// - [`PrefetchError::EmptyRequest`] if nothing is left to fetch
pub fn enumerate(
    request: PrefetchRequest,
    layer: &LayerConfig,
) -> Result<Enumeration, PrefetchError> {
    match (request, layer.addressing) {
        (
            PrefetchRequest::Tiles(tiles),
            Addressing::Tiled {
                min_level,
                max_level,
                scheme,
            },
        ) => enumerate_tiles(tiles, min_level, max_level, scheme),
        (PrefetchRequest::Partitions(ids), Addressing::Partitioned) => enumerate_partitions(ids),
        (request, addressing) => Err(PrefetchError::AddressingMismatch {
            layer: layer.id.clone(),
            layer_mode: addressing.mode_name(),
            request_mode: request.mode_name(),
        }),
    }
}

fn enumerate_tiles(
    request: TileRequest,
    layer_min: u8,
    layer_max: u8,
    scheme: TilingScheme,
) -> Result<Enumeration, PrefetchError> {
    let area = &request.area;
    // Revalidate: the fields are public
    let area = GeoRectangle::new(area.west, area.south, area.east, area.north)?;
    // Addressing is public too; never walk deeper than a quadkey can hold
    let layer_max = layer_max.min(MAX_LEVEL);

    let mut levels = request.levels.clone();
    levels.sort_unstable();
    levels.dedup();

    let mut warnings = Vec::new();
    let mut kept = Vec::with_capacity(levels.len());
    for level in levels {
        match check_level(level, layer_min, layer_max, &request) {
            Some(reason) => {
                let warning = LevelWarning { level, reason };
                warn!(warning = %warning, "Dropping requested level");
                warnings.push(warning);
            }
            None => kept.push(level),
        }
    }

    let (Some(&coarsest), Some(&finest)) = (kept.first(), kept.last()) else {
        return Err(PrefetchError::EmptyRequest(
            "no requested level is available on the layer".to_string(),
        ));
    };

    let ranges: Vec<TileRange> = (coarsest..=finest)
        .map(|level| scheme.tile_range(&area, level))
        .collect();
    let wanted = kept.iter().fold(0u64, |mask, &level| mask | (1u64 << level));
    let total = kept
        .iter()
        .map(|&level| ranges[(level - coarsest) as usize].len())
        .sum::<u64>();

    debug!(
        area = %area,
        coarsest,
        finest,
        total,
        scheme = scheme.name(),
        "Enumerating tiles"
    );

    Ok(Enumeration {
        sequence: AddressSequence {
            remaining: total,
            inner: Inner::Tiles(TileWalk {
                roots: ranges[0].iter(),
                stack: Vec::new(),
                ranges,
                coarsest,
                finest,
                wanted,
            }),
        },
        warnings,
    })
}

fn check_level(
    level: u8,
    layer_min: u8,
    layer_max: u8,
    request: &TileRequest,
) -> Option<LevelWarningReason> {
    if level > layer_max {
        return Some(LevelWarningReason::AboveLayerMax { max: layer_max });
    }
    if level < layer_min {
        return Some(LevelWarningReason::BelowLayerMin { min: layer_min });
    }
    let clamp_min = request.min_level.unwrap_or(0);
    let clamp_max = request.max_level.unwrap_or(u8::MAX);
    if level < clamp_min || level > clamp_max {
        return Some(LevelWarningReason::OutsideClamp {
            min: clamp_min,
            max: clamp_max,
        });
    }
    None
}

fn enumerate_partitions(ids: Vec<String>) -> Result<Enumeration, PrefetchError> {
    let mut seen = HashSet::with_capacity(ids.len());
    let unique: Vec<String> = ids
        .into_iter()
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect();

    if unique.is_empty() {
        return Err(PrefetchError::EmptyRequest(
            "no partition ids given".to_string(),
        ));
    }

    debug!(count = unique.len(), "Enumerating partitions");
    Ok(Enumeration {
        sequence: AddressSequence {
            remaining: unique.len() as u64,
            inner: Inner::Partitions(unique.into_iter()),
        },
        warnings: Vec::new(),
    })
}

// =============================================================================
// Address Sequence
// =============================================================================

/// Lazy, single-pass sequence of prefetch targets.
///
/// The exact number of targets is known from the start, see
/// [`remaining`](Self::remaining).
#[derive(Debug)]
pub struct AddressSequence {
    remaining: u64,
    inner: Inner,
}

#[derive(Debug)]
enum Inner {
    Tiles(TileWalk),
    Partitions(std::vec::IntoIter<String>),
}

/// Depth-first walk below the covering tiles of the coarsest level.
#[derive(Debug)]
struct TileWalk {
    roots: TileRangeIter,
    stack: Vec<TileAddress>,
    /// Covering range per level, `coarsest..=finest`
    ranges: Vec<TileRange>,
    coarsest: u8,
    finest: u8,
    /// Bit `n` set if level `n` was requested
    wanted: u64,
}

impl TileWalk {
    fn next_tile(&mut self) -> Option<TileAddress> {
        loop {
            let tile = match self.stack.pop() {
                Some(tile) => tile,
                None => self.roots.next()?,
            };

            if tile.level() < self.finest {
                self.push_children(&tile);
            }
            if self.wanted & (1u64 << tile.level()) != 0 {
                return Some(tile);
            }
        }
    }

    fn push_children(&mut self, tile: &TileAddress) {
        let range = &self.ranges[(tile.level() + 1 - self.coarsest) as usize];
        // Reverse so quadrant 0 is visited first
        for quadrant in (0..4u8).rev() {
            if let Ok(child) = tile.child(quadrant) {
                if range.contains(&child) {
                    self.stack.push(child);
                }
            }
        }
    }
}

impl AddressSequence {
    /// Number of targets not yet yielded.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl Iterator for AddressSequence {
    type Item = PrefetchTarget;

    fn next(&mut self) -> Option<Self::Item> {
        let target = match &mut self.inner {
            Inner::Tiles(walk) => walk.next_tile().map(PrefetchTarget::Tile),
            Inner::Partitions(ids) => ids.next().map(PrefetchTarget::Partition),
        }?;
        self.remaining = self.remaining.saturating_sub(1);
        Some(target)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match usize::try_from(self.remaining) {
            Ok(n) => (n, Some(n)),
            Err(_) => (usize::MAX, None),
        }
    }
}
