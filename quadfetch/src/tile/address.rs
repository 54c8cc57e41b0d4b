//! Quadtree tile addresses and 64-bit quadkeys.
//!
//! A [`TileAddress`] is a `(level, row, column)` triple. Its quadkey packs the
//! triple into one `u64`:
//!
//! ```text
//! bit 2*level        sentinel 1 marking the level
//! bits 0..2*level    Morton interleave: column bits at even positions,
//!                    row bits at odd positions
//! ```
//!
//! With this layout the parent key is `key >> 2` and the child in quadrant
//! `q` is `(key << 2) | q`, where `q = (row_bit << 1) | column_bit`.

use std::fmt;

use crate::coord::{grid_size, CoordError, MAX_LEVEL};

/// Quadtree coordinate of a tile.
///
/// # Example
///
/// ```
/// use quadfetch::tile::TileAddress;
///
/// let tile = TileAddress::new(2, 1, 1).unwrap();
/// let key = tile.quadkey();
/// assert_eq!(TileAddress::from_quadkey(key).unwrap(), tile);
/// assert_eq!(tile.child(3).unwrap().parent(), Some(tile));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileAddress {
    level: u8,
    row: u32,
    column: u32,
}

impl TileAddress {
    /// Creates an address, validating level and range.
    ///
    /// # Arguments
    ///
    /// * `level` - Quadtree depth (0 to [`MAX_LEVEL`])
    /// * `row` - Row within `[0, 2^level)`
    /// * `column` - Column within `[0, 2^level)`
    pub fn new(level: u8, row: u32, column: u32) -> Result<Self, CoordError> {
        Self::with_max_level(level, row, column, MAX_LEVEL)
    }

    /// Creates an address against a layer-specific maximum depth.
    ///
    /// `max_level` is itself capped at [`MAX_LEVEL`].
    pub fn with_max_level(
        level: u8,
        row: u32,
        column: u32,
        max_level: u8,
    ) -> Result<Self, CoordError> {
        let max = max_level.min(MAX_LEVEL);
        if level > max {
            return Err(CoordError::InvalidLevel { level, max });
        }

        let n = grid_size(level);
        if row as u64 >= n {
            return Err(CoordError::InvalidRow { row, level });
        }
        if column as u64 >= n {
            return Err(CoordError::InvalidColumn { column, level });
        }

        Ok(Self { level, row, column })
    }

    /// Builds an address the caller has already range-checked.
    pub(crate) fn from_parts_unchecked(level: u8, row: u32, column: u32) -> Self {
        debug_assert!(level <= MAX_LEVEL);
        debug_assert!((row as u64) < grid_size(level));
        debug_assert!((column as u64) < grid_size(level));
        Self { level, row, column }
    }

    /// The root tile covering the whole grid.
    pub fn root() -> Self {
        Self {
            level: 0,
            row: 0,
            column: 0,
        }
    }

    /// Quadtree depth.
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Row within the level.
    pub fn row(&self) -> u32 {
        self.row
    }

    /// Column within the level.
    pub fn column(&self) -> u32 {
        self.column
    }

    // =========================================================================
    // Encoding
    // =========================================================================

    /// Encodes the address as a 64-bit quadkey.
    pub fn quadkey(&self) -> u64 {
        let sentinel = 1u64 << (2 * self.level as u32);
        sentinel | spread_bits(self.column) | (spread_bits(self.row) << 1)
    }

    /// Decodes a 64-bit quadkey.
    ///
    /// # Errors
    ///
    /// Returns `CoordError::InvalidQuadkey` for zero, or for keys whose
    /// highest set bit is not at an even position.
    pub fn from_quadkey(key: u64) -> Result<Self, CoordError> {
        if key == 0 {
            return Err(CoordError::InvalidQuadkey(key));
        }

        let msb = 63 - key.leading_zeros();
        if msb % 2 != 0 {
            return Err(CoordError::InvalidQuadkey(key));
        }

        let level = (msb / 2) as u8;
        let body = key ^ (1u64 << msb);

        Ok(Self {
            level,
            row: compact_bits(body >> 1),
            column: compact_bits(body),
        })
    }

    /// Decimal string form of the quadkey, used in cache keys and URLs.
    pub fn to_key_string(&self) -> String {
        self.quadkey().to_string()
    }

    /// Parses the decimal string form produced by [`to_key_string`](Self::to_key_string).
    pub fn from_key_string(key: &str) -> Result<Self, CoordError> {
        let value: u64 = key
            .trim()
            .parse()
            .map_err(|_| CoordError::InvalidQuadkeyString(key.to_string()))?;
        Self::from_quadkey(value)
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Returns the parent tile, or `None` at level 0.
    pub fn parent(&self) -> Option<Self> {
        if self.level == 0 {
            return None;
        }
        Some(Self {
            level: self.level - 1,
            row: self.row >> 1,
            column: self.column >> 1,
        })
    }

    /// Returns the child in `quadrant` (0-3).
    ///
    /// Bit 0 of the quadrant selects the column offset, bit 1 the row offset.
    pub fn child(&self, quadrant: u8) -> Result<Self, CoordError> {
        if quadrant > 3 {
            return Err(CoordError::InvalidQuadrant(quadrant));
        }
        if self.level >= MAX_LEVEL {
            return Err(CoordError::InvalidLevel {
                level: self.level + 1,
                max: MAX_LEVEL,
            });
        }

        Ok(Self {
            level: self.level + 1,
            row: (self.row << 1) | (quadrant >> 1) as u32,
            column: (self.column << 1) | (quadrant & 1) as u32,
        })
    }

    /// Returns all four children in quadrant order.
    pub fn children(&self) -> Result<[Self; 4], CoordError> {
        Ok([
            self.child(0)?,
            self.child(1)?,
            self.child(2)?,
            self.child(3)?,
        ])
    }

    /// The ancestor at `level`, or the tile itself when `level` equals its own.
    ///
    /// Returns `None` if `level` is deeper than this tile.
    pub fn ancestor_at(&self, level: u8) -> Option<Self> {
        if level > self.level {
            return None;
        }
        let shift = (self.level - level) as u32;
        Some(Self {
            level,
            row: self.row >> shift,
            column: self.column >> shift,
        })
    }

    /// Returns true if this tile strictly contains `other`.
    pub fn is_ancestor_of(&self, other: &TileAddress) -> bool {
        other.level > self.level && other.ancestor_at(self.level) == Some(*self)
    }

    /// Tile one row up (row - 1).
    pub fn previous_row(&self) -> Result<Self, CoordError> {
        if self.row == 0 {
            return Err(self.out_of_range("previous row"));
        }
        Ok(Self {
            row: self.row - 1,
            ..*self
        })
    }

    /// Tile one row down (row + 1).
    pub fn next_row(&self) -> Result<Self, CoordError> {
        if self.row as u64 + 1 >= grid_size(self.level) {
            return Err(self.out_of_range("next row"));
        }
        Ok(Self {
            row: self.row + 1,
            ..*self
        })
    }

    /// Tile one column to the left (column - 1).
    pub fn previous_column(&self) -> Result<Self, CoordError> {
        if self.column == 0 {
            return Err(self.out_of_range("previous column"));
        }
        Ok(Self {
            column: self.column - 1,
            ..*self
        })
    }

    /// Tile one column to the right (column + 1).
    pub fn next_column(&self) -> Result<Self, CoordError> {
        if self.column as u64 + 1 >= grid_size(self.level) {
            return Err(self.out_of_range("next column"));
        }
        Ok(Self {
            column: self.column + 1,
            ..*self
        })
    }

    fn out_of_range(&self, direction: &'static str) -> CoordError {
        CoordError::OutOfRange {
            direction,
            level: self.level,
            row: self.row,
            column: self.column,
        }
    }
}

impl fmt::Display for TileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.level, self.row, self.column)
    }
}

/// Spreads the 32 bits of `v` into the even bit positions of a `u64`.
#[inline]
fn spread_bits(v: u32) -> u64 {
    let mut x = v as u64;
    x = (x | (x << 16)) & 0x0000_FFFF_0000_FFFF;
    x = (x | (x << 8)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x << 4)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x << 2)) & 0x3333_3333_3333_3333;
    x = (x | (x << 1)) & 0x5555_5555_5555_5555;
    x
}

/// Inverse of [`spread_bits`]: gathers the even bit positions.
#[inline]
fn compact_bits(v: u64) -> u32 {
    let mut x = v & 0x5555_5555_5555_5555;
    x = (x | (x >> 1)) & 0x3333_3333_3333_3333;
    x = (x | (x >> 2)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x >> 4)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x >> 8)) & 0x0000_FFFF_0000_FFFF;
    x = (x | (x >> 16)) & 0x0000_0000_FFFF_FFFF;
    x as u32
}
