//! Tiling schemes and geographic bounds.
//!
//! A layer's tiling scheme decides how a [`TileAddress`] maps to a
//! geographic rectangle. The enumerator only needs two operations from it:
//! the bounds of a tile, and the range of tiles at a level that covers an
//! area.
//!
//! Two schemes are provided:
//!
//! - [`TilingScheme::Geographic`]: equirectangular quadtree, level 0 is one
//!   tile covering the globe, row 0 at the south pole.
//! - [`TilingScheme::WebMercator`]: slippy-map tiling, row 0 at the north
//!   edge, latitudes clamped to the Mercator range.

mod types;

pub use types::{CoordError, GeoRectangle, MAX_LAT, MAX_LEVEL, MAX_LON, MIN_LAT, MIN_LON};

use std::f64::consts::PI;

use crate::tile::TileAddress;

/// How tiles of a layer are laid out on the globe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TilingScheme {
    /// Equirectangular quadtree over (-180..180, -90..90).
    #[default]
    Geographic,
    /// Web Mercator slippy-map tiling.
    WebMercator,
}

impl TilingScheme {
    /// Name used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            TilingScheme::Geographic => "geographic",
            TilingScheme::WebMercator => "web_mercator",
        }
    }

    /// Parses a configuration name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "geographic" | "equirectangular" => Some(TilingScheme::Geographic),
            "web_mercator" | "webmercator" | "mercator" => Some(TilingScheme::WebMercator),
            _ => None,
        }
    }

    /// Returns the geographic bounds of a tile.
    pub fn tile_bounds(&self, tile: &TileAddress) -> GeoRectangle {
        let n = grid_size(tile.level()) as f64;
        let row = tile.row() as f64;
        let col = tile.column() as f64;

        match self {
            TilingScheme::Geographic => {
                let lon_span = 360.0 / n;
                let lat_span = 180.0 / n;
                let west = MIN_LON + col * lon_span;
                let south = -90.0 + row * lat_span;
                GeoRectangle {
                    west,
                    south,
                    east: west + lon_span,
                    north: south + lat_span,
                }
            }
            TilingScheme::WebMercator => {
                // Row grows southwards, so the northwest corner is (row, col)
                let (north, west) = mercator_corner(row, col, n);
                let (south, east) = mercator_corner(row + 1.0, col + 1.0, n);
                GeoRectangle {
                    west,
                    south,
                    east,
                    north,
                }
            }
        }
    }

    /// Returns the rectangular range of tiles at `level` covering `area`.
    ///
    /// Tiles that only touch the area along an edge are excluded. The range
    /// is never empty: a degenerate area still maps to the tile containing it.
    pub fn tile_range(&self, area: &GeoRectangle, level: u8) -> TileRange {
        let n = grid_size(level) as f64;

        let x_min = (area.west - MIN_LON) / 360.0 * n;
        let x_max = (area.east - MIN_LON) / 360.0 * n;

        let (y_min, y_max) = match self {
            TilingScheme::Geographic => (
                (area.south + 90.0) / 180.0 * n,
                (area.north + 90.0) / 180.0 * n,
            ),
            // North maps to the smaller row in Mercator
            TilingScheme::WebMercator => {
                (mercator_row(area.north, n), mercator_row(area.south, n))
            }
        };

        let (column_min, column_max) = cell_span(x_min, x_max, n);
        let (row_min, row_max) = cell_span(y_min, y_max, n);

        TileRange {
            level,
            row_min,
            row_max,
            column_min,
            column_max,
        }
    }
}

/// Number of rows (and columns) at a level.
#[inline]
pub fn grid_size(level: u8) -> u64 {
    1u64 << level
}

/// Converts a continuous span on one axis to an inclusive cell range.
fn cell_span(start: f64, end: f64, n: f64) -> (u32, u32) {
    let last = n - 1.0;
    let first_cell = start.floor().clamp(0.0, last);
    let last_cell = if end > start {
        (end.ceil() - 1.0).clamp(0.0, last)
    } else {
        first_cell
    };
    (first_cell as u32, last_cell.max(first_cell) as u32)
}

/// Web Mercator row (continuous) for a latitude.
fn mercator_row(lat: f64, n: f64) -> f64 {
    let lat = lat.clamp(MIN_LAT, MAX_LAT);
    let lat_rad = lat * PI / 180.0;
    (1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n
}

/// Latitude/longitude of the northwest corner of a Mercator cell.
fn mercator_corner(row: f64, col: f64, n: f64) -> (f64, f64) {
    let lon = col / n * 360.0 - 180.0;

    let y = row / n;
    let lat_rad = (PI * (1.0 - 2.0 * y)).sinh().atan();
    let lat = lat_rad * 180.0 / PI;

    (lat, lon)
}

/// An inclusive rectangular block of tiles at one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub level: u8,
    pub row_min: u32,
    pub row_max: u32,
    pub column_min: u32,
    pub column_max: u32,
}

impl TileRange {
    /// Number of tiles in the range.
    pub fn len(&self) -> u64 {
        let rows = (self.row_max - self.row_min) as u64 + 1;
        let cols = (self.column_max - self.column_min) as u64 + 1;
        rows * cols
    }

    /// Ranges always hold at least one tile.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns true if `tile` is at this level and inside the range.
    pub fn contains(&self, tile: &TileAddress) -> bool {
        tile.level() == self.level
            && (self.row_min..=self.row_max).contains(&tile.row())
            && (self.column_min..=self.column_max).contains(&tile.column())
    }

    /// Lazily walks the range in row-major order.
    pub fn iter(&self) -> TileRangeIter {
        TileRangeIter {
            range: *self,
            row: self.row_min as u64,
            column: self.column_min as u64,
        }
    }
}

/// Row-major iterator over a [`TileRange`].
#[derive(Debug, Clone)]
pub struct TileRangeIter {
    range: TileRange,
    row: u64,
    column: u64,
}

impl Iterator for TileRangeIter {
    type Item = TileAddress;

    fn next(&mut self) -> Option<Self::Item> {
        if self.row > self.range.row_max as u64 {
            return None;
        }

        let tile =
            TileAddress::from_parts_unchecked(self.range.level, self.row as u32, self.column as u32);

        self.column += 1;
        if self.column > self.range.column_max as u64 {
            self.column = self.range.column_min as u64;
            self.row += 1;
        }

        Some(tile)
    }
}
