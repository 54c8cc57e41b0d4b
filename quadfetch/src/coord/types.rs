//! Coordinate type definitions

use std::fmt;

/// Web Mercator valid latitude range
pub const MIN_LAT: f64 = -85.05112878;
pub const MAX_LAT: f64 = 85.05112878;

/// Valid longitude range
pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;

/// Deepest quadtree level a 64-bit quadkey can address.
///
/// Level 31 uses 62 bits for the interleaved row/column plus one sentinel bit.
pub const MAX_LEVEL: u8 = 31;

/// A geographic bounding rectangle in degrees.
///
/// Edges are stored as west/south/east/north. Rectangles never cross the
/// antimeridian (`west <= east` always holds).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoRectangle {
    /// Western edge (minimum longitude)
    pub west: f64,
    /// Southern edge (minimum latitude)
    pub south: f64,
    /// Eastern edge (maximum longitude)
    pub east: f64,
    /// Northern edge (maximum latitude)
    pub north: f64,
}

impl GeoRectangle {
    /// Creates a validated rectangle.
    ///
    /// # Errors
    ///
    /// Returns `CoordError::InvalidRectangle` if an edge is outside the valid
    /// longitude/latitude range or the edges are inverted.
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Result<Self, CoordError> {
        let finite = [west, south, east, north].iter().all(|v| v.is_finite());
        if !finite {
            return Err(CoordError::InvalidRectangle(
                "edges must be finite numbers".to_string(),
            ));
        }
        if !(MIN_LON..=MAX_LON).contains(&west) || !(MIN_LON..=MAX_LON).contains(&east) {
            return Err(CoordError::InvalidRectangle(format!(
                "longitude out of range: west={}, east={}",
                west, east
            )));
        }
        if !(-90.0..=90.0).contains(&south) || !(-90.0..=90.0).contains(&north) {
            return Err(CoordError::InvalidRectangle(format!(
                "latitude out of range: south={}, north={}",
                south, north
            )));
        }
        if west > east || south > north {
            return Err(CoordError::InvalidRectangle(format!(
                "inverted edges: ({}, {}) -> ({}, {})",
                west, south, east, north
            )));
        }

        Ok(Self {
            west,
            south,
            east,
            north,
        })
    }

    /// The whole globe.
    pub fn world() -> Self {
        Self {
            west: MIN_LON,
            south: -90.0,
            east: MAX_LON,
            north: 90.0,
        }
    }

    /// Width in degrees of longitude.
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    /// Height in degrees of latitude.
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Returns true if `other` shares area with this rectangle.
    ///
    /// Rectangles that only touch along an edge do not intersect. When this
    /// rectangle is degenerate on an axis (zero width or height) that axis is
    /// treated as a closed interval, so a point still intersects the tile
    /// containing it.
    pub fn intersects(&self, other: &GeoRectangle) -> bool {
        axis_overlaps(self.west, self.east, other.west, other.east)
            && axis_overlaps(self.south, self.north, other.south, other.north)
    }

    /// Returns true if `other` lies entirely within this rectangle.
    pub fn contains(&self, other: &GeoRectangle) -> bool {
        self.west <= other.west
            && self.east >= other.east
            && self.south <= other.south
            && self.north >= other.north
    }
}

fn axis_overlaps(a_min: f64, a_max: f64, b_min: f64, b_max: f64) -> bool {
    if a_min == a_max {
        b_min <= a_min && a_min <= b_max
    } else {
        a_min < b_max && b_min < a_max
    }
}

impl fmt::Display for GeoRectangle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.west, self.south, self.east, self.north
        )
    }
}

/// Errors that can occur during coordinate and address handling.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordError {
    /// Level exceeds the maximum addressable depth
    InvalidLevel { level: u8, max: u8 },
    /// Row is outside `[0, 2^level)`
    InvalidRow { row: u32, level: u8 },
    /// Column is outside `[0, 2^level)`
    InvalidColumn { column: u32, level: u8 },
    /// Quadkey does not encode a valid address
    InvalidQuadkey(u64),
    /// Quadkey string is not a decimal number
    InvalidQuadkeyString(String),
    /// Child quadrant outside 0-3
    InvalidQuadrant(u8),
    /// Navigation would step off the edge of the grid
    OutOfRange {
        direction: &'static str,
        level: u8,
        row: u32,
        column: u32,
    },
    /// Bounding rectangle is malformed
    InvalidRectangle(String),
}

impl fmt::Display for CoordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordError::InvalidLevel { level, max } => {
                write!(f, "Invalid level: {} (must be between 0 and {})", level, max)
            }
            CoordError::InvalidRow { row, level } => {
                write!(f, "Invalid row {} at level {}", row, level)
            }
            CoordError::InvalidColumn { column, level } => {
                write!(f, "Invalid column {} at level {}", column, level)
            }
            CoordError::InvalidQuadkey(key) => write!(f, "Invalid quadkey: {}", key),
            CoordError::InvalidQuadkeyString(key) => {
                write!(f, "Invalid quadkey string: '{}'", key)
            }
            CoordError::InvalidQuadrant(q) => {
                write!(f, "Invalid quadrant: {} (must be 0-3)", q)
            }
            CoordError::OutOfRange {
                direction,
                level,
                row,
                column,
            } => write!(
                f,
                "No {} tile for {}/{}/{}: edge of grid",
                direction, level, row, column
            ),
            CoordError::InvalidRectangle(msg) => write!(f, "Invalid rectangle: {}", msg),
        }
    }
}

impl std::error::Error for CoordError {}
