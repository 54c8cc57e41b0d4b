//! Tile addressing.
//!
//! Provides [`TileAddress`], the quadtree coordinate used to name spatial
//! units of data, and its reversible 64-bit quadkey encoding.

mod address;

pub use address::TileAddress;
