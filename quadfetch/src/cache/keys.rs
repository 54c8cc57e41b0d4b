//! Cache key derivation.
//!
//! # Key Format
//!
//! Keys are namespaced by layer so a whole layer can be dropped with
//! [`ProtectedCache::remove_keys_with_prefix`](super::ProtectedCache::remove_keys_with_prefix):
//!
//! - tiles: `{layer}::tile::{quadkey}`, e.g. `terrain::tile::22`
//! - partitions: `{layer}::partition::{id}`, e.g. `roads::partition::23618402`

use crate::tile::TileAddress;

const SEPARATOR: &str = "::";

/// Key under which a tile of `layer` is cached.
pub fn tile_key(layer: &str, tile: &TileAddress) -> String {
    format!("{layer}{SEPARATOR}tile{SEPARATOR}{}", tile.quadkey())
}

/// Key under which a partition of `layer` is cached.
pub fn partition_key(layer: &str, partition: &str) -> String {
    format!("{layer}{SEPARATOR}partition{SEPARATOR}{partition}")
}

/// Prefix shared by every key of `layer`.
pub fn layer_prefix(layer: &str) -> String {
    format!("{layer}{SEPARATOR}")
}
